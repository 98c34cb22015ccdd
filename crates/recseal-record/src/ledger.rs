//! # Ledger Contract
//!
//! What a record looks like once sealed: one [`ChannelSection`] per declared
//! channel, each holding the channel's wire bytes and, for private channels,
//! the Merkle root that proofs are later checked against.
//!
//! Verifiers only need the published roots. They reach them through
//! [`CommitmentLookup`], which a ledger client, a [`PublishedRoots`] file, or
//! a plain map in tests can implement. A [`LedgerBundle`] also implements it,
//! but it carries private section bytes and peppers and belongs to the owner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use recseal_core::{ChannelId, Hash32, PolicyError, ProofError, RecordError};
use recseal_crypto::roots_match;

use crate::channel::Visibility;
use crate::tree::RecordTree;

/// Source of published channel commitments.
pub trait CommitmentLookup {
    /// The root published for `channel`, if any.
    fn published_root(&self, channel: ChannelId) -> Option<Hash32>;

    /// The declared name of `channel`, if known.
    fn channel_name(&self, _channel: ChannelId) -> Option<&str> {
        None
    }
}

impl CommitmentLookup for BTreeMap<ChannelId, Hash32> {
    fn published_root(&self, channel: ChannelId) -> Option<Hash32> {
        self.get(&channel).copied()
    }
}

/// One channel of a sealed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSection {
    /// The channel this section encodes.
    pub channel_id: ChannelId,
    /// Declared channel name.
    pub name: String,
    /// Whether the section is committed under a pepper.
    pub visibility: Visibility,
    /// Section bytes, hex in JSON.
    #[serde(with = "hex")]
    pub data: Vec<u8>,
    /// Commitment of a private channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Hash32>,
}

impl CommitmentLookup for [ChannelSection] {
    fn published_root(&self, channel: ChannelId) -> Option<Hash32> {
        self.iter().find(|s| s.channel_id == channel).and_then(|s| s.root)
    }

    fn channel_name(&self, channel: ChannelId) -> Option<&str> {
        self.iter()
            .find(|s| s.channel_id == channel)
            .map(|s| s.name.as_str())
    }
}

/// Every section of one sealed record, as a single JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBundle {
    /// Sections in channel order.
    pub sections: Vec<ChannelSection>,
}

impl LedgerBundle {
    /// Serialize as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Published roots only, as a verifier would hold them.
    pub fn roots(&self) -> BTreeMap<ChannelId, Hash32> {
        self.sections
            .iter()
            .filter_map(|s| s.root.map(|root| (s.channel_id, root)))
            .collect()
    }

    /// Rebuild the owner's tree from every section.
    pub fn open(&self) -> Result<RecordTree, RecordError> {
        RecordTree::from_sections(&self.sections)
    }

    /// The part of the bundle a verifier may hold: roots and names of the
    /// private channels, without section bytes.
    pub fn published(&self) -> PublishedRoots {
        let channels = self
            .sections
            .iter()
            .filter_map(|s| {
                s.root.map(|root| PublishedRoot {
                    channel_id: s.channel_id,
                    name: s.name.clone(),
                    root,
                })
            })
            .collect();
        PublishedRoots { channels }
    }
}

impl From<Vec<ChannelSection>> for LedgerBundle {
    fn from(sections: Vec<ChannelSection>) -> Self {
        Self { sections }
    }
}

impl CommitmentLookup for LedgerBundle {
    fn published_root(&self, channel: ChannelId) -> Option<Hash32> {
        self.sections.as_slice().published_root(channel)
    }

    fn channel_name(&self, channel: ChannelId) -> Option<&str> {
        self.sections.as_slice().channel_name(channel)
    }
}

/// Commitment of one private channel as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRoot {
    /// The committed channel.
    pub channel_id: ChannelId,
    /// Declared channel name.
    pub name: String,
    /// Merkle root of the channel's leaves.
    pub root: Hash32,
}

/// Roots-only view of a sealed record, safe to hand to verifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRoots {
    /// One entry per private channel.
    pub channels: Vec<PublishedRoot>,
}

impl PublishedRoots {
    /// Serialize as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl CommitmentLookup for PublishedRoots {
    fn published_root(&self, channel: ChannelId) -> Option<Hash32> {
        self.channels
            .iter()
            .find(|c| c.channel_id == channel)
            .map(|c| c.root)
    }

    fn channel_name(&self, channel: ChannelId) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.channel_id == channel)
            .map(|c| c.name.as_str())
    }
}

impl RecordTree {
    /// Export every declared channel as a section, with roots for the
    /// private ones.
    pub fn seal(&self) -> Result<Vec<ChannelSection>, RecordError> {
        if !self.finalized {
            return Err(PolicyError::NotFinalized.into());
        }
        let mut sections = Vec::new();
        for channel in self.channels.iter() {
            let id = channel.id();
            sections.push(ChannelSection {
                channel_id: id,
                name: channel.name().to_string(),
                visibility: channel.visibility(),
                data: self.export_section(id)?,
                root: self.channel_root(id)?,
            });
        }
        tracing::info!(channels = sections.len(), "sealed record");
        Ok(sections)
    }

    /// Rebuild a tree from sealed sections and check each published root
    /// against the recomputed one.
    pub fn from_sections(sections: &[ChannelSection]) -> Result<Self, RecordError> {
        let mut tree = RecordTree::new();
        for section in sections {
            tree.register_channel(section.channel_id, &section.name, section.visibility)?;
        }
        for section in sections {
            tree.import_section(section.channel_id, &section.data)?;
        }
        tree.finalize()?;

        for section in sections {
            let (Some(expected), Some(computed)) = (section.root, tree.channel_root(section.channel_id)?)
            else {
                continue;
            };
            if !roots_match(&expected, &computed) {
                tracing::warn!(channel = %section.channel_id, "section does not match its published root");
                return Err(ProofError::RootMismatch {
                    channel: section.channel_id,
                    expected,
                    computed,
                }
                .into());
            }
        }
        Ok(tree)
    }
}
