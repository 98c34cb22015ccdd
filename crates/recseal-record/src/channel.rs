//! # Channels
//!
//! Every leaf belongs to exactly one channel. A channel is committed and
//! exported on its own, so one document can hold fields with different
//! audiences.
//!
//! Private channels carry a 32-byte pepper that seeds their salt stream.
//! The pepper only ever leaves memory inside the channel's own section bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use recseal_core::{ChannelId, PolicyError};
use recseal_crypto::Pepper;

/// Who may read a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Readable by anyone. Never part of a proof.
    Public,
    /// Salted, committed by Merkle root, selectively disclosed by proofs.
    Private,
}

/// A declared channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    name: String,
    visibility: Visibility,
    pepper: Option<Pepper>,
}

impl Channel {
    /// Identifier.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// True for private channels.
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// The pepper, once drawn or imported.
    pub fn pepper(&self) -> Option<&Pepper> {
        self.pepper.as_ref()
    }

    pub(crate) fn set_pepper(&mut self, pepper: Pepper) {
        self.pepper = Some(pepper);
    }
}

/// The channels declared on one record tree.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
}

impl ChannelRegistry {
    /// Declare the next channel.
    pub fn declare(&mut self, name: &str, visibility: Visibility) -> Result<ChannelId, PolicyError> {
        let next = self
            .channels
            .keys()
            .next_back()
            .map_or(Some(0), |last| last.0.checked_add(1))
            .ok_or(PolicyError::TooManyChannels)?;
        let id = ChannelId(next);
        self.register(id, name, visibility)?;
        Ok(id)
    }

    /// Register a channel under a known id, as read from a section or a
    /// proof. Registering the same channel twice is a no-op.
    pub fn register(&mut self, id: ChannelId, name: &str, visibility: Visibility) -> Result<(), PolicyError> {
        if let Some(existing) = self.channels.get(&id) {
            if existing.name == name && existing.visibility == visibility {
                return Ok(());
            }
            return Err(PolicyError::DuplicateChannelName(name.to_string()));
        }
        if self.by_name(name).is_some() {
            return Err(PolicyError::DuplicateChannelName(name.to_string()));
        }
        self.channels.insert(
            id,
            Channel {
                id,
                name: name.to_string(),
                visibility,
                pepper: None,
            },
        );
        Ok(())
    }

    /// Look up by id.
    pub fn get(&self, id: ChannelId) -> Result<&Channel, PolicyError> {
        self.channels.get(&id).ok_or(PolicyError::UnknownChannel(id))
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> Result<&mut Channel, PolicyError> {
        self.channels.get_mut(&id).ok_or(PolicyError::UnknownChannel(id))
    }

    /// Look up by name.
    pub fn by_name(&self, name: &str) -> Option<&Channel> {
        self.channels.values().find(|c| c.name == name)
    }

    /// True if `id` was declared.
    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    /// Channels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.channels.values_mut()
    }
}
