//! # Identifier Newtypes
//!
//! A channel id is a small integer on the wire and in proofs. Wrapping it
//! keeps it from being confused with leaf indices and array positions, which
//! are also small integers flowing through the same code paths.

use serde::{Deserialize, Serialize};

/// Identifier of a record channel, assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u16);

impl ChannelId {
    /// The raw numeric identifier.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u16> for ChannelId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}
