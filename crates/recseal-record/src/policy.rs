//! # Record Policy
//!
//! Declarative channel and field rules, loaded from YAML:
//!
//! ```yaml
//! channels:
//!   - name: public
//!     visibility: public
//!   - name: contact
//!     visibility: private
//! fields:
//!   - path: this
//!     channel: public
//!   - path: this.email
//!     channel: contact
//!     mask:
//!       pattern: "/^(.)(.*?)(@.)(.*?)(\\..*)$/"
//!       substitution: "$1***$3***$5"
//!   - path: this.items[*].qty
//!     channel: contact
//!     hashable: true
//! ```
//!
//! Channels are declared in list order, so the first one gets id 0. Field
//! rules run in list order and later rules override earlier channel
//! assignments.

use serde::{Deserialize, Serialize};

use recseal_core::PolicyError;

use crate::channel::Visibility;
use crate::mask::MaskSpec;
use crate::tree::RecordTree;

/// A channel declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelDecl {
    /// Name that field rules refer to.
    pub name: String,
    /// `public` or `private`.
    pub visibility: Visibility,
}

/// Rule for the leaves under one path list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    /// Comma-separated path expressions.
    pub path: String,
    /// Channel name to assign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Make the leaves Hashable.
    #[serde(default)]
    pub hashable: bool,
    /// Make the leaves Maskable with this mask. Excludes `hashable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<MaskSpec>,
}

/// Channels plus field rules for one kind of record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPolicy {
    /// Channels in declaration order; the first gets id 0.
    #[serde(default)]
    pub channels: Vec<ChannelDecl>,
    /// Rules applied in order.
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

impl RecordPolicy {
    /// Parse a policy from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PolicyError::InvalidPolicy(format!("failed to parse policy YAML: {e}")))
    }

    /// Declare the channels on `tree` and apply every field rule.
    ///
    /// The tree still needs [`RecordTree::finalize`] afterwards.
    pub fn apply(&self, tree: &mut RecordTree) -> Result<(), PolicyError> {
        for decl in &self.channels {
            tree.declare_channel(&decl.name, decl.visibility)?;
        }
        for rule in &self.fields {
            if rule.hashable && rule.mask.is_some() {
                return Err(PolicyError::InvalidPolicy(format!(
                    "rule for {} is both hashable and masked",
                    rule.path
                )));
            }
            if let Some(name) = &rule.channel {
                let id = tree
                    .channels()
                    .by_name(name)
                    .map(|c| c.id())
                    .ok_or_else(|| PolicyError::UnknownChannelName(name.clone()))?;
                tree.set_channel(&rule.path, id)?;
            }
            if rule.hashable {
                tree.set_hashable(&rule.path)?;
            }
            if let Some(mask) = &rule.mask {
                tree.set_maskable(&rule.path, mask)?;
            }
        }
        tracing::debug!(
            channels = self.channels.len(),
            rules = self.fields.len(),
            "applied record policy"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BaseKind;
    use recseal_core::ChannelId;
    use serde_json::json;

    const POLICY: &str = r#"
channels:
  - name: public
    visibility: public
  - name: contact
    visibility: private
fields:
  - path: this
    channel: public
  - path: this.email
    channel: contact
    mask:
      pattern: "^(.)(.*)$"
      substitution: "$1***"
  - path: this.items[*].qty
    channel: contact
    hashable: true
  - path: this.card
    channel: contact
    mask:
      intervals:
        - start: 0
          end: 12
          replacement: "xxxx"
"#;

    fn doc() -> RecordTree {
        RecordTree::from_json(&json!({
            "email": "kim@example.net",
            "card": "4111111111111111",
            "items": [{"qty": 1, "sku": "a"}, {"qty": 4, "sku": "b"}]
        }))
        .unwrap()
    }

    #[test]
    fn applies_channels_and_rules() {
        let policy = RecordPolicy::from_yaml_str(POLICY).unwrap();
        let mut tree = doc();
        policy.apply(&mut tree).unwrap();
        tree.finalize().unwrap();

        assert_eq!(tree.channels().by_name("contact").map(|c| c.id()), Some(ChannelId(1)));
        assert_eq!(tree.leaf("this.items[1].qty").unwrap().base(), BaseKind::Hashable);
        assert_eq!(tree.leaf("this.items[1].qty").unwrap().channel(), Some(ChannelId(1)));
        assert_eq!(tree.leaf("this.items[1].sku").unwrap().channel(), Some(ChannelId(0)));
        assert_eq!(tree.leaf("this.email").unwrap().base(), BaseKind::Maskable);
        assert_eq!(tree.leaf("this.card").unwrap().base(), BaseKind::Maskable);
        assert_eq!(tree.to_json()["card"], json!("4111111111111111"));
    }

    #[test]
    fn undeclared_channel_name_is_rejected() {
        let policy = RecordPolicy::from_yaml_str(
            "fields:\n  - path: this.email\n    channel: nowhere\n",
        )
        .unwrap();
        assert_eq!(
            policy.apply(&mut doc()),
            Err(PolicyError::UnknownChannelName("nowhere".into()))
        );
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        assert!(matches!(
            RecordPolicy::from_yaml_str("channels: [ {name: a, visibility: secret} ]"),
            Err(PolicyError::InvalidPolicy(_))
        ));
        assert!(matches!(
            RecordPolicy::from_yaml_str("fields:\n  - path: this\n    colour: red\n"),
            Err(PolicyError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn hashable_and_mask_together_is_rejected() {
        let policy = RecordPolicy {
            channels: vec![],
            fields: vec![FieldRule {
                path: "this.email".into(),
                channel: None,
                hashable: true,
                mask: Some(MaskSpec::pattern("^(.*)$", "$1")),
            }],
        };
        assert!(matches!(
            policy.apply(&mut doc()),
            Err(PolicyError::InvalidPolicy(_))
        ));
    }
}
