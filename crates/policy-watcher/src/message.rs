//! # Change Messages
//!
//! The wire-level description of one policy mutation.
//!
//! ## Wire Format
//!
//! A JSON object, field names as deployed:
//!
//! ```text
//! {"Method":"UpdateForAddPolicy","ID":"<origin>","Sec":"p","Ptype":"p",
//!  "NewRule":["alice","/data","read"]}
//! ```
//!
//! | Method | Payload fields |
//! |--------|----------------|
//! | `Update`, `UpdateForSavePolicy` | none |
//! | `UpdateForAddPolicy`, `UpdateForRemovePolicy` | `Sec`, `Ptype`, `NewRule` |
//! | `UpdateForRemoveFilteredPolicy` | `Sec`, `Ptype`, `FieldIndex`, `FieldValues` |
//! | `UpdateForAddPolicies`, `UpdateForRemovePolicies` | `Sec`, `Ptype`, `NewRules` |
//! | `UpdateForUpdatePolicy` | `Sec`, `Ptype`, `OldRule`, `NewRule` |
//! | `UpdateForUpdatePolicies` | `Sec`, `Ptype`, `OldRules`, `NewRules` |
//!
//! `method` and `originID` are accepted as aliases. Unknown fields are
//! ignored and `null` rule lists decode as empty.

use policy_types::Rule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved payload that stops a listener. Never a valid encoded message.
pub const CLOSE_SENTINEL: &str = "close";

/// Errors decoding a change message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload is not a JSON change message.
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The `Method` field names no known mutation kind.
    #[error("unknown update type: {0}")]
    UnknownMethod(String),

    /// A field the method requires is absent.
    #[error("{method} message is missing {field}")]
    MissingField {
        method: UpdateType,
        field: &'static str,
    },
}

/// The nine mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Update,
    AddPolicy,
    RemovePolicy,
    RemoveFilteredPolicy,
    SavePolicy,
    AddPolicies,
    RemovePolicies,
    UpdatePolicy,
    UpdatePolicies,
}

impl UpdateType {
    /// Every kind, in wire-table order.
    pub const ALL: [UpdateType; 9] = [
        UpdateType::Update,
        UpdateType::AddPolicy,
        UpdateType::RemovePolicy,
        UpdateType::RemoveFilteredPolicy,
        UpdateType::SavePolicy,
        UpdateType::AddPolicies,
        UpdateType::RemovePolicies,
        UpdateType::UpdatePolicy,
        UpdateType::UpdatePolicies,
    ];

    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "Update",
            Self::AddPolicy => "UpdateForAddPolicy",
            Self::RemovePolicy => "UpdateForRemovePolicy",
            Self::RemoveFilteredPolicy => "UpdateForRemoveFilteredPolicy",
            Self::SavePolicy => "UpdateForSavePolicy",
            Self::AddPolicies => "UpdateForAddPolicies",
            Self::RemovePolicies => "UpdateForRemovePolicies",
            Self::UpdatePolicy => "UpdateForUpdatePolicy",
            Self::UpdatePolicies => "UpdateForUpdatePolicies",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateType {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MessageError::UnknownMethod(s.to_string()))
    }
}

/// One policy mutation, carrying exactly the payload its kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyChange {
    /// Reload everything.
    Update,
    AddPolicy {
        sec: String,
        ptype: String,
        rule: Rule,
    },
    RemovePolicy {
        sec: String,
        ptype: String,
        rule: Rule,
    },
    RemoveFilteredPolicy {
        sec: String,
        ptype: String,
        field_index: usize,
        field_values: Vec<String>,
    },
    /// The originator saved its whole policy; reload everything.
    SavePolicy,
    AddPolicies {
        sec: String,
        ptype: String,
        rules: Vec<Rule>,
    },
    RemovePolicies {
        sec: String,
        ptype: String,
        rules: Vec<Rule>,
    },
    UpdatePolicy {
        sec: String,
        ptype: String,
        old_rule: Rule,
        new_rule: Rule,
    },
    UpdatePolicies {
        sec: String,
        ptype: String,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    },
}

impl PolicyChange {
    /// Kind of this change.
    #[must_use]
    pub fn update_type(&self) -> UpdateType {
        match self {
            Self::Update => UpdateType::Update,
            Self::AddPolicy { .. } => UpdateType::AddPolicy,
            Self::RemovePolicy { .. } => UpdateType::RemovePolicy,
            Self::RemoveFilteredPolicy { .. } => UpdateType::RemoveFilteredPolicy,
            Self::SavePolicy => UpdateType::SavePolicy,
            Self::AddPolicies { .. } => UpdateType::AddPolicies,
            Self::RemovePolicies { .. } => UpdateType::RemovePolicies,
            Self::UpdatePolicy { .. } => UpdateType::UpdatePolicy,
            Self::UpdatePolicies { .. } => UpdateType::UpdatePolicies,
        }
    }
}

/// A change stamped with the identifier of the instance that published it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMessage {
    pub origin_id: String,
    pub change: PolicyChange,
}

impl ChangeMessage {
    pub fn new(origin_id: impl Into<String>, change: PolicyChange) -> Self {
        Self {
            origin_id: origin_id.into(),
            change,
        }
    }

    #[must_use]
    pub fn update_type(&self) -> UpdateType {
        self.change.update_type()
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(&Envelope::from(self))?)
    }

    /// Parse a payload into a typed message.
    pub fn decode(payload: &str) -> Result<Self, MessageError> {
        Envelope::parse(payload)?.try_into()
    }
}

/// The flat wire record.
///
/// Parsing an envelope never looks at the method name, so an unknown kind
/// still yields the origin identifier. [`ChangeMessage::decode`] is the
/// typed layer on top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Method", alias = "method")]
    pub method: String,

    #[serde(rename = "ID", alias = "originID", default)]
    pub id: String,

    #[serde(rename = "Sec", default, skip_serializing_if = "Option::is_none")]
    pub sec: Option<String>,

    #[serde(rename = "Ptype", default, skip_serializing_if = "Option::is_none")]
    pub ptype: Option<String>,

    #[serde(rename = "OldRule", default, skip_serializing_if = "Option::is_none")]
    pub old_rule: Option<Rule>,

    #[serde(rename = "OldRules", default, skip_serializing_if = "Option::is_none")]
    pub old_rules: Option<Vec<Rule>>,

    #[serde(rename = "NewRule", default, skip_serializing_if = "Option::is_none")]
    pub new_rule: Option<Rule>,

    #[serde(rename = "NewRules", default, skip_serializing_if = "Option::is_none")]
    pub new_rules: Option<Vec<Rule>>,

    #[serde(rename = "FieldIndex", default, skip_serializing_if = "Option::is_none")]
    pub field_index: Option<usize>,

    #[serde(rename = "FieldValues", default, skip_serializing_if = "Option::is_none")]
    pub field_values: Option<Vec<String>>,
}

impl Envelope {
    /// Parse a raw payload without interpreting the method.
    pub fn parse(payload: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(payload)?)
    }

    fn addressed(sec: &str, ptype: &str, method: UpdateType) -> Self {
        Self {
            method: method.as_str().to_string(),
            sec: Some(sec.to_string()),
            ptype: Some(ptype.to_string()),
            ..Self::default()
        }
    }

    fn take_address(&mut self, method: UpdateType) -> Result<(String, String), MessageError> {
        let sec = self.sec.take().ok_or(MessageError::MissingField {
            method,
            field: "Sec",
        })?;
        let ptype = self.ptype.take().ok_or(MessageError::MissingField {
            method,
            field: "Ptype",
        })?;
        Ok((sec, ptype))
    }
}

impl From<&ChangeMessage> for Envelope {
    fn from(msg: &ChangeMessage) -> Self {
        let method = msg.update_type();
        let mut env = match &msg.change {
            PolicyChange::Update | PolicyChange::SavePolicy => Envelope {
                method: method.as_str().to_string(),
                ..Envelope::default()
            },
            PolicyChange::AddPolicy { sec, ptype, rule }
            | PolicyChange::RemovePolicy { sec, ptype, rule } => Envelope {
                new_rule: Some(rule.clone()),
                ..Envelope::addressed(sec, ptype, method)
            },
            PolicyChange::RemoveFilteredPolicy {
                sec,
                ptype,
                field_index,
                field_values,
            } => Envelope {
                field_index: Some(*field_index),
                field_values: Some(field_values.clone()),
                ..Envelope::addressed(sec, ptype, method)
            },
            PolicyChange::AddPolicies { sec, ptype, rules }
            | PolicyChange::RemovePolicies { sec, ptype, rules } => Envelope {
                new_rules: Some(rules.clone()),
                ..Envelope::addressed(sec, ptype, method)
            },
            PolicyChange::UpdatePolicy {
                sec,
                ptype,
                old_rule,
                new_rule,
            } => Envelope {
                old_rule: Some(old_rule.clone()),
                new_rule: Some(new_rule.clone()),
                ..Envelope::addressed(sec, ptype, method)
            },
            PolicyChange::UpdatePolicies {
                sec,
                ptype,
                old_rules,
                new_rules,
            } => Envelope {
                old_rules: Some(old_rules.clone()),
                new_rules: Some(new_rules.clone()),
                ..Envelope::addressed(sec, ptype, method)
            },
        };
        env.id = msg.origin_id.clone();
        env
    }
}

impl TryFrom<Envelope> for ChangeMessage {
    type Error = MessageError;

    fn try_from(mut env: Envelope) -> Result<Self, Self::Error> {
        let method: UpdateType = env.method.parse()?;

        let change = match method {
            UpdateType::Update => PolicyChange::Update,
            UpdateType::SavePolicy => PolicyChange::SavePolicy,
            UpdateType::AddPolicy => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::AddPolicy {
                    sec,
                    ptype,
                    rule: env.new_rule.take().unwrap_or_default(),
                }
            }
            UpdateType::RemovePolicy => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::RemovePolicy {
                    sec,
                    ptype,
                    rule: env.new_rule.take().unwrap_or_default(),
                }
            }
            UpdateType::RemoveFilteredPolicy => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::RemoveFilteredPolicy {
                    sec,
                    ptype,
                    field_index: env.field_index.ok_or(MessageError::MissingField {
                        method,
                        field: "FieldIndex",
                    })?,
                    field_values: env.field_values.take().unwrap_or_default(),
                }
            }
            UpdateType::AddPolicies => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::AddPolicies {
                    sec,
                    ptype,
                    rules: env.new_rules.take().unwrap_or_default(),
                }
            }
            UpdateType::RemovePolicies => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::RemovePolicies {
                    sec,
                    ptype,
                    rules: env.new_rules.take().unwrap_or_default(),
                }
            }
            UpdateType::UpdatePolicy => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::UpdatePolicy {
                    sec,
                    ptype,
                    old_rule: env.old_rule.take().unwrap_or_default(),
                    new_rule: env.new_rule.take().unwrap_or_default(),
                }
            }
            UpdateType::UpdatePolicies => {
                let (sec, ptype) = env.take_address(method)?;
                PolicyChange::UpdatePolicies {
                    sec,
                    ptype,
                    old_rules: env.old_rules.take().unwrap_or_default(),
                    new_rules: env.new_rules.take().unwrap_or_default(),
                }
            }
        };

        Ok(ChangeMessage {
            origin_id: env.id,
            change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_types::rule;

    fn sample_changes() -> Vec<PolicyChange> {
        vec![
            PolicyChange::Update,
            PolicyChange::AddPolicy {
                sec: "p".into(),
                ptype: "p".into(),
                rule: rule(&["alice", "/data", "read"]),
            },
            PolicyChange::RemovePolicy {
                sec: "p".into(),
                ptype: "p".into(),
                rule: rule(&["bob", "/data", "write"]),
            },
            PolicyChange::RemoveFilteredPolicy {
                sec: "g".into(),
                ptype: "g".into(),
                field_index: 1,
                field_values: rule(&["admin", ""]),
            },
            PolicyChange::SavePolicy,
            PolicyChange::AddPolicies {
                sec: "p".into(),
                ptype: "p2".into(),
                rules: vec![rule(&["a", "/x", "GET"]), rule(&["b", "/y", "POST"])],
            },
            PolicyChange::RemovePolicies {
                sec: "g".into(),
                ptype: "g2".into(),
                rules: vec![rule(&["tester", "1"])],
            },
            PolicyChange::UpdatePolicy {
                sec: "p".into(),
                ptype: "p".into(),
                old_rule: rule(&["alice", "/data", "read"]),
                new_rule: rule(&["alice", "/data", "write"]),
            },
            PolicyChange::UpdatePolicies {
                sec: "p".into(),
                ptype: "p".into(),
                old_rules: vec![rule(&["a", "/1", "GET"]), rule(&["b", "/2", "GET"])],
                new_rules: vec![rule(&["a", "/1", "PUT"]), rule(&["b", "/2", "PUT"])],
            },
        ]
    }

    #[test]
    fn test_every_kind_survives_the_wire() {
        for change in sample_changes() {
            let msg = ChangeMessage::new("node-1", change);
            let payload = msg.encode().unwrap();
            assert_eq!(ChangeMessage::decode(&payload).unwrap(), msg);
        }
    }

    #[test]
    fn test_sample_changes_cover_every_kind() {
        let kinds: Vec<UpdateType> = sample_changes().iter().map(|c| c.update_type()).collect();
        assert_eq!(kinds, UpdateType::ALL.to_vec());
    }

    #[test]
    fn test_wire_field_names() {
        let msg = ChangeMessage::new(
            "node-1",
            PolicyChange::AddPolicy {
                sec: "p".into(),
                ptype: "p".into(),
                rule: rule(&["alice", "/data", "read"]),
            },
        );
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();

        assert_eq!(value["Method"], "UpdateForAddPolicy");
        assert_eq!(value["ID"], "node-1");
        assert_eq!(value["Sec"], "p");
        assert_eq!(value["Ptype"], "p");
        assert_eq!(value["NewRule"][2], "read");
        assert!(value.get("OldRule").is_none());
    }

    #[test]
    fn test_decodes_full_record_with_nulls_and_extra_fields() {
        let payload = r#"{"Method":"UpdateForAddPolicy","ID":"go-peer","Sec":"p","Ptype":"p",
            "OldRule":null,"OldRules":null,"NewRule":["4","/api/test","GET"],"NewRules":null,
            "FieldIndex":0,"FieldValues":null,"Extra":{"future":true}}"#;

        let msg = ChangeMessage::decode(payload).unwrap();
        assert_eq!(msg.origin_id, "go-peer");
        assert_eq!(
            msg.change,
            PolicyChange::AddPolicy {
                sec: "p".into(),
                ptype: "p".into(),
                rule: rule(&["4", "/api/test", "GET"]),
            }
        );
    }

    #[test]
    fn test_lowercase_aliases() {
        let payload = r#"{"method":"Update","originID":"n2"}"#;
        let msg = ChangeMessage::decode(payload).unwrap();
        assert_eq!(msg.origin_id, "n2");
        assert_eq!(msg.change, PolicyChange::Update);
    }

    #[test]
    fn test_unknown_method_parses_as_envelope_only() {
        let payload = r#"{"Method":"UpdateForSomethingNew","ID":"n3"}"#;

        let env = Envelope::parse(payload).unwrap();
        assert_eq!(env.id, "n3");

        let err = ChangeMessage::decode(payload).unwrap_err();
        assert!(matches!(err, MessageError::UnknownMethod(ref m) if m == "UpdateForSomethingNew"));
        assert_eq!(err.to_string(), "unknown update type: UpdateForSomethingNew");
    }

    #[test]
    fn test_missing_addressing_is_rejected() {
        let payload = r#"{"Method":"UpdateForRemovePolicy","ID":"n4","NewRule":["a"]}"#;
        let err = ChangeMessage::decode(payload).unwrap_err();
        assert!(matches!(
            err,
            MessageError::MissingField {
                method: UpdateType::RemovePolicy,
                field: "Sec"
            }
        ));
    }

    #[test]
    fn test_filtered_removal_requires_field_index() {
        let payload = r#"{"Method":"UpdateForRemoveFilteredPolicy","ID":"n","Sec":"p","Ptype":"p"}"#;
        assert!(matches!(
            ChangeMessage::decode(payload),
            Err(MessageError::MissingField {
                field: "FieldIndex",
                ..
            })
        ));
    }

    #[test]
    fn test_sentinel_is_not_a_message() {
        assert!(matches!(
            Envelope::parse(CLOSE_SENTINEL),
            Err(MessageError::Json(_))
        ));
    }

    #[test]
    fn test_update_type_names() {
        for kind in UpdateType::ALL {
            assert_eq!(kind.as_str().parse::<UpdateType>().unwrap(), kind);
        }
        assert_eq!(UpdateType::SavePolicy.to_string(), "UpdateForSavePolicy");
    }
}
