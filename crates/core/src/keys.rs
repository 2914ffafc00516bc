//! Validated string keys for workflows and nodes.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum allowed length of a [`WorkflowId`] or [`NodeId`].
pub const KEY_MAX_LEN: usize = 128;

/// Errors from constructing a key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The input was empty or contained only whitespace.
    #[error("key cannot be empty or whitespace")]
    Empty,
    /// The key contains a `.` or whitespace.
    #[error("key `{key}` contains invalid character {ch:?} (dots and whitespace are not allowed)")]
    InvalidCharacter {
        /// The rejected key.
        key: String,
        /// The first offending character.
        ch: char,
    },
    /// The key exceeds [`KEY_MAX_LEN`] bytes.
    #[error("key exceeds maximum length of {KEY_MAX_LEN} bytes")]
    TooLong,
}

fn check_key(raw: &str) -> Result<(), KeyError> {
    if raw.trim().is_empty() {
        return Err(KeyError::Empty);
    }
    if raw.len() > KEY_MAX_LEN {
        return Err(KeyError::TooLong);
    }
    if let Some(ch) = raw.chars().find(|c| *c == '.' || c.is_whitespace()) {
        return Err(KeyError::InvalidCharacter {
            key: raw.to_owned(),
            ch,
        });
    }
    Ok(())
}

macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a key, validating the input.
            pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
                let raw = raw.into();
                check_key(&raw)?;
                Ok(Self(raw))
            }

            /// Borrow the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = KeyError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = KeyError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_key! {
    /// Identifier of a workflow definition, chosen by its author
    /// (e.g. `meeting_scheduler`).
    WorkflowId
}

define_key! {
    /// Identifier of a node, unique within one workflow definition
    /// (e.g. `check_calendar`).
    ///
    /// Node ids appear as path segments in the state store, so they may not
    /// contain dots.
    NodeId
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn accepts_plain_identifier() {
        let id = NodeId::new("check_calendar").unwrap();
        assert_eq!(id.as_str(), "check_calendar");
        assert_eq!(id.to_string(), "check_calendar");
    }

    #[rstest]
    #[case("", KeyError::Empty)]
    #[case("   ", KeyError::Empty)]
    #[case("a.b", KeyError::InvalidCharacter { key: "a.b".into(), ch: '.' })]
    #[case("a b", KeyError::InvalidCharacter { key: "a b".into(), ch: ' ' })]
    fn rejects_invalid_keys(#[case] raw: &str, #[case] expected: KeyError) {
        assert_eq!(NodeId::new(raw).unwrap_err(), expected);
    }

    #[test]
    fn rejects_overlong_key() {
        let raw = "x".repeat(KEY_MAX_LEN + 1);
        assert_eq!(WorkflowId::new(raw).unwrap_err(), KeyError::TooLong);
    }

    #[test]
    fn deserialization_validates() {
        let ok: NodeId = serde_json::from_str("\"fetch\"").unwrap();
        assert_eq!(ok, "fetch");
        assert!(serde_json::from_str::<NodeId>("\"nodes.fetch\"").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = WorkflowId::new("onboarding").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"onboarding\"");
    }

    #[test]
    fn usable_as_map_key_by_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(NodeId::new("a").unwrap(), 1);
        assert_eq!(map.get("a"), Some(&1));
    }
}
