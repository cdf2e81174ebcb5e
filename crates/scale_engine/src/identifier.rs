use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "scaling";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    namespace: String,
    path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("invalid character {ch:?} in namespace of identifier '{raw}'")]
    InvalidNamespace { raw: String, ch: char },
    #[error("invalid character {ch:?} in path of identifier '{raw}'")]
    InvalidPath { raw: String, ch: char },
}

impl Identifier {
    pub fn new(namespace: &str, path: &str) -> Result<Self, IdentifierError> {
        let raw = format!("{namespace}:{path}");
        if path.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if let Some(ch) = namespace.chars().find(|ch| !is_namespace_char(*ch)) {
            return Err(IdentifierError::InvalidNamespace { raw, ch });
        }
        if let Some(ch) = path.chars().find(|ch| !is_path_char(*ch)) {
            return Err(IdentifierError::InvalidPath { raw, ch });
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    /// Identifier in the default namespace. Panics on an invalid path, so only
    /// call it with literals.
    pub fn scaling(path: &str) -> Self {
        Self::new(DEFAULT_NAMESPACE, path).expect("built-in identifier literal must be valid")
    }

    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        match trimmed.split_once(':') {
            Some((namespace, path)) => {
                let namespace = if namespace.is_empty() {
                    DEFAULT_NAMESPACE
                } else {
                    namespace
                };
                Self::new(namespace, path)
            }
            None => Self::new(DEFAULT_NAMESPACE, trimmed),
        }
    }

    pub fn try_parse(raw: &str) -> Option<Self> {
        Self::parse(raw).ok()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn is_namespace_char(ch: char) -> bool {
    matches!(ch, 'a'..='z' | '0'..='9' | '_' | '-' | '.')
}

fn is_path_char(ch: char) -> bool {
    is_namespace_char(ch) || ch == '/'
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_uses_default_namespace() {
        let id = Identifier::parse("width").expect("parse");
        assert_eq!(id.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(id.to_string(), "scaling:width");
    }

    #[test]
    fn rejects_uppercase_and_empty_path() {
        assert!(matches!(
            Identifier::parse("Mod:thing"),
            Err(IdentifierError::InvalidNamespace { ch: 'M', .. })
        ));
        assert_eq!(Identifier::parse("mod:"), Err(IdentifierError::Empty));
        assert!(Identifier::try_parse("  ").is_none());
    }

    #[test]
    fn path_allows_slashes_but_namespace_does_not() {
        assert!(Identifier::parse("mod:a/b").is_ok());
        assert!(Identifier::parse("m/d:a").is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let id = Identifier::parse("mod:tail_length").expect("parse");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"mod:tail_length\"");
        let back: Identifier = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
