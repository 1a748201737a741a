//! Scope names such as `string.quoted.double.json`.
//!
//! A scope is an immutable, reference counted string: token scope stacks are cloned a lot
//! and cloning a `Scope` is only a refcount bump. Scopes compare and sort as plain strings.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A dotted, hierarchical label identifying the syntactic category of a token.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope(Arc<str>);

impl Scope {
    /// Create a new scope from a dot-separated string. Surrounding whitespace is ignored.
    pub fn new(s: &str) -> Scope {
        Scope(Arc::from(s.trim()))
    }

    /// Splits a rule `name` into its scopes: a name can hold several space separated scopes,
    /// eg `"meta.tag string.quoted"`.
    pub(crate) fn parse_many(s: &str) -> Vec<Scope> {
        s.split_whitespace().map(Scope::new).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot separated parts of the scope, eg `["source", "json"]` for `source.json`
    pub fn atoms(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|a| !a.is_empty())
    }

    /// Number of atoms in this scope
    pub fn len(&self) -> usize {
        self.atoms().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every atom of this scope is the same as the atom at the same position in
    /// `other`. `string.quoted` is a prefix of `string.quoted.double` but not of
    /// `string.quotedness`.
    pub fn is_prefix_of(&self, other: &Scope) -> bool {
        let mut theirs = other.atoms();
        self.atoms().all(|atom| theirs.next() == Some(atom))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope(\"{}\")", self.0)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Scope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Scope::new(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_scope_creation() {
        let scope = Scope::new("source.rust.meta.function");
        assert_eq!(scope.len(), 4);
        assert_eq!(scope.as_str(), "source.rust.meta.function");
        assert_eq!(scope.to_string(), "source.rust.meta.function");
    }

    #[test]
    fn test_empty_scope() {
        let scope = Scope::new("  ");
        assert_eq!(scope.len(), 0);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_prefix_matching() {
        let prefix = Scope::new("source.rust");
        let full = Scope::new("source.rust.meta.function");
        let different = Scope::new("source.rusty");

        assert!(prefix.is_prefix_of(&full));
        assert!(prefix.is_prefix_of(&prefix));
        assert!(!prefix.is_prefix_of(&different));
        assert!(!full.is_prefix_of(&prefix));
    }

    #[test]
    fn test_parse_many() {
        let scopes = Scope::parse_many("meta.tag  string.quoted ");
        assert_eq!(scopes, vec![Scope::new("meta.tag"), Scope::new("string.quoted")]);
        assert!(Scope::parse_many("").is_empty());
    }

    #[test]
    fn test_scope_ordering() {
        let scope1 = Scope::new("source.rust");
        let scope2 = Scope::new("source.rust.meta");

        // Longer scopes should sort after shorter prefixes
        assert!(scope1 < scope2);
    }
}
