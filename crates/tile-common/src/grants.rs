//! Access-control grants held by a caller.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// The set of grants a caller holds.
///
/// Data with no grant is public. Data carrying a grant is only visible to
/// callers holding that exact grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants(BTreeSet<String>);

impl Grants {
    /// Validate and build a grant set.
    ///
    /// Empty or whitespace-padded grant names are rejected.
    pub fn new<I, S>(grants: I) -> TileResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for grant in grants {
            let grant = grant.into();
            if grant.is_empty() {
                return Err(TileError::InvalidGrants("grant names must not be empty".into()));
            }
            if grant.trim() != grant {
                return Err(TileError::InvalidGrants(format!(
                    "grant '{}' has surrounding whitespace",
                    grant
                )));
            }
            set.insert(grant);
        }
        Ok(Self(set))
    }

    /// A caller holding no grants; sees public data only.
    pub fn public() -> Self {
        Self::default()
    }

    /// The grants needed to see data restricted by `grant`.
    ///
    /// Used by internal build routines acting on behalf of a layer.
    pub fn for_grant(grant: Option<&str>) -> Self {
        Self(grant.into_iter().map(str::to_string).collect())
    }

    /// Whether data restricted by `grant` is visible to this caller.
    pub fn permits(&self, grant: Option<&str>) -> bool {
        match grant {
            None => true,
            Some(g) => self.0.contains(g),
        }
    }

    pub fn contains(&self, grant: &str) -> bool {
        self.0.contains(grant)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_data_always_visible() {
        assert!(Grants::public().permits(None));
        assert!(!Grants::public().permits(Some("priv")));
    }

    #[test]
    fn test_restricted_data_needs_match() {
        let grants = Grants::new(["priv", "act"]).unwrap();
        assert!(grants.permits(Some("priv")));
        assert!(!grants.permits(Some("other")));
        assert_eq!(grants.len(), 2);
    }

    #[test]
    fn test_rejects_malformed_grants() {
        assert!(matches!(Grants::new([""]), Err(TileError::InvalidGrants(_))));
        assert!(matches!(Grants::new([" priv"]), Err(TileError::InvalidGrants(_))));
    }

    #[test]
    fn test_for_grant() {
        assert!(Grants::for_grant(None).is_empty());
        assert!(Grants::for_grant(Some("priv")).contains("priv"));
    }
}
