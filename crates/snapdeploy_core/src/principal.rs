//! Principal resolution by name.
//!
//! Identifiers are not stable across environments, so snapshots refer to
//! owners and grantees by name. A name must resolve to exactly one principal;
//! ambiguity never silently picks a candidate.

use crate::ledger::WarningLedger;
use snapdeploy_store::{GraphStore, Principal, StoreResult};

/// Result of looking up a principal by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one principal has this name.
    Unique(Principal),
    /// No principal has this name.
    Missing,
    /// Several principals share this name.
    Ambiguous(usize),
}

/// Looks up a principal by exact name.
pub fn resolve(store: &dyn GraphStore, name: &str) -> StoreResult<Resolution> {
    let mut hits = store.find_principals(name)?;
    Ok(match hits.len() {
        0 => Resolution::Missing,
        1 => Resolution::Unique(hits.remove(0)),
        n => Resolution::Ambiguous(n),
    })
}

/// Resolves a name and records misses in the ledger.
///
/// `None` means the caller strips the reference from the entry.
pub fn resolve_or_record(
    store: &dyn GraphStore,
    name: &str,
    ledger: &mut WarningLedger,
) -> StoreResult<Option<Principal>> {
    Ok(match resolve(store, name)? {
        Resolution::Unique(principal) => Some(principal),
        Resolution::Missing => {
            ledger.missing_principal(name);
            None
        }
        Resolution::Ambiguous(count) => {
            ledger.ambiguous_principal(name, count);
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapdeploy_store::{InMemoryStore, PrincipalKind};

    #[test]
    fn zero_matches_is_missing() {
        let store = InMemoryStore::new();
        let mut ledger = WarningLedger::new();
        assert_eq!(resolve(&store, "alice").unwrap(), Resolution::Missing);
        assert!(resolve_or_record(&store, "alice", &mut ledger)
            .unwrap()
            .is_none());
        assert_eq!(ledger.missing_principal_count("alice"), 1);
    }

    #[test]
    fn two_matches_is_ambiguous() {
        let store = InMemoryStore::new();
        store.add_principal("alice", PrincipalKind::User);
        store.add_principal("alice", PrincipalKind::Group);
        let mut ledger = WarningLedger::new();

        assert_eq!(resolve(&store, "alice").unwrap(), Resolution::Ambiguous(2));
        assert!(resolve_or_record(&store, "alice", &mut ledger)
            .unwrap()
            .is_none());
        assert_eq!(ledger.ambiguous_principal_count("alice"), 1);
        assert_eq!(ledger.missing_principal_count("alice"), 0);
    }

    #[test]
    fn one_match_is_substituted() {
        let store = InMemoryStore::new();
        let id = store.add_principal("alice", PrincipalKind::User);
        let mut ledger = WarningLedger::new();

        let principal = resolve_or_record(&store, "alice", &mut ledger)
            .unwrap()
            .unwrap();
        assert_eq!(principal.id, id);
        assert!(ledger.is_empty());
    }
}
