//! One-time conversions of entries written by older exporters.

use crate::entry::{ExportEntry, KEY_AUTHENTICATED, KEY_PUBLIC};
use serde_json::Value;
use snapdeploy_store::Visibility;

/// Grant bits that only make sense for anonymous users.
pub const PUBLIC_FLAG_BITS: [u64; 7] = [16, 32, 64, 128, 512, 2048, 8192];

/// Grant bits that only make sense for authenticated users.
pub const AUTHENTICATED_FLAG_BITS: [u64; 7] = [1, 2, 4, 8, 256, 1024, 4096];

const KEY_FLAGS: &str = "flags";
const KEY_HIDDEN: &str = "hidden";

/// Derives visibility from a resource access `flags` bit-set.
#[must_use]
pub fn visibility_from_flags(flags: u64) -> Visibility {
    Visibility::new(
        PUBLIC_FLAG_BITS.iter().any(|bit| flags & bit != 0),
        AUTHENTICATED_FLAG_BITS.iter().any(|bit| flags & bit != 0),
    )
}

/// Adds visibility flags to an old-format resource grant.
///
/// Applies only to entries that carry `flags` but neither visibility key.
/// Returns true if the entry was converted.
pub fn apply_grant_flags(entry: &mut ExportEntry) -> bool {
    if entry.contains(KEY_PUBLIC) || entry.contains(KEY_AUTHENTICATED) {
        return false;
    }
    let Some(flags) = entry.get(KEY_FLAGS).and_then(Value::as_u64) else {
        return false;
    };
    let visibility = visibility_from_flags(flags);
    entry.insert(KEY_PUBLIC, visibility.public);
    entry.insert(KEY_AUTHENTICATED, visibility.authenticated);
    true
}

/// Converts the legacy `hidden` flag of a structural entry.
///
/// `hidden: true` makes the entry invisible to everyone. The key is dropped
/// either way.
pub fn apply_hidden_flag(entry: &mut ExportEntry) {
    if let Some(hidden) = entry.remove(KEY_HIDDEN) {
        if hidden.as_bool() == Some(true) {
            entry.insert(KEY_PUBLIC, false);
            entry.insert(KEY_AUTHENTICATED, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_table() {
        assert_eq!(visibility_from_flags(0), Visibility::new(false, false));
        assert_eq!(visibility_from_flags(16), Visibility::new(true, false));
        assert_eq!(visibility_from_flags(1), Visibility::new(false, true));
        assert_eq!(visibility_from_flags(16 | 1), Visibility::new(true, true));
        assert_eq!(visibility_from_flags(4096), Visibility::new(false, true));
        assert_eq!(visibility_from_flags(8192), Visibility::new(true, false));
    }

    #[test]
    fn grant_with_visibility_is_left_alone() {
        let mut entry = ExportEntry::new();
        entry.insert("flags", 255);
        entry.insert(KEY_PUBLIC, false);
        assert!(!apply_grant_flags(&mut entry));
        assert!(!entry.contains(KEY_AUTHENTICATED));
    }

    #[test]
    fn old_grant_gets_visibility() {
        let mut entry = ExportEntry::new();
        entry.insert("signature", "/api/*");
        entry.insert("flags", 1 | 2);
        assert!(apply_grant_flags(&mut entry));
        assert_eq!(entry.get(KEY_PUBLIC), Some(&Value::Bool(false)));
        assert_eq!(entry.get(KEY_AUTHENTICATED), Some(&Value::Bool(true)));
        assert!(entry.contains("flags"));
    }

    #[test]
    fn hidden_false_keeps_visibility() {
        let mut entry = ExportEntry::new();
        entry.insert(KEY_PUBLIC, true);
        entry.insert(KEY_HIDDEN, false);
        apply_hidden_flag(&mut entry);
        assert_eq!(entry.get(KEY_PUBLIC), Some(&Value::Bool(true)));
        assert!(!entry.contains(KEY_HIDDEN));
    }
}
