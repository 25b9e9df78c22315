//! Snapshot tree digests and golden-file helpers.
//!
//! Identifiers generated by the store are random, so golden comparisons run
//! on text where every identifier is replaced by a stable placeholder.

use snapdeploy_store::content_checksum;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Relative path (with `/` separators) to content checksum of every file
/// below `root`.
pub fn tree_digest(root: &Path) -> BTreeMap<String, String> {
    let mut digest = BTreeMap::new();
    collect(root, root, &mut digest);
    digest
}

fn collect(root: &Path, dir: &Path, digest: &mut BTreeMap<String, String>) {
    let entries = fs::read_dir(dir).unwrap_or_else(|e| panic!("Cannot list {dir:?}: {e}"));
    for entry in entries {
        let path = entry.expect("Failed to read directory entry").path();
        if path.is_dir() {
            collect(root, &path, digest);
        } else {
            let data = fs::read(&path).unwrap_or_else(|e| panic!("Cannot read {path:?}: {e}"));
            digest.insert(relative_name(root, &path), content_checksum(&data));
        }
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Modification times of every file below `root`, keyed like [`tree_digest`].
pub fn tree_mtimes(root: &Path) -> BTreeMap<String, std::time::SystemTime> {
    tree_digest(root)
        .into_keys()
        .map(|name| {
            let modified = fs::metadata(root.join(&name))
                .and_then(|m| m.modified())
                .unwrap_or_else(|e| panic!("Cannot stat {name}: {e}"));
            (name, modified)
        })
        .collect()
}

fn is_hex(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}

fn is_identifier(token: &str) -> bool {
    let compact = token.len() == 32 && token.chars().all(is_hex);
    let hyphenated = token.len() == 36
        && token.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => is_hex(c),
        });
    compact || hyphenated
}

/// Replaces store-generated identifiers with `<id-N>`, numbered by first
/// appearance.
pub fn normalize_ids(text: &str) -> String {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut out = String::with_capacity(text.len());
    let mut token = String::new();

    let mut flush = |token: &mut String, out: &mut String| {
        if is_identifier(token) {
            let next = seen.len() + 1;
            let n = *seen.entry(token.clone()).or_insert(next);
            out.push_str(&format!("<id-{n}>"));
        } else {
            out.push_str(token);
        }
        token.clear();
    };

    for c in text.chars() {
        if is_hex(c) || c == '-' {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);
    out
}

/// Concatenates every text file below `root` under `== <name>` headers,
/// with identifiers normalized.
pub fn snapshot_text(root: &Path) -> String {
    let mut text = String::new();
    for name in tree_digest(root).into_keys() {
        let content = fs::read(root.join(&name)).expect("Failed to read snapshot file");
        text.push_str(&format!("== {name}\n"));
        text.push_str(&String::from_utf8_lossy(&content));
        if !text.ends_with('\n') {
            text.push('\n');
        }
    }
    normalize_ids(&text)
}

/// A golden test that compares output against expected files.
pub struct GoldenTest {
    name: String,
    golden_dir: PathBuf,
    update_mode: bool,
}

impl GoldenTest {
    /// Creates a new golden test.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the test (used for file naming)
    /// * `golden_dir` - Directory containing golden files
    pub fn new(name: impl Into<String>, golden_dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            golden_dir: golden_dir.as_ref().to_path_buf(),
            update_mode: std::env::var("UPDATE_GOLDEN").is_ok(),
        }
    }

    /// Asserts that the given string matches the golden file.
    ///
    /// If `UPDATE_GOLDEN` environment variable is set, updates the golden file instead.
    pub fn assert_text(&self, suffix: &str, actual: &str) {
        let path = self.file_path(suffix);

        if self.update_mode {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create golden directory");
            }
            fs::write(&path, actual).expect("Failed to write golden file");
            println!("Updated golden file: {:?}", path);
            return;
        }

        if !path.exists() {
            panic!(
                "Golden file not found: {:?}\n\
                 Run with UPDATE_GOLDEN=1 to create it.\n\
                 Actual:\n{}",
                path, actual
            );
        }

        let expected = fs::read_to_string(&path).expect("Failed to read golden file");
        if actual != expected {
            panic!(
                "Golden test '{}' failed for '{}':\n\
                 --- Expected ---\n{}\n\
                 --- Actual ---\n{}\n\
                 Run with UPDATE_GOLDEN=1 to update.",
                self.name, suffix, expected, actual
            );
        }
    }

    /// Asserts that the normalized text of a snapshot matches the golden file.
    pub fn assert_snapshot(&self, suffix: &str, root: &Path) {
        self.assert_text(suffix, &snapshot_text(root));
    }

    fn file_path(&self, suffix: &str) -> PathBuf {
        let filename = if suffix.is_empty() {
            format!("{}.golden", self.name)
        } else {
            format!("{}_{}.golden", self.name, suffix)
        };
        self.golden_dir.join(filename)
    }
}
