//! Content-addressed file sync.
//!
//! Binary content is compared by SHA-256 in both directions: export writes a
//! file only when the checksum on disk differs from the stored one, import
//! re-ingests content only when the checksum of the file on disk differs.
//! Unchanged content therefore never shows up as a diff in version control.
//!
//! `files.json` maps virtual paths to entries with a `type` of `file` or
//! `folder`; file entries also carry the content `checksum`.

use crate::context::RunContext;
use crate::entry::{upsert_node, ExportEntry};
use crate::error::{DeployError, DeployResult};
use crate::json::{read_json, write_json};
use crate::layout::{file_disk_path, SnapshotLayout, FILES_DIR, FILES_FILE, FOLDERS_FILE};
use crate::ledger::WarningLedger;
use snapdeploy_store::{
    content_checksum, ContentStorage, GraphStore, NodeId, NodeKind, StoreResult, StoredNode,
    TxOptions,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const KEY_TYPE: &str = "type";
const KEY_CHECKSUM: &str = "checksum";
const KEY_PATH: &str = "path";
const TYPE_FILE: &str = "file";
const TYPE_FOLDER: &str = "folder";

/// Returns true if content with `candidate` checksum must be written over
/// content with `existing` checksum.
#[must_use]
pub fn should_write(existing: Option<&str>, candidate: &str) -> bool {
    existing != Some(candidate)
}

/// SHA-256 of a file on disk, `None` if it does not exist.
pub fn disk_checksum(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(content_checksum(&data))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Which file system nodes an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelection {
    /// Every file and folder, listed in `files.json`.
    All,
    /// Files only; their ancestor folders go to `folders.json`.
    FilesWithAncestors,
}

/// Counters of one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSyncStats {
    /// Content files written (export) or ingested (import).
    pub written: usize,
    /// Content files left alone because the checksums matched.
    pub unchanged: usize,
    /// Stale files removed from the snapshot (export only).
    pub pruned: usize,
    /// Files and folders listed in `files.json` or `folders.json` (export only).
    pub listed: BTreeSet<NodeId>,
}

/// Syncs the virtual file system with the `files/` tree of a snapshot.
pub struct FileSync<'a> {
    store: &'a dyn GraphStore,
    content: &'a dyn ContentStorage,
}

impl<'a> FileSync<'a> {
    /// Creates a sync over the given collaborators.
    pub fn new(store: &'a dyn GraphStore, content: &'a dyn ContentStorage) -> Self {
        Self { store, content }
    }

    /// Exports files and folders, then prunes stale files from `files/`.
    ///
    /// Per-file I/O failures are recorded and the export moves on.
    pub fn export(
        &self,
        layout: &SnapshotLayout,
        ctx: &mut RunContext<'_>,
        selection: FileSelection,
    ) -> DeployResult<FileSyncStats> {
        let files_root = layout.path(FILES_DIR);
        fs::create_dir_all(&files_root)?;

        let files = self.live_nodes(NodeKind::File)?;
        let folders = self.live_nodes(NodeKind::Folder)?;

        let mut stats = FileSyncStats::default();
        let mut index: BTreeMap<String, ExportEntry> = BTreeMap::new();
        let mut keep_files = BTreeSet::new();
        let mut keep_dirs = BTreeSet::new();

        let listed_folders: Vec<&StoredNode> = match selection {
            FileSelection::All => folders.iter().collect(),
            FileSelection::FilesWithAncestors => Vec::new(),
        };
        for folder in listed_folders {
            let Some(path) = folder.natural_key() else {
                continue;
            };
            let dir = file_disk_path(&files_root, path);
            if let Err(e) = fs::create_dir_all(&dir) {
                ctx.ledger
                    .file_problem(format!("Cannot create folder {}: {e}", dir.display()));
            }
            keep_dirs.insert(dir);
            index.insert(path.to_string(), self.entry(folder, TYPE_FOLDER)?);
            stats.listed.insert(folder.id.clone());
        }

        let mut claims = DiskClaims::default();
        for file in &files {
            let Some(path) = file.natural_key() else {
                ctx.ledger
                    .file_problem(format!("File {} has no path, skipped", file.id));
                continue;
            };
            let disk = file_disk_path(&files_root, path);
            if !claims.claim(&disk, path, &mut ctx.ledger) {
                continue;
            }
            let mut entry = self.entry(file, TYPE_FILE)?;

            if let Some(checksum) = self.content.checksum(&file.id)? {
                entry.insert(KEY_CHECKSUM, checksum.clone());
                match self.export_content(&file.id, &disk, &checksum) {
                    Ok(true) => stats.written += 1,
                    Ok(false) => stats.unchanged += 1,
                    Err(e) => ctx
                        .ledger
                        .file_problem(format!("Cannot export {}: {e}", disk.display())),
                }
                keep_files.insert(disk);
            }
            if index.insert(path.to_string(), entry).is_some() {
                ctx.ledger
                    .notice(format!("A folder and a file share the path {path}"));
            }
            stats.listed.insert(file.id.clone());
        }

        write_json(&layout.path(FILES_FILE), &index)?;

        if selection == FileSelection::FilesWithAncestors {
            let ancestors = ancestor_folders(&files, &folders);
            let mut listed = Vec::new();
            for folder in ancestors {
                if let Some(path) = folder.natural_key() {
                    keep_dirs.insert(file_disk_path(&files_root, path));
                }
                let mut entry = ExportEntry::from_node(self.store, folder)?;
                entry.insert(KEY_TYPE, TYPE_FOLDER);
                listed.push(entry);
                stats.listed.insert(folder.id.clone());
            }
            crate::entry::sort_entries(&mut listed, KEY_PATH);
            write_json(&layout.path(FOLDERS_FILE), &listed)?;
        }

        stats.pruned = prune(&files_root, &keep_files, &keep_dirs, &mut ctx.ledger);
        info!(
            written = stats.written,
            unchanged = stats.unchanged,
            pruned = stats.pruned,
            "Files exported"
        );
        Ok(stats)
    }

    /// Imports folders and files, ingesting content whose checksum changed.
    ///
    /// Nothing is deleted. A listed file whose content is missing on disk is
    /// recorded as a missing source file.
    pub fn import(
        &self,
        layout: &SnapshotLayout,
        ctx: &mut RunContext<'_>,
    ) -> DeployResult<FileSyncStats> {
        let mut stats = FileSyncStats::default();
        let files_root = layout.path(FILES_DIR);
        let legacy = ctx.legacy_dom_visibility();

        if layout.exists(FOLDERS_FILE) {
            let folders: Vec<ExportEntry> = read_json(&layout.path(FOLDERS_FILE))?;
            let ledger = &mut ctx.ledger;
            self.store
                .transaction(TxOptions::default(), &mut || {
                    for entry in &folders {
                        let Some(path) = entry.str(KEY_PATH) else {
                            continue;
                        };
                        if self.store.find_by_key(NodeKind::Folder, path)?.is_empty() {
                            let mut entry = entry.clone();
                            entry.remove(KEY_TYPE);
                            let node =
                                entry.into_new_node(NodeKind::Folder, self.store, ledger, legacy)?;
                            self.store.create_node(node)?;
                        }
                    }
                    Ok(())
                })
                .map_err(|e| DeployError::stage("folder import", e))?;
        }

        if !layout.exists(FILES_FILE) {
            return Ok(stats);
        }
        let index: BTreeMap<String, ExportEntry> = read_json(&layout.path(FILES_FILE))?;

        let ledger = &mut ctx.ledger;
        self.store
            .transaction(TxOptions::default(), &mut || {
                // BTreeMap order puts parents before children
                for (path, entry) in &index {
                    let mut entry = entry.clone();
                    let kind = match entry.take_str(KEY_TYPE).as_deref() {
                        Some(TYPE_FOLDER) => NodeKind::Folder,
                        _ => NodeKind::File,
                    };
                    entry.remove(KEY_CHECKSUM);
                    entry.insert(KEY_PATH, path.clone());
                    let node = entry.into_new_node(kind, self.store, ledger, legacy)?;
                    let id = upsert_node(self.store, node)?;

                    if kind == NodeKind::File {
                        let disk = file_disk_path(&files_root, path);
                        match self.import_content(&id, &disk) {
                            Ok(Some(true)) => stats.written += 1,
                            Ok(Some(false)) => stats.unchanged += 1,
                            Ok(None) => ledger.missing_source_file(format!("{FILES_DIR}{path}")),
                            Err(e) => ledger
                                .file_problem(format!("Cannot import {}: {e}", disk.display())),
                        }
                    }
                }
                Ok(())
            })
            .map_err(|e| DeployError::stage("file import", e))?;

        info!(
            written = stats.written,
            unchanged = stats.unchanged,
            "Files imported"
        );
        Ok(stats)
    }

    fn live_nodes(&self, kind: NodeKind) -> StoreResult<Vec<StoredNode>> {
        let mut live = Vec::new();
        for node in self.store.nodes(kind)? {
            if !self.store.is_trashed(&node.id)? {
                live.push(node);
            }
        }
        live.sort_by(|a, b| a.natural_key().cmp(&b.natural_key()).then(a.id.cmp(&b.id)));
        Ok(live)
    }

    fn entry(&self, node: &StoredNode, node_type: &str) -> StoreResult<ExportEntry> {
        let mut entry = ExportEntry::from_node(self.store, node)?;
        entry.remove(KEY_PATH);
        entry.insert(KEY_TYPE, node_type);
        Ok(entry)
    }

    fn export_content(&self, id: &NodeId, disk: &Path, checksum: &str) -> StoreResult<bool> {
        let existing = disk_checksum(disk)?;
        if !should_write(existing.as_deref(), checksum) {
            return Ok(false);
        }
        let data = self.content.read(id)?;
        if let Some(parent) = disk.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(disk, data)?;
        debug!("Wrote {}", disk.display());
        Ok(true)
    }

    /// `None` when the file is absent on disk, otherwise whether it was ingested.
    fn import_content(&self, id: &NodeId, disk: &Path) -> StoreResult<Option<bool>> {
        let Some(candidate) = disk_checksum(disk)? else {
            return Ok(None);
        };
        let existing = self.content.checksum(id)?;
        if !should_write(existing.as_deref(), &candidate) {
            return Ok(Some(false));
        }
        let data = fs::read(disk)?;
        self.content.write(id, &data)?;
        Ok(Some(true))
    }
}

/// Folders containing at least one of `files`, sorted by path.
fn ancestor_folders<'n>(files: &[StoredNode], folders: &'n [StoredNode]) -> Vec<&'n StoredNode> {
    let mut wanted = BTreeSet::new();
    for file in files {
        let Some(path) = file.natural_key() else {
            continue;
        };
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('/') {
            if parent.is_empty() {
                break;
            }
            wanted.insert(parent.to_string());
            current = parent;
        }
    }
    folders
        .iter()
        .filter(|f| f.natural_key().is_some_and(|p| wanted.contains(p)))
        .collect()
}

/// Disk paths taken by exported files.
///
/// Escaping keeps distinct virtual paths apart, so an exact clash means two
/// nodes share one path. Paths equal up to case are kept but reported, since
/// they overwrite each other on case-insensitive file systems.
#[derive(Default)]
struct DiskClaims {
    exact: BTreeMap<PathBuf, String>,
    folded: BTreeMap<String, String>,
}

impl DiskClaims {
    /// False when `disk` is already taken; the clash is recorded.
    fn claim(&mut self, disk: &Path, path: &str, ledger: &mut WarningLedger) -> bool {
        if let Some(owner) = self.exact.get(disk) {
            ledger.file_problem(format!(
                "Files {owner} and {path} both map to {}, {path} skipped",
                disk.display()
            ));
            return false;
        }
        self.exact.insert(disk.to_path_buf(), path.to_string());

        let folded = disk.to_string_lossy().to_lowercase();
        if let Some(owner) = self.folded.get(&folded) {
            ledger.file_problem(format!(
                "Files {owner} and {path} differ only in case and collide on \
                 case-insensitive file systems"
            ));
        } else {
            self.folded.insert(folded, path.to_string());
        }
        true
    }
}

/// Removes files below `root` that are not in `keep_files`, then empty
/// directories not in `keep_dirs`. Returns the number of files removed.
///
/// Symbolic links are removed like files and never followed. Entries that
/// cannot be read or removed are recorded and skipped.
pub fn prune(
    root: &Path,
    keep_files: &BTreeSet<PathBuf>,
    keep_dirs: &BTreeSet<PathBuf>,
    ledger: &mut WarningLedger,
) -> usize {
    prune_with(root, keep_files, keep_dirs, ledger, |path| fs::remove_file(path))
}

fn prune_with<R>(
    root: &Path,
    keep_files: &BTreeSet<PathBuf>,
    keep_dirs: &BTreeSet<PathBuf>,
    ledger: &mut WarningLedger,
    remove_file: R,
) -> usize
where
    R: FnMut(&Path) -> io::Result<()>,
{
    struct Pass<'p, R> {
        keep_files: &'p BTreeSet<PathBuf>,
        keep_dirs: &'p BTreeSet<PathBuf>,
        ledger: &'p mut WarningLedger,
        remove_file: R,
        removed: usize,
    }

    impl<R: FnMut(&Path) -> io::Result<()>> Pass<'_, R> {
        fn walk(&mut self, dir: &Path) {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.ledger
                        .file_problem(format!("Cannot list {}: {e}", dir.display()));
                    return;
                }
            };
            for entry in entries {
                let (path, file_type) = match entry.and_then(|e| Ok((e.path(), e.file_type()?))) {
                    Ok(found) => found,
                    Err(e) => {
                        self.ledger
                            .file_problem(format!("Cannot read entry in {}: {e}", dir.display()));
                        continue;
                    }
                };
                if file_type.is_dir() {
                    self.walk(&path);
                    self.remove_if_empty(&path);
                } else if !self.keep_files.contains(&path) {
                    match (self.remove_file)(&path) {
                        Ok(()) => {
                            debug!("Pruned {}", path.display());
                            self.removed += 1;
                        }
                        Err(e) => self
                            .ledger
                            .file_problem(format!("Cannot prune {}: {e}", path.display())),
                    }
                }
            }
        }

        fn remove_if_empty(&mut self, dir: &Path) {
            if self.keep_dirs.contains(dir) {
                return;
            }
            let empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
            if empty {
                if let Err(e) = fs::remove_dir(dir) {
                    self.ledger
                        .file_problem(format!("Cannot prune {}: {e}", dir.display()));
                }
            }
        }
    }

    if !root.is_dir() {
        return 0;
    }
    let mut pass = Pass {
        keep_files,
        keep_dirs,
        ledger,
        remove_file,
        removed: 0,
    };
    pass.walk(root);
    pass.removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_write_rules() {
        assert!(should_write(None, "abc"));
        assert!(should_write(Some("abd"), "abc"));
        assert!(!should_write(Some("abc"), "abc"));
    }

    #[test]
    fn disk_checksum_of_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(disk_checksum(&path).unwrap().is_none());

        fs::write(&path, b"hello").unwrap();
        assert_eq!(
            disk_checksum(&path).unwrap(),
            Some(content_checksum(b"hello"))
        );
    }

    #[test]
    fn prune_removes_stale_files_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("kept-empty")).unwrap();
        fs::write(root.join("a/keep.txt"), b"1").unwrap();
        fs::write(root.join("a/b/stale.txt"), b"2").unwrap();

        let keep_files = BTreeSet::from([root.join("a/keep.txt")]);
        let keep_dirs = BTreeSet::from([root.join("kept-empty")]);
        let mut ledger = WarningLedger::new();
        let removed = prune(root, &keep_files, &keep_dirs, &mut ledger);

        assert_eq!(removed, 1);
        assert!(ledger.is_empty());
        assert!(root.join("a/keep.txt").exists());
        assert!(!root.join("a/b").exists());
        assert!(root.join("kept-empty").exists());
    }

    #[test]
    fn prune_failure_is_recorded_and_the_pass_continues() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a/locked.txt"), b"1").unwrap();
        fs::write(root.join("a/stale.txt"), b"2").unwrap();
        fs::write(root.join("old.txt"), b"3").unwrap();

        let mut ledger = WarningLedger::new();
        let removed = prune_with(
            root,
            &BTreeSet::new(),
            &BTreeSet::new(),
            &mut ledger,
            |path| {
                if path.ends_with("locked.txt") {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
                } else {
                    fs::remove_file(path)
                }
            },
        );

        assert_eq!(removed, 2);
        assert!(root.join("a/locked.txt").exists());
        assert!(!root.join("a/stale.txt").exists());
        assert!(!root.join("old.txt").exists());
        assert_eq!(ledger.file_problems().len(), 1);
        assert!(ledger.file_problems()[0].contains("locked.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn prune_does_not_follow_directory_links() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("precious.txt"), b"keep me").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let mut ledger = WarningLedger::new();
        let removed = prune(dir.path(), &BTreeSet::new(), &BTreeSet::new(), &mut ledger);

        assert_eq!(removed, 1);
        assert!(outside.path().join("precious.txt").exists());
        assert!(fs::symlink_metadata(dir.path().join("link")).is_err());
    }

    #[test]
    fn clashing_disk_paths_are_recorded() {
        let mut claims = DiskClaims::default();
        let mut ledger = WarningLedger::new();
        let root = Path::new("/snap/files");

        assert!(claims.claim(&file_disk_path(root, "/a b.txt"), "/a b.txt", &mut ledger));
        assert!(claims.claim(&file_disk_path(root, "/a_b.txt"), "/a_b.txt", &mut ledger));
        assert!(ledger.is_empty());

        assert!(!claims.claim(&file_disk_path(root, "/a_b.txt"), "/a_b.txt", &mut ledger));
        assert!(claims.claim(&file_disk_path(root, "/A_B.txt"), "/A_B.txt", &mut ledger));
        assert_eq!(ledger.file_problems().len(), 2);
    }

    #[test]
    fn ancestors_of_nested_file() {
        use snapdeploy_store::{Attributes, Visibility};
        let node = |kind, path: &str| StoredNode {
            id: NodeId::new(path),
            kind,
            visibility: Visibility::default(),
            owner: None,
            grants: Vec::new(),
            attributes: Attributes::from([("path".to_string(), path.into())]),
            body: None,
        };
        let files = vec![node(NodeKind::File, "/a/b/c.txt")];
        let folders = vec![
            node(NodeKind::Folder, "/a"),
            node(NodeKind::Folder, "/a/b"),
            node(NodeKind::Folder, "/z"),
        ];
        let found: Vec<_> = ancestor_folders(&files, &folders)
            .into_iter()
            .filter_map(|f| f.natural_key())
            .collect();
        assert_eq!(found, vec!["/a", "/a/b"]);
    }
}
