//! Restore points: capture before mutating, restore on failure.
//!
//! Every capture copies the matching files into `.mendmap/restore/<id>/`
//! and keeps the bytes in memory for the fast path. Restoration first
//! asks the revision system to check out the captured revision; if that
//! fails or no revision system is present, files are rewritten byte for
//! byte from the snapshot.

use crate::core::{ids, EngineError, FileSnapshot, ResourceSample, RestorePoint};
use crate::io::FileWalker;
use crate::revision::RevisionSystem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const STORE_DIR: &str = ".mendmap";

#[derive(Debug, Serialize, Deserialize)]
struct RestoreManifest {
    id: String,
    created_at: DateTime<Utc>,
    description: String,
    revision: Option<String>,
    files: Vec<PathBuf>,
}

pub struct SnapshotManager {
    root: PathBuf,
    store: PathBuf,
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    points: BTreeMap<String, RestorePoint>,
}

impl SnapshotManager {
    pub fn new(root: &Path, extensions: Vec<String>, ignore_patterns: Vec<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            store: root.join(STORE_DIR).join("restore"),
            extensions,
            ignore_patterns,
            points: BTreeMap::new(),
        }
    }

    /// Capture every matching file under the root. Returns the new
    /// restore point's id.
    pub fn create_restore_point(
        &mut self,
        description: &str,
        revision: Option<String>,
        metrics: ResourceSample,
    ) -> Result<String, EngineError> {
        let id = ids::timestamped("rp", description);
        let files = FileWalker::new(self.root.clone())
            .with_extensions(self.extensions.clone())
            .with_ignore_patterns(self.ignore_patterns.clone())
            .walk()
            .map_err(|e| EngineError::Analysis(e.to_string()))?;

        let backup_dir = self.store.join(&id);
        std::fs::create_dir_all(&backup_dir)?;

        let mut snapshots: BTreeMap<PathBuf, FileSnapshot> = BTreeMap::new();
        let mut manifest_files = Vec::new();
        for path in files {
            let content = std::fs::read(&path)?;
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            let rel = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
            let backup_path = backup_dir.join(&rel);
            if let Some(parent) = backup_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&backup_path, &content)?;

            manifest_files.push(rel.clone());
            snapshots.insert(rel, FileSnapshot { content, modified });
        }

        let manifest = RestoreManifest {
            id: id.clone(),
            created_at: Utc::now(),
            description: description.to_string(),
            revision: revision.clone(),
            files: manifest_files,
        };
        std::fs::write(
            backup_dir.join("manifest.json"),
            serde_json::to_vec_pretty(&manifest)?,
        )?;

        log::info!(
            "restore point {} captured ({} files): {}",
            id,
            snapshots.len(),
            description
        );

        self.points.insert(
            id.clone(),
            RestorePoint {
                id: id.clone(),
                created_at: manifest.created_at,
                description: description.to_string(),
                files: snapshots,
                revision,
                metrics,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&RestorePoint> {
        self.points.get(id)
    }

    pub fn point_ids(&self) -> Vec<String> {
        self.points.keys().cloned().collect()
    }

    /// Restore the tree to the given point. Revision checkout is tried
    /// first; any failure there falls back to file restoration. Errors
    /// from the fallback are final.
    pub fn rollback_to(
        &self,
        id: &str,
        revision_system: Option<&dyn RevisionSystem>,
    ) -> Result<(), EngineError> {
        let point = self
            .points
            .get(id)
            .ok_or_else(|| EngineError::UnknownRestorePoint(id.to_string()))?;

        if let (Some(system), Some(revision)) = (revision_system, point.revision.as_ref()) {
            match system.checkout(revision) {
                Ok(()) => {
                    log::info!("rolled back to {} via revision {}", id, revision);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "revision checkout for {} failed ({}), restoring files directly",
                        id,
                        e
                    );
                }
            }
        }

        self.restore_files(point).map_err(|e| EngineError::RollbackFailed {
            restore_point: id.to_string(),
            message: e.to_string(),
        })?;
        log::info!("rolled back to {} via file restore", id);
        Ok(())
    }

    /// Last-resort rollback on unexpected session failure. Failures here
    /// are logged loudly and propagated; nothing retries after this.
    pub fn emergency_rollback(
        &self,
        id: &str,
        revision_system: Option<&dyn RevisionSystem>,
    ) -> Result<(), EngineError> {
        log::error!("emergency rollback to {}", id);
        self.rollback_to(id, revision_system).map_err(|e| {
            log::error!("emergency rollback to {} failed: {}", id, e);
            e
        })
    }

    /// Rewrite every snapshotted file and delete tracked files that did
    /// not exist at capture time, so the tree matches the point exactly.
    fn restore_files(&self, point: &RestorePoint) -> Result<(), EngineError> {
        let current = FileWalker::new(self.root.clone())
            .with_extensions(self.extensions.clone())
            .with_ignore_patterns(self.ignore_patterns.clone())
            .walk()
            .map_err(|e| EngineError::Analysis(e.to_string()))?;
        for path in current {
            let rel = path.strip_prefix(&self.root).unwrap_or(&path);
            if !point.files.contains_key(rel) {
                std::fs::remove_file(&path)?;
            }
        }

        for (rel, snapshot) in &point.files {
            let target = self.root.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &snapshot.content)?;
        }
        Ok(())
    }

    /// Verify the store directory is writable before any mutation starts.
    pub fn probe(&self) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.store)?;
        let probe = self.store.join(".probe");
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample() -> ResourceSample {
        ResourceSample {
            cpu_pct: 1.0,
            memory_pct: 2.0,
            disk_pct: 3.0,
            sampled_at: Utc::now(),
        }
    }

    fn manager(root: &Path) -> SnapshotManager {
        SnapshotManager::new(
            root,
            vec!["rs".into(), "toml".into()],
            vec!["**/.mendmap/**".into()],
        )
    }

    #[test]
    fn capture_then_restore_reverts_edits() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn original() {}\n").unwrap();

        let mut snapshots = manager(dir.path());
        let id = snapshots
            .create_restore_point("before edit", None, sample())
            .unwrap();

        fs::write(dir.path().join("a.rs"), "fn mangled( {\n").unwrap();
        snapshots.rollback_to(&id, None).unwrap();

        let restored = fs::read_to_string(dir.path().join("a.rs")).unwrap();
        assert_eq!(restored, "fn original() {}\n");
    }

    #[test]
    fn rollback_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn original() {}\n").unwrap();

        let mut snapshots = manager(dir.path());
        let id = snapshots
            .create_restore_point("before edit", None, sample())
            .unwrap();
        fs::write(dir.path().join("a.rs"), "changed").unwrap();

        snapshots.rollback_to(&id, None).unwrap();
        snapshots.rollback_to(&id, None).unwrap();
        let restored = fs::read_to_string(dir.path().join("a.rs")).unwrap();
        assert_eq!(restored, "fn original() {}\n");
    }

    #[test]
    fn restore_recreates_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn live() {}\n").unwrap();

        let mut snapshots = manager(dir.path());
        let id = snapshots
            .create_restore_point("before delete", None, sample())
            .unwrap();
        fs::remove_file(dir.path().join("src/lib.rs")).unwrap();

        snapshots.rollback_to(&id, None).unwrap();
        assert!(dir.path().join("src/lib.rs").exists());
    }

    #[test]
    fn restore_removes_files_created_after_capture() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();

        let mut snapshots = manager(dir.path());
        let id = snapshots
            .create_restore_point("before create", None, sample())
            .unwrap();
        fs::write(dir.path().join("new.toml"), "fresh = true\n").unwrap();

        snapshots.rollback_to(&id, None).unwrap();
        assert!(!dir.path().join("new.toml").exists());
        assert!(dir.path().join("a.rs").exists());
    }

    #[test]
    fn backups_and_manifest_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();

        let mut snapshots = manager(dir.path());
        let id = snapshots
            .create_restore_point("capture", None, sample())
            .unwrap();

        let point_dir = dir.path().join(".mendmap/restore").join(&id);
        assert!(point_dir.join("a.rs").exists());
        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(point_dir.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["id"], id.as_str());
        assert_eq!(manifest["description"], "capture");
    }

    #[test]
    fn store_dir_is_not_captured() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();

        let mut snapshots = manager(dir.path());
        let first = snapshots
            .create_restore_point("first", None, sample())
            .unwrap();
        let second = snapshots
            .create_restore_point("second", None, sample())
            .unwrap();
        // The second capture must not pick up the first capture's backups.
        let point = snapshots.get(&second).unwrap();
        assert!(point.files.keys().all(|p| !p.starts_with(".mendmap")));
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_point_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = manager(dir.path());
        assert!(matches!(
            snapshots.rollback_to("rp_missing", None),
            Err(EngineError::UnknownRestorePoint(_))
        ));
    }

    #[test]
    fn probe_succeeds_on_writable_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(manager(dir.path()).probe().is_ok());
    }
}
