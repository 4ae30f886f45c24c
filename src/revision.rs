//! Revision-control integration. The engine prefers restoring state by
//! asking the revision system to check the tree out at a captured
//! revision; when that is unavailable or fails, snapshots restore files
//! byte for byte instead.

use crate::core::EngineError;
use git2::build::CheckoutBuilder;
use git2::Repository;
use std::path::{Path, PathBuf};

pub trait RevisionSystem: Send + Sync {
    /// Opaque handle for the current state of the tree.
    fn current_revision(&self) -> Result<String, EngineError>;

    /// Force the working tree back to `revision`.
    fn checkout(&self, revision: &str) -> Result<(), EngineError>;

    /// False when uncommitted modifications exist.
    fn working_tree_clean(&self) -> Result<bool, EngineError>;
}

/// Holds the repository path and opens the repository per call;
/// `git2::Repository` itself is not shareable across threads.
pub struct GitRevision {
    repo_path: PathBuf,
}

impl GitRevision {
    /// Locate the repository containing `root`, if any.
    pub fn discover(root: &Path) -> Option<Self> {
        match Repository::discover(root) {
            Ok(repo) => Some(Self {
                repo_path: repo.path().to_path_buf(),
            }),
            Err(e) => {
                log::debug!("no git repository at {}: {}", root.display(), e);
                None
            }
        }
    }

    fn open(&self) -> Result<Repository, EngineError> {
        Repository::open(&self.repo_path).map_err(|e| EngineError::Revision(e.to_string()))
    }
}

impl RevisionSystem for GitRevision {
    fn current_revision(&self) -> Result<String, EngineError> {
        let repo = self.open()?;
        let head = repo.head().map_err(|e| EngineError::Revision(e.to_string()))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| EngineError::Revision(e.to_string()))?;
        Ok(commit.id().to_string())
    }

    fn checkout(&self, revision: &str) -> Result<(), EngineError> {
        let repo = self.open()?;
        let oid = git2::Oid::from_str(revision)
            .map_err(|e| EngineError::Revision(format!("bad revision {revision}: {e}")))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|e| EngineError::Revision(e.to_string()))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| EngineError::Revision(e.to_string()))?;
        repo.set_head_detached(oid)
            .map_err(|e| EngineError::Revision(e.to_string()))?;
        Ok(())
    }

    fn working_tree_clean(&self) -> Result<bool, EngineError> {
        let repo = self.open()?;
        let mut options = git2::StatusOptions::new();
        options.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut options))
            .map_err(|e| EngineError::Revision(e.to_string()))?;
        Ok(statuses.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_revision_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GitRevision>();
    }

    #[test]
    fn discover_returns_none_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitRevision::discover(dir.path()).is_none());
    }

    #[test]
    fn discover_and_read_head_in_a_fresh_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let sig = git2::Signature::now("test", "test@example.com").unwrap();
            let tree_id = repo.index().unwrap().write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }

        let revision = GitRevision::discover(dir.path()).unwrap();
        let head = revision.current_revision().unwrap();
        assert_eq!(head.len(), 40);
        assert!(revision.working_tree_clean().unwrap());
    }
}
