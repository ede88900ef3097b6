//! Trust-boundary checks for filesystem access
//!
//! Every stat, open, and directory listing in the indexing core goes through
//! the validator first. A path that fails here is rejected before any I/O
//! happens and the error is surfaced synchronously to the caller.

use crate::error::{IndexError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};

/// Validates candidate log paths against the configured allowlist.
#[derive(Debug, Clone)]
pub struct PathValidator {
    allowed_roots: Vec<PathBuf>,
    excluded: GlobSet,
}

impl PathValidator {
    pub fn new(allowed_roots: Vec<PathBuf>, exclude_patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| IndexError::Config(format!("Invalid exclude pattern {pattern}: {e}")))?;
            builder.add(glob);
        }
        let excluded = builder
            .build()
            .map_err(|e| IndexError::Config(format!("Failed to build exclude set: {e}")))?;

        Ok(Self {
            allowed_roots,
            excluded,
        })
    }

    /// A validator with no roots rejects everything; useful as a safe default.
    pub fn deny_all() -> Self {
        Self {
            allowed_roots: Vec::new(),
            excluded: GlobSet::empty(),
        }
    }

    /// Check that the path sits under one of the configured log roots.
    pub fn is_under_allowed_root(&self, path: &Path) -> bool {
        if self.excluded.is_match(path) {
            return false;
        }
        self.allowed_roots.iter().any(|root| path.starts_with(root))
    }

    /// Check structural sanity: absolute, no parent traversal, and a real
    /// file name at the end.
    pub fn is_well_formed_log_path(&self, path: &Path) -> bool {
        if !path.is_absolute() {
            return false;
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return false;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => !name.is_empty() && !name.contains('\0'),
            None => false,
        }
    }

    /// Run both checks, mapping failures onto the error taxonomy. This is the
    /// single gate in front of all filesystem access in the core.
    pub fn validate(&self, path: &Path) -> Result<()> {
        if !self.is_well_formed_log_path(path) {
            return Err(IndexError::InvalidPath(path.to_path_buf()));
        }
        if !self.is_under_allowed_root(path) {
            return Err(IndexError::NotWhitelisted(path.to_path_buf()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PathValidator {
        PathValidator::new(
            vec![PathBuf::from("/var/log")],
            &["**/*.tmp".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn accepts_paths_under_allowed_roots() {
        let v = validator();
        assert!(v.validate(Path::new("/var/log/nginx/access.log")).is_ok());
    }

    #[test]
    fn rejects_paths_outside_roots() {
        let v = validator();
        let err = v.validate(Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, IndexError::NotWhitelisted(_)));
    }

    #[test]
    fn rejects_traversal_and_relative_paths() {
        let v = validator();
        assert!(matches!(
            v.validate(Path::new("/var/log/../../etc/shadow")).unwrap_err(),
            IndexError::InvalidPath(_)
        ));
        assert!(matches!(
            v.validate(Path::new("relative/app.log")).unwrap_err(),
            IndexError::InvalidPath(_)
        ));
    }

    #[test]
    fn rejects_excluded_patterns() {
        let v = validator();
        assert!(matches!(
            v.validate(Path::new("/var/log/app.log.tmp")).unwrap_err(),
            IndexError::NotWhitelisted(_)
        ));
    }

    #[test]
    fn deny_all_rejects_everything() {
        let v = PathValidator::deny_all();
        assert!(v.validate(Path::new("/var/log/app.log")).is_err());
    }
}
