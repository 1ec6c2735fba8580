//! Temporary file ownership and best-effort secondary operations.

use std::fmt::Display;
use std::path::PathBuf;

use tempfile::TempPath;

/// Runs a secondary operation whose failure must never mask the primary
/// outcome: on error the failure is logged and `None` returned.
pub fn attempt<T, E: Display>(what: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation = what, error = %e, "Secondary operation failed");
            None
        }
    }
}

/// Files owned by a job. Every tracked file is removed by [`release`] or,
/// failing that, when the guard is dropped (including during unwinding).
///
/// [`release`]: ArtifactGuard::release
#[derive(Debug, Default)]
pub struct ArtifactGuard {
    files: Vec<TempPath>,
}

impl ArtifactGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: paths.into_iter().map(TempPath::from_path).collect(),
        }
    }

    pub fn track(&mut self, path: PathBuf) {
        self.files.push(TempPath::from_path(path));
    }

    /// Takes over a file created through `tempfile`.
    pub fn adopt(&mut self, file: TempPath) {
        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Hands ownership of the tracked files back to the caller.
    pub fn disarm(&mut self) -> Vec<PathBuf> {
        self.files
            .drain(..)
            .filter_map(|file| attempt("keep temporary file", file.keep()))
            .collect()
    }

    /// Removes every tracked file and returns how many were deleted.
    pub fn release(&mut self) -> usize {
        let mut removed = 0;
        for file in self.files.drain(..) {
            let path = file.to_path_buf();
            match file.close() {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    file = %crate::sanitize::redact_path(&path),
                    error = %e,
                    "Failed to remove temporary file"
                ),
            }
        }
        removed
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let mut guard = ArtifactGuard::with_paths([a.clone()]);
        guard.track(b.clone());
        assert_eq!(guard.len(), 2);
        assert_eq!(guard.release(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(guard.is_empty());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut guard = ArtifactGuard::with_paths([dir.path().join("gone.pdf")]);
        assert_eq!(guard.release(), 0);
    }

    #[test]
    fn test_drop_during_panic_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"a").unwrap();

        let tracked = path.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = ArtifactGuard::with_paths([tracked]);
            panic!("worker blew up");
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_disarm_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"a").unwrap();

        let mut guard = ArtifactGuard::with_paths([path.clone()]);
        assert_eq!(guard.disarm(), vec![path.clone()]);
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn test_adopted_tempfile_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let file = tempfile::NamedTempFile::new_in(dir.path()).unwrap().into_temp_path();
        let path = file.to_path_buf();

        let mut guard = ArtifactGuard::new();
        guard.adopt(file);
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_attempt() {
        assert_eq!(attempt("ok", Ok::<_, String>(3)), Some(3));
        assert_eq!(attempt("bad", Err::<u8, _>("nope")), None);
    }
}
