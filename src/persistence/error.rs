//! Persistence-specific error helpers

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{MapError, MapResult};

/// Attach a context message to I/O style failures
pub trait PersistenceErrorContext<T> {
    fn persistence_context(self, context: &str) -> MapResult<T>;
}

impl<T> PersistenceErrorContext<T> for std::io::Result<T> {
    fn persistence_context(self, context: &str) -> MapResult<T> {
        self.map_err(|e| MapError::Io(std::io::Error::new(e.kind(), format!("{}: {}", context, e))))
    }
}

/// Create a corrupted data error
pub fn corrupted_data(reason: impl Into<String>) -> MapError {
    MapError::CorruptedData(reason.into())
}

/// Create a version mismatch error
pub fn version_mismatch(expected: u32, found: u32) -> MapError {
    MapError::VersionMismatch { expected, found }
}

/// Create a capacity mismatch error
pub fn capacity_mismatch(field: &'static str, expected: u64, found: u64) -> MapError {
    MapError::CapacityMismatch {
        field,
        expected,
        found,
    }
}

/// Write through a temporary sibling file and rename it into place, so a
/// failed write never leaves a truncated file at `path`.
pub fn atomic_write<F>(path: &Path, write: F) -> MapResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> MapResult<()>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = File::create(&tmp).persistence_context(&format!("create {}", tmp.display()))?;
    let mut writer = BufWriter::new(file);
    let result = write(&mut writer).and_then(|_| {
        writer
            .flush()
            .persistence_context(&format!("flush {}", tmp.display()))
    });

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    drop(writer);

    std::fs::rename(&tmp, path).persistence_context(&format!("rename to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_cleans_up_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let result = atomic_write(&path, |_| Err(corrupted_data("boom")));
        assert!(matches!(result, Err(MapError::CorruptedData(_))));
        assert!(!path.exists());
        assert!(!dir.path().join("out.bin.tmp").exists());

        atomic_write(&path, |w| w.write_all(b"ok").persistence_context("write")).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ok");
    }
}
