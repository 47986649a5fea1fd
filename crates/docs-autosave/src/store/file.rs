//! File-backed document store.
//!
//! Each handle is stored in `<root>/<handle>.doc`:
//!
//! ```text
//! +------------------+
//! | Magic: "DOC\x01" | 4 bytes - file identification
//! +------------------+
//! | Version: 1       | 4 bytes - u32 little-endian format version
//! +------------------+
//! | Revision         | 8 bytes - u64 little-endian, monotonic per handle
//! +------------------+
//! | Payload          | Variable - encoded document state
//! +------------------+
//! ```

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DocumentStore, SaveReceipt, content_digest};
use crate::error::{AutosaveError, Result};
use crate::handle::DocumentHandle;

/// Magic bytes at the start of every document file.
pub const FILE_MAGIC: [u8; 4] = *b"DOC\x01";

/// Current document file format version.
pub const FILE_FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

/// A document read back from a [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub handle: DocumentHandle,
    pub revision: u64,
    pub content: Vec<u8>,
}

impl StoredDocument {
    pub fn digest(&self) -> String {
        content_digest(&self.content)
    }
}

/// Store that writes one file per document under a root directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes revision assignment across concurrent in-flight saves.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, handle: &DocumentHandle) -> PathBuf {
        self.root.join(format!("{handle}.doc"))
    }

    /// Load the latest persisted state of `handle`.
    ///
    /// Spawns the read on a blocking thread pool to avoid blocking the
    /// async runtime.
    pub async fn load(&self, handle: &DocumentHandle) -> Result<StoredDocument> {
        let path = self.path_for(handle);
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || read_document(&path, handle))
            .await
            .map_err(|e| AutosaveError::Io {
                operation: "read",
                path: PathBuf::new(),
                source: std::io::Error::other(e),
            })?
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn save(&self, handle: &DocumentHandle, content: Vec<u8>) -> Result<SaveReceipt> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(handle);
        let handle = handle.clone();

        tokio::task::spawn_blocking(move || write_document(&path, handle, &content))
            .await
            .map_err(|e| AutosaveError::Io {
                operation: "write",
                path: PathBuf::new(),
                source: std::io::Error::other(e),
            })?
    }
}

/// Write the next revision of a document.
///
/// Uses atomic write (temp file + rename) so a crash mid-save leaves the
/// previous revision intact.
fn write_document(path: &Path, handle: DocumentHandle, content: &[u8]) -> Result<SaveReceipt> {
    let revision = read_revision(path)?.map_or(1, |current| current + 1);

    let mut bytes = Vec::with_capacity(HEADER_LEN + content.len());
    bytes.extend_from_slice(&FILE_MAGIC);
    bytes.extend_from_slice(&FILE_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&revision.to_le_bytes());
    bytes.extend_from_slice(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AutosaveError::Io {
            operation: "create directory",
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("doc.tmp");
    let mut file = File::create(&temp_path).map_err(|e| AutosaveError::Io {
        operation: "create",
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(&bytes).map_err(|e| AutosaveError::Io {
        operation: "write",
        path: temp_path.clone(),
        source: e,
    })?;

    file.sync_all().map_err(|e| AutosaveError::Io {
        operation: "sync",
        path: temp_path.clone(),
        source: e,
    })?;

    fs::rename(&temp_path, path).map_err(|e| AutosaveError::AtomicWriteFailed {
        temp_path: temp_path.clone(),
        target_path: path.to_path_buf(),
        source: e,
    })?;

    tracing::debug!(%handle, revision, path = %path.display(), "wrote document file");
    Ok(SaveReceipt::new(handle, revision, content))
}

fn read_document(path: &Path, handle: DocumentHandle) -> Result<StoredDocument> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AutosaveError::NotFound {
                handle: handle.to_string(),
            });
        }
        Err(e) => {
            return Err(AutosaveError::Io {
                operation: "read",
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let Some((header, content)) = bytes.split_first_chunk::<HEADER_LEN>() else {
        return Err(too_small(path));
    };

    Ok(StoredDocument {
        handle,
        revision: parse_header(header, path)?,
        content: content.to_vec(),
    })
}

/// Revision currently on disk, reading only the header. `None` if the
/// document was never saved.
fn read_revision(path: &Path) -> Result<Option<u64>> {
    let io_error = |source| AutosaveError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source,
    };

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    let mut header = [0u8; HEADER_LEN];
    match file.read_exact(&mut header) {
        Ok(()) => parse_header(&header, path).map(Some),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(too_small(path)),
        Err(e) => Err(io_error(e)),
    }
}

/// Validate magic and version, returning the stored revision.
fn parse_header(header: &[u8; HEADER_LEN], path: &Path) -> Result<u64> {
    if header[0..4] != FILE_MAGIC {
        return Err(AutosaveError::InvalidFormat {
            path: path.to_path_buf(),
            reason: "Not a document file (invalid magic bytes)".to_string(),
        });
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version == 0 {
        return Err(AutosaveError::InvalidFormat {
            path: path.to_path_buf(),
            reason: "Format version 0 is not valid".to_string(),
        });
    }
    if version > FILE_FORMAT_VERSION {
        return Err(AutosaveError::UnsupportedVersion {
            found: version,
            max_supported: FILE_FORMAT_VERSION,
            path: path.to_path_buf(),
        });
    }

    let mut revision = [0u8; 8];
    revision.copy_from_slice(&header[8..HEADER_LEN]);
    Ok(u64::from_le_bytes(revision))
}

fn too_small(path: &Path) -> AutosaveError {
    AutosaveError::InvalidFormat {
        path: path.to_path_buf(),
        reason: "File too small".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn handle() -> DocumentHandle {
        DocumentHandle::new("meeting-notes").unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let receipt = store.save(&handle(), b"# Notes".to_vec()).await.unwrap();
        assert_eq!(receipt.revision, 1);

        let stored = store.load(&handle()).await.unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.content, b"# Notes");
        assert_eq!(stored.digest(), receipt.digest);

        let bytes = fs::read(store.path_for(&handle())).unwrap();
        assert_eq!(&bytes[0..4], &FILE_MAGIC);
        assert!(!store.path_for(&handle()).with_extension("doc.tmp").exists());
    }

    #[tokio::test]
    async fn test_revision_survives_new_store_instance() {
        let dir = tempdir().unwrap();
        FileStore::new(dir.path())
            .save(&handle(), b"v1".to_vec())
            .await
            .unwrap();

        let receipt = FileStore::new(dir.path())
            .save(&handle(), b"v2".to_vec())
            .await
            .unwrap();
        assert_eq!(receipt.revision, 2);
    }

    #[tokio::test]
    async fn test_load_missing_document() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.load(&handle()).await,
            Err(AutosaveError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_invalid_magic() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        fs::write(store.path_for(&handle()), b"NOT_A_DOCUMENT_FILE").unwrap();

        assert!(matches!(
            store.load(&handle()).await,
            Err(AutosaveError::InvalidFormat { .. })
        ));
    }

    fn write_header(store: &FileStore, version: u32, revision: u64) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FILE_MAGIC);
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&revision.to_le_bytes());
        bytes.extend_from_slice(b"old body");
        fs::write(store.path_for(&handle()), bytes).unwrap();
    }

    #[tokio::test]
    async fn test_load_rejects_version_zero() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        write_header(&store, 0, 3);

        assert!(matches!(
            store.load(&handle()).await,
            Err(AutosaveError::InvalidFormat { .. })
        ));
        assert!(matches!(
            store.save(&handle(), b"new".to_vec()).await,
            Err(AutosaveError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_revision_comes_from_header_only() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let path = store.path_for(&handle());

        assert_eq!(read_revision(&path).unwrap(), None);

        write_header(&store, FILE_FORMAT_VERSION, 41);
        assert_eq!(read_revision(&path).unwrap(), Some(41));

        fs::write(&path, &FILE_MAGIC).unwrap();
        assert!(matches!(
            read_revision(&path),
            Err(AutosaveError::InvalidFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_continues_from_header_revision() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        write_header(&store, FILE_FORMAT_VERSION, 41);

        let receipt = store.save(&handle(), b"new".to_vec()).await.unwrap();
        assert_eq!(receipt.revision, 42);
        assert_eq!(store.load(&handle()).await.unwrap().content, b"new");
    }

    #[tokio::test]
    async fn test_load_unsupported_version() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FILE_MAGIC);
        bytes.extend_from_slice(&999u32.to_le_bytes());
        bytes.extend_from_slice(&7u64.to_le_bytes());
        fs::write(store.path_for(&handle()), bytes).unwrap();

        assert!(matches!(
            store.load(&handle()).await,
            Err(AutosaveError::UnsupportedVersion { found: 999, .. })
        ));
    }
}
