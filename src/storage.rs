//! Storage Gateway: abstracts the object store backing original-file bytes
//! and page raster bytes behind a small trait, so the concrete backend
//! (local filesystem here; S3-compatible bucket as an external collaborator)
//! never leaks into the extraction pipeline.
//!
//! The `<session-id>/<uuid>.<ext>` key convention and the sidecar
//! `.filenames.json` manifest are grounded on
//! `original_source/backend/app/services/modules/bucket_manager.py`'s
//! upload path, which needs a manifest for the same reason: uploaded
//! filenames aren't safe to use as storage keys directly.
//!
//! Polymorphic over source kind: an upload session (object-store-backed,
//! the manifest case above) and a local folder (read directly off disk,
//! grounded on the happy-path scenario of a job pointed at `/in`). A third,
//! remote-drive-backed source exists only as a tagged variant with no
//! implementation here: reaching a third-party drive needs an OAuth flow,
//! which is this crate's one explicitly out-of-scope external collaborator.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A stored object's address: which upload session it belongs to and the
/// key it was stored under within that session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub session_id: String,
    pub key: String,
}

impl ObjectRef {
    pub fn object_key(&self) -> String {
        format!("{}/{}", self.session_id, self.key)
    }
}

/// A job's source descriptor, tagged by kind. `remote_drive` carries a
/// provider name for API-surface compatibility but has no gateway
/// implementation — see the module doc comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    UploadSession { session_id: String },
    Folder { path: String, file_types: Vec<String> },
    RemoteDrive { provider: String },
}

/// One document discovered by `StorageGateway::enumerate`, before a
/// `Document` row exists for it. `source_path` is opaque outside the
/// gateway that produced it — pass it back to `fetch` unmodified.
#[derive(Debug, Clone)]
pub struct DocumentRef {
    pub source_path: String,
    pub filename: String,
    pub size: u64,
    pub mime: String,
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn put(&self, session_id: &str, bytes: &[u8], content_type: &str) -> Result<ObjectRef>;
    async fn get(&self, object_ref: &ObjectRef) -> Result<Vec<u8>>;
    async fn put_filenames_manifest(
        &self,
        session_id: &str,
        manifest: &HashMap<String, String>,
    ) -> Result<()>;
    async fn get_filenames_manifest(&self, session_id: &str) -> Result<HashMap<String, String>>;

    /// Check that `config` points at a reachable source before a job is
    /// allowed to start discovery against it.
    async fn validate(&self, config: &SourceConfig) -> Result<()>;
    /// Count documents `config` would yield, stopping early once `cap` is
    /// reached (a large folder shouldn't be walked in full just to report
    /// "more than enough").
    async fn count(&self, config: &SourceConfig, cap: usize) -> Result<usize>;
    /// Enumerate every document `config` points at. Not a lazy stream in
    /// this implementation — discovery's source sizes are small enough
    /// (bounded by `count`'s own cap) that materializing the full list is
    /// simpler than threading an async stream through the broker task that
    /// calls it.
    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<DocumentRef>>;
    /// Fetch the bytes a prior `enumerate` call's `source_path` addresses.
    async fn fetch(&self, source_path: &str) -> Result<Vec<u8>>;
}

/// Local-filesystem implementation: `{root}/{session_id}/{uuid}.{ext}`, with
/// `{root}/{session_id}/.filenames.json` holding the key-to-original-name
/// map for the whole session.
pub struct LocalFsStorage {
    root: PathBuf,
}

impl LocalFsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn manifest_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(".filenames.json")
    }
}

#[async_trait]
impl StorageGateway for LocalFsStorage {
    async fn put(&self, session_id: &str, bytes: &[u8], content_type: &str) -> Result<ObjectRef> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Transient(format!("create storage dir: {e}")))?;

        let key = format!("{}.{}", Uuid::new_v4(), mime_to_extension(content_type));
        let path = dir.join(&key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Transient(format!("write object {}: {e}", path.display())))?;

        Ok(ObjectRef {
            session_id: session_id.to_string(),
            key,
        })
    }

    async fn get(&self, object_ref: &ObjectRef) -> Result<Vec<u8>> {
        let path = self.session_dir(&object_ref.session_id).join(&object_ref.key);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("object {}", object_ref.object_key()))
            } else {
                AppError::Transient(format!("read object {}: {e}", path.display()))
            }
        })
    }

    async fn put_filenames_manifest(
        &self,
        session_id: &str,
        manifest: &HashMap<String, String>,
    ) -> Result<()> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Transient(format!("create storage dir: {e}")))?;
        let contents = serde_json::to_vec_pretty(manifest)?;
        tokio::fs::write(self.manifest_path(session_id), contents)
            .await
            .map_err(|e| AppError::Transient(format!("write filenames manifest: {e}")))?;
        Ok(())
    }

    async fn get_filenames_manifest(&self, session_id: &str) -> Result<HashMap<String, String>> {
        let path = self.manifest_path(session_id);
        let contents = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("filenames manifest for session {session_id}"))
            } else {
                AppError::Transient(format!("read filenames manifest: {e}"))
            }
        })?;
        Ok(serde_json::from_slice(&contents)?)
    }

    async fn validate(&self, config: &SourceConfig) -> Result<()> {
        match config {
            SourceConfig::UploadSession { .. } => Ok(()),
            SourceConfig::Folder { path, .. } => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("folder source {path}: {e}")))?;
                if metadata.is_dir() {
                    Ok(())
                } else {
                    Err(AppError::InvalidInput(format!("folder source {path} is not a directory")))
                }
            }
            SourceConfig::RemoteDrive { provider } => {
                Err(AppError::InvalidInput(format!("remote drive source ({provider}) is not implemented")))
            }
        }
    }

    async fn count(&self, config: &SourceConfig, cap: usize) -> Result<usize> {
        match config {
            SourceConfig::UploadSession { session_id } => {
                let manifest = match self.get_filenames_manifest(session_id).await {
                    Ok(m) => m,
                    Err(AppError::NotFound(_)) => HashMap::new(),
                    Err(e) => return Err(e),
                };
                Ok(manifest.len().min(cap))
            }
            SourceConfig::Folder { path, file_types } => {
                let mut entries = tokio::fs::read_dir(path)
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("folder source {path}: {e}")))?;
                let mut count = 0usize;
                while count < cap {
                    let Some(entry) = entries
                        .next_entry()
                        .await
                        .map_err(|e| AppError::Transient(format!("reading folder {path}: {e}")))?
                    else {
                        break;
                    };
                    if is_wanted_file(&entry, file_types).await {
                        count += 1;
                    }
                }
                Ok(count)
            }
            SourceConfig::RemoteDrive { provider } => {
                Err(AppError::InvalidInput(format!("remote drive source ({provider}) is not implemented")))
            }
        }
    }

    async fn enumerate(&self, config: &SourceConfig) -> Result<Vec<DocumentRef>> {
        match config {
            SourceConfig::UploadSession { session_id } => {
                let manifest = match self.get_filenames_manifest(session_id).await {
                    Ok(m) => m,
                    Err(AppError::NotFound(_)) => HashMap::new(),
                    Err(e) => return Err(e),
                };
                let session_dir = self.session_dir(session_id);
                let mut refs = Vec::with_capacity(manifest.len());
                for (key, filename) in manifest {
                    let size = tokio::fs::metadata(session_dir.join(&key)).await.map(|m| m.len()).unwrap_or(0);
                    refs.push(DocumentRef {
                        source_path: format!("{session_id}/{key}"),
                        mime: extension_to_mime_key(&key).to_string(),
                        filename,
                        size,
                    });
                }
                Ok(refs)
            }
            SourceConfig::Folder { path, file_types } => {
                let mut entries = tokio::fs::read_dir(path)
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("folder source {path}: {e}")))?;
                let mut refs = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| AppError::Transient(format!("reading folder {path}: {e}")))?
                {
                    if !is_wanted_file(&entry, file_types).await {
                        continue;
                    }
                    let filename = entry.file_name().to_string_lossy().into_owned();
                    let metadata = entry
                        .metadata()
                        .await
                        .map_err(|e| AppError::Transient(format!("stat {}: {e}", entry.path().display())))?;
                    refs.push(DocumentRef {
                        source_path: format!("folder:{}", entry.path().display()),
                        mime: extension_to_mime_key(&filename).to_string(),
                        filename,
                        size: metadata.len(),
                    });
                }
                Ok(refs)
            }
            SourceConfig::RemoteDrive { provider } => {
                Err(AppError::InvalidInput(format!("remote drive source ({provider}) is not implemented")))
            }
        }
    }

    async fn fetch(&self, source_path: &str) -> Result<Vec<u8>> {
        if let Some(path) = source_path.strip_prefix("folder:") {
            return tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AppError::NotFound(format!("source file {path}"))
                } else {
                    AppError::Transient(format!("read source file {path}: {e}"))
                }
            });
        }
        let (session_id, key) = source_path
            .split_once('/')
            .ok_or_else(|| AppError::InvalidInput(format!("malformed object source_path {source_path}")))?;
        self.get(&ObjectRef { session_id: session_id.to_string(), key: key.to_string() }).await
    }
}

/// Whether a folder-walk directory entry should be treated as a document:
/// a regular file whose extension is in `file_types` (case-insensitive), or
/// any regular file when `file_types` is empty.
async fn is_wanted_file(entry: &tokio::fs::DirEntry, file_types: &[String]) -> bool {
    let Ok(file_type) = entry.file_type().await else { return false };
    if !file_type.is_file() {
        return false;
    }
    if file_types.is_empty() {
        return true;
    }
    let name = entry.file_name();
    let name = name.to_string_lossy();
    let Some(ext) = name.rsplit('.').next() else { return false };
    file_types.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext))
}

/// MIME lookup by a filename or manifest key's extension, the inverse of
/// `mime_to_extension`.
pub fn extension_to_mime_key(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or("") {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "tiff" | "tif" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Map MIME type to file extension, used to keep stored object keys
/// human-recognizable even though the basename itself is a UUID.
pub fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/tiff" => "tiff",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFsStorage::new(dir.path());
        let reference = storage
            .put("session-1", b"hello pdf", "application/pdf")
            .await
            .unwrap();
        assert!(reference.key.ends_with(".pdf"));

        let bytes = storage.get(&reference).await.unwrap();
        assert_eq!(bytes, b"hello pdf");
    }

    #[tokio::test]
    async fn get_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFsStorage::new(dir.path());
        let missing = ObjectRef {
            session_id: "session-1".to_string(),
            key: "nonexistent.pdf".to_string(),
        };
        let err = storage.get(&missing).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn filenames_manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFsStorage::new(dir.path());
        let mut manifest = HashMap::new();
        manifest.insert("abc.pdf".to_string(), "Statement March.pdf".to_string());

        storage.put_filenames_manifest("session-1", &manifest).await.unwrap();
        let loaded = storage.get_filenames_manifest("session-1").await.unwrap();
        assert_eq!(loaded.get("abc.pdf"), Some(&"Statement March.pdf".to_string()));
    }

    #[tokio::test]
    async fn folder_enumerate_finds_matching_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"a").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"bb").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let storage = LocalFsStorage::new(dir.path().parent().unwrap());
        let config = SourceConfig::Folder {
            path: dir.path().to_string_lossy().into_owned(),
            file_types: vec!["pdf".to_string()],
        };
        storage.validate(&config).await.unwrap();

        let mut refs = storage.enumerate(&config).await.unwrap();
        refs.sort_by(|a, b| a.filename.cmp(&b.filename));
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].filename, "a.pdf");
        assert_eq!(refs[0].mime, "application/pdf");
        assert_eq!(refs[1].size, 2);

        let bytes = storage.fetch(&refs[1].source_path).await.unwrap();
        assert_eq!(bytes, b"bb");
    }

    #[tokio::test]
    async fn folder_count_stops_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("{i}.pdf")), b"x").unwrap();
        }
        let storage = LocalFsStorage::new(dir.path());
        let config = SourceConfig::Folder { path: dir.path().to_string_lossy().into_owned(), file_types: vec![] };
        let count = storage.count(&config, 3).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn validate_rejects_missing_folder() {
        let storage = LocalFsStorage::new("/tmp");
        let config = SourceConfig::Folder { path: "/tmp/does-not-exist-bulkextract".to_string(), file_types: vec![] };
        let err = storage.validate(&config).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
