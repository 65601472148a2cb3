//! Post attachments for Agora.
//!
//! Metadata lives in `post_attachments`; the bytes live in an
//! [`AttachmentStore`]. Files are stored in a sharded directory structure:
//! ```text
//! {base_path}/
//! ├── ab/
//! │   └── ab12cd34-5678-90ab-cdef-123456789012.png
//! └── ...
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::db::DbPool;
use crate::{AgoraError, Result};

/// A file attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PostAttachment {
    pub id: i64,
    pub post_id: i64,
    /// Name inside the attachment store (UUID.extension).
    pub stored_name: String,
    /// Name given by the uploader.
    pub file_name: String,
    pub size: i64,
    pub mime_type: String,
    pub created_at: String,
}

impl PostAttachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Data for recording a stored attachment.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub post_id: i64,
    pub stored_name: String,
    pub file_name: String,
    pub size: i64,
    pub mime_type: String,
}

impl NewAttachment {
    /// Describe an upload; the MIME type is guessed from the file name.
    pub fn new(
        post_id: i64,
        stored_name: impl Into<String>,
        file_name: impl Into<String>,
        size: i64,
    ) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            post_id,
            stored_name: stored_name.into(),
            file_name,
            size,
            mime_type,
        }
    }
}

/// Where attachment bytes are kept.
pub trait AttachmentStore: Send + Sync {
    /// Store content under a fresh name and return that name.
    fn save(&self, content: &[u8], original_name: &str) -> Result<String>;

    /// Read stored content.
    fn load(&self, stored_name: &str) -> Result<Vec<u8>>;

    /// Remove stored content. Returns false if it was already gone.
    fn release(&self, stored_name: &str) -> Result<bool>;
}

/// Attachment store on the local file system.
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    base_path: PathBuf,
}

impl LocalAttachmentStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Full path of a stored name: `{base_path}/{shard}/{stored_name}`.
    pub fn file_path(&self, stored_name: &str) -> PathBuf {
        self.base_path.join(shard_of(stored_name)).join(stored_name)
    }

    pub fn exists(&self, stored_name: &str) -> bool {
        self.file_path(stored_name).exists()
    }
}

impl AttachmentStore for LocalAttachmentStore {
    fn save(&self, content: &[u8], original_name: &str) -> Result<String> {
        let stored_name = format!("{}.{}", Uuid::new_v4(), extension_of(original_name));
        let file_path = self.file_path(&stored_name);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, content)?;

        Ok(stored_name)
    }

    fn load(&self, stored_name: &str) -> Result<Vec<u8>> {
        match fs::read(self.file_path(stored_name)) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AgoraError::NotFound(format!("attachment {stored_name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release(&self, stored_name: &str) -> Result<bool> {
        match fs::remove_file(self.file_path(stored_name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// First two characters of the stored name.
fn shard_of(stored_name: &str) -> &str {
    stored_name.get(..2).unwrap_or(stored_name)
}

/// Lowercase extension of a file name, "bin" when there is none.
fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

/// Repository for attachment metadata.
pub struct AttachmentRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AttachmentRepository<'a> {
    /// Create a new AttachmentRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Record an attachment.
    pub async fn create(&self, attachment: &NewAttachment) -> Result<PostAttachment> {
        sqlx::query_as(
            "INSERT INTO post_attachments (post_id, stored_name, file_name, size, mime_type)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, post_id, stored_name, file_name, size, mime_type, created_at",
        )
        .bind(attachment.post_id)
        .bind(&attachment.stored_name)
        .bind(&attachment.file_name)
        .bind(attachment.size)
        .bind(&attachment.mime_type)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<PostAttachment>> {
        sqlx::query_as(
            "SELECT id, post_id, stored_name, file_name, size, mime_type, created_at
             FROM post_attachments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Attachments of a post, in upload order.
    pub async fn list_by_post(&self, post_id: i64) -> Result<Vec<PostAttachment>> {
        sqlx::query_as(
            "SELECT id, post_id, stored_name, file_name, size, mime_type, created_at
             FROM post_attachments WHERE post_id = ? ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Delete an attachment record. The stored file is not touched.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM post_attachments WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Count attachment records.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_attachments")
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (LocalAttachmentStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalAttachmentStore::new(dir.path().join("attachments")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_save_load_release() {
        let (store, _dir) = setup_store();

        let name = store.save(b"hello", "notes.TXT").unwrap();
        assert!(name.ends_with(".txt"));
        assert!(store.exists(&name));
        assert!(store
            .file_path(&name)
            .parent()
            .unwrap()
            .ends_with(&name[..2]));

        assert_eq!(store.load(&name).unwrap(), b"hello");
        assert!(store.release(&name).unwrap());
        assert!(!store.release(&name).unwrap());
        assert!(matches!(store.load(&name), Err(AgoraError::NotFound(_))));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.PNG"), "png");
        assert_eq!(extension_of("README"), "bin");
        assert_eq!(extension_of("weird.ta r"), "bin");
    }

    #[test]
    fn test_new_attachment_guesses_mime() {
        let image = NewAttachment::new(1, "ab.png", "cat.png", 10);
        assert_eq!(image.mime_type, "image/png");

        let unknown = NewAttachment::new(1, "cd.bin", "blob", 10);
        assert_eq!(unknown.mime_type, "application/octet-stream");
    }
}
