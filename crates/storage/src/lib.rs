mod error;

pub use error::{StorageError, StorageResult};
use opendal::services::Fs;
pub use opendal::Buffer;
use opendal::Operator;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Blob store rooted at a local directory. All paths are relative to the root.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    op: Operator,
}

impl Storage {
    pub fn new_fs(root: impl AsRef<Path>) -> StorageResult<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = Storage::path_to_string(root)?;

        let mut builder = Fs::default();
        builder.root(root.as_str());
        let op: Operator = Operator::new(builder)?.finish();

        Ok(Self {
            op,
            root: PathBuf::from(root),
        })
    }

    fn path_to_string(path: impl AsRef<Path>) -> StorageResult<String> {
        match path.as_ref().to_str() {
            Some(path) => Ok(path.to_string()),
            None => Err(StorageError::PathError),
        }
    }

    /// A bare file name: no separators, no parent references, not empty.
    pub fn validate_file_name(name: &str) -> StorageResult<()> {
        let invalid = name.is_empty()
            || name == "."
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\');
        if invalid {
            return Err(StorageError::InvalidFileName(name.to_string()));
        }
        Ok(())
    }

    /// `<uuid v4 hex><ext>`, e.g. `3f2a...e1.png` for ext `.png`.
    pub fn unique_filename(ext: &str) -> String {
        format!("{}{}", Uuid::new_v4().simple(), ext)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get_actual_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub async fn is_exist(&self, path: impl AsRef<Path>) -> StorageResult<bool> {
        let path = Storage::path_to_string(path)?;
        self.op
            .is_exist(path.as_str())
            .await
            .map_err(StorageError::from)
    }

    pub async fn read(&self, path: impl AsRef<Path>) -> StorageResult<Buffer> {
        let path = Storage::path_to_string(path)?;
        self.op
            .read(path.as_str())
            .await
            .map_err(StorageError::from)
    }

    /// if dir not exist, create it iteratively
    pub async fn write(&self, path: impl AsRef<Path>, bs: impl Into<Buffer>) -> StorageResult<()> {
        let path = Storage::path_to_string(path)?;
        self.op
            .write(path.as_str(), bs)
            .await
            .map_err(StorageError::from)
    }

    /// Stores `bs` under a fresh name ending in `ext` and returns that name.
    pub async fn write_unique(&self, ext: &str, bs: impl Into<Buffer>) -> StorageResult<String> {
        let mut filename = Storage::unique_filename(ext);
        while self.is_exist(&filename).await? {
            tracing::warn!("generated file name {} already taken, retrying", filename);
            filename = Storage::unique_filename(ext);
        }
        self.write(&filename, bs).await?;
        Ok(filename)
    }

    pub async fn remove_file(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = Storage::path_to_string(path)?;
        self.op
            .delete(path.as_str())
            .await
            .map_err(StorageError::from)
    }
}
