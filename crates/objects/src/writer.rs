//! Streaming object writer.
//!
//! The writer tees bytes into an MD5 digest and a temporary file created
//! lazily inside the store root, so the final rename stays on one
//! filesystem and is atomic. On failure the temporary file is left in
//! place for inspection; `remove` is the explicit miss-path cleanup.

use crate::error::{StoreError, StoreResult};
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Writes one object into a store root.
pub struct ObjectWriter {
    root: PathBuf,
    file: Option<OpenFile>,
    digest: Md5,
    size: u64,
    expected: Option<u64>,
}

struct OpenFile {
    file: fs::File,
    path: PathBuf,
}

impl ObjectWriter {
    /// Create a writer targeting the given store root. No file is opened
    /// until the first write. Callers that have no store configured model
    /// the absent sink as `Option<ObjectWriter>::None`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file: None,
            digest: Md5::new(),
            size: 0,
            expected: None,
        }
    }

    /// Arm a size check applied at finalization.
    pub fn expect_size(&mut self, size: u64) {
        self.expected = Some(size);
    }

    /// Location of the underlying temporary file, if one has been opened.
    pub fn temp_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append bytes. The first call opens the temporary file; the counter
    /// advances by what the file operation actually wrote.
    pub async fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        if self.file.is_none() {
            let named = tempfile::Builder::new()
                .prefix(".unresolved_object_")
                .tempfile_in(&self.root)?;
            let (std_file, temp_path) = named.into_parts();
            // Disarm auto-delete: the temp file must survive failures.
            let path = temp_path.keep().map_err(|err| err.error)?;
            self.file = Some(OpenFile {
                file: fs::File::from_std(std_file),
                path,
            });
        }
        self.digest.update(buf);
        if let Some(open) = self.file.as_mut() {
            let mut written = 0;
            while written < buf.len() {
                let n = open.file.write(&buf[written..]).await?;
                if n == 0 {
                    return Err(std::io::ErrorKind::WriteZero.into());
                }
                written += n;
                self.size += n as u64;
            }
        }
        Ok(())
    }

    /// Finish the object. The content hash is always computed and returned,
    /// even when nothing was written. When an expected size is armed and
    /// does not match, the temporary file is kept and an error returned.
    /// When the final object already exists the temporary file is removed
    /// and the write reported as successful; identical content from
    /// different servers converges here.
    pub async fn finalize(self) -> StoreResult<(u64, String)> {
        let hash: String = self.digest.finalize().iter().map(|b| format!("{b:02x}")).collect();

        if let Some(expected) = self.expected {
            if expected != self.size {
                let temp = self.file.as_ref().map(|f| f.path.clone()).unwrap_or_default();
                return Err(StoreError::SizeMismatch {
                    expected,
                    actual: self.size,
                    temp,
                });
            }
        }

        // A zero-byte object is still an object: materialize an empty temp
        // file so the rename below places it.
        let OpenFile { mut file, path } = match self.file {
            Some(open) => open,
            None => {
                let named = tempfile::Builder::new()
                    .prefix(".unresolved_object_")
                    .tempfile_in(&self.root)?;
                let (std_file, temp_path) = named.into_parts();
                let path = temp_path.keep().map_err(|err| err.error)?;
                OpenFile {
                    file: fs::File::from_std(std_file),
                    path,
                }
            }
        };
        file.sync_all().await?;
        drop(file);

        let dir = self.root.join(&hash[..2]);
        create_prefix_dir(&dir)?;

        let target = dir.join(&hash);
        if fs::symlink_metadata(&target).await.is_ok() {
            fs::remove_file(&path).await?;
            return Ok((self.size, hash));
        }
        if let Err(err) = fs::rename(&path, &target).await {
            // Another writer may have placed the object between the check
            // and the rename; a present target still counts as success.
            if fs::symlink_metadata(&target).await.is_ok() {
                let _ = fs::remove_file(&path).await;
                return Ok((self.size, hash));
            }
            return Err(StoreError::Io(err));
        }
        Ok((self.size, hash))
    }

    /// Close and delete the temporary file.
    pub async fn remove(self) -> StoreResult<()> {
        if let Some(OpenFile { file, path }) = self.file {
            drop(file);
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

fn create_prefix_dir(dir: &Path) -> StoreResult<()> {
    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    match builder.create(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(StoreError::Io(err)),
    }
}
