use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, ResultExt};
use crate::models::comparison::UploadedImage;
use crate::utils::staging_suffix;

/// An upload written to a temporary file for the duration of a request.
///
/// The file is deleted when this value is dropped, whichever way the request
/// ends.
#[derive(Debug)]
pub struct StagedUpload {
    upload: UploadedImage,
    file: Option<NamedTempFile>,
}

impl StagedUpload {
    /// Write `upload` to a fresh temporary file inside `dir`
    pub async fn stage(dir: &Path, prefix: &str, upload: UploadedImage) -> Result<Self> {
        let suffix = staging_suffix(upload.file_name.as_deref());
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(&suffix)
            .tempfile_in(dir)
            .with_context(|| format!("failed to create staging file in {}", dir.display()))?;

        // Own the file before writing so a failed write still cleans up
        let staged = Self {
            upload,
            file: Some(file),
        };

        let mut out = tokio::fs::OpenOptions::new()
            .write(true)
            .open(staged.path())
            .await?;
        out.write_all(&staged.upload.data).await?;
        out.flush().await?;

        log::debug!(
            "Staged {} ({} bytes) at {}",
            staged.upload.field,
            staged.upload.len(),
            staged.path().display()
        );
        Ok(staged)
    }

    /// Location of the staged file
    pub fn path(&self) -> &Path {
        match &self.file {
            Some(file) => file.path(),
            None => Path::new(""),
        }
    }

    /// The upload this file was staged from
    pub fn upload(&self) -> &UploadedImage {
        &self.upload
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            match file.close() {
                Ok(()) => log::debug!("Removed staged upload {}", path.display()),
                Err(e) => log::warn!("Failed to remove staged upload {}: {}", path.display(), e),
            }
        }
    }
}
