use camino::{Utf8Path, Utf8PathBuf};
use image::ImageFormat;
use tracing::debug;

use crate::error::CatalogError;

const FALLBACK_MIME: &str = "application/octet-stream";

/// A local photo file about to be uploaded, with the metadata recorded on its
/// `PhotoItem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSource {
    pub path: Utf8PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl PhotoSource {
    pub fn read(path: &Utf8Path) -> Result<Self, CatalogError> {
        let metadata = std::fs::metadata(path.as_std_path()).map_err(|err| photo_err(path, err))?;
        if !metadata.is_file() {
            return Err(CatalogError::PhotoRead {
                path: path.to_string(),
                message: "not a regular file".to_string(),
            });
        }
        let name = path
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| path.to_string());
        let mime_type = ImageFormat::from_path(path.as_std_path())
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| FALLBACK_MIME.to_string());
        let (width, height) = match image::image_dimensions(path.as_std_path()) {
            Ok((width, height)) => (Some(width), Some(height)),
            Err(err) => {
                debug!(path = %path, error = %err, "could not read pixel dimensions");
                (None, None)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            mime_type,
            width,
            height,
        })
    }

    /// Locally viewable reference stored on the photo record.
    pub fn local_url(&self) -> String {
        let absolute = self
            .path
            .canonicalize_utf8()
            .unwrap_or_else(|_| self.path.clone());
        format!("file://{absolute}")
    }

    pub async fn bytes(&self) -> Result<Vec<u8>, CatalogError> {
        tokio::fs::read(self.path.as_std_path())
            .await
            .map_err(|err| photo_err(&self.path, err))
    }
}

fn photo_err(path: &Utf8Path, err: std::io::Error) -> CatalogError {
    CatalogError::PhotoRead {
        path: path.to_string(),
        message: err.to_string(),
    }
}
