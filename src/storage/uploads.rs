//! Upload store for scanned images
//!
//! Uploaded image bytes are copied into the uploads directory under a
//! content-hash filename and referenced by a `/uploads/...` url, so the
//! same image always maps to the same stored file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// A stored upload: filesystem location plus its public-style url.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub url: String,
}

/// Probe the uploaded bytes for image dimensions.
///
/// Fails when the bytes are not a decodable image, which rejects bad
/// uploads before the detector is ever called.
pub fn probe_dimensions(image_bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = image::ImageReader::new(std::io::Cursor::new(image_bytes))
        .with_guessed_format()
        .context("failed to probe image format")?;

    reader
        .into_dimensions()
        .context("failed to read image dimensions")
}

/// Copy image bytes into the uploads directory, named by content hash.
pub fn store_upload(image_bytes: &[u8], uploads_dir: &Path) -> Result<StoredUpload> {
    std::fs::create_dir_all(uploads_dir)
        .with_context(|| format!("failed to create uploads directory {:?}", uploads_dir))?;

    let extension = image::guess_format(image_bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin");

    let mut hasher = Sha256::new();
    hasher.update(image_bytes);
    let digest = hasher.finalize();
    let hash_prefix: String = digest.iter().take(8).map(|byte| format!("{byte:02x}")).collect();

    let filename = format!("scan_{hash_prefix}.{extension}");
    let path = uploads_dir.join(&filename);

    if !path.exists() {
        std::fs::write(&path, image_bytes)
            .with_context(|| format!("failed to write upload {:?}", path))?;
        debug!("Stored upload at {:?}", path);
    }

    Ok(StoredUpload {
        path,
        url: format!("/uploads/{filename}"),
    })
}
