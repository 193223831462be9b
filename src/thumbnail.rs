//! Thumbnail generation. Not part of the scheduling core (SPEC_FULL.md marks
//! it an external collaborator) but every capture attempts one; failures are
//! logged and otherwise ignored by the caller.
//!
//! Deviation from the source: thumbnails are encoded as JPEG rather than
//! WebP, since the crate only carries the `image` crate's `jpeg` feature
//! (see DESIGN.md).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use md5::{Digest, Md5};

const THUMBNAIL_WIDTH: u32 = 384;
const THUMBNAIL_HEIGHT: u32 = 216;
const THUMBNAIL_QUALITY: u8 = 75;

/// Hash-bucketed thumbnail path: `<job_dir>/thumbs/<first_hex>/<next_two_hex>/<name>.jpg`,
/// where `<job_dir>` is the parent of the `YYYY/MM/DD/HH` hierarchy under the
/// capture path.
pub fn thumbnail_path(image_path: &Path) -> PathBuf {
    let job_dir = image_path
        .parent() // HH
        .and_then(Path::parent) // DD
        .and_then(Path::parent) // MM
        .and_then(Path::parent) // YYYY
        .and_then(Path::parent) // job dir
        .unwrap_or_else(|| image_path.parent().unwrap_or(image_path));

    let digest = md5_hex(image_path.to_string_lossy().as_bytes());
    let stem = image_path.file_stem().and_then(|s| s.to_str()).unwrap_or("capture");

    job_dir
        .join("thumbs")
        .join(&digest[0..1])
        .join(&digest[1..3])
        .join(format!("{stem}.jpg"))
}

pub async fn generate(image_path: &Path) -> Result<PathBuf> {
    let image_path = image_path.to_path_buf();
    tokio::task::spawn_blocking(move || generate_blocking(&image_path))
        .await
        .context("thumbnail worker panicked")?
}

fn generate_blocking(image_path: &Path) -> Result<PathBuf> {
    let out_path = thumbnail_path(image_path);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).context("creating thumbnail directory")?;
    }

    let img = image::open(image_path).context("opening captured image")?;
    let thumb = img.resize(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Lanczos3);

    let file = std::fs::File::create(&out_path).context("creating thumbnail file")?;
    let mut writer = std::io::BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, THUMBNAIL_QUALITY);
    thumb
        .write_with_encoder(encoder)
        .context("encoding thumbnail")?;

    Ok(out_path)
}

pub fn delete(image_path: &Path) -> Result<()> {
    let out_path = thumbnail_path(image_path);
    if out_path.exists() {
        std::fs::remove_file(&out_path).context("deleting thumbnail")?;
    }
    Ok(())
}

/// Non-cryptographic use: only for distributing thumbnails across
/// directories, matching the source's `hashlib.md5(path).hexdigest()`.
fn md5_hex(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn thumbnail_path_is_hash_bucketed() {
        let image_path = Path::new("/captures/1_backyard/2025/01/01/12/backyard_000001_20250101_120000.jpg");
        let out = thumbnail_path(image_path);
        assert!(out.ends_with("backyard_000001_20250101_120000.jpg"));
        assert!(out.to_string_lossy().contains("thumbs"));
    }
}
