//! Image output: turns transferred native bitmaps into image files.
//!
//! The codec is chosen from the file extension. Pages are decoded through
//! the `image` crate's BMP reader and re-encoded with the target codec.

pub mod dib;

use crate::binding::NativeBitmap;
use crate::error::{TwainError, TwainResult};
use dib::DibHeader;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File extensions with an output codec.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["bmp", "png", "jpg", "jpeg", "tif", "tiff", "gif"];

/// Codec for a file extension, case-insensitive.
pub fn format_for_extension(ext: &str) -> TwainResult<ImageFormat> {
    match ext.to_ascii_lowercase().as_str() {
        "bmp" => Ok(ImageFormat::Bmp),
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "tif" | "tiff" => Ok(ImageFormat::Tiff),
        "gif" => Ok(ImageFormat::Gif),
        _ => Err(TwainError::UnsupportedFormat(ext.to_string())),
    }
}

/// Codec for the extension of `path`.
pub fn format_for_path(path: &Path) -> TwainResult<ImageFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| TwainError::UnsupportedFormat(String::new()))?;
    format_for_extension(ext)
}

/// Decode a packed DIB.
pub fn decode_dib(dib: &[u8]) -> TwainResult<DynamicImage> {
    let header = DibHeader::parse(dib)?;
    let bmp = header.to_bmp(dib)?;
    Ok(image::load_from_memory_with_format(&bmp, ImageFormat::Bmp)?)
}

/// Saves transferred pages to disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageWriter;

impl ImageWriter {
    /// A writer with the default codecs.
    pub fn new() -> Self {
        Self
    }

    /// Save one page to `path`, encoded as the extension says.
    pub fn save(&self, page: &NativeBitmap, path: &Path) -> TwainResult<()> {
        let format = format_for_path(path)?;
        let image = decode_dib(&page.bytes()?)?;
        let image = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.into_rgb8()),
            _ => image,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        image.save_with_format(path, format)?;
        info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "page saved"
        );
        Ok(())
    }

    /// Save every page next to `base`, page `i` as `<stem><i>.<ext>`.
    ///
    /// Each page is saved independently; the result for each path is
    /// reported in page order.
    pub fn save_all(&self, pages: &[NativeBitmap], base: &Path) -> Vec<(PathBuf, TwainResult<()>)> {
        pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let path = page_path(base, i);
                let result = self.save(page, &path);
                if let Err(err) = &result {
                    warn!(path = %path.display(), error = %err, "page not saved");
                }
                (path, result)
            })
            .collect()
    }
}

/// Path of page `index` for the base path `base`.
pub fn page_path(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}{}", stem, index),
    };
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(format_for_extension("PNG").unwrap(), ImageFormat::Png);
        assert_eq!(format_for_extension("jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(format_for_extension("tif").unwrap(), ImageFormat::Tiff);
        let err = format_for_extension("xyz").unwrap_err();
        assert_eq!(err.to_string(), "Unknown picture format for extension 'xyz'");
        assert!(format_for_path(Path::new("scan")).is_err());
    }

    #[test]
    fn test_page_paths() {
        assert_eq!(
            page_path(Path::new("/tmp/out/scan.png"), 0),
            PathBuf::from("/tmp/out/scan0.png")
        );
        assert_eq!(page_path(Path::new("page.jpg"), 12), PathBuf::from("page12.jpg"));
        assert_eq!(page_path(Path::new("raw"), 1), PathBuf::from("raw1"));
    }
}
