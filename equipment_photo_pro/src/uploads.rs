//! Equipment Photo Pro - Upload Storage
//!
//! Flat directory of uploaded originals and enhanced results. Every name
//! handed out or accepted here is a plain file name inside the root.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};

/// Image formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Sniff the format from magic bytes
    pub fn detect(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [0x47, 0x49, 0x46, 0x38, ..] => Some(Self::Gif),
            [0x52, 0x49, 0x46, 0x46, _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

/// A file written by [`UploadStore::save_upload`]
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub kind: ImageKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub kept: usize,
}

/// Check that `name` is a single plain file name
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// `images-<millis>-<uuid>.<ext>`
pub fn new_upload_name(kind: ImageKind) -> String {
    format!(
        "images-{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        kind.extension()
    )
}

/// Enhanced output for a stored upload, always JPEG
pub fn enhanced_name(stored: &str) -> String {
    let stem = Path::new(stored)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(stored);
    format!("enhanced-{stem}.jpg")
}

/// Upload directory handler
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Create the store, making the directory if needed
    pub fn new(root: &Path) -> AppResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a client-supplied name to a path inside the root
    pub fn resolve(&self, name: &str) -> AppResult<PathBuf> {
        if !is_safe_name(name) {
            return Err(AppError::InvalidFileName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Validate and persist an uploaded image under a fresh name
    pub fn save_upload(&self, data: &[u8], max_bytes: u64) -> AppResult<StoredUpload> {
        let size = data.len() as u64;
        if size > max_bytes {
            return Err(AppError::FileTooLarge {
                size,
                max: max_bytes,
            });
        }

        let kind = ImageKind::detect(data)
            .ok_or_else(|| AppError::UnsupportedMediaType("unrecognised image data".into()))?;

        let name = new_upload_name(kind);
        let path = self.write_file(&name, data)?;

        tracing::debug!(%name, size, mime = kind.mime(), "upload stored");
        Ok(StoredUpload {
            name,
            path,
            size,
            kind,
        })
    }

    /// Write a file atomically (temp file, then rename)
    pub fn write_file(&self, name: &str, data: &[u8]) -> AppResult<PathBuf> {
        let path = self.resolve(name)?;
        let temp_path = self.root.join(format!(".{name}.tmp"));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        Ok(path)
    }

    pub fn read_file(&self, name: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(AppError::FileNotFound(name.to_string()));
        }
        Ok(fs::read(path)?)
    }

    pub fn delete_file(&self, name: &str) -> AppResult<()> {
        let path = self.resolve(name)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Delete files last modified more than `max_age` ago
    pub fn sweep(&self, max_age: Duration) -> AppResult<SweepReport> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = SweepReport::default();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                Some(modified) => modified,
                None => continue,
            };

            if modified <= cutoff {
                match fs::remove_file(entry.path()) {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), "failed to remove old upload: {}", e)
                    }
                }
            } else {
                report.kept += 1;
            }
        }

        if report.removed > 0 {
            tracing::info!(removed = report.removed, kept = report.kept, "old uploads swept");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn test_detect_kinds() {
        assert_eq!(ImageKind::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::detect(PNG_MAGIC), Some(ImageKind::Png));
        assert_eq!(ImageKind::detect(b"GIF89a.."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::detect(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::detect(b"RIFF\0\0\0\0WAVEfmt "), None);
        assert_eq!(ImageKind::detect(b"%PDF-1.7"), None);
        assert_eq!(ImageKind::detect(&[]), None);
    }

    #[test]
    fn test_names() {
        let name = new_upload_name(ImageKind::Png);
        assert!(name.starts_with("images-"));
        assert!(name.ends_with(".png"));
        assert!(is_safe_name(&name));

        assert_eq!(enhanced_name("images-1-abc.png"), "enhanced-images-1-abc.jpg");
    }

    #[test]
    fn test_unsafe_names_rejected() {
        for name in ["", "../etc/passwd", "a/b.jpg", ".env", "a\\b", "x..y", "name with space.jpg"] {
            assert!(!is_safe_name(name), "{name:?} should be rejected");
        }
        assert!(is_safe_name("enhanced-images-1-abc.jpg"));
    }

    #[test]
    fn test_save_and_read() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(&dir.path().join("uploads")).unwrap();

        let stored = store.save_upload(PNG_MAGIC, 1024).unwrap();
        assert_eq!(stored.kind, ImageKind::Png);
        assert_eq!(stored.size, PNG_MAGIC.len() as u64);
        assert!(store.exists(&stored.name));
        assert_eq!(store.read_file(&stored.name).unwrap(), PNG_MAGIC);

        store.delete_file(&stored.name).unwrap();
        assert!(!store.exists(&stored.name));
        assert!(matches!(store.read_file(&stored.name), Err(AppError::FileNotFound(_))));
    }

    #[test]
    fn test_save_rejects_bad_uploads() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.save_upload(PNG_MAGIC, 4),
            Err(AppError::FileTooLarge { size: 10, max: 4 })
        ));
        assert!(matches!(
            store.save_upload(b"just some text", 1024),
            Err(AppError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            store.resolve("../secret"),
            Err(AppError::InvalidFileName(_))
        ));
    }

    #[test]
    fn test_sweep_keeps_fresh_files() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path()).unwrap();
        store.write_file("fresh.jpg", b"data").unwrap();

        let report = store.sweep(Duration::from_secs(3600)).unwrap();
        assert_eq!(report, SweepReport { removed: 0, kept: 1 });

        let report = store.sweep(Duration::ZERO).unwrap();
        assert_eq!(report.removed, 1);
        assert!(!store.exists("fresh.jpg"));
    }
}
