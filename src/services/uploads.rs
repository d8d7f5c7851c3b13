//! Cover image and PDF storage on local disk

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::{
    config::UploadConfig,
    error::{AppError, AppResult},
    models::upload::{FileInfo, FileKind, FileList, UploadedFile},
};

#[derive(Clone)]
pub struct UploadService {
    root: PathBuf,
    base_url: String,
    max_image_size: usize,
    max_pdf_size: usize,
}

impl UploadService {
    pub fn new(config: &UploadConfig, base_url: &str) -> Self {
        Self {
            root: config.directory.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_image_size: config.max_image_size,
            max_pdf_size: config.max_pdf_size,
        }
    }

    /// Upload root, served at `/uploads`
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_size(&self, kind: FileKind) -> usize {
        match kind {
            FileKind::Cover => self.max_image_size,
            FileKind::Pdf => self.max_pdf_size,
        }
    }

    /// Create the upload directories if missing
    pub async fn ensure_dirs(&self) -> AppResult<()> {
        for kind in [FileKind::Cover, FileKind::Pdf] {
            tokio::fs::create_dir_all(self.root.join(kind.dir_name())).await?;
        }
        Ok(())
    }

    pub fn public_url(&self, kind: FileKind, filename: &str) -> String {
        format!("{}/uploads/{}/{}", self.base_url, kind.dir_name(), filename)
    }

    /// Check and write an uploaded file under a fresh name
    pub async fn store(
        &self,
        kind: FileKind,
        original_name: &str,
        mimetype: &str,
        bytes: &[u8],
    ) -> AppResult<UploadedFile> {
        if !kind.accepts(mimetype) {
            return Err(AppError::Validation(match kind {
                FileKind::Cover => "Only image files (JPEG, PNG, GIF, WebP) are allowed".to_string(),
                FileKind::Pdf => "Only PDF files are allowed".to_string(),
            }));
        }
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        let max = self.max_size(kind);
        if bytes.len() > max {
            return Err(AppError::Validation(format!(
                "File too large. Maximum size is {}MB",
                max / (1024 * 1024)
            )));
        }

        self.ensure_dirs().await?;
        let nonce: u64 = rand::thread_rng().gen_range(0..1_000_000_000);
        let filename = stored_name(original_name, Utc::now().timestamp_millis(), nonce);
        tokio::fs::write(self.root.join(kind.dir_name()).join(&filename), bytes).await?;

        tracing::info!(filename = %filename, size = bytes.len(), "{} uploaded", kind.label());

        Ok(UploadedFile {
            original_name: original_name.to_string(),
            url: self.public_url(kind, &filename),
            filename,
            size: bytes.len() as u64,
            mimetype: mimetype.to_string(),
        })
    }

    pub async fn delete(&self, kind: FileKind, filename: &str) -> AppResult<()> {
        let path = self.existing(kind, filename).await?;
        tokio::fs::remove_file(&path).await?;

        tracing::info!(filename = %filename, "{} deleted", kind.label());
        Ok(())
    }

    pub async fn info(&self, kind: FileKind, filename: &str) -> AppResult<FileInfo> {
        let path = self.existing(kind, filename).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(self.file_info(kind, filename.to_string(), &metadata))
    }

    /// Files of one kind, sorted by name
    pub async fn list(&self, kind: FileKind) -> AppResult<FileList> {
        let dir = self.root.join(kind.dir_name());
        let mut files = Vec::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileList { files, count: 0 });
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            files.push(self.file_info(kind, name, &metadata));
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        Ok(FileList {
            count: files.len(),
            files,
        })
    }

    fn file_info(&self, kind: FileKind, filename: String, metadata: &std::fs::Metadata) -> FileInfo {
        FileInfo {
            url: self.public_url(kind, &filename),
            filename,
            size: metadata.len(),
            kind,
            uploaded_at: metadata.created().ok().map(DateTime::<Utc>::from),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }

    /// Path of an existing stored file; names never leave their directory
    async fn existing(&self, kind: FileKind, filename: &str) -> AppResult<PathBuf> {
        check_filename(filename)?;
        let path = self.root.join(kind.dir_name()).join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            Ok(_) => Err(AppError::NotFound("File not found".to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn check_filename(filename: &str) -> AppResult<()> {
    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(AppError::BadRequest("Invalid filename".to_string()));
    }
    Ok(())
}

/// Replace everything outside `[A-Za-z0-9.-]` with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// `<base>-<millis>-<nonce><ext>` from a client supplied name
pub fn stored_name(original_name: &str, millis: i64, nonce: u64) -> String {
    let mut sanitized = sanitize_filename(original_name);
    // stored names never start with a dot
    let dots = sanitized.len() - sanitized.trim_start_matches('.').len();
    sanitized.replace_range(..dots, &"_".repeat(dots));
    let (base, ext) = match sanitized.rfind('.') {
        Some(i) if i > 0 => sanitized.split_at(i),
        _ => (sanitized.as_str(), ""),
    };
    format!("{}-{}-{}{}", base, millis, nonce, ext)
}
