use crate::utils::validation::Policy;
use std::env;

/// Limits and allow-lists for the upload intake pipeline
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes (default: 25 MB)
    pub max_file_size_bytes: u64,

    /// Maximum total staged bytes per session and case before commit
    /// (default: 100 MB)
    pub session_quota_bytes: u64,

    /// File extensions accepted by the intake pipeline
    pub allowed_extensions: Vec<String>,

    /// Declared MIME types accepted by the intake pipeline
    pub allowed_mime_types: Vec<String>,
}

/// Document, image and land-record formats a case file may arrive in.
/// Browsers upload the GIS sidecar formats as octet-stream, which is why
/// that MIME type is part of the default allow-list.
const DEFAULT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "xls", "rtf", "txt", "jpg", "jpeg", "png", "gif", "tif", "tiff", "html", "prj",
    "gis", "dbf", "shp", "shx",
];

const DEFAULT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.ms-excel",
    "application/rtf",
    "application/octet-stream",
    "text/plain",
    "text/html",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/tiff",
];

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 25 * 1024 * 1024,
            session_quota_bytes: 100 * 1024 * 1024,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            allowed_mime_types: DEFAULT_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size_bytes: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size_bytes),

            session_quota_bytes: env::var("SESSION_QUOTA_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.session_quota_bytes),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .map(|v| parse_list(&v))
                .unwrap_or(default.allowed_extensions),

            allowed_mime_types: env::var("ALLOWED_MIME_TYPES")
                .map(|v| parse_list(&v))
                .unwrap_or(default.allowed_mime_types),
        }
    }

    /// Create config for development (small limits so quota paths are easy
    /// to exercise by hand)
    pub fn development() -> Self {
        Self {
            max_file_size_bytes: 5 * 1024 * 1024,
            session_quota_bytes: 10 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// The immutable policy value handed to every validator call
    pub fn policy(&self) -> Policy {
        Policy::new(
            &self.allowed_extensions,
            &self.allowed_mime_types,
            self.max_file_size_bytes,
        )
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
