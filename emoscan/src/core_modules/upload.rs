use crate::error::ValidationError;
use serde::Deserialize;

/// Largest roster file the backend accepts.
pub const MAX_ROSTER_BYTES: u64 = 50 * 1024 * 1024;

const ACCEPTED_EXTENSIONS: [&str; 3] = [".xlsx", ".xls", ".docx"];

/// A roster spreadsheet (or document) selected for upload.
#[derive(Debug, Clone)]
pub struct RosterFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RosterFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_roster(&self.name, self.size())
    }

    /// MIME type sent with the multipart part.
    pub fn content_type(&self) -> &'static str {
        let name = self.name.to_ascii_lowercase();
        if name.ends_with(".xlsx") {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        } else if name.ends_with(".xls") {
            "application/vnd.ms-excel"
        } else if name.ends_with(".docx") {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        } else {
            "application/octet-stream"
        }
    }
}

/// Checks a file before any network traffic: known extension, non-empty, and
/// under the size limit.
pub fn validate_roster(name: &str, size: u64) -> Result<(), ValidationError> {
    let lowered = name.to_ascii_lowercase();
    if !ACCEPTED_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        return Err(ValidationError::UnsupportedType { name: name.to_string() });
    }
    if size == 0 {
        return Err(ValidationError::Empty);
    }
    if size > MAX_ROSTER_BYTES {
        return Err(ValidationError::TooLarge {
            size,
            limit: MAX_ROSTER_BYTES,
        });
    }
    Ok(())
}

/// Import summary returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UploadReport {
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default, alias = "total_processed")]
    pub total_count: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}
