use crate::error::{Error, Result};

/// Extensions accepted for upload, lowercase, with the leading dot.
pub const DEFAULT_ALLOWED_EXTS: &[&str] = &[".pdf", ".md", ".txt"];

/// Default upload ceiling in mebibytes.
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 100;

/// Upload acceptance policy: which extensions are allowed and how large
/// a payload may be. Checked before any byte is written.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_exts: Vec<String>,
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_exts: DEFAULT_ALLOWED_EXTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl UploadPolicy {
    /// Build the policy from the environment, falling back to defaults.
    /// `DOCSTASH_MAX_UPLOAD_MB` overrides the size ceiling.
    pub fn from_env() -> Result<Self> {
        let mut policy = Self::default();
        if let Ok(val) = std::env::var("DOCSTASH_MAX_UPLOAD_MB") {
            let mb: u64 = val.parse().map_err(|_| {
                Error::Config(format!(
                    "DOCSTASH_MAX_UPLOAD_MB is not a number: {val}"
                ))
            })?;
            policy.max_bytes = mb * 1024 * 1024;
        }
        Ok(policy)
    }

    pub fn allows_ext(&self, ext: &str) -> bool {
        self.allowed_exts.iter().any(|e| e == ext)
    }
}

/// Split a filename into (title, lowercase extension with dot).
/// A name without a dot yields an empty extension.
pub fn split_filename(filename: &str) -> (String, String) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => {
            let (stem, ext) = filename.split_at(pos);
            (stem.to_string(), ext.to_lowercase())
        }
        _ => (filename.to_string(), String::new()),
    }
}
