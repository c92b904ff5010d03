use crate::config::RecordingConfig;
use crate::error::RecordingError;
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Timezone used to render recording file names
#[derive(Debug, Clone, Copy)]
pub enum NameTimezone {
    Local,
    Named(Tz),
}

impl NameTimezone {
    /// Resolve a configured timezone, falling back to UTC on parse errors
    pub fn resolve(name: &str) -> Self {
        if name.eq_ignore_ascii_case("local") {
            return NameTimezone::Local;
        }
        match name.parse::<Tz>() {
            Ok(tz) => NameTimezone::Named(tz),
            Err(_) => {
                warn!(
                    "Invalid recording timezone '{}', falling back to UTC",
                    name
                );
                NameTimezone::Named(chrono_tz::UTC)
            }
        }
    }
}

/// Builds output paths for new recording sessions
#[derive(Debug, Clone)]
pub struct FileNamer {
    directory: PathBuf,
    template: String,
    extension: &'static str,
    timezone: NameTimezone,
}

impl FileNamer {
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            directory: PathBuf::from(&config.path),
            template: config.file_name_template.clone(),
            extension: config.codec.extension(),
            timezone: NameTimezone::resolve(&config.timezone),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path for a session opened at `at`.
    ///
    /// An existing file is never overwritten: a numeric suffix is added until
    /// the name is free.
    pub fn path_for(&self, at: SystemTime) -> Result<PathBuf, RecordingError> {
        let stem = self.render(at)?;

        let first = self.directory.join(format!("{}.{}", stem, self.extension));
        if !first.exists() {
            return Ok(first);
        }

        let mut suffix = 1u32;
        loop {
            let candidate = self
                .directory
                .join(format!("{}-{}.{}", stem, suffix, self.extension));
            if !candidate.exists() {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    fn render(&self, at: SystemTime) -> Result<String, RecordingError> {
        let utc = DateTime::<Utc>::from(at);
        let mut name = String::new();
        let written = match self.timezone {
            NameTimezone::Local => {
                write!(name, "{}", utc.with_timezone(&Local).format(&self.template))
            }
            NameTimezone::Named(tz) => {
                write!(name, "{}", utc.with_timezone(&tz).format(&self.template))
            }
        };

        written.map_err(|_| RecordingError::WriterOpenFailed {
            path: self.directory.clone(),
            details: format!("Invalid file name template '{}'", self.template),
        })?;

        // Keep the rendered name inside the recording directory
        let name = name.replace(['/', '\\'], "-");
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(RecordingError::WriterOpenFailed {
                path: self.directory.clone(),
                details: "File name template rendered an empty name".to_string(),
            });
        }
        Ok(name)
    }
}
