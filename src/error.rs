//! Internal error kinds
//!
//! Readers return these so the cause can be logged. The public sampling
//! functions never surface them: every failure becomes an absent reading.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed data in {}: {detail}", path.display())]
    Parse { path: PathBuf, detail: String },

    #[error("Vendor library {name} unavailable: {detail}")]
    Library { name: &'static str, detail: String },
}

impl TelemetryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TelemetryError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        TelemetryError::Parse {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_path() {
        let err = TelemetryError::parse("/proc/stat", "missing cpu line");
        assert_eq!(
            err.to_string(),
            "Malformed data in /proc/stat: missing cpu line"
        );

        let err = TelemetryError::io(
            "/proc/diskstats",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("Failed to read /proc/diskstats"));
    }
}
