//! Device identity discovery.
//!
//! `device-id` is the host name; `device-secret` is the raw bytes of
//! `/etc/machine-id` with the trailing newline stripped. Resolved once at
//! startup and threaded through as a typed value rather than re-read at
//! every signing call.

use crate::errors::{AppError, AppResult};
use std::path::Path;

const MACHINE_ID_PATH: &str = "/etc/machine-id";

#[derive(Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_secret: Vec<u8>,
}

impl DeviceIdentity {
    pub fn discover() -> AppResult<Self> {
        let device_id = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::config("unable to determine device hostname"))?;

        let device_secret = Self::read_machine_id(Path::new(MACHINE_ID_PATH))?;

        Ok(Self {
            device_id,
            device_secret,
        })
    }

    fn read_machine_id(path: &Path) -> AppResult<Vec<u8>> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("failed to read {}: {e}", path.display())))?;
        let trimmed = raw.trim_end_matches('\n').trim_end_matches('\r');
        if trimmed.is_empty() {
            return Err(AppError::config("device secret (/etc/machine-id) is empty"));
        }
        Ok(trimmed.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-id");
        std::fs::write(&path, "abc123\n").unwrap();
        let secret = DeviceIdentity::read_machine_id(&path).unwrap();
        assert_eq!(secret, b"abc123");
    }

    #[test]
    fn empty_secret_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-id");
        std::fs::write(&path, "\n").unwrap();
        let err = DeviceIdentity::read_machine_id(&path).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }
}
