use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::CaptureError;

/// Result handed to the delegate when a capture session completes
/// successfully. The file still lives in the scratch directory; the caller
/// owns moving it to permanent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingResult {
    /// Caller-supplied identifier the session was started with.
    pub session_id: String,
    pub file_path: PathBuf,
    /// Whole seconds of audio, truncated.
    pub duration_secs: u32,
    /// SHA-256 hex digest of the finished file.
    pub checksum: String,
    /// RFC 3339 timestamp of when the result was produced.
    pub created_at: String,
}

impl RecordingResult {
    pub(crate) fn new(
        session_id: &str,
        file_path: PathBuf,
        duration_secs: u32,
    ) -> Result<Self, CaptureError> {
        let checksum = sha256_file(&file_path)?;
        Ok(Self {
            session_id: session_id.to_string(),
            file_path,
            duration_secs,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::IoFailure(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.wav");
        fs::write(&path, b"abc").unwrap();

        let result = RecordingResult::new("sess1", path.clone(), 0).unwrap();
        assert_eq!(
            result.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(result.file_path, path);
        assert_eq!(result.session_id, "sess1");
    }

    #[test]
    fn missing_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecordingResult::new("sess1", dir.path().join("absent.wav"), 0).unwrap_err();
        assert!(matches!(err, CaptureError::IoFailure(_)));
    }
}
