//! Subscriber token bootstrap.
//!
//! The service authenticates subscribers against a single shared secret
//! stored in a plaintext file. The file is created exactly once: restarts
//! reuse whatever is already there, verbatim.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Token entropy in bytes (256 bits, hex-encoded to 64 chars).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read token file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to persist token file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Return the subscriber token, generating and persisting one on first run.
///
/// Existing file content is returned as-is, with no trimming or format
/// validation. Any read failure other than the file being absent is fatal:
/// the service must not start without a usable credential.
pub fn ensure_credential(path: &Path) -> Result<String, CredentialError> {
    match fs::read_to_string(path) {
        Ok(token) => Ok(token),
        Err(e) if e.kind() == ErrorKind::NotFound => generate_and_persist(path),
        Err(e) => Err(CredentialError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Generate a fresh token and write it durably before handing it out.
///
/// The flush matters: a crash between deciding to create the token and the
/// bytes reaching disk would leave the next restart with a different secret.
fn generate_and_persist(path: &Path) -> Result<String, CredentialError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let persist_err = |source: io::Error| CredentialError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
    }

    let mut file = File::create(path).map_err(persist_err)?;
    file.write_all(token.as_bytes()).map_err(persist_err)?;
    file.sync_all().map_err(persist_err)?;

    // Only copy an operator can retrieve without reading the file directly.
    info!("generated subscriber token: {token}");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_token_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        let token = ensure_credential(&path).unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex::decode(&token).unwrap().len(), TOKEN_BYTES);
        assert_eq!(fs::read_to_string(&path).unwrap(), token);
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        let first = ensure_credential(&path).unwrap();
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();
        let second = ensure_credential(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn existing_content_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "not-hex at all \n").unwrap();

        let token = ensure_credential(&path).unwrap();
        assert_eq!(token, "not-hex at all \n");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/token");

        let token = ensure_credential(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), token);
    }

    #[test]
    fn unreadable_path_is_fatal_not_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        // a directory at the token path reads with an error other than NotFound
        let path = dir.path().join("token");
        fs::create_dir(&path).unwrap();

        let err = ensure_credential(&path).unwrap_err();
        assert!(matches!(err, CredentialError::Read { .. }));
        assert!(path.is_dir());
    }
}
