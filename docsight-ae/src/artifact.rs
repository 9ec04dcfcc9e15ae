//! Artifact store access
//!
//! The engine only reads artifact content by reference; upload and
//! validation live elsewhere. References are paths relative to the resolved
//! root folder.

use docsight_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Raw artifact content loaded by reference
#[derive(Debug, Clone)]
pub struct RawArtifact {
    pub artifact_ref: String,
    /// UTF-8 document text
    pub text: String,
    /// SHA-256 of the raw bytes, hex encoded
    pub content_hash: String,
}

/// Read-only view over artifacts stored under the root folder
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Validate an artifact reference without reading it.
    ///
    /// Rejects empty references, absolute paths, and parent traversal.
    pub fn validate_ref(&self, artifact_ref: &str) -> Result<()> {
        if artifact_ref.trim().is_empty() {
            return Err(Error::InvalidInput("Artifact reference is empty".to_string()));
        }

        let path = Path::new(artifact_ref);
        if path.is_absolute() {
            return Err(Error::InvalidInput(format!(
                "Artifact reference must be relative to the root folder: {}",
                artifact_ref
            )));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(Error::InvalidInput(format!(
                "Artifact reference must not traverse outside the root folder: {}",
                artifact_ref
            )));
        }

        Ok(())
    }

    /// Load artifact bytes, returning UTF-8 text plus a content hash
    pub fn load(&self, artifact_ref: &str) -> Result<RawArtifact> {
        self.validate_ref(artifact_ref)?;

        let path = self.root.join(artifact_ref);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("Artifact not found: {}", artifact_ref))
            } else {
                Error::Io(e)
            }
        })?;

        if bytes.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Artifact is empty: {}",
                artifact_ref
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let content_hash = format!("{:x}", hasher.finalize());

        let text = String::from_utf8(bytes).map_err(|_| {
            Error::InvalidInput(format!("Artifact is not valid UTF-8 text: {}", artifact_ref))
        })?;

        Ok(RawArtifact {
            artifact_ref: artifact_ref.to_string(),
            text,
            content_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn store_with_file(name: &str, content: &[u8]) -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
        f.write_all(content).unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn load_returns_text_and_stable_hash() {
        let (_dir, store) = store_with_file("doc.txt", b"hello world");
        let a = store.load("doc.txt").unwrap();
        let b = store.load("doc.txt").unwrap();
        assert_eq!(a.text, "hello world");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let (_dir, store) = store_with_file("doc.txt", b"x");
        assert!(matches!(
            store.load("other.txt"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn traversal_and_absolute_refs_are_rejected() {
        let (_dir, store) = store_with_file("doc.txt", b"x");
        assert!(store.validate_ref("../etc/passwd").is_err());
        assert!(store.validate_ref("/etc/passwd").is_err());
        assert!(store.validate_ref("").is_err());
        assert!(store.validate_ref("reports/q3.txt").is_ok());
    }

    #[test]
    fn empty_and_binary_artifacts_are_invalid() {
        let (_dir, store) = store_with_file("empty.txt", b"");
        assert!(matches!(
            store.load("empty.txt"),
            Err(Error::InvalidInput(_))
        ));

        let (_dir2, store2) = store_with_file("bin.dat", &[0xff, 0xfe, 0x00, 0x80]);
        assert!(matches!(
            store2.load("bin.dat"),
            Err(Error::InvalidInput(_))
        ));
    }
}
