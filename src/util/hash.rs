//! Content hashing used by node signatures and the cache directory.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA256 of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex-encoded SHA256 of a file's contents, read in chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 16 * 1024];

    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Collects a sequence of signature parts into a single digest.
///
/// Parts are separated by a NUL byte, so `["ab", "c"]` and `["a", "bc"]`
/// never collide.
#[derive(Default)]
pub struct SignatureHasher {
    hasher: Sha256,
}

impl SignatureHasher {
    pub fn new() -> Self {
        SignatureHasher::default()
    }

    /// Append one part.
    pub fn push(&mut self, part: &str) -> &mut Self {
        self.hasher.update(part.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Append every part of an iterator, in order.
    pub fn extend<'a>(&mut self, parts: impl IntoIterator<Item = &'a str>) -> &mut Self {
        for part in parts {
            self.push(part);
        }
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Hash a list of signature parts in one go.
pub fn hash_collect<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = SignatureHasher::new();
    hasher.extend(parts);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(sha256_bytes(b"hello"), HELLO);
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("firmware.bin");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), HELLO);
    }

    #[test]
    fn test_sha256_file_missing() {
        let tmp = TempDir::new().unwrap();
        let err = sha256_file(&tmp.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("failed to open file for hashing"));
    }

    #[test]
    fn test_hash_collect_separates_parts() {
        assert_ne!(hash_collect(["ab", "c"]), hash_collect(["a", "bc"]));
        assert_eq!(hash_collect(["a", "b"]), hash_collect(["a", "b"]));
    }

    #[test]
    fn test_signature_hasher_matches_collect() {
        let mut hasher = SignatureHasher::new();
        hasher.push("one").extend(["two", "three"]);
        assert_eq!(hasher.finish(), hash_collect(["one", "two", "three"]));
    }
}
