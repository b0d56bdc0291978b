//! File digest computation
//!
//! Computes size, MD5 and SHA-256 of a file in one buffered pass. MD5 is the
//! fast corpus-dedup digest; SHA-256 is the evidentiary one. Both are stored
//! on the file report, so both are computed here rather than on demand.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size for digest computation
const BUF_SIZE: usize = 64 * 1024;

/// Size and digests of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    /// File size in bytes
    pub size: u64,

    /// Hex-encoded MD5 digest
    pub md5: String,

    /// Hex-encoded SHA-256 digest
    pub sha256: String,
}

/// Compute size, MD5 and SHA-256 for the given file in one pass
pub fn digest_file(path: &Path) -> io::Result<FileDigests> {
    let mut file = File::open(path)?;
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha256.update(&buf[..n]);
        size += n as u64;
    }

    Ok(FileDigests {
        size,
        md5: hex::encode(md5.finalize()),
        sha256: hex::encode(sha256.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_known_digests() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, "abc").unwrap();

        let digests = digest_file(&path).unwrap();
        assert_eq!(digests.size, 3);
        assert_eq!(digests.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            digests.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, "").unwrap();

        let digests = digest_file(&path).unwrap();
        assert_eq!(digests.size, 0);
        assert_eq!(digests.md5, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_same_content_same_digests() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "identical bytes").unwrap();
        fs::write(&b, "identical bytes").unwrap();

        assert_eq!(digest_file(&a).unwrap(), digest_file(&b).unwrap());
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(digest_file(Path::new("/no/such/file")).is_err());
    }
}
