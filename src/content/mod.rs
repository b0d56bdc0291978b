//! Content analysis for container files
//!
//! Currently file digests: every container gets a fast digest (MD5) and a
//! cryptographic digest (SHA-256) computed in a single streaming pass, so
//! scans of the same corpus are comparable across runs and machines.

pub mod digest;

pub use digest::{digest_file, FileDigests};
