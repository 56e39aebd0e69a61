//! Content fingerprinting for files using XXH3-64.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

/// Streaming chunk size. Matches the read granularity used throughout the
/// pipeline (download buffering uses the transport's own chunking).
const CHUNK_SIZE: usize = 8 * 1024;

/// Width of the hex-encoded digest: a 64-bit value as 16 lowercase digits.
pub const DIGEST_WIDTH: usize = 16;

/// Compute the content fingerprint for a file.
///
/// The digest identifies byte content only; it is change-sensitive, not
/// collision-proof, and must never be used for integrity guarantees.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:016x}", hasher.digest()))
}

/// Hash an in-memory buffer with the same algorithm and encoding as
/// [`hash_file`].
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Xxh3::new();
    hasher.update(content);
    format!("{:016x}", hasher.digest())
}
