//! File utilities for indexing operations.

use std::fs;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Text recovered from raw file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// True when the bytes were not valid UTF-8 and were read as Latin-1.
    pub latin1_fallback: bool,
}

/// SHA-256 of a chunk's content, hex encoded.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Lowercase extension without the dot.
pub fn normalized_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Read a file, refusing anything larger than `max_size` bytes.
///
/// The limit is enforced on the bytes actually read as well as on the
/// metadata, so a file growing between the check and the read is still capped.
pub fn read_limited(path: &Path, max_size: u64) -> std::io::Result<Vec<u8>> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(too_large(metadata.len(), max_size));
    }

    let mut buffer = Vec::with_capacity(metadata.len() as usize);
    fs::File::open(path)?
        .take(max_size + 1)
        .read_to_end(&mut buffer)?;

    if buffer.len() as u64 > max_size {
        return Err(too_large(buffer.len() as u64, max_size));
    }
    Ok(buffer)
}

fn too_large(size: u64, max_size: u64) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("file exceeds maximum size: {size} > {max_size}"),
    )
}

/// Decode bytes as UTF-8, falling back to Latin-1.
///
/// Latin-1 maps every byte to a char, so the fallback itself cannot fail;
/// NUL bytes are rejected up front as a binary-content marker.
pub fn decode_text(bytes: Vec<u8>) -> Result<DecodedText, String> {
    if let Some(pos) = bytes.iter().position(|&b| b == 0) {
        return Err(format!("binary content (NUL byte at offset {pos})"));
    }

    match String::from_utf8(bytes) {
        Ok(text) => Ok(DecodedText {
            text,
            latin1_fallback: false,
        }),
        Err(err) => {
            let text = err.into_bytes().into_iter().map(char::from).collect();
            Ok(DecodedText {
                text,
                latin1_fallback: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash("hello world"));
        assert_ne!(hash, content_hash("hello world!"));
    }

    #[test]
    fn test_normalized_extension() {
        assert_eq!(
            normalized_extension(&PathBuf::from("a/README.MD")),
            Some("md".to_string())
        );
        assert_eq!(normalized_extension(&PathBuf::from("Makefile")), None);
    }

    #[test]
    fn test_decode_utf8() {
        let decoded = decode_text("héllo".as_bytes().to_vec()).unwrap();
        assert_eq!(decoded.text, "héllo");
        assert!(!decoded.latin1_fallback);
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "café" in Latin-1
        let decoded = decode_text(vec![0x63, 0x61, 0x66, 0xE9]).unwrap();
        assert_eq!(decoded.text, "café");
        assert!(decoded.latin1_fallback);
    }

    #[test]
    fn test_decode_rejects_nul() {
        assert!(decode_text(vec![b'a', 0, b'b']).is_err());
    }

    #[test]
    fn test_read_limited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "0123456789").unwrap();

        assert_eq!(read_limited(&path, 10).unwrap().len(), 10);
        assert!(read_limited(&path, 9).is_err());
    }
}
