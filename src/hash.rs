use sha2::{Digest, Sha256};

use crate::error::{Result, StreamError};

/// Lower-case hex SHA-256 of `data`, matching the format `sha256sum`
/// produces on the remote side.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Parse a `sha256sum`-style hex digest (`<64 hex chars>`, optionally
/// followed by `  -` or a filename that the caller has already stripped).
pub fn parse_remote_hash(line: &str) -> Result<[u8; 32]> {
    let hex_part = line.split_whitespace().next().unwrap_or(line);
    let bytes = hex::decode(hex_part).map_err(|_| StreamError::InvalidRemoteHash(line.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| StreamError::InvalidRemoteHash(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // sha256sum of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn parses_sha256sum_output_with_filename() {
        let line = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85  -";
        let h = parse_remote_hash(line).unwrap();
        assert_eq!(hex::encode(h), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
    }

    #[test]
    fn rejects_malformed_hash() {
        assert!(parse_remote_hash("not-a-hash").is_err());
    }
}
