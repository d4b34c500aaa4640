use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

use crate::errors::DecodingError;

pub mod consts;
pub mod request;
pub mod response;
pub mod utils;

/// Outcome of one decoding attempt against the input buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A full message was decoded and the cursor advanced past it.
    Success,
    /// Not enough bytes buffered; the cursor was not moved.
    NeedMore,
    /// The message was malformed and skipped; the connection stays usable.
    Err,
}

/// Greeting message from server.
///
/// [Docs](https://www.tarantool.io/en/doc/latest/dev_guide/internals/box_protocol/#greeting-message).
#[derive(Clone, Debug)]
pub struct Greeting {
    /// First greeting line: server version and instance uuid.
    pub server: String,
    /// Salt for the auth challenge, decoded from base64.
    pub salt: Vec<u8>,
}

impl Greeting {
    /// Size of the full message from server in bytes.
    pub const SIZE: usize = 128;

    /// Longest salt the server sends (pre-decode).
    const MAX_SALT_SIZE: usize = 44;

    /// Decode greeting from a full 128-byte block.
    pub fn decode(buffer: [u8; Self::SIZE]) -> Result<Self, DecodingError> {
        let line1 = &buffer[0..63];
        let line2 = &buffer[64..127];
        if buffer[63] != b'\n' || buffer[127] != b'\n' || !line1.starts_with(b"Tarantool") {
            return Err(DecodingError::BadGreeting);
        }

        let salt_b64 = &line2[..Self::MAX_SALT_SIZE.min(line2.len())];
        let salt_b64: &[u8] = match salt_b64.iter().rposition(|b| *b != b' ' && *b != b'=') {
            Some(idx) => &salt_b64[..=idx],
            None => b"",
        };
        let salt = STANDARD_NO_PAD
            .decode(salt_b64)
            .map_err(|_| DecodingError::BadGreeting)?;

        Ok(Self {
            server: String::from_utf8_lossy(line1).trim_end().to_owned(),
            salt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn greeting_block(salt: &[u8]) -> [u8; Greeting::SIZE] {
        let mut block = [b' '; Greeting::SIZE];
        let line1 = b"Tarantool 2.10.0 (Binary) 7169df9c-d8c8-4349-b9e1-e37bd2186e1a";
        block[..line1.len()].copy_from_slice(line1);
        block[63] = b'\n';
        let salt_b64 = STANDARD.encode(salt);
        block[64..64 + salt_b64.len()].copy_from_slice(salt_b64.as_bytes());
        block[127] = b'\n';
        block
    }

    #[test]
    fn greeting_parses_version_and_salt() {
        let salt: Vec<u8> = (0..32).collect();
        let greeting = Greeting::decode(greeting_block(&salt)).unwrap();
        assert!(greeting.server.starts_with("Tarantool 2.10.0"));
        assert_eq!(greeting.salt, salt);
    }

    #[test]
    fn greeting_rejects_garbage() {
        let block = [0u8; Greeting::SIZE];
        assert!(Greeting::decode(block).is_err());
    }
}
