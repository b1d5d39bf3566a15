//! Derived key used to address a (zone, label) pair in the namecache and the DHT.
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1_smol::Sha1;

use crate::common::ZoneKey;
use crate::error::ParseError;

/// The size of query keys in bytes.
pub const QUERY_KEY_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
/// Storage key of the block holding the records of one label under one zone.
///
/// Computed as `sha1(zone ‖ label)`, the same way a BEP_0044 mutable target is
/// computed from a public key and a salt, so observers of the DHT learn neither
/// the zone nor the label from the key alone.
pub struct QueryKey(#[serde(with = "serde_bytes")] [u8; QUERY_KEY_SIZE]);

impl QueryKey {
    /// Derive the query key of `label` under `zone`.
    pub fn derive(zone: &ZoneKey, label: &str) -> QueryKey {
        let mut hasher = Sha1::new();
        hasher.update(zone.as_bytes());
        hasher.update(label.as_bytes());

        QueryKey(hasher.digest().bytes())
    }

    /// Create a query key from raw bytes. Returns Err if `bytes` is not of length
    /// [QUERY_KEY_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<QueryKey, ParseError> {
        let bytes = bytes.as_ref();
        let array: [u8; QUERY_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| ParseError::InvalidQueryKeySize(bytes.len()))?;

        Ok(QueryKey(array))
    }

    pub fn as_bytes(&self) -> &[u8; QUERY_KEY_SIZE] {
        &self.0
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({})", self)
    }
}

impl FromStr for QueryKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<QueryKey, ParseError> {
        if s.len() != QUERY_KEY_SIZE * 2 || !s.is_ascii() {
            return Err(ParseError::InvalidQueryKeyEncoding);
        }

        let mut bytes = [0_u8; QUERY_KEY_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseError::InvalidQueryKeyEncoding)?;
        }

        Ok(QueryKey(bytes))
    }
}

#[cfg(test)]
mod test {
    use ed25519_dalek::SigningKey;

    use super::*;

    #[test]
    fn derive_depends_on_zone_and_label() {
        let a: ZoneKey = (&SigningKey::from_bytes(&[1; 32])).into();
        let b: ZoneKey = (&SigningKey::from_bytes(&[2; 32])).into();

        assert_eq!(QueryKey::derive(&a, "www"), QueryKey::derive(&a, "www"));
        assert_ne!(QueryKey::derive(&a, "www"), QueryKey::derive(&a, "mail"));
        assert_ne!(QueryKey::derive(&a, "www"), QueryKey::derive(&b, "www"));
    }

    #[test]
    fn hex_string() {
        let key = QueryKey::from_str("4238af8aff56cf6e0007d9d2003bf23d33eea7c3").unwrap();

        assert_eq!(key.to_string(), "4238af8aff56cf6e0007d9d2003bf23d33eea7c3");
        assert!(QueryKey::from_str("4238af8aff56cf6e").is_err());
        assert!(QueryKey::from_str("zz38af8aff56cf6e0007d9d2003bf23d33eea7c3").is_err());
    }

    #[test]
    fn from_bytes_checks_length() {
        assert!(QueryKey::from_bytes([0; 19]).is_err());
        assert!(QueryKey::from_bytes([0; 20]).is_ok());
    }
}
