//! Zone identity.
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::common::QueryKey;
use crate::error::ParseError;

/// Length of a zone key in bytes.
pub const ZONE_KEY_SIZE: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// A zone is identified solely by its ed25519 public key.
///
/// The textual form is the z-base32 encoding of the key, which is also the form a
/// zone key takes when used as the top level label of a name.
pub struct ZoneKey(#[serde(with = "serde_bytes")] [u8; ZONE_KEY_SIZE]);

impl ZoneKey {
    /// Create a zone key from raw bytes, rejecting anything that is not a valid
    /// ed25519 public key.
    pub fn from_bytes(bytes: &[u8]) -> Result<ZoneKey, ParseError> {
        let key = VerifyingKey::try_from(bytes).map_err(|_| ParseError::InvalidZoneKey)?;

        Ok(ZoneKey(key.to_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; ZONE_KEY_SIZE] {
        &self.0
    }

    /// The ed25519 key used to verify blocks published under this zone.
    pub fn verifying_key(&self) -> Result<VerifyingKey, ParseError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| ParseError::InvalidZoneKey)
    }

    /// Storage key of `label` under this zone.
    pub fn query_key(&self, label: &str) -> QueryKey {
        QueryKey::derive(self, label)
    }
}

impl From<&SigningKey> for ZoneKey {
    fn from(signer: &SigningKey) -> Self {
        ZoneKey(signer.verifying_key().to_bytes())
    }
}

impl From<VerifyingKey> for ZoneKey {
    fn from(key: VerifyingKey) -> Self {
        ZoneKey(key.to_bytes())
    }
}

impl Display for ZoneKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", z32::encode(&self.0))
    }
}

impl Debug for ZoneKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ZoneKey({})", self)
    }
}

impl FromStr for ZoneKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<ZoneKey, ParseError> {
        let bytes = z32::decode(s.as_bytes()).map_err(|_| ParseError::InvalidZoneKeyEncoding)?;

        if bytes.len() != ZONE_KEY_SIZE {
            return Err(ParseError::InvalidZoneKeyEncoding);
        }

        ZoneKey::from_bytes(&bytes)
    }
}
