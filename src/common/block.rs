//! Signed record blocks, the unit stored in the namecache and the DHT.

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

use crate::common::{QueryKey, Record, Timestamp, ZoneKey};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// All records of one label under one zone, signed by the zone key.
pub struct Block {
    /// `sha1(zone ‖ label)`
    #[serde(rename = "k")]
    query_key: QueryKey,
    /// ed25519 public key of the zone
    #[serde(rename = "z")]
    zone: ZoneKey,
    /// the block must not be used after this time
    #[serde(rename = "e")]
    expiration: Timestamp,
    /// bencoded list of [Record]s
    #[serde(rename = "v")]
    payload: Bytes,
    /// ed25519 signature over [encode_signable]
    #[serde(rename = "s", with = "serde_bytes")]
    signature: [u8; 64],
}

impl Block {
    /// Create a new block from a zone's signing key, the label and its records.
    pub fn sign(
        signer: &SigningKey,
        label: &str,
        records: &[Record],
        expiration: Timestamp,
    ) -> Result<Self, serde_bencode::Error> {
        let zone = ZoneKey::from(signer);
        let query_key = zone.query_key(label);
        let payload: Bytes = serde_bencode::to_bytes(&records)?.into();

        let signature = signer.sign(&encode_signable(&query_key, expiration, &payload));

        Ok(Self::new_signed_unchecked(
            query_key,
            zone,
            expiration,
            payload,
            signature.to_bytes(),
        ))
    }

    /// Create a block from already signed parts, as received from the network.
    pub fn new_signed_unchecked(
        query_key: QueryKey,
        zone: ZoneKey,
        expiration: Timestamp,
        payload: Bytes,
        signature: [u8; 64],
    ) -> Self {
        Self {
            query_key,
            zone,
            expiration,
            payload,
            signature,
        }
    }

    /// Check that this block is the unexpired, correctly signed block of `label` under
    /// `zone`, and decode its records.
    pub fn verify(
        &self,
        zone: &ZoneKey,
        label: &str,
        now: Timestamp,
    ) -> Result<Vec<Record>, ValidationError> {
        if self.zone != *zone {
            return Err(ValidationError::ZoneMismatch);
        }

        if self.query_key != zone.query_key(label) {
            return Err(ValidationError::QueryKeyMismatch);
        }

        if self.expiration <= now {
            return Err(ValidationError::Expired);
        }

        let key = zone
            .verifying_key()
            .map_err(|_| ValidationError::InvalidZoneKey)?;

        key.verify(
            &encode_signable(&self.query_key, self.expiration, &self.payload),
            &Signature::from_bytes(&self.signature),
        )
        .map_err(|_| ValidationError::InvalidSignature)?;

        Ok(serde_bencode::from_bytes(&self.payload)?)
    }

    /// Bencode this block for storage, signature included.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }

    /// Decode a stored block. The result is untrusted until [Block::verify] accepts it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_bencode::Error> {
        serde_bencode::from_bytes(bytes)
    }

    // === Getters ===

    pub fn query_key(&self) -> &QueryKey {
        &self.query_key
    }

    pub fn zone(&self) -> &ZoneKey {
        &self.zone
    }

    pub fn expiration(&self) -> Timestamp {
        self.expiration
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }
}

pub fn encode_signable(query_key: &QueryKey, expiration: Timestamp, payload: &[u8]) -> Box<[u8]> {
    let mut signable = Vec::with_capacity(query_key.as_bytes().len() + 8 + payload.len());

    signable.extend(query_key.as_bytes());
    signable.extend(expiration.to_be_bytes());
    signable.extend(payload);

    signable.into()
}

#[derive(thiserror::Error, Debug)]
/// Reasons a block is discarded.
pub enum ValidationError {
    #[error("Block was signed by a different zone")]
    ZoneMismatch,

    #[error("Block query key does not match the zone and label")]
    QueryKeyMismatch,

    #[error("Block is expired")]
    Expired,

    #[error("Invalid zone public key")]
    InvalidZoneKey,

    #[error("Invalid block signature")]
    InvalidSignature,

    #[error("Failed to decode block payload: {0}")]
    Payload(#[from] serde_bencode::Error),
}
