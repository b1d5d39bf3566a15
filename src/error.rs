//! Main Crate Errors

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors parsing keys, names and record payloads.
pub enum ParseError {
    #[error("Invalid ed25519 zone key")]
    InvalidZoneKey,

    #[error("Zone key is not a z-base32 encoded 32 bytes key")]
    InvalidZoneKeyEncoding,

    #[error("Invalid query key size, expected 20, got {0}")]
    InvalidQueryKeySize(usize),

    #[error("Query key is not a 40 characters hex string")]
    InvalidQueryKeyEncoding,

    #[error("GNS2DNS payload is not `name NUL server NUL`")]
    InvalidGns2Dns,

    #[error("BOX payload too short: {0} bytes")]
    InvalidBox(usize),

    #[error("Box selector is not `_service._protocol`")]
    InvalidBoxSelector,

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Synchronous rejection of a lookup.
pub enum LookupError {
    #[error("Name is empty")]
    EmptyName,

    #[error("Name contains an empty label: {0:?}")]
    EmptyLabel(String),

    #[error("Label is longer than 63 bytes: {0:?}")]
    LabelTooLong(String),

    #[error("Name is longer than 253 bytes")]
    NameTooLong,

    #[error("Registry was shut down")]
    Shutdown,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CancelError {
    /// The lookup already delivered its result, was cancelled before, or never existed.
    #[error("Unknown or finished lookup handle")]
    UnknownHandle,
}
