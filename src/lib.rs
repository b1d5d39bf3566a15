#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Modules
mod common;
mod core;
mod error;
mod registry;

#[cfg(feature = "async")]
pub mod async_resolver;
mod resolver;
pub mod testnet;

pub use crate::common::{
    Block, BoxSelector, BoxedRecord, DnsAuthority, QueryKey, Record, RecordFlags, RecordType,
    Timestamp, ValidationError, ZoneKey,
};
pub use crate::core::background::QueryId;
pub use crate::core::resolution::{LookupOptions, ResolverHandle, ResultCallback};
pub use crate::core::walker::APEX_LABEL;
pub use crate::error::{CancelError, LookupError, ParseError};
pub use crate::registry::{
    BlockValidator, Config, DhtClient, DhtEvent, DnsBridge, DnsBridgeError, Info, Namecache,
    RecordTypes, Registry, SignedBlockValidator, StandardRecordTypes, TickReport,
};
pub use resolver::{PendingLookup, Resolver, ResolverBuilder, ResolverError, DEFAULT_RECURSION_DEPTH};
pub use testnet::Testnet;

#[cfg(feature = "async")]
pub use async_resolver::AsyncResolver;

pub use bytes::Bytes;
pub use ed25519_dalek::SigningKey;

