//! Interfaces of the services the registry consumes.
//!
//! Asynchronous collaborators share one shape: the registry starts work tagged with
//! a [QueryId], may cancel it, and polls for completions from [super::Registry::tick].
//! Implementations must never report a completion for a query after it was cancelled.

use std::fmt::Debug;

use crate::common::{Block, DnsAuthority, Record, RecordType, Timestamp, ZoneKey};
use crate::common::{QueryKey, ValidationError};
use crate::core::background::QueryId;

/// Local store of previously resolved blocks.
pub trait Namecache: Debug + Send {
    /// Start looking up the block stored under `key`.
    fn lookup(&mut self, query: QueryId, key: &QueryKey);

    /// Abandon a lookup, its result must not be returned by [Namecache::poll].
    fn cancel(&mut self, query: QueryId);

    /// Next finished lookup, with `None` for a miss.
    fn poll(&mut self) -> Option<(QueryId, Option<Block>)>;

    /// Store a block obtained from the DHT. Fire and forget.
    fn cache_block(&mut self, _block: &Block) {}
}

#[derive(Debug, Clone)]
pub enum DhtEvent {
    /// A block found under the queried key, untrusted until validated.
    Candidate(Block),
    /// No more candidates will come, because the lookup was exhausted or timed out.
    Done,
}

/// Distributed storage of signed blocks.
pub trait DhtClient: Debug + Send {
    /// Start a lookup of `key`; it may yield any number of candidates.
    fn get(&mut self, query: QueryId, key: &QueryKey);

    /// Stop a lookup, no more events must be returned for it.
    fn cancel(&mut self, query: QueryId);

    fn poll(&mut self) -> Option<(QueryId, DhtEvent)>;
}

/// Turns a block into the records of `label` under `zone`, or rejects it.
pub trait BlockValidator: Debug + Send {
    fn decrypt_and_validate(
        &self,
        block: &Block,
        zone: &ZoneKey,
        label: &str,
    ) -> Result<Vec<Record>, ValidationError>;
}

#[derive(Debug, Clone, Default)]
/// Checks query key, expiration and the zone's ed25519 signature.
pub struct SignedBlockValidator;

impl BlockValidator for SignedBlockValidator {
    fn decrypt_and_validate(
        &self,
        block: &Block,
        zone: &ZoneKey,
        label: &str,
    ) -> Result<Vec<Record>, ValidationError> {
        block.verify(zone, label, Timestamp::now())
    }
}

/// Which record types steer the traversal.
pub trait RecordTypes: Debug + Send {
    /// Delegation to another zone, carrying the zone key as data.
    fn is_delegation(&self, record_type: RecordType) -> bool;

    /// Delegation to a legacy DNS authority.
    fn is_dns_bridge(&self, record_type: RecordType) -> bool;

    fn is_box(&self, record_type: RecordType) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct StandardRecordTypes;

impl RecordTypes for StandardRecordTypes {
    fn is_delegation(&self, record_type: RecordType) -> bool {
        record_type == RecordType::PKEY
    }

    fn is_dns_bridge(&self, record_type: RecordType) -> bool {
        record_type == RecordType::GNS2DNS
    }

    fn is_box(&self, record_type: RecordType) -> bool {
        record_type == RecordType::BOX
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsBridgeError {
    #[error("No DNS bridge configured")]
    Unavailable,

    #[error("DNS resolution timed out")]
    Timeout,

    #[error("DNS resolution failed: {0}")]
    Failed(String),
}

/// Resolves the legacy DNS part of a name under a GNS2DNS delegation.
pub trait DnsBridge: Debug + Send {
    fn resolve(
        &mut self,
        query: QueryId,
        authority: &DnsAuthority,
        name: &str,
        record_type: RecordType,
    );

    fn cancel(&mut self, query: QueryId);

    fn poll(&mut self) -> Option<(QueryId, Result<Vec<Record>, DnsBridgeError>)>;
}
