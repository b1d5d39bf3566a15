//! In-memory collaborators, to run resolutions without a network.
//!
//! A [Testnet] is a shared world of published blocks, cached blocks and legacy DNS
//! records. Each collaborator created from it ([Testnet::namecache], [Testnet::dht],
//! [Testnet::dns_bridge]) answers on its next poll, unless the key it is asked for
//! is held with [Testnet::hold].
//!
//! The namecache keeps blocks in their bencoded storage form, like a persistent
//! store would, and treats entries that fail to decode as misses.

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ed25519_dalek::SigningKey;
use lru::LruCache;
use tracing::{debug, trace};

use crate::common::{Block, DnsAuthority, QueryKey, Record, RecordType, Timestamp};
use crate::core::background::QueryId;
use crate::registry::{DhtClient, DhtEvent, DnsBridge, DnsBridgeError, Namecache};

/// Blocks kept by a [Testnet] namecache before the least recently used is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
/// Shared in-memory world backing the in-memory collaborators.
pub struct Testnet {
    state: Arc<Mutex<World>>,
}

#[derive(Debug)]
struct World {
    published: HashMap<QueryKey, Vec<Block>>,
    cached: LruCache<QueryKey, Vec<u8>>,
    dns: HashMap<(String, RecordType), Vec<Record>>,
    held: HashSet<QueryKey>,
    stats: Stats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counters of the calls collaborators received.
pub struct Stats {
    pub cache_lookups: usize,
    pub cached_blocks: usize,
    pub dht_gets: usize,
    pub dht_cancels: usize,
    pub dns_resolutions: usize,
}

impl Default for Testnet {
    fn default() -> Self {
        Self::new()
    }
}

impl Testnet {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Testnet {
            state: Arc::new(Mutex::new(World {
                published: HashMap::new(),
                cached: LruCache::new(capacity),
                dns: HashMap::new(),
                held: HashSet::new(),
                stats: Stats::default(),
            })),
        }
    }

    // === Collaborators ===

    pub fn namecache(&self) -> MemoryNamecache {
        MemoryNamecache {
            testnet: self.clone(),
            ready: VecDeque::new(),
        }
    }

    pub fn dht(&self) -> MemoryDht {
        MemoryDht {
            testnet: self.clone(),
            pending: Vec::new(),
        }
    }

    pub fn dns_bridge(&self) -> MemoryDnsBridge {
        MemoryDnsBridge {
            testnet: self.clone(),
            ready: VecDeque::new(),
        }
    }

    // === World ===

    /// Sign `records` as the content of `label` in the signer's zone and publish the
    /// block to the DHT.
    pub fn publish(
        &self,
        signer: &SigningKey,
        label: &str,
        records: &[Record],
        expiration: Timestamp,
    ) -> Result<Block, serde_bencode::Error> {
        let block = Block::sign(signer, label, records, expiration)?;
        self.publish_block(block.clone());

        Ok(block)
    }

    /// Publish a block as is, valid or not. Blocks published under the same key are
    /// returned in publication order.
    pub fn publish_block(&self, block: Block) {
        self.world()
            .published
            .entry(*block.query_key())
            .or_default()
            .push(block);
    }

    /// Put a block directly into the namecache.
    pub fn cache_block(&self, block: &Block) {
        self.world().store(block);
    }

    /// Put raw bytes into the namecache under `key`, e.g. a corrupted entry.
    pub fn cache_raw(&self, key: QueryKey, bytes: Vec<u8>) {
        self.world().cached.put(key, bytes);
    }

    pub fn cached(&self, key: &QueryKey) -> Option<Block> {
        self.world()
            .cached
            .peek(key)
            .and_then(|bytes| Block::from_bytes(bytes).ok())
    }

    /// Answer legacy DNS queries for `name` and `record_type` with `records`.
    pub fn set_dns(&self, name: &str, record_type: RecordType, records: Vec<Record>) {
        self.world()
            .dns
            .insert((name.to_string(), record_type), records);
    }

    /// Stop answering DHT lookups of `key` until [Testnet::release] is called.
    pub fn hold(&self, key: QueryKey) {
        self.world().held.insert(key);
    }

    pub fn release(&self, key: &QueryKey) {
        self.world().held.remove(key);
    }

    pub fn stats(&self) -> Stats {
        self.world().stats
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl World {
    fn store(&mut self, block: &Block) {
        match block.to_bytes() {
            Ok(bytes) => {
                self.cached.put(*block.query_key(), bytes);
            }
            Err(error) => debug!(?error, "Could not encode block for the namecache"),
        }
    }
}

#[derive(Debug)]
/// [Namecache] backed by the [Testnet] LRU cache.
pub struct MemoryNamecache {
    testnet: Testnet,
    ready: VecDeque<(QueryId, Option<Block>)>,
}

impl Namecache for MemoryNamecache {
    fn lookup(&mut self, query: QueryId, key: &QueryKey) {
        let mut world = self.testnet.world();
        world.stats.cache_lookups += 1;

        let block = world.cached.get(key).and_then(|bytes| match Block::from_bytes(bytes) {
            Ok(block) => Some(block),
            Err(error) => {
                debug!(?key, ?error, "Corrupted namecache entry");
                None
            }
        });
        trace!(?query, ?key, hit = block.is_some(), "Memory namecache lookup");

        self.ready.push_back((query, block));
    }

    fn cancel(&mut self, query: QueryId) {
        self.ready.retain(|(id, _)| *id != query);
    }

    fn poll(&mut self) -> Option<(QueryId, Option<Block>)> {
        self.ready.pop_front()
    }

    fn cache_block(&mut self, block: &Block) {
        let mut world = self.testnet.world();
        world.stats.cached_blocks += 1;
        world.store(block);
    }
}

#[derive(Debug)]
/// [DhtClient] answering from the blocks published to the [Testnet].
pub struct MemoryDht {
    testnet: Testnet,
    /// Started lookups with the candidates they did not return yet.
    pending: Vec<(QueryId, QueryKey, Option<VecDeque<Block>>)>,
}

impl DhtClient for MemoryDht {
    fn get(&mut self, query: QueryId, key: &QueryKey) {
        self.testnet.world().stats.dht_gets += 1;
        self.pending.push((query, *key, None));
    }

    fn cancel(&mut self, query: QueryId) {
        let before = self.pending.len();
        self.pending.retain(|(id, _, _)| *id != query);

        if self.pending.len() != before {
            self.testnet.world().stats.dht_cancels += 1;
        }
    }

    fn poll(&mut self) -> Option<(QueryId, DhtEvent)> {
        let world = self.testnet.world();

        let index = self
            .pending
            .iter()
            .position(|(_, key, _)| !world.held.contains(key))?;

        let (query, key, candidates) = &mut self.pending[index];
        let query = *query;

        let candidates = candidates.get_or_insert_with(|| {
            world
                .published
                .get(key)
                .map(|blocks| blocks.iter().cloned().collect())
                .unwrap_or_default()
        });

        match candidates.pop_front() {
            Some(block) => Some((query, DhtEvent::Candidate(block))),
            None => {
                self.pending.remove(index);
                Some((query, DhtEvent::Done))
            }
        }
    }
}

#[derive(Debug)]
/// [DnsBridge] answering from the records set with [Testnet::set_dns].
pub struct MemoryDnsBridge {
    testnet: Testnet,
    ready: VecDeque<(QueryId, Result<Vec<Record>, DnsBridgeError>)>,
}

impl DnsBridge for MemoryDnsBridge {
    fn resolve(
        &mut self,
        query: QueryId,
        authority: &DnsAuthority,
        name: &str,
        record_type: RecordType,
    ) {
        let mut world = self.testnet.world();
        world.stats.dns_resolutions += 1;

        trace!(?query, authority = %authority.name, name, "Memory DNS resolution");

        let result = world
            .dns
            .get(&(name.to_string(), record_type))
            .cloned()
            .ok_or_else(|| DnsBridgeError::Failed(format!("NXDOMAIN {name}")));

        self.ready.push_back((query, result));
    }

    fn cancel(&mut self, query: QueryId) {
        self.ready.retain(|(id, _)| *id != query);
    }

    fn poll(&mut self) -> Option<(QueryId, Result<Vec<Record>, DnsBridgeError>)> {
        self.ready.pop_front()
    }
}
