//! Bookkeeping of the cache, DHT and DNS queries issued on behalf of resolutions.
//!
//! DHT queries share a bounded number of slots; once all slots are taken new DHT
//! queries wait in FIFO order. Cache and DNS queries start immediately.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::common::{DnsAuthority, QueryKey, RecordType};
use crate::core::resolution::ResolverHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Identifier of one background query, handed to collaborators to tag completions.
pub struct QueryId(u32);

impl QueryId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_u32(id: u32) -> Self {
        QueryId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Cache,
    Dht,
    Dns,
}

#[derive(Debug, Clone, PartialEq)]
/// What a background query asks its collaborator for.
pub enum QueryRequest {
    Cache(QueryKey),
    Dht(QueryKey),
    Dns {
        authority: DnsAuthority,
        name: String,
        record_type: RecordType,
    },
}

impl QueryRequest {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryRequest::Cache(_) => QueryKind::Cache,
            QueryRequest::Dht(_) => QueryKind::Dht,
            QueryRequest::Dns { .. } => QueryKind::Dns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundQuery {
    pub id: QueryId,
    pub request: QueryRequest,
    /// Resolution that issued this query.
    pub owner: ResolverHandle,
    /// Traversal step of the owner that issued this query.
    pub step: u32,
    /// Set once the query is handed to its collaborator.
    started_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Start the query at its collaborator now.
    Start(QueryId),
    /// All DHT slots are taken, the query will be returned by [BackgroundQueries::promote].
    Queued(QueryId),
}

#[derive(Debug)]
pub struct BackgroundQueries {
    next_id: u32,
    max_dht_queries: usize,
    inflight: HashMap<QueryId, BackgroundQuery>,
    inflight_dht: usize,
    queue: VecDeque<BackgroundQuery>,
}

impl BackgroundQueries {
    pub fn new(max_dht_queries: usize) -> Self {
        Self {
            next_id: 0,
            max_dht_queries: max_dht_queries.max(1),
            inflight: HashMap::new(),
            inflight_dht: 0,
            queue: VecDeque::new(),
        }
    }

    // === Getters ===

    pub fn get(&self, id: QueryId) -> Option<&BackgroundQuery> {
        self.inflight.get(&id)
    }

    pub fn is_queued(&self, id: QueryId) -> bool {
        self.queue.iter().any(|query| query.id == id)
    }

    pub fn inflight_dht(&self) -> usize {
        self.inflight_dht
    }

    pub fn queued_dht(&self) -> usize {
        self.queue.len()
    }

    pub fn inflight_total(&self) -> usize {
        self.inflight.len()
    }

    // === Public Methods ===

    /// Register a new query for `owner` at traversal `step`.
    pub fn submit(&mut self, owner: ResolverHandle, step: u32, request: QueryRequest) -> Dispatch {
        let id = self.next_id();
        let kind = request.kind();

        let query = BackgroundQuery {
            id,
            request,
            owner,
            step,
            started_at: None,
        };

        if kind == QueryKind::Dht && self.inflight_dht >= self.max_dht_queries {
            trace!(?id, ?owner, queued = self.queue.len(), "DHT query queued");
            self.queue.push_back(query);

            return Dispatch::Queued(id);
        }

        self.start(query);

        Dispatch::Start(id)
    }

    /// Remove a finished query, freeing its slot.
    pub fn complete(&mut self, id: QueryId) -> Option<BackgroundQuery> {
        let query = self.inflight.remove(&id)?;

        if query.request.kind() == QueryKind::Dht {
            self.inflight_dht -= 1;
        }

        Some(query)
    }

    /// Remove every queued and inflight query of `owner`.
    ///
    /// Returns the inflight ones, which still need to be cancelled at their
    /// collaborators. Completions arriving later for their ids are unknown to this
    /// manager and get dropped.
    pub fn cancel_all(&mut self, owner: ResolverHandle) -> Vec<BackgroundQuery> {
        self.queue.retain(|query| query.owner != owner);

        let ids: Vec<QueryId> = self
            .inflight
            .values()
            .filter(|query| query.owner == owner)
            .map(|query| query.id)
            .collect();

        ids.into_iter().filter_map(|id| self.complete(id)).collect()
    }

    /// Move queued DHT queries into free slots, oldest first.
    ///
    /// Returns the queries that must now be started at the DHT.
    pub fn promote(&mut self) -> Vec<BackgroundQuery> {
        let mut started = Vec::new();

        while self.inflight_dht < self.max_dht_queries {
            let Some(query) = self.queue.pop_front() else {
                break;
            };

            started.push(query.clone());
            self.start(query);
        }

        started
    }

    /// Remove DHT queries that have been inflight for longer than `timeout`.
    pub fn expire_dht(&mut self, timeout: Duration) -> Vec<BackgroundQuery> {
        self.expire_dht_at(Instant::now(), timeout)
    }

    // === Private Methods ===

    fn expire_dht_at(&mut self, now: Instant, timeout: Duration) -> Vec<BackgroundQuery> {
        let ids: Vec<QueryId> = self
            .inflight
            .values()
            .filter(|query| {
                query.request.kind() == QueryKind::Dht
                    && query
                        .started_at
                        .is_some_and(|started_at| now.saturating_duration_since(started_at) >= timeout)
            })
            .map(|query| query.id)
            .collect();

        ids.into_iter().filter_map(|id| self.complete(id)).collect()
    }

    fn start(&mut self, mut query: BackgroundQuery) {
        if query.request.kind() == QueryKind::Dht {
            self.inflight_dht += 1;
        }

        query.started_at = Some(Instant::now());
        self.inflight.insert(query.id, query);
    }

    fn next_id(&mut self) -> QueryId {
        loop {
            let id = QueryId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);

            if !self.inflight.contains_key(&id) && !self.is_queued(id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dht(byte: u8) -> QueryRequest {
        QueryRequest::Dht(QueryKey::from_bytes([byte; 20]).unwrap())
    }

    fn cache(byte: u8) -> QueryRequest {
        QueryRequest::Cache(QueryKey::from_bytes([byte; 20]).unwrap())
    }

    #[test]
    fn dht_ceiling_queues_fifo() {
        let mut queries = BackgroundQueries::new(1);
        let (a, b, c) = (ResolverHandle(1), ResolverHandle(2), ResolverHandle(3));

        let Dispatch::Start(first) = queries.submit(a, 0, dht(1)) else {
            panic!("first DHT query should start");
        };
        let Dispatch::Queued(second) = queries.submit(b, 0, dht(2)) else {
            panic!("second DHT query should wait");
        };
        let Dispatch::Queued(third) = queries.submit(c, 0, dht(3)) else {
            panic!("third DHT query should wait");
        };

        assert!(queries.promote().is_empty());
        assert_eq!(queries.inflight_dht(), 1);
        assert_eq!(queries.queued_dht(), 2);

        queries.complete(first).unwrap();

        let promoted = queries.promote();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].id, second);
        assert!(queries.is_queued(third));
    }

    #[test]
    fn cache_queries_ignore_ceiling() {
        let mut queries = BackgroundQueries::new(1);
        let owner = ResolverHandle(1);

        assert!(matches!(queries.submit(owner, 0, dht(1)), Dispatch::Start(_)));
        assert!(matches!(queries.submit(owner, 0, cache(2)), Dispatch::Start(_)));
        assert!(matches!(queries.submit(owner, 0, cache(3)), Dispatch::Start(_)));
        assert_eq!(queries.inflight_total(), 3);
    }

    #[test]
    fn cancel_all_drops_queued_and_inflight() {
        let mut queries = BackgroundQueries::new(1);
        let (a, b) = (ResolverHandle(1), ResolverHandle(2));

        let Dispatch::Start(inflight) = queries.submit(a, 0, dht(1)) else {
            panic!("should start");
        };
        queries.submit(a, 0, dht(2));
        queries.submit(b, 0, dht(3));

        let cancelled = queries.cancel_all(a);

        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, inflight);
        assert!(queries.get(inflight).is_none());
        assert!(queries.complete(inflight).is_none());

        let promoted = queries.promote();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].owner, b);
    }

    #[test]
    fn expire_only_old_dht_queries() {
        let mut queries = BackgroundQueries::new(10);
        let owner = ResolverHandle(1);

        queries.submit(owner, 0, dht(1));
        queries.submit(owner, 0, cache(2));

        let timeout = Duration::from_secs(60);
        assert!(queries
            .expire_dht_at(Instant::now(), timeout)
            .is_empty());

        let expired = queries.expire_dht_at(Instant::now() + timeout, timeout);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].request.kind(), QueryKind::Dht);
        assert_eq!(queries.inflight_dht(), 0);
        assert_eq!(queries.inflight_total(), 1);
    }
}
