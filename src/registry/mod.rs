//! Registry of active lookups - the single-threaded orchestration layer.
//!
//! Owns the collaborators and every live [Resolution], issues their background
//! queries, routes completions back, and delivers results from [Registry::tick].

pub(crate) mod collaborators;
pub(crate) mod config;
mod handle_completion;
mod info;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::common::{RecordType, ZoneKey};
use crate::core::background::{BackgroundQueries, BackgroundQuery, Dispatch, QueryId, QueryRequest};
use crate::core::resolution::{LookupOptions, Next, Resolution, ResolverHandle, ResultCallback};
use crate::core::walker::split_name;
use crate::error::{CancelError, LookupError};

pub use collaborators::{
    BlockValidator, DhtClient, DhtEvent, DnsBridge, DnsBridgeError, Namecache, RecordTypes,
    SignedBlockValidator, StandardRecordTypes,
};
pub use config::{Config, DEFAULT_DHT_TIMEOUT, DEFAULT_IDLE_WAIT, DEFAULT_MAX_BACKGROUND_QUERIES};
pub use info::Info;

#[derive(Debug)]
/// Process-wide table of active lookups and the collaborators serving them.
///
/// Constructing a registry is the `init` step; every lookup goes through it and
/// [Registry::shutdown] cancels whatever is still active.
pub struct Registry {
    config: Config,

    cache: Box<dyn Namecache>,
    dht: Box<dyn DhtClient>,
    dns: Option<Box<dyn DnsBridge>>,
    validator: Box<dyn BlockValidator>,
    types: Box<dyn RecordTypes>,

    background: BackgroundQueries,
    resolutions: HashMap<ResolverHandle, Resolution>,
    /// Resolutions with a result waiting for the next tick.
    finished: Vec<ResolverHandle>,

    next_handle: u64,
    shut_down: bool,
}

#[derive(Debug, Default)]
/// What happened during one [Registry::tick].
pub struct TickReport {
    /// Lookups whose callback was invoked.
    pub finished: Vec<ResolverHandle>,
    /// Completions that no longer had an owner, or were for an earlier step.
    pub discarded: usize,
    /// Collaborator completions polled during this tick, discarded ones included.
    pub handled: usize,
}

impl Registry {
    /// Create a registry around the namecache and DHT collaborators.
    ///
    /// Blocks are checked with [SignedBlockValidator], record types dispatched with
    /// [StandardRecordTypes], and GNS2DNS delegations fail until a bridge is set with
    /// [Registry::with_dns_bridge].
    pub fn init(config: Config, cache: Box<dyn Namecache>, dht: Box<dyn DhtClient>) -> Self {
        debug!(
            max_background_queries = config.max_background_queries,
            "Initializing resolver registry"
        );

        Registry {
            background: BackgroundQueries::new(config.max_background_queries),
            config,

            cache,
            dht,
            dns: None,
            validator: Box::new(SignedBlockValidator),
            types: Box::new(StandardRecordTypes),

            resolutions: HashMap::new(),
            finished: Vec::new(),

            next_handle: 0,
            shut_down: false,
        }
    }

    // === Options ===

    pub fn with_validator(mut self, validator: Box<dyn BlockValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_record_types(mut self, types: Box<dyn RecordTypes>) -> Self {
        self.types = types;
        self
    }

    pub fn with_dns_bridge(mut self, dns: Box<dyn DnsBridge>) -> Self {
        self.dns = Some(dns);
        self
    }

    // === Getters ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` if `handle` still refers to a lookup that may deliver a result.
    pub fn is_active(&self, handle: ResolverHandle) -> bool {
        self.resolutions.contains_key(&handle)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Returns a summary of the outstanding work.
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    // === Public Methods ===

    /// Start resolving `name` under `zone`.
    ///
    /// Fails synchronously only on malformed names or after [Registry::shutdown].
    /// Otherwise `callback` is invoked exactly once from a later [Registry::tick],
    /// with the records found or with no records, unless the lookup is cancelled first.
    pub fn lookup(
        &mut self,
        zone: ZoneKey,
        record_type: RecordType,
        name: &str,
        options: LookupOptions,
        depth: u32,
        callback: ResultCallback,
    ) -> Result<ResolverHandle, LookupError> {
        if self.shut_down {
            return Err(LookupError::Shutdown);
        }

        let labels = split_name(name)?;

        let handle = ResolverHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);

        debug!(?handle, ?zone, ?record_type, name, depth, "New lookup");

        let mut resolution = Resolution::new(
            handle,
            zone,
            record_type,
            labels,
            options,
            depth,
            callback,
        );
        let next = resolution.start(&self.config.suffixes);

        self.resolutions.insert(handle, resolution);
        self.drive(handle, next);

        Ok(handle)
    }

    /// Cancel a lookup: abort its background queries and drop its callback.
    ///
    /// Once this returns, the callback will never be invoked.
    pub fn lookup_cancel(&mut self, handle: ResolverHandle) -> Result<(), CancelError> {
        if !self.forget(handle) {
            return Err(CancelError::UnknownHandle);
        }

        self.promote();

        debug!(?handle, "Lookup cancelled");

        Ok(())
    }

    /// Cancel every active lookup and refuse new ones.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let handles: Vec<ResolverHandle> = self.resolutions.keys().copied().collect();

        debug!(active = handles.len(), "Shutting down resolver registry");

        // Nothing is promoted: every queued query belongs to a lookup being dropped.
        for handle in handles {
            self.forget(handle);
        }
    }

    /// Drain collaborator completions, route them to their resolutions, start queued
    /// DHT queries, and invoke the callbacks of finished lookups.
    ///
    /// Call periodically; no progress is made between calls.
    ///
    /// Only completions that are ready when the tick starts are handled. Queries started
    /// while handling them are polled on the next tick, so a long delegation chain answered
    /// from the namecache cannot hold up other lookups.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let cached: Vec<_> = std::iter::from_fn(|| self.cache.poll()).collect();
        report.handled += cached.len();

        for (query, block) in cached {
            self.handle_cache_result(query, block, &mut report);
        }

        let events: Vec<_> = std::iter::from_fn(|| self.dht.poll()).collect();
        report.handled += events.len();

        for (query, event) in events {
            self.handle_dht_event(query, event, &mut report);
        }

        let resolved: Vec<_> =
            std::iter::from_fn(|| self.dns.as_mut().and_then(|dns| dns.poll())).collect();
        report.handled += resolved.len();

        for (query, result) in resolved {
            self.handle_dns_result(query, result, &mut report);
        }

        for query in self.background.expire_dht(self.config.dht_timeout) {
            self.dht.cancel(query.id);
            self.handle_dht_timeout(query, &mut report);
        }

        self.promote();
        self.deliver(&mut report);

        report
    }

    // === Private Methods ===

    /// Act on what a resolution asked for.
    fn drive(&mut self, handle: ResolverHandle, next: Next) {
        match next {
            Next::Query(request) => self.dispatch(handle, request),
            Next::Finished => self.finished.push(handle),
            Next::Ignored => {}
        }
    }

    fn dispatch(&mut self, handle: ResolverHandle, request: QueryRequest) {
        let Some(resolution) = self.resolutions.get_mut(&handle) else {
            return;
        };

        if matches!(request, QueryRequest::Dns { .. }) && self.dns.is_none() {
            debug!(?handle, "GNS2DNS delegation without a DNS bridge");

            let next = resolution.on_dns(None);
            return self.drive(handle, next);
        }

        match self.background.submit(handle, resolution.step(), request.clone()) {
            Dispatch::Start(query) => self.start_query(query, &request),
            Dispatch::Queued(query) => {
                trace!(?handle, ?query, "Waiting for a free DHT slot");
            }
        }
    }

    fn start_query(&mut self, query: QueryId, request: &QueryRequest) {
        match request {
            QueryRequest::Cache(key) => self.cache.lookup(query, key),
            QueryRequest::Dht(key) => self.dht.get(query, key),
            QueryRequest::Dns {
                authority,
                name,
                record_type,
            } => {
                if let Some(dns) = self.dns.as_mut() {
                    dns.resolve(query, authority, name, *record_type)
                }
            }
        }
    }

    /// Drop a lookup with its pending result and background queries, without invoking
    /// its callback. Returns `false` if the lookup is unknown.
    fn forget(&mut self, handle: ResolverHandle) -> bool {
        if self.resolutions.remove(&handle).is_none() {
            return false;
        }

        self.finished.retain(|finished| *finished != handle);
        self.abort_queries(handle);

        true
    }

    /// Start queued DHT queries for which a slot became free.
    fn promote(&mut self) {
        for BackgroundQuery { id, request, .. } in self.background.promote() {
            self.start_query(id, &request);
        }
    }

    fn abort_queries(&mut self, handle: ResolverHandle) {
        for query in self.background.cancel_all(handle) {
            trace!(?handle, id = ?query.id, kind = ?query.request.kind(), "Aborting query");

            match query.request {
                QueryRequest::Cache(_) => self.cache.cancel(query.id),
                QueryRequest::Dht(_) => self.dht.cancel(query.id),
                QueryRequest::Dns { .. } => {
                    if let Some(dns) = self.dns.as_mut() {
                        dns.cancel(query.id)
                    }
                }
            }
        }
    }

    /// Invoke the callbacks of finished resolutions and forget them.
    fn deliver(&mut self, report: &mut TickReport) {
        for handle in std::mem::take(&mut self.finished) {
            let Some(mut resolution) = self.resolutions.remove(&handle) else {
                continue;
            };

            self.abort_queries(handle);

            if let Some((records, callback)) = resolution.take_result() {
                trace!(?handle, records = records.len(), "Delivering result");

                callback(records);
                report.finished.push(handle);
            }
        }
    }
}
