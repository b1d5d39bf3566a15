//! Resolver running a [Registry] on its own thread.

use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::common::{Record, RecordType, ZoneKey};
use crate::core::resolution::{LookupOptions, ResolverHandle};
use crate::error::{CancelError, LookupError};
use crate::registry::{
    BlockValidator, Config, DhtClient, DnsBridge, Info, Namecache, RecordTypes, Registry,
};

/// Delegations followed by [Resolver::resolve].
pub const DEFAULT_RECURSION_DEPTH: u32 = 16;

#[derive(Debug, Clone)]
/// Handle to a resolver thread; cheap to clone, all clones talk to the same thread.
pub struct Resolver(pub(crate) Sender<ActorMessage>);

#[derive(Debug)]
/// Create a [Resolver] with custom configurations and collaborators.
pub struct ResolverBuilder {
    config: Config,
    cache: Box<dyn Namecache>,
    dht: Box<dyn DhtClient>,
    dns: Option<Box<dyn DnsBridge>>,
    validator: Option<Box<dyn BlockValidator>>,
    types: Option<Box<dyn RecordTypes>>,
}

impl ResolverBuilder {
    /// Set [Config::max_background_queries].
    pub fn max_background_queries(mut self, max: usize) -> Self {
        self.config.max_background_queries = max;
        self
    }

    /// Set [Config::dht_timeout].
    pub fn dht_timeout(mut self, timeout: Duration) -> Self {
        self.config.dht_timeout = timeout;
        self
    }

    /// Set [Config::cache_remote_blocks].
    pub fn cache_remote_blocks(mut self, cache: bool) -> Self {
        self.config.cache_remote_blocks = cache;
        self
    }

    /// Add a configured suffix, see [Config::suffixes].
    pub fn suffix(mut self, tld: &str, zone: ZoneKey) -> Self {
        self.config.suffixes.insert(tld.to_lowercase(), zone);
        self
    }

    /// Set [Config::idle_wait].
    pub fn idle_wait(mut self, idle_wait: Duration) -> Self {
        self.config.idle_wait = idle_wait;
        self
    }

    /// Replace the whole [Config].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn dns_bridge(mut self, dns: impl DnsBridge + 'static) -> Self {
        self.dns = Some(Box::new(dns));
        self
    }

    pub fn validator(mut self, validator: impl BlockValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn record_types(mut self, types: impl RecordTypes + 'static) -> Self {
        self.types = Some(Box::new(types));
        self
    }

    /// Spawn the resolver thread.
    pub fn build(self) -> Result<Resolver, std::io::Error> {
        let idle_wait = self.config.idle_wait;

        let mut registry = Registry::init(self.config, self.cache, self.dht);
        if let Some(dns) = self.dns {
            registry = registry.with_dns_bridge(dns);
        }
        if let Some(validator) = self.validator {
            registry = registry.with_validator(validator);
        }
        if let Some(types) = self.types {
            registry = registry.with_record_types(types);
        }

        let (sender, receiver) = flume::unbounded();

        thread::Builder::new()
            .name("gns-resolver".to_string())
            .spawn(move || run(registry, receiver, idle_wait))?;

        Ok(Resolver(sender))
    }
}

impl Resolver {
    /// Returns a builder around the namecache and DHT collaborators.
    pub fn builder(
        cache: impl Namecache + 'static,
        dht: impl DhtClient + 'static,
    ) -> ResolverBuilder {
        ResolverBuilder {
            config: Config::default(),
            cache: Box::new(cache),
            dht: Box::new(dht),
            dns: None,
            validator: None,
            types: None,
        }
    }

    // === Getters ===

    /// Summary of the registry's outstanding work.
    pub fn info(&self) -> Result<Info, ResolverError> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0
            .send(ActorMessage::Info(sender))
            .map_err(|_| ResolverError::Shutdown)?;

        receiver.recv().map_err(|_| ResolverError::Shutdown)
    }

    // === Public Methods ===

    /// Start a lookup, see [Registry::lookup].
    pub fn lookup(
        &self,
        zone: ZoneKey,
        record_type: RecordType,
        name: &str,
        options: LookupOptions,
        depth: u32,
    ) -> Result<PendingLookup, ResolverError> {
        let (sender, receiver) = flume::bounded::<Result<ResolverHandle, LookupError>>(1);
        let (records_sender, records) = flume::bounded::<Vec<Record>>(1);

        self.0
            .send(ActorMessage::Lookup(
                LookupRequest {
                    zone,
                    record_type,
                    name: name.to_string(),
                    options,
                    depth,
                },
                records_sender,
                sender,
            ))
            .map_err(|_| ResolverError::Shutdown)?;

        let handle = receiver.recv().map_err(|_| ResolverError::Shutdown)??;

        Ok(PendingLookup { handle, records })
    }

    /// Resolve `name` with default options and [DEFAULT_RECURSION_DEPTH], blocking
    /// until the records are available.
    pub fn resolve(
        &self,
        zone: ZoneKey,
        record_type: RecordType,
        name: &str,
    ) -> Result<Vec<Record>, ResolverError> {
        self.lookup(
            zone,
            record_type,
            name,
            LookupOptions::default(),
            DEFAULT_RECURSION_DEPTH,
        )?
        .wait()
        .ok_or(ResolverError::Shutdown)
    }

    /// Cancel a lookup. Once this returns `Ok`, its records will never be delivered.
    pub fn cancel(&self, handle: ResolverHandle) -> Result<(), ResolverError> {
        let (sender, receiver) = flume::bounded::<Result<(), CancelError>>(1);

        self.0
            .send(ActorMessage::Cancel(handle, sender))
            .map_err(|_| ResolverError::Shutdown)?;

        Ok(receiver.recv().map_err(|_| ResolverError::Shutdown)??)
    }

    /// Cancel all lookups and stop the resolver thread.
    pub fn shutdown(&self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }
}

#[derive(Debug)]
/// A lookup started by [Resolver::lookup].
pub struct PendingLookup {
    handle: ResolverHandle,
    records: Receiver<Vec<Record>>,
}

impl PendingLookup {
    /// Handle to pass to [Resolver::cancel].
    pub fn handle(&self) -> ResolverHandle {
        self.handle
    }

    /// Block until the records are delivered.
    ///
    /// Returns `None` if the lookup was cancelled or the resolver shut down.
    pub fn wait(self) -> Option<Vec<Record>> {
        self.records.recv().ok()
    }

    /// Like [PendingLookup::wait], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Vec<Record>> {
        self.records.recv_timeout(timeout).ok()
    }

    /// Records if they were already delivered.
    pub fn try_wait(&self) -> Option<Vec<Record>> {
        self.records.try_recv().ok()
    }
}

#[derive(Debug)]
pub(crate) struct LookupRequest {
    pub(crate) zone: ZoneKey,
    pub(crate) record_type: RecordType,
    pub(crate) name: String,
    pub(crate) options: LookupOptions,
    pub(crate) depth: u32,
}

#[derive(Debug)]
pub(crate) enum ActorMessage {
    Lookup(
        LookupRequest,
        Sender<Vec<Record>>,
        Sender<Result<ResolverHandle, LookupError>>,
    ),
    Cancel(ResolverHandle, Sender<Result<(), CancelError>>),
    Info(Sender<Info>),
    Shutdown(Sender<()>),
}

fn run(mut registry: Registry, receiver: Receiver<ActorMessage>, idle_wait: Duration) {
    // Keep ticking without waiting while collaborators still report progress.
    let mut busy = false;

    let shutdown_ack = loop {
        let wait = if busy { Duration::ZERO } else { idle_wait };

        let message = match receiver.recv_timeout(wait) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Resolver handles dropped, shutting down the resolver thread");
                break None;
            }
        };

        let mut shutdown_ack = None;

        for message in message.into_iter().chain(receiver.try_iter()) {
            match message {
                ActorMessage::Lookup(request, records, sender) => {
                    let callback = Box::new(move |found: Vec<Record>| {
                        let _ = records.send(found);
                    });

                    let _ = sender.send(registry.lookup(
                        request.zone,
                        request.record_type,
                        &request.name,
                        request.options,
                        request.depth,
                        callback,
                    ));
                }
                ActorMessage::Cancel(handle, sender) => {
                    let _ = sender.send(registry.lookup_cancel(handle));
                }
                ActorMessage::Info(sender) => {
                    let _ = sender.send(registry.info());
                }
                ActorMessage::Shutdown(sender) => {
                    shutdown_ack = Some(sender);
                    break;
                }
            }
        }

        if shutdown_ack.is_some() {
            break shutdown_ack;
        }

        busy = registry.tick().handled > 0;
    };

    registry.shutdown();

    // Dropping queued messages drops their reply senders, so callers see a shutdown.
    receiver.drain().for_each(drop);
    drop(receiver);

    if let Some(sender) = shutdown_ack {
        let _ = sender.send(());
    }

    debug!("Resolver thread shut down");
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Resolver thread was shut down")]
    Shutdown,

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Cancel(#[from] CancelError),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ed25519_dalek::SigningKey;

    use crate::common::Timestamp;
    use crate::testnet::Testnet;

    use super::*;

    fn resolver(testnet: &Testnet) -> Resolver {
        Resolver::builder(testnet.namecache(), testnet.dht())
            .idle_wait(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[test]
    fn resolve_published_record() {
        let testnet = Testnet::new();
        let signer = SigningKey::from_bytes(&[3; 32]);
        let expiration = Timestamp::now() + Duration::from_secs(1000);
        let record = Record::new(RecordType::A, vec![192, 0, 2, 7], expiration);

        testnet
            .publish(&signer, "www", &[record.clone()], expiration)
            .unwrap();

        let resolver = resolver(&testnet);
        let records = resolver
            .resolve(ZoneKey::from(&signer), RecordType::A, "www")
            .unwrap();

        assert_eq!(records, vec![record]);
    }

    #[test]
    fn cancel_is_acknowledged() {
        let testnet = Testnet::new();
        let zone = ZoneKey::from(&SigningKey::from_bytes(&[3; 32]));
        testnet.hold(zone.query_key("www"));

        let resolver = resolver(&testnet);
        let pending = resolver
            .lookup(zone, RecordType::A, "www", LookupOptions::default(), 0)
            .unwrap();

        resolver.cancel(pending.handle()).unwrap();
        assert_eq!(
            resolver.cancel(pending.handle()),
            Err(ResolverError::Cancel(CancelError::UnknownHandle))
        );

        testnet.release(&zone.query_key("www"));
        assert!(pending.wait().is_none());
    }

    #[test]
    fn shutdown() {
        let testnet = Testnet::new();
        let resolver = resolver(&testnet);

        let clone = resolver.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            clone.shutdown();
        });

        handle.join().unwrap();

        assert_eq!(resolver.info(), Err(ResolverError::Shutdown));
        assert!(matches!(
            resolver.lookup(
                ZoneKey::from(&SigningKey::from_bytes(&[3; 32])),
                RecordType::A,
                "www",
                LookupOptions::default(),
                0
            ),
            Err(ResolverError::Shutdown)
        ));
    }
}
