//! AsyncResolver node.

use crate::{
    common::{Record, RecordType, ZoneKey},
    core::resolution::{LookupOptions, ResolverHandle},
    error::{CancelError, LookupError},
    registry::Info,
    resolver::{ActorMessage, LookupRequest, Resolver, ResolverError, DEFAULT_RECURSION_DEPTH},
};

impl Resolver {
    /// Return an async version of the Resolver client.
    pub fn as_async(self) -> AsyncResolver {
        AsyncResolver(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the [Resolver].
pub struct AsyncResolver(Resolver);

impl AsyncResolver {
    // === Getters ===

    /// Summary of the registry's outstanding work.
    pub async fn info(&self) -> Result<Info, ResolverError> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0
             .0
            .send(ActorMessage::Info(sender))
            .map_err(|_| ResolverError::Shutdown)?;

        receiver.recv_async().await.map_err(|_| ResolverError::Shutdown)
    }

    // === Public Methods ===

    /// Start a lookup; the returned [AsyncPendingLookup] resolves to its records.
    pub async fn lookup(
        &self,
        zone: ZoneKey,
        record_type: RecordType,
        name: &str,
        options: LookupOptions,
        depth: u32,
    ) -> Result<AsyncPendingLookup, ResolverError> {
        let (sender, receiver) = flume::bounded::<Result<ResolverHandle, LookupError>>(1);
        let (records_sender, records) = flume::bounded::<Vec<Record>>(1);

        self.0
             .0
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

        let handle = receiver
            .recv_async()
            .await
            .map_err(|_| ResolverError::Shutdown)??;

        Ok(AsyncPendingLookup { handle, records })
    }

    /// Resolve `name` with default options and [DEFAULT_RECURSION_DEPTH].
    pub async fn resolve(
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
        )
        .await?
        .wait()
        .await
        .ok_or(ResolverError::Shutdown)
    }

    /// Cancel a lookup. Once this returns `Ok`, its records will never be delivered.
    pub async fn cancel(&self, handle: ResolverHandle) -> Result<(), ResolverError> {
        let (sender, receiver) = flume::bounded::<Result<(), CancelError>>(1);

        self.0
             .0
            .send(ActorMessage::Cancel(handle, sender))
            .map_err(|_| ResolverError::Shutdown)?;

        Ok(receiver
            .recv_async()
            .await
            .map_err(|_| ResolverError::Shutdown)??)
    }

    /// Cancel all lookups and stop the resolver thread.
    pub async fn shutdown(&self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0 .0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }
}

#[derive(Debug)]
/// A lookup started by [AsyncResolver::lookup].
pub struct AsyncPendingLookup {
    handle: ResolverHandle,
    records: flume::Receiver<Vec<Record>>,
}

impl AsyncPendingLookup {
    pub fn handle(&self) -> ResolverHandle {
        self.handle
    }

    /// Returns `None` if the lookup was cancelled or the resolver shut down.
    pub async fn wait(self) -> Option<Vec<Record>> {
        self.records.recv_async().await.ok()
    }
}
