//! Routing of collaborator completions back to the resolution that issued them.

use tracing::{debug, trace};

use crate::common::{Block, Record, Timestamp};
use crate::core::background::{BackgroundQuery, QueryId};
use crate::core::resolution::Next;

use super::{DhtEvent, DnsBridgeError, Registry, TickReport};

impl Registry {
    pub(super) fn handle_cache_result(
        &mut self,
        query: QueryId,
        block: Option<Block>,
        report: &mut TickReport,
    ) {
        let Some(owner) = self.take_current(query, report) else {
            return;
        };
        let Some(resolution) = self.resolutions.get_mut(&owner.owner) else {
            return;
        };

        let records = match (block, resolution.current_step()) {
            (Some(block), Some(step)) => {
                match self
                    .validator
                    .decrypt_and_validate(&block, &step.zone, &step.label)
                {
                    Ok(records) => Some(records),
                    Err(error) => {
                        debug!(?query, ?error, "Discarding invalid cached block");
                        None
                    }
                }
            }
            _ => None,
        };

        let next = resolution.on_cache(records, self.types.as_ref(), Timestamp::now());
        self.drive(owner.owner, next);
    }

    pub(super) fn handle_dht_event(
        &mut self,
        query: QueryId,
        event: DhtEvent,
        report: &mut TickReport,
    ) {
        let block = match event {
            DhtEvent::Candidate(block) => block,
            DhtEvent::Done => {
                let Some(owner) = self.take_current(query, report) else {
                    return;
                };
                return self.resume_dht(owner, None);
            }
        };

        // Candidates keep the query inflight until one of them is valid and has live records.
        let Some(owner) = self.background.get(query).cloned() else {
            trace!(?query, "Discarding candidate of an unknown query");
            report.discarded += 1;
            return;
        };
        let Some(resolution) = self.resolutions.get(&owner.owner) else {
            report.discarded += 1;
            return;
        };
        if resolution.step() != owner.step {
            self.background.complete(query);
            self.dht.cancel(query);
            report.discarded += 1;
            return;
        }
        let Some(step) = resolution.current_step() else {
            report.discarded += 1;
            return;
        };

        let records = match self
            .validator
            .decrypt_and_validate(&block, &step.zone, &step.label)
        {
            Ok(records) => records,
            Err(error) => {
                debug!(?query, ?error, "Discarding invalid DHT candidate");
                return;
            }
        };

        let now = Timestamp::now();
        if !records.iter().any(|record| !record.is_expired(now)) {
            debug!(?query, "Discarding DHT candidate without live records");
            return;
        }

        self.background.complete(query);
        self.dht.cancel(query);

        if self.config.cache_remote_blocks {
            self.cache.cache_block(&block);
        }

        self.resume_dht(owner, Some(records));
    }

    /// A DHT query ran out of time; it counts as if no block was found.
    pub(super) fn handle_dht_timeout(&mut self, query: BackgroundQuery, report: &mut TickReport) {
        debug!(id = ?query.id, owner = ?query.owner, "DHT query timed out");

        if !self.is_current(&query) {
            report.discarded += 1;
            return;
        }

        self.resume_dht(query, None);
    }

    pub(super) fn handle_dns_result(
        &mut self,
        query: QueryId,
        result: Result<Vec<Record>, DnsBridgeError>,
        report: &mut TickReport,
    ) {
        let Some(owner) = self.take_current(query, report) else {
            return;
        };
        let Some(resolution) = self.resolutions.get_mut(&owner.owner) else {
            return;
        };

        let records = match result {
            Ok(records) => Some(records),
            Err(error) => {
                debug!(?query, ?error, "DNS resolution failed");
                None
            }
        };

        let next = resolution.on_dns(records);
        self.drive(owner.owner, next);
    }

    // === Private Methods ===

    fn resume_dht(&mut self, query: BackgroundQuery, records: Option<Vec<Record>>) {
        let Some(resolution) = self.resolutions.get_mut(&query.owner) else {
            return;
        };

        let next: Next = resolution.on_dht(records, self.types.as_ref(), Timestamp::now());
        self.drive(query.owner, next);
    }

    /// Remove a completed query, returning it only if its owner is still waiting for it.
    fn take_current(&mut self, query: QueryId, report: &mut TickReport) -> Option<BackgroundQuery> {
        let Some(completed) = self.background.complete(query) else {
            trace!(?query, "Discarding completion of an unknown query");
            report.discarded += 1;
            return None;
        };

        if !self.is_current(&completed) {
            trace!(?query, owner = ?completed.owner, "Discarding stale completion");
            report.discarded += 1;
            return None;
        }

        Some(completed)
    }

    fn is_current(&self, query: &BackgroundQuery) -> bool {
        self.resolutions
            .get(&query.owner)
            .is_some_and(|resolution| resolution.step() == query.step)
    }
}
