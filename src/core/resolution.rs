//! Per-lookup resolution state machine.
//!
//! A [Resolution] never performs I/O: it tells the registry which background query
//! to issue next through [Next], and is fed the outcome of that query.

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};

use tracing::{debug, trace};

use crate::common::{DnsAuthority, Record, RecordType, Timestamp, ZoneKey};
use crate::core::background::QueryRequest;
use crate::core::classifier::classify;
use crate::core::walker::{Step, Walker};
use crate::registry::RecordTypes;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Opaque reference to one in-flight lookup.
pub struct ResolverHandle(pub(crate) u64);

impl Display for ResolverHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for ResolverHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ResolverHandle({})", self.0)
    }
}

/// Receives the records of a finished lookup, empty on absence or failure.
pub type ResultCallback = Box<dyn FnOnce(Vec<Record>) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Local lookup options.
pub struct LookupOptions {
    /// Never query the DHT, only the namecache.
    pub local_only: bool,
    /// Resolve the top level label as an ordinary label, even if it is a zone key or
    /// a configured suffix.
    pub no_zone_substitution: bool,
}

impl LookupOptions {
    pub fn local_only(mut self) -> Self {
        self.local_only = true;
        self
    }

    pub fn no_zone_substitution(mut self) -> Self {
        self.no_zone_substitution = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
/// What the registry should do after driving a [Resolution].
pub enum Next {
    /// Issue this background query for the resolution's current step.
    Query(QueryRequest),
    /// The result is ready to be delivered.
    Finished,
    /// The input did not belong to the current state and was ignored.
    Ignored,
}

#[derive(Debug)]
enum State {
    Init,
    Cache(Step),
    Dht(Step),
    Dns,
    Done(Vec<Record>),
}

pub struct Resolution {
    handle: ResolverHandle,
    record_type: RecordType,
    options: LookupOptions,
    walker: Walker,
    state: State,
    /// Incremented for every issued query, so late responses of an earlier step can
    /// be told apart.
    step: u32,
    callback: Option<ResultCallback>,
}

impl Debug for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("handle", &self.handle)
            .field("record_type", &self.record_type)
            .field("options", &self.options)
            .field("walker", &self.walker)
            .field("state", &self.state)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl Resolution {
    pub fn new(
        handle: ResolverHandle,
        zone: ZoneKey,
        record_type: RecordType,
        labels: Vec<String>,
        options: LookupOptions,
        depth: u32,
        callback: ResultCallback,
    ) -> Self {
        Resolution {
            handle,
            record_type,
            options,
            walker: Walker::new(zone, labels, depth),
            state: State::Init,
            step: 0,
            callback: Some(callback),
        }
    }

    // === Getters ===

    pub fn handle(&self) -> ResolverHandle {
        self.handle
    }

    /// Sequence number of the query this resolution is waiting for.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Zone and label whose block is awaited.
    pub fn current_step(&self) -> Option<&Step> {
        match &self.state {
            State::Cache(step) | State::Dht(step) => Some(step),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    // === Public Methods ===

    /// Apply zone substitution to the top level label and issue the first lookup.
    pub fn start(&mut self, suffixes: &HashMap<String, ZoneKey>) -> Next {
        if !matches!(self.state, State::Init) {
            return Next::Ignored;
        }

        if !self.options.no_zone_substitution && !self.walker.substitute_suffix(suffixes) {
            if let Some(zone) = self.walker.take_zone_key_tld() {
                trace!(handle = ?self.handle, ?zone, "Zone key top level label");

                if self.walker.delegate(zone).is_err() {
                    debug!(handle = ?self.handle, "Recursion budget exhausted at zone key label");
                    return self.finish(Vec::new());
                }
            }
        }

        self.lookup_next()
    }

    /// Outcome of the namecache query: the validated records of the current label, or
    /// `None` on a miss or an invalid block.
    pub fn on_cache(
        &mut self,
        records: Option<Vec<Record>>,
        types: &dyn RecordTypes,
        now: Timestamp,
    ) -> Next {
        let step = match std::mem::replace(&mut self.state, State::Init) {
            State::Cache(step) => step,
            other => {
                self.state = other;
                return Next::Ignored;
            }
        };

        match records {
            Some(records) if records.iter().any(|record| !record.is_expired(now)) => {
                self.process(step, &records, types, now)
            }
            _ if self.options.local_only => {
                trace!(handle = ?self.handle, label = %step.label, "Cache miss, DHT not allowed");
                self.finish(Vec::new())
            }
            _ => {
                trace!(handle = ?self.handle, label = %step.label, "Cache miss, asking the DHT");
                let key = step.zone.query_key(&step.label);
                self.state = State::Dht(step);
                self.query(QueryRequest::Dht(key))
            }
        }
    }

    /// Outcome of the DHT query: the first valid candidate's records, or `None` if the
    /// query was exhausted or timed out.
    pub fn on_dht(
        &mut self,
        records: Option<Vec<Record>>,
        types: &dyn RecordTypes,
        now: Timestamp,
    ) -> Next {
        let step = match std::mem::replace(&mut self.state, State::Init) {
            State::Dht(step) => step,
            other => {
                self.state = other;
                return Next::Ignored;
            }
        };

        match records {
            Some(records) => self.process(step, &records, types, now),
            None => {
                debug!(handle = ?self.handle, label = %step.label, zone = ?step.zone, "No block found");
                self.finish(Vec::new())
            }
        }
    }

    /// Outcome of the legacy DNS resolution, terminal either way.
    pub fn on_dns(&mut self, records: Option<Vec<Record>>) -> Next {
        if !matches!(self.state, State::Dns) {
            return Next::Ignored;
        }

        self.finish(records.unwrap_or_default())
    }

    /// Take the result and callback of a finished resolution, at most once.
    pub fn take_result(&mut self) -> Option<(Vec<Record>, ResultCallback)> {
        let State::Done(records) = &mut self.state else {
            return None;
        };

        let callback = self.callback.take()?;

        Some((std::mem::take(records), callback))
    }

    // === Private Methods ===

    fn process(
        &mut self,
        step: Step,
        records: &[Record],
        types: &dyn RecordTypes,
        now: Timestamp,
    ) -> Next {
        let classified = classify(records, self.record_type, now, types, step.selector.as_ref());

        if step.is_final && !classified.answers.is_empty() {
            return self.finish(classified.answers);
        }

        if let Some(zone) = classified
            .delegations
            .iter()
            .find_map(|record| record.zone_key().ok())
        {
            if self.walker.delegate(zone).is_err() {
                debug!(handle = ?self.handle, label = %step.label, "Recursion budget exhausted");
                return self.finish(Vec::new());
            }

            trace!(handle = ?self.handle, label = %step.label, ?zone, budget = self.walker.budget(), "Delegated");
            return self.lookup_next();
        }

        if let Some(authority) = DnsAuthority::from_records(&classified.dns_bridges) {
            let name = self.walker.dns_name(&authority.name);
            trace!(handle = ?self.handle, label = %step.label, %name, "Delegated to legacy DNS");

            self.state = State::Dns;
            return self.query(QueryRequest::Dns {
                authority,
                name,
                record_type: self.record_type,
            });
        }

        self.finish(Vec::new())
    }

    fn lookup_next(&mut self) -> Next {
        let step = self.walker.next_step();
        let key = step.zone.query_key(&step.label);

        trace!(handle = ?self.handle, label = %step.label, zone = ?step.zone, ?key, "Resolving label");

        self.state = State::Cache(step);
        self.query(QueryRequest::Cache(key))
    }

    fn query(&mut self, request: QueryRequest) -> Next {
        self.step = self.step.wrapping_add(1);
        Next::Query(request)
    }

    fn finish(&mut self, records: Vec<Record>) -> Next {
        debug!(handle = ?self.handle, records = records.len(), "Resolution done");

        self.state = State::Done(records);
        Next::Finished
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use ed25519_dalek::SigningKey;

    use crate::core::walker::split_name;
    use crate::registry::StandardRecordTypes;

    use super::*;

    fn zone(seed: u8) -> ZoneKey {
        (&SigningKey::from_bytes(&[seed; 32])).into()
    }

    fn resolution(
        name: &str,
        record_type: RecordType,
        options: LookupOptions,
        depth: u32,
    ) -> (Resolution, Arc<Mutex<Vec<Vec<Record>>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();

        let resolution = Resolution::new(
            ResolverHandle(1),
            zone(1),
            record_type,
            split_name(name).unwrap(),
            options,
            depth,
            Box::new(move |records| sink.lock().unwrap().push(records)),
        );

        (resolution, delivered)
    }

    fn later() -> Timestamp {
        Timestamp::now() + Duration::from_secs(1000)
    }

    #[test]
    fn cache_hit_answers_without_dht() {
        let (mut resolution, _) = resolution("www", RecordType::A, LookupOptions::default(), 0);
        let record = Record::new(RecordType::A, vec![192, 0, 2, 1], later());

        assert_eq!(
            resolution.start(&HashMap::new()),
            Next::Query(QueryRequest::Cache(zone(1).query_key("www")))
        );
        assert_eq!(
            resolution.on_cache(Some(vec![record.clone()]), &StandardRecordTypes, Timestamp::now()),
            Next::Finished
        );

        let (records, _) = resolution.take_result().unwrap();
        assert_eq!(records, vec![record]);
        assert!(resolution.take_result().is_none());
    }

    #[test]
    fn cache_miss_falls_back_to_dht() {
        let (mut resolution, _) = resolution("www", RecordType::A, LookupOptions::default(), 0);

        resolution.start(&HashMap::new());
        let first_step = resolution.step();

        assert_eq!(
            resolution.on_cache(None, &StandardRecordTypes, Timestamp::now()),
            Next::Query(QueryRequest::Dht(zone(1).query_key("www")))
        );
        assert_ne!(resolution.step(), first_step);

        assert_eq!(
            resolution.on_dht(None, &StandardRecordTypes, Timestamp::now()),
            Next::Finished
        );
        assert_eq!(resolution.take_result().unwrap().0, vec![]);
    }

    #[test]
    fn local_only_never_asks_dht() {
        let (mut resolution, _) =
            resolution("www", RecordType::A, LookupOptions::default().local_only(), 0);

        resolution.start(&HashMap::new());

        assert_eq!(
            resolution.on_cache(None, &StandardRecordTypes, Timestamp::now()),
            Next::Finished
        );
    }

    #[test]
    fn expired_cache_content_is_a_miss() {
        let (mut resolution, _) = resolution("www", RecordType::A, LookupOptions::default(), 0);
        let stale = Record::new(RecordType::A, vec![192, 0, 2, 1], Timestamp::from_micros(1));

        resolution.start(&HashMap::new());

        assert!(matches!(
            resolution.on_cache(Some(vec![stale]), &StandardRecordTypes, Timestamp::now()),
            Next::Query(QueryRequest::Dht(_))
        ));
    }

    #[test]
    fn zone_key_tld_needs_budget() {
        let name = format!("dummy.{}", zone(2));

        let (mut exhausted, _) =
            resolution(&name, RecordType::TXT, LookupOptions::default(), 0);
        assert_eq!(exhausted.start(&HashMap::new()), Next::Finished);

        let (mut allowed, _) = resolution(&name, RecordType::TXT, LookupOptions::default(), 1);
        assert_eq!(
            allowed.start(&HashMap::new()),
            Next::Query(QueryRequest::Cache(zone(2).query_key("dummy")))
        );
    }

    #[test]
    fn no_zone_substitution_keeps_tld_label() {
        let name = format!("dummy.{}", zone(2));
        let (mut resolution, _) = resolution(
            &name,
            RecordType::TXT,
            LookupOptions::default().no_zone_substitution(),
            0,
        );

        assert_eq!(
            resolution.start(&HashMap::new()),
            Next::Query(QueryRequest::Cache(zone(1).query_key(&zone(2).to_string())))
        );
    }

    #[test]
    fn delegation_in_the_middle_of_a_name() {
        let (mut resolution, _) = resolution("leaf.sub", RecordType::A, LookupOptions::default(), 1);
        let delegation = Record::delegation(&zone(2), later());

        resolution.start(&HashMap::new());

        assert_eq!(
            resolution.on_cache(Some(vec![delegation]), &StandardRecordTypes, Timestamp::now()),
            Next::Query(QueryRequest::Cache(zone(2).query_key("leaf")))
        );
    }

    #[test]
    fn delegation_at_final_label_resolves_apex() {
        let (mut resolution, _) = resolution("sub", RecordType::A, LookupOptions::default(), 1);
        let delegation = Record::delegation(&zone(2), later());

        resolution.start(&HashMap::new());

        assert_eq!(
            resolution.on_cache(Some(vec![delegation.clone()]), &StandardRecordTypes, Timestamp::now()),
            Next::Query(QueryRequest::Cache(zone(2).query_key("@")))
        );

        let (mut pkey, _) = resolution_for_pkey();
        pkey.start(&HashMap::new());
        assert_eq!(
            pkey.on_cache(Some(vec![delegation.clone()]), &StandardRecordTypes, Timestamp::now()),
            Next::Finished
        );
        assert_eq!(pkey.take_result().unwrap().0, vec![delegation]);
    }

    fn resolution_for_pkey() -> (Resolution, Arc<Mutex<Vec<Vec<Record>>>>) {
        resolution("sub", RecordType::PKEY, LookupOptions::default(), 0)
    }

    #[test]
    fn gns2dns_hands_over_to_dns() {
        let (mut resolution, _) =
            resolution("www.legacy", RecordType::A, LookupOptions::default(), 0);
        let bridge = Record::new(
            RecordType::GNS2DNS,
            DnsAuthority::encode("example.com", "192.0.2.53"),
            later(),
        );

        resolution.start(&HashMap::new());

        assert_eq!(
            resolution.on_cache(Some(vec![bridge]), &StandardRecordTypes, Timestamp::now()),
            Next::Query(QueryRequest::Dns {
                authority: DnsAuthority {
                    name: "example.com".to_string(),
                    servers: vec!["192.0.2.53".to_string()],
                },
                name: "www.example.com".to_string(),
                record_type: RecordType::A,
            })
        );
        assert_eq!(resolution.on_dns(None), Next::Finished);
        assert_eq!(resolution.take_result().unwrap().0, vec![]);
    }

    #[test]
    fn out_of_state_input_is_ignored() {
        let (mut resolution, _) = resolution("www", RecordType::A, LookupOptions::default(), 0);

        resolution.start(&HashMap::new());

        assert_eq!(
            resolution.on_dht(None, &StandardRecordTypes, Timestamp::now()),
            Next::Ignored
        );
        assert_eq!(resolution.on_dns(None), Next::Ignored);
        assert!(resolution.current_step().is_some());
        assert!(!resolution.is_done());
    }

    #[test]
    fn callback_fires_once() {
        let (mut resolution, delivered) =
            resolution("www", RecordType::A, LookupOptions::default().local_only(), 0);

        resolution.start(&HashMap::new());
        resolution.on_cache(None, &StandardRecordTypes, Timestamp::now());

        let (records, callback) = resolution.take_result().unwrap();
        callback(records);

        assert!(resolution.take_result().is_none());
        assert_eq!(delivered.lock().unwrap().len(), 1);
    }
}
