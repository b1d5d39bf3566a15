use super::Registry;

/// Snapshot of the registry's outstanding work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    active_lookups: usize,
    inflight_queries: usize,
    inflight_dht_queries: usize,
    queued_dht_queries: usize,
}

impl Info {
    /// Lookups that neither delivered a result nor were cancelled.
    pub fn active_lookups(&self) -> usize {
        self.active_lookups
    }
    /// Background queries handed to a collaborator and not finished yet.
    pub fn inflight_queries(&self) -> usize {
        self.inflight_queries
    }
    /// Inflight DHT queries, bounded by [crate::Config::max_background_queries].
    pub fn inflight_dht_queries(&self) -> usize {
        self.inflight_dht_queries
    }
    /// DHT queries waiting for a free slot.
    pub fn queued_dht_queries(&self) -> usize {
        self.queued_dht_queries
    }
}

impl From<&Registry> for Info {
    fn from(registry: &Registry) -> Self {
        Self {
            active_lookups: registry.resolutions.len(),
            inflight_queries: registry.background.inflight_total(),
            inflight_dht_queries: registry.background.inflight_dht(),
            queued_dht_queries: registry.background.queued_dht(),
        }
    }
}
