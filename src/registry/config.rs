use std::collections::HashMap;
use std::time::Duration;

use crate::common::ZoneKey;

/// Default ceiling of concurrently inflight DHT queries.
pub const DEFAULT_MAX_BACKGROUND_QUERIES: usize = 1000;
/// Default time a DHT query may stay inflight before it counts as "no data".
pub const DEFAULT_DHT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default time the resolver thread waits for new messages when there is nothing to do.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
/// Registry configurations
pub struct Config {
    /// Maximum number of DHT queries inflight at once, across all lookups.
    ///
    /// Further DHT queries wait in FIFO order for a free slot.
    ///
    /// Defaults to [DEFAULT_MAX_BACKGROUND_QUERIES]
    pub max_background_queries: usize,
    /// How long a DHT query may run before it is abandoned and treated as if no
    /// block was found.
    ///
    /// Defaults to [DEFAULT_DHT_TIMEOUT]
    pub dht_timeout: Duration,
    /// Store blocks found in the DHT into the namecache.
    ///
    /// Defaults to `true`
    pub cache_remote_blocks: bool,
    /// Top level labels standing for a local zone, e.g. `"gnu"`.
    ///
    /// Defaults to empty.
    pub suffixes: HashMap<String, ZoneKey>,
    /// How long the [crate::Resolver] thread sleeps waiting for messages when idle.
    ///
    /// Defaults to [DEFAULT_IDLE_WAIT]
    pub idle_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_background_queries: DEFAULT_MAX_BACKGROUND_QUERIES,
            dht_timeout: DEFAULT_DHT_TIMEOUT,
            cache_remote_blocks: true,
            suffixes: HashMap::new(),
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}
