//! Per-session name counters used to mint object ids

use std::collections::HashMap;

use tracing::debug;

/// Base name → highest sequence number handed out so far
///
/// Counters never decrease: merging the client's view keeps the larger value
/// per name, and recording an allocation only ever raises a counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameCounters {
    counts: HashMap<String, u64>,
}

impl NameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in counters reported by the client
    pub fn merge(&mut self, incoming: &HashMap<String, u64>) {
        debug!(incoming = incoming.len(), "NameCounters::merge: called");
        for (name, &count) in incoming {
            let entry = self.counts.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// First sequence number worth trying for `name`
    pub fn next_start(&self, name: &str) -> u64 {
        self.get(name) + 1
    }

    /// Record that `{name}{n}` was allocated
    pub fn record(&mut self, name: &str, n: u64) {
        let entry = self.counts.entry(name.to_string()).or_insert(0);
        *entry = (*entry).max(n);
    }

    pub fn as_map(&self) -> &HashMap<String, u64> {
        &self.counts
    }
}

/// First `{base}{n}` with `n >= start` for which `is_taken` is false
pub fn first_free_id(base: &str, start: u64, is_taken: impl Fn(&str) -> bool) -> (String, u64) {
    let mut n = start.max(1);
    loop {
        let candidate = format!("{}{}", base, n);
        if !is_taken(&candidate) {
            debug!(%candidate, "first_free_id: found");
            return (candidate, n);
        }
        n += 1;
    }
}
