use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::core::common::LookupRecord;

/// Running totals for one lookup call.
///
/// The clock starts with the first result requested and stops at
/// `finish`, so time spent before consumption begins is not counted.
#[derive(Debug, Default)]
pub struct LookupStats {
    pub resolved: u64,
    pub failed: u64,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl LookupStats {
    /// Start the clock, unless it is already running.
    pub fn begin(&mut self) {
        self.started.get_or_insert_with(Instant::now);
    }

    /// Stop the clock.
    pub fn finish(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.map(|s| s.elapsed()).unwrap_or_default());
        }
    }

    pub fn record(&mut self, answer: &Option<String>) {
        match answer {
            Some(_) => self.resolved += 1,
            None => self.failed += 1,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        match (self.elapsed, self.started) {
            (Some(elapsed), _) => elapsed.as_secs_f64(),
            (None, Some(started)) => started.elapsed().as_secs_f64(),
            (None, None) => 0.0,
        }
    }
}

/// Hostnames grouped by the known server they resolve to.
#[derive(Debug, Default, PartialEq)]
pub struct ServerReport {
    /// Server name => sorted hostnames
    pub groups: BTreeMap<String, Vec<String>>,
    /// Hostnames that failed to resolve or resolved to an unknown address,
    /// sorted case-insensitively.
    pub unmatched: Vec<LookupRecord>,
}

impl ServerReport {
    /// Distinct addresses of the unmatched hostnames, worth a reverse lookup.
    pub fn unmatched_addresses(&self) -> Vec<String> {
        let addresses: BTreeSet<&String> = self
            .unmatched
            .iter()
            .filter_map(|(_, address)| address.as_ref())
            .collect();
        addresses.into_iter().cloned().collect()
    }

    pub fn longest_grouped(&self) -> usize {
        self.groups.values().flatten().map(|h| h.len()).max().unwrap_or(0)
    }

    pub fn longest_unmatched(&self) -> usize {
        self.unmatched.iter().map(|(h, _)| h.len()).max().unwrap_or(0)
    }
}

/// Sort forward lookup results into per-server groups.
/// `servers` maps IP address => server name.
pub fn group_by_server<R>(records: R, servers: &HashMap<String, String>) -> ServerReport
where
    R: IntoIterator<Item = LookupRecord>,
{
    let mut report = ServerReport::default();

    for (hostname, address) in records {
        match address.as_ref().and_then(|a| servers.get(a)) {
            Some(server) => report.groups.entry(server.to_owned()).or_default().push(hostname),
            None => report.unmatched.push((hostname, address)),
        }
    }

    for hostnames in report.groups.values_mut() {
        hostnames.sort();
    }
    report.unmatched.sort_by_key(|(hostname, _)| hostname.to_lowercase());

    report
}
