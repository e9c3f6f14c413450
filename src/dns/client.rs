use std::net::IpAddr;

use anyhow::Result;
use dns_lookup::{AddrInfoHints, getaddrinfo, lookup_addr, lookup_host};
use tracing::{Level, event};

use crate::core::common::{LookupKind, LookupRecord};
use crate::core::konst::{APP_NAME, RESOLVER_THREAD_NAME};
use crate::pool::bounded::{PoolResults, WorkerPool, default_concurrency};
use crate::util::message::lookup_summary_msg;
use crate::util::parser::parse_ipaddr;
use crate::util::result::LookupStats;

/// Multi-threaded DNS and reverse DNS lookups through the system resolver.
///
/// Built to consume large inputs efficiently: only enough entries are
/// pulled at a time to keep the worker threads busy.
#[derive(Clone, Debug)]
pub struct Resolver {
    pool: WorkerPool,
}

impl Resolver {
    /// `None` picks a thread count from the number of CPUs.
    pub fn new(concurrency: Option<usize>) -> Result<Resolver> {
        let concurrency = concurrency.unwrap_or_else(default_concurrency);
        let pool = WorkerPool::new(concurrency)?.with_thread_name(RESOLVER_THREAD_NAME);
        Ok(Resolver { pool })
    }

    pub fn concurrency(&self) -> usize {
        self.pool.concurrency()
    }

    /// Hostnames to IP addresses.
    ///
    /// Yields `(hostname, address)` in completion order, `address` being
    /// `None` when the name did not resolve.
    pub fn lookup<'a, T, S>(&self, hostnames: T) -> Result<Lookups<'a>>
    where
        T: IntoIterator<Item = S>,
        T::IntoIter: 'a,
        S: Into<String> + 'a,
    {
        let results = self
            .pool
            .run(resolve_hostname, hostnames.into_iter().map(|s| s.into()))?;
        Ok(Lookups::new(LookupKind::Forward, results))
    }

    /// IP addresses to fully qualified hostnames.
    ///
    /// Yields `(address, hostname)` in completion order, `hostname` being
    /// `None` when the address is malformed or has no name.
    pub fn reverse_lookup<'a, T, S>(&self, addresses: T) -> Result<Lookups<'a>>
    where
        T: IntoIterator<Item = S>,
        T::IntoIter: 'a,
        S: Into<String> + 'a,
    {
        let results = self
            .pool
            .run(resolve_address, addresses.into_iter().map(|s| s.into()))?;
        Ok(Lookups::new(LookupKind::Reverse, results))
    }
}

/// Lookup results as they complete.
///
/// The summary event is only emitted once the sequence has been drained;
/// dropping it part way through logs nothing.
pub struct Lookups<'a> {
    kind: LookupKind,
    results: PoolResults<'a, LookupRecord>,
    stats: LookupStats,
    drained: bool,
}

impl<'a> Lookups<'a> {
    fn new(kind: LookupKind, results: PoolResults<'a, LookupRecord>) -> Self {
        Lookups {
            kind,
            results,
            stats: LookupStats::default(),
            drained: false,
        }
    }

    pub fn stats(&self) -> &LookupStats {
        &self.stats
    }

    /// Summary of the lookups consumed so far.
    pub fn summary_msg(&self) -> String {
        lookup_summary_msg(
            self.kind,
            self.stats.resolved,
            self.stats.failed,
            self.stats.elapsed_secs(),
        )
    }
}

impl Iterator for Lookups<'_> {
    type Item = LookupRecord;

    fn next(&mut self) -> Option<LookupRecord> {
        if self.drained {
            return None;
        }
        self.stats.begin();
        match self.results.next() {
            Some(record) => {
                self.stats.record(&record.1);
                Some(record)
            }
            None => {
                self.drained = true;
                self.stats.finish();
                event!(target: APP_NAME, Level::INFO, "{}", self.summary_msg());
                None
            }
        }
    }
}

/// Prefer IPv4, the way `gethostbyname` callers expect, but fall back to
/// whatever the resolver returned.
fn pick_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
}

fn resolve_hostname(hostname: String) -> LookupRecord {
    let address = match lookup_host(&hostname) {
        Ok(addresses) => pick_address(&addresses),
        Err(e) => {
            event!(target: APP_NAME, Level::DEBUG, "Hostname lookup failed: {hostname}: {e}");
            return (hostname, None);
        }
    };

    match address {
        Some(address) => {
            event!(target: APP_NAME, Level::DEBUG, "Hostname {hostname} resolved to {address}");
            (hostname, Some(address.to_string()))
        }
        None => {
            event!(target: APP_NAME, Level::DEBUG, "Hostname lookup failed: {hostname}: no addresses");
            (hostname, None)
        }
    }
}

fn resolve_address(address: String) -> LookupRecord {
    let Some(ip) = parse_ipaddr(&address) else {
        event!(target: APP_NAME, Level::DEBUG, "Address lookup failed: {address}: not an IP address");
        return (address, None);
    };

    match lookup_addr(&ip) {
        // getnameinfo hands back the numeric form when there is no PTR record
        Ok(hostname) if hostname.parse::<IpAddr>().is_err() => {
            let hostname = fully_qualified(hostname);
            event!(target: APP_NAME, Level::DEBUG, "IP {address} resolved to {hostname}");
            (address, Some(hostname))
        }
        Ok(_) => {
            event!(target: APP_NAME, Level::DEBUG, "Address lookup failed: {address}: no PTR record");
            (address, None)
        }
        Err(e) => {
            event!(target: APP_NAME, Level::DEBUG, "Address lookup failed: {address}: {e}");
            (address, None)
        }
    }
}

/// Expand a short name to its canonical, dotted form when the resolver
/// knows one. Names that are already dotted, or have no dotted canonical
/// name, are returned unchanged.
fn fully_qualified(hostname: String) -> String {
    if hostname.contains('.') {
        return hostname;
    }
    let hints = AddrInfoHints {
        socktype: 0,
        protocol: 0,
        address: 0,
        flags: libc::AI_CANONNAME,
    };
    let canonical = getaddrinfo(Some(hostname.as_str()), None, Some(hints))
        .ok()
        .and_then(|mut infos| infos.find_map(|info| info.ok().and_then(|info| info.canonname)));

    match canonical {
        Some(name) if name.contains('.') => name,
        _ => hostname,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::sync::{Arc, Mutex};
    use std::thread::sleep;
    use std::time::Duration;

    use super::*;

    const MISSING_HOST: &str = "this-host-does-not-exist.invalid";

    fn resolver() -> Resolver {
        Resolver::new(Some(4)).unwrap()
    }

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber installed on this thread, returning what it logged.
    fn captured_logs<F: FnOnce()>(f: F) -> String {
        let writer = CaptureWriter::default();
        let buffer = Arc::clone(&writer.0);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .finish();

        tracing::subscriber::with_default(subscriber, f);

        let logs = buffer.lock().unwrap().clone();
        String::from_utf8(logs).unwrap()
    }

    #[test]
    fn default_concurrency_comes_from_cpu_count() {
        let resolver = Resolver::new(None).unwrap();
        assert_eq!(resolver.concurrency(), default_concurrency());
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(Resolver::new(Some(0)).is_err());
    }

    #[test]
    fn pick_address_prefers_ipv4() {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert_eq!(pick_address(&[v6, v4]), Some(v4));
        assert_eq!(pick_address(&[v6]), Some(v6));
        assert_eq!(pick_address(&[]), None);
    }

    #[test]
    fn lookup_localhost_gives_loopback() {
        let results: Vec<LookupRecord> = resolver().lookup(["localhost"]).unwrap().collect();

        assert_eq!(results.len(), 1);
        let (hostname, address) = &results[0];
        assert_eq!(hostname, "localhost");
        let address: IpAddr = address.as_deref().unwrap().parse().unwrap();
        assert!(address.is_loopback());
    }

    #[test]
    fn lookup_missing_host_gives_none() {
        let results: Vec<LookupRecord> = resolver().lookup([MISSING_HOST]).unwrap().collect();
        assert_eq!(results, vec![(MISSING_HOST.to_owned(), None)]);
    }

    #[test]
    fn lookup_malformed_name_gives_none() {
        let results: Vec<LookupRecord> = resolver().lookup(["bad\0name"]).unwrap().collect();
        assert_eq!(results, vec![("bad\0name".to_owned(), None)]);
    }

    #[test]
    fn lookup_ip_literal_resolves_to_itself() {
        let results: Vec<LookupRecord> = resolver().lookup(["127.0.0.1"]).unwrap().collect();
        assert_eq!(results, vec![("127.0.0.1".to_owned(), Some("127.0.0.1".to_owned()))]);
    }

    #[test]
    fn lookup_empty_input_gives_nothing() {
        let results: Vec<LookupRecord> = resolver().lookup(Vec::<String>::new()).unwrap().collect();
        assert!(results.is_empty());
    }

    #[test]
    fn reverse_lookup_loopback_gives_a_name() {
        let results: Vec<LookupRecord> = resolver().reverse_lookup(["127.0.0.1"]).unwrap().collect();

        assert_eq!(results.len(), 1);
        let (address, hostname) = &results[0];
        assert_eq!(address, "127.0.0.1");
        let hostname = hostname.as_deref().unwrap();
        assert!(!hostname.is_empty());
        assert!(hostname.parse::<IpAddr>().is_err());
    }

    #[test]
    fn reverse_lookup_malformed_address_gives_none() {
        let results: Vec<LookupRecord> = resolver().reverse_lookup(["not-an-address"]).unwrap().collect();
        assert_eq!(results, vec![("not-an-address".to_owned(), None)]);
    }

    #[test]
    fn reverse_lookup_reserved_address_gives_none() {
        // TEST-NET-1, never delegated
        let results: Vec<LookupRecord> = resolver().reverse_lookup(["192.0.2.1"]).unwrap().collect();
        assert_eq!(results, vec![("192.0.2.1".to_owned(), None)]);
    }

    #[test]
    fn stats_cover_the_drained_sequence() {
        let mut lookups = resolver().lookup(["localhost", MISSING_HOST, "127.0.0.1"]).unwrap();
        let mut count = 0;
        for _ in lookups.by_ref() {
            count += 1;
        }

        assert_eq!(count, 3);
        assert_eq!(lookups.stats().resolved, 2);
        assert_eq!(lookups.stats().failed, 1);
        assert!(lookups.next().is_none());
        assert!(lookups.summary_msg().starts_with("2 hostnames resolved in "));
        assert!(lookups.summary_msg().ends_with(" seconds. 1 failed."));
    }

    #[test]
    fn drained_lookup_logs_the_summary_once() {
        let logs = captured_logs(|| {
            let mut lookups = resolver().lookup(["127.0.0.1", "localhost"]).unwrap();
            assert_eq!(lookups.by_ref().count(), 2);
            assert!(lookups.next().is_none());
            assert!(lookups.next().is_none());
        });

        assert_eq!(logs.matches("hostnames resolved in").count(), 1);
        assert!(logs.contains("2 hostnames resolved in "));
    }

    #[test]
    fn drained_reverse_lookup_logs_the_summary() {
        let logs = captured_logs(|| {
            assert_eq!(resolver().reverse_lookup(["not-an-address"]).unwrap().count(), 1);
        });

        assert_eq!(logs.matches("IP addresses resolved in").count(), 1);
        assert!(logs.contains(" seconds. 1 failed."));
    }

    #[test]
    fn abandoned_lookup_logs_no_summary() {
        let logs = captured_logs(|| {
            let lookups = resolver().lookup(["127.0.0.1", "localhost", "::1"]).unwrap();
            assert_eq!(lookups.take(1).count(), 1);
        });

        assert!(!logs.contains("resolved in"));
    }

    #[test]
    fn stats_clock_starts_on_first_result() {
        let mut lookups = resolver().lookup(["127.0.0.1"]).unwrap();
        sleep(Duration::from_millis(300));
        assert_eq!(lookups.stats().elapsed_secs(), 0.0);

        assert_eq!(lookups.by_ref().count(), 1);
        let elapsed = lookups.stats().elapsed_secs();
        assert!(elapsed < 0.3, "idle time counted: {elapsed}");

        sleep(Duration::from_millis(50));
        assert_eq!(lookups.stats().elapsed_secs(), elapsed);
    }

    #[test]
    fn lookup_accepts_lazy_iterators() {
        let hosts = (0..3).map(|_| "localhost".to_owned());
        let resolved = resolver()
            .lookup(hosts)
            .unwrap()
            .filter(|(_, address)| address.is_some())
            .count();
        assert_eq!(resolved, 3);
    }

    #[test]
    fn fully_qualified_keeps_dotted_names() {
        assert_eq!(fully_qualified("web.example.com".to_owned()), "web.example.com");
    }
}
