//! NAT translation table.
//!
//! Owns the forward (bucket+id -> flow) and reverse (flow -> record) indices
//! and serializes every operation through one table-wide lock. Cleanup is
//! opportunistic: the insertion path triggers a rate-limited sweep instead
//! of a background timer.

use crate::nat::allocator::IdAllocator;
use crate::nat::flow::{Bucket, Flow, FlowKey, IdentityMode, IpVersion, Protocol};
use crate::telemetry::NatMetrics;
use crate::{Error, Result};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Per-protocol idle timeouts.
#[derive(Debug, Clone)]
pub struct NatTimeouts {
    /// TCP, tuned for long-lived connections (default: 15 minutes).
    pub tcp: Duration,
    /// UDP and every other non-ICMP protocol (default: 5 minutes).
    pub udp: Duration,
    /// ICMP (default: 30 seconds). Also the minimum interval between
    /// cleanup sweeps.
    pub icmp: Duration,
}

impl Default for NatTimeouts {
    fn default() -> Self {
        Self {
            tcp: Duration::from_secs(900),
            udp: Duration::from_secs(300),
            icmp: Duration::from_secs(30),
        }
    }
}

impl NatTimeouts {
    /// Idle timeout for a protocol. Anything that is not TCP or ICMP uses
    /// the UDP timeout.
    pub fn for_protocol(&self, protocol: Protocol) -> Duration {
        match protocol {
            Protocol::Tcp => self.tcp,
            Protocol::Icmp => self.icmp,
            Protocol::Udp | Protocol::Other(_) => self.udp,
        }
    }
}

/// Why a record left the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Idle longer than its protocol timeout.
    Expired,
    /// Displaced by an overwriting insert.
    Replaced,
    /// Removed by an explicit `remove` call.
    Explicit,
    /// The table was shut down.
    Shutdown,
}

/// A live translation record.
///
/// The table hands out clones; the authoritative copy stays in the reverse
/// index and only the table refreshes its access time.
#[derive(Debug, Clone)]
pub struct NatEntry {
    key: FlowKey,
    id: u16,
    created_at: Instant,
    last_access: Instant,
}

impl NatEntry {
    fn new(key: FlowKey, id: u16) -> Self {
        let now = Instant::now();
        Self {
            key,
            id,
            created_at: now,
            last_access: now,
        }
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    /// The allocated translation id, unique within this record's bucket.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn bucket(&self) -> Bucket {
        self.key.bucket()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    fn is_expired(&self, now: Instant, timeouts: &NatTimeouts) -> bool {
        now.duration_since(self.last_access) > timeouts.for_protocol(self.key.protocol)
    }
}

/// Forward index key. Translation ids only mean something within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MappingKey {
    bucket: Bucket,
    id: u16,
}

type RemovalListener = Box<dyn Fn(&NatEntry, RemovalReason) + Send + Sync>;

/// Index and allocator state guarded by the table lock.
struct TableState {
    /// bucket+id -> flow identity, for inbound resolution.
    forward: HashMap<MappingKey, FlowKey>,
    /// flow identity -> record, for outbound lookup. Owns the records.
    reverse: HashMap<FlowKey, NatEntry>,
    allocator: IdAllocator,
    last_sweep: Instant,
    disposed: bool,
}

/// NAT translation table.
///
/// Every operation takes `&self` and serializes through one internal lock,
/// so the effects of concurrent `add`/`get`/`resolve`/`remove` calls are
/// totally ordered and no caller observes a half-applied insert or removal.
///
/// The removal listener registered with [`NatTable::on_removed`] runs while
/// that lock is held. It must not call back into the table, or the
/// re-entrant lock acquisition will deadlock.
pub struct NatTable {
    state: Mutex<TableState>,
    mode: IdentityMode,
    timeouts: NatTimeouts,
    metrics: NatMetrics,
    listener: Option<RemovalListener>,
}

impl NatTable {
    pub fn new(mode: IdentityMode) -> Self {
        Self::with_timeouts(mode, NatTimeouts::default())
    }

    pub fn with_timeouts(mode: IdentityMode, timeouts: NatTimeouts) -> Self {
        Self {
            state: Mutex::new(TableState {
                forward: HashMap::new(),
                reverse: HashMap::new(),
                allocator: IdAllocator::new(),
                last_sweep: Instant::now(),
                disposed: false,
            }),
            mode,
            timeouts,
            metrics: NatMetrics::new(),
            listener: None,
        }
    }

    /// Register the removal listener. One listener per table, set at
    /// construction before the table is shared.
    ///
    /// The callback fires exactly once per destroyed record, synchronously,
    /// after the removal is committed to both indices but while the table
    /// lock is still held. Use it to release resources keyed by the flow's
    /// id (sockets, tunnel sessions); do not touch this table from inside
    /// it. A panicking listener is caught and logged, never propagated.
    pub fn on_removed<F>(mut self, listener: F) -> Self
    where
        F: Fn(&NatEntry, RemovalReason) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn identity_mode(&self) -> IdentityMode {
        self.mode
    }

    pub fn timeouts(&self) -> &NatTimeouts {
        &self.timeouts
    }

    pub fn metrics(&self) -> &NatMetrics {
        &self.metrics
    }

    /// Look up the record for `flow`, refreshing its access time on a hit.
    /// A miss is `Ok(None)`; never allocates.
    pub fn get(&self, flow: &Flow) -> Result<Option<NatEntry>> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        let key = FlowKey::from_flow(flow, self.mode);
        Ok(Self::touch_reverse(&mut state, &key))
    }

    /// `get`, then `add` on a miss, under a single lock acquisition, so no
    /// other caller can register the same flow in between.
    pub fn get_or_add(&self, flow: &Flow) -> Result<NatEntry> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        let key = FlowKey::from_flow(flow, self.mode);
        if let Some(entry) = Self::touch_reverse(&mut state, &key) {
            return Ok(entry);
        }
        self.add_locked(&mut state, key, None, false)
    }

    /// Insert a new record for `flow` with a freshly allocated id.
    /// Fails with [`Error::Conflict`] if the flow is already mapped.
    pub fn add(&self, flow: &Flow) -> Result<NatEntry> {
        self.add_with(flow, None, false)
    }

    /// Full insert: optional explicit id, optional overwrite.
    ///
    /// Runs the opportunistic cleanup sweep first. A record already holding
    /// either index key (same bucket+id, or same flow identity) rejects the
    /// insert unless `overwrite` is set, in which case the conflicting
    /// record is removed first and its removal notification fires.
    pub fn add_with(&self, flow: &Flow, id: Option<u16>, overwrite: bool) -> Result<NatEntry> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        let key = FlowKey::from_flow(flow, self.mode);
        self.add_locked(&mut state, key, id, overwrite)
    }

    /// Translate an inbound packet's bucket+id back to its flow record,
    /// refreshing the access time on a hit. A miss is `Ok(None)`.
    pub fn resolve(
        &self,
        version: IpVersion,
        protocol: Protocol,
        id: u16,
    ) -> Result<Option<NatEntry>> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        let mapping = MappingKey {
            bucket: Bucket { version, protocol },
            id,
        };
        let Some(key) = state.forward.get(&mapping).cloned() else {
            self.metrics.resolve_misses.inc();
            return Ok(None);
        };
        let hit = Self::touch_reverse(&mut state, &key);
        if hit.is_some() {
            self.metrics.resolve_hits.inc();
        }
        Ok(hit)
    }

    /// Remove `entry`'s flow from both indices. Idempotent; returns whether
    /// a live record was actually removed (and its notification fired).
    pub fn remove(&self, entry: &NatEntry) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        Ok(self.remove_locked(&mut state, &entry.key, RemovalReason::Explicit))
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live record.
    pub fn items(&self) -> Vec<NatEntry> {
        self.state.lock().unwrap().reverse.values().cloned().collect()
    }

    /// Remove every record (one notification each, reason `Shutdown`) and
    /// permanently dispose the table. Later `get`/`add`/`resolve`/`remove`
    /// calls fail with [`Error::Disposed`]. Idempotent.
    ///
    /// Holds the same lock as every other operation: a shutdown concurrent
    /// with in-flight calls is safe, each call either completes before the
    /// teardown or fails disposed after it.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        if state.disposed {
            return;
        }
        let keys: Vec<FlowKey> = state.reverse.keys().cloned().collect();
        for key in keys {
            self.remove_locked(&mut state, &key, RemovalReason::Shutdown);
        }
        state.disposed = true;
        debug!("nat table disposed");
    }

    fn check_open(state: &TableState) -> Result<()> {
        if state.disposed {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn touch_reverse(state: &mut TableState, key: &FlowKey) -> Option<NatEntry> {
        state.reverse.get_mut(key).map(|entry| {
            entry.touch();
            entry.clone()
        })
    }

    fn add_locked(
        &self,
        state: &mut TableState,
        key: FlowKey,
        id: Option<u16>,
        overwrite: bool,
    ) -> Result<NatEntry> {
        self.sweep_locked(state);

        let bucket = key.bucket();
        let id = match id {
            // 0 is the reserved sentinel, never a valid mapping.
            Some(0) => return Err(Error::Conflict("id 0 is reserved".into())),
            Some(explicit) => explicit,
            None => {
                let TableState {
                    forward, allocator, ..
                } = state;
                match allocator.allocate(bucket, |candidate| {
                    forward.contains_key(&MappingKey {
                        bucket,
                        id: candidate,
                    })
                }) {
                    Ok(id) => id,
                    Err(e) => {
                        self.metrics.exhausted.inc();
                        warn!(%bucket, "translation id space exhausted");
                        return Err(e);
                    }
                }
            }
        };

        let mapping = MappingKey { bucket, id };
        let forward_conflict = state.forward.contains_key(&mapping);
        let reverse_conflict = state.reverse.contains_key(&key);
        if forward_conflict || reverse_conflict {
            if !overwrite {
                self.metrics.conflicts.inc();
                let what = if forward_conflict {
                    format!("id {} already mapped in {}", id, bucket)
                } else {
                    format!("flow {} already mapped", key)
                };
                return Err(Error::Conflict(what));
            }
            // Displace whatever holds either key before inserting.
            if let Some(existing) = state.forward.get(&mapping).cloned() {
                self.remove_locked(state, &existing, RemovalReason::Replaced);
            }
            if state.reverse.contains_key(&key) {
                let displaced = key.clone();
                self.remove_locked(state, &displaced, RemovalReason::Replaced);
            }
        }

        let entry = NatEntry::new(key.clone(), id);
        state.forward.insert(mapping, key.clone());
        state.reverse.insert(key, entry.clone());
        self.metrics.insertions.inc();
        self.metrics.set_entries(state.reverse.len());
        debug!(%bucket, id, "mapping registered");
        Ok(entry)
    }

    fn remove_locked(&self, state: &mut TableState, key: &FlowKey, reason: RemovalReason) -> bool {
        let Some(entry) = state.reverse.remove(key) else {
            return false;
        };
        state.forward.remove(&MappingKey {
            bucket: entry.bucket(),
            id: entry.id,
        });
        self.metrics.removals.inc();
        if reason == RemovalReason::Expired {
            self.metrics.evictions.inc();
        }
        self.metrics.set_entries(state.reverse.len());
        debug!(bucket = %entry.bucket(), id = entry.id, ?reason, "mapping removed");
        self.notify_removed(&entry, reason);
        true
    }

    /// Rate-limited cleanup, called from the insertion path: at most one
    /// full scan per ICMP-timeout interval.
    fn sweep_locked(&self, state: &mut TableState) {
        let now = Instant::now();
        if now.duration_since(state.last_sweep) < self.timeouts.icmp {
            return;
        }
        state.last_sweep = now;
        let expired: Vec<FlowKey> = state
            .reverse
            .values()
            .filter(|entry| entry.is_expired(now, &self.timeouts))
            .map(|entry| entry.key.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        trace!(count = expired.len(), "evicting idle mappings");
        for key in expired {
            self.remove_locked(state, &key, RemovalReason::Expired);
        }
    }

    fn notify_removed(&self, entry: &NatEntry, reason: RemovalReason) {
        let Some(listener) = &self.listener else {
            return;
        };
        // Still inside the table's critical section; a panicking listener
        // must not poison the lock or abort the caller's operation.
        if catch_unwind(AssertUnwindSafe(|| listener(entry, reason))).is_err() {
            warn!(id = entry.id, "removal listener panicked");
        }
    }
}

impl Drop for NatTable {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn udp_flow(src_port: u16) -> Flow {
        Flow::new(
            Protocol::Udp,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            src_port,
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            53,
        )
    }

    fn short_timeouts() -> NatTimeouts {
        NatTimeouts {
            tcp: Duration::from_millis(50),
            udp: Duration::from_millis(20),
            icmp: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_first_add_allocates_8001() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add(&udp_flow(5000)).unwrap();
        assert_eq!(entry.id(), 8001);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_refreshes_and_returns_same_record() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let added = table.add(&udp_flow(5000)).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        let got = table.get(&udp_flow(5000)).unwrap().unwrap();
        assert_eq!(got.id(), added.id());
        assert_eq!(got.key(), added.key());
        assert!(got.last_access() > added.last_access());
    }

    #[test]
    fn test_get_miss_is_none() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        assert!(table.get(&udp_flow(5000)).unwrap().is_none());
    }

    #[test]
    fn test_resolve_roundtrip() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add(&udp_flow(5000)).unwrap();

        let resolved = table
            .resolve(IpVersion::V4, Protocol::Udp, entry.id())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key(), entry.key());
    }

    #[test]
    fn test_resolve_miss_is_none() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        assert!(
            table
                .resolve(IpVersion::V4, Protocol::Udp, 9)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_get_or_add_reuses_mapping() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let a = table.get_or_add(&udp_flow(5000)).unwrap();
        let b = table.get_or_add(&udp_flow(5000)).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_add_duplicate_flow_conflicts() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        table.add(&udp_flow(5000)).unwrap();
        let err = table.add(&udp_flow(5000)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.metrics().conflicts.get(), 1);
    }

    #[test]
    fn test_add_with_explicit_id() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add_with(&udp_flow(5000), Some(12345), false).unwrap();
        assert_eq!(entry.id(), 12345);

        let resolved = table
            .resolve(IpVersion::V4, Protocol::Udp, 12345)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key(), entry.key());
    }

    #[test]
    fn test_explicit_id_zero_rejected() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let err = table.add_with(&udp_flow(5000), Some(0), false).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_explicit_id_conflict_without_overwrite() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        table.add_with(&udp_flow(5000), Some(9000), false).unwrap();
        let err = table.add_with(&udp_flow(5001), Some(9000), false).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // Rejected insert leaves the table unchanged.
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_overwrite_displaces_and_notifies() {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let seen = removed.clone();
        let table = NatTable::new(IdentityMode::SourceOnly)
            .on_removed(move |entry, reason| seen.lock().unwrap().push((entry.id(), reason)));

        let old = table.add_with(&udp_flow(5000), Some(9000), false).unwrap();
        let new = table.add_with(&udp_flow(5001), Some(9000), true).unwrap();

        let events = removed.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], (old.id(), RemovalReason::Replaced));
        drop(events);

        // The new record owns the id now.
        let resolved = table
            .resolve(IpVersion::V4, Protocol::Udp, 9000)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key(), new.key());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_overwrite_same_flow_reallocates() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let old = table.add(&udp_flow(5000)).unwrap();
        let new = table.add_with(&udp_flow(5000), None, true).unwrap();
        assert_ne!(old.id(), new.id());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add(&udp_flow(5000)).unwrap();

        assert!(table.remove(&entry).unwrap());
        assert!(!table.remove(&entry).unwrap());
        assert!(table.is_empty());
    }

    #[test]
    fn test_id_reusable_after_remove() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add(&udp_flow(5000)).unwrap();
        table.remove(&entry).unwrap();

        let again = table.add_with(&udp_flow(5001), Some(entry.id()), false).unwrap();
        assert_eq!(again.id(), entry.id());
    }

    #[test]
    fn test_allocator_never_duplicates_live_ids() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let mut ids = std::collections::HashSet::new();
        for port in 0..200 {
            let entry = table.add(&udp_flow(port)).unwrap();
            assert!(ids.insert(entry.id()), "id {} issued twice", entry.id());
        }
    }

    #[test]
    fn test_bijection_invariant() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        for port in 0..50 {
            table.add(&udp_flow(port)).unwrap();
        }
        let items = table.items();
        let mut seen = std::collections::HashSet::new();
        for entry in &items {
            assert!(seen.insert((entry.bucket(), entry.id())));
            let resolved = table
                .resolve(entry.bucket().version, entry.bucket().protocol, entry.id())
                .unwrap()
                .unwrap();
            assert_eq!(resolved.key(), entry.key());
        }
    }

    #[test]
    fn test_idle_eviction_on_insert() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let count = evicted.clone();
        let table = NatTable::with_timeouts(IdentityMode::SourceOnly, short_timeouts())
            .on_removed(move |_, reason| {
                if reason == RemovalReason::Expired {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            });

        table.add(&udp_flow(5000)).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        // Unrelated insert triggers the sweep.
        table.add(&udp_flow(6000)).unwrap();
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
        assert!(table.get(&udp_flow(5000)).unwrap().is_none());
        assert_eq!(table.metrics().evictions.get(), 1);
    }

    #[test]
    fn test_recently_accessed_not_evicted() {
        let table = NatTable::with_timeouts(
            IdentityMode::SourceOnly,
            NatTimeouts {
                tcp: Duration::from_millis(500),
                udp: Duration::from_millis(500),
                icmp: Duration::from_millis(1),
            },
        );

        table.add(&udp_flow(5000)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        table.get(&udp_flow(5000)).unwrap().unwrap();

        // Sweep interval has elapsed but the record was just touched.
        table.add(&udp_flow(6000)).unwrap();
        assert!(table.get(&udp_flow(5000)).unwrap().is_some());
    }

    #[test]
    fn test_sweep_rate_limited() {
        // Long ICMP timeout: the sweep interval never elapses, so even an
        // expired UDP record survives back-to-back inserts.
        let table = NatTable::with_timeouts(
            IdentityMode::SourceOnly,
            NatTimeouts {
                tcp: Duration::from_secs(60),
                udp: Duration::from_millis(1),
                icmp: Duration::from_secs(60),
            },
        );
        table.add(&udp_flow(5000)).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        table.add(&udp_flow(6000)).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_shutdown_notifies_every_record() {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let seen = removed.clone();
        let table = NatTable::new(IdentityMode::SourceOnly)
            .on_removed(move |entry, reason| seen.lock().unwrap().push((entry.id(), reason)));

        table.add(&udp_flow(5000)).unwrap();
        table.add(&udp_flow(5001)).unwrap();
        table.shutdown();

        let events = removed.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(_, r)| *r == RemovalReason::Shutdown));
        drop(events);
        assert!(table.items().is_empty());

        // Idempotent: no further notifications.
        table.shutdown();
        assert_eq!(removed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_disposed_use_fails_distinctly() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add(&udp_flow(5000)).unwrap();
        table.shutdown();

        assert!(matches!(table.get(&udp_flow(5000)), Err(Error::Disposed)));
        assert!(matches!(table.add(&udp_flow(5001)), Err(Error::Disposed)));
        assert!(matches!(
            table.resolve(IpVersion::V4, Protocol::Udp, entry.id()),
            Err(Error::Disposed)
        ));
        assert!(matches!(table.remove(&entry), Err(Error::Disposed)));
    }

    #[test]
    fn test_listener_panic_is_isolated() {
        let table = NatTable::new(IdentityMode::SourceOnly)
            .on_removed(|_, _| panic!("listener bug"));

        let entry = table.add(&udp_flow(5000)).unwrap();
        assert!(table.remove(&entry).unwrap());

        // Table stays usable, lock unpoisoned.
        table.add(&udp_flow(5001)).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_destination_sensitive_fanout() {
        let table = NatTable::new(IdentityMode::SourceAndDestination);
        let mut dns = udp_flow(5000);
        let mut other = udp_flow(5000);
        dns.dst_addr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
        other.dst_addr = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));

        let a = table.add(&dns).unwrap();
        let b = table.add(&other).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_icmp_keyed_by_identifier() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let ping = Flow::new(
            Protocol::Icmp,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            0x1234,
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            0,
        );
        let entry = table.get_or_add(&ping).unwrap();
        let resolved = table
            .resolve(IpVersion::V4, Protocol::Icmp, entry.id())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key().src_port, 0x1234);
    }

    #[test]
    fn test_buckets_isolate_ids() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let udp = table.add(&udp_flow(5000)).unwrap();
        let tcp_flow = Flow::new(
            Protocol::Tcp,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            5000,
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            443,
        );
        let tcp = table.add(&tcp_flow).unwrap();

        // Same id in different buckets is fine; resolution stays separate.
        assert_eq!(udp.id(), tcp.id());
        let resolved = table
            .resolve(IpVersion::V4, Protocol::Tcp, tcp.id())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key().protocol, Protocol::Tcp);
    }

    #[test]
    fn test_metrics_track_activity() {
        let table = NatTable::new(IdentityMode::SourceOnly);
        let entry = table.add(&udp_flow(5000)).unwrap();
        table.resolve(IpVersion::V4, Protocol::Udp, entry.id()).unwrap();
        table.resolve(IpVersion::V4, Protocol::Udp, 9).unwrap();
        table.remove(&entry).unwrap();

        let m = table.metrics();
        assert_eq!(m.insertions.get(), 1);
        assert_eq!(m.removals.get(), 1);
        assert_eq!(m.resolve_hits.get(), 1);
        assert_eq!(m.resolve_misses.get(), 1);
        assert_eq!(m.entries(), 0);
    }
}
