//! Edge Filter (C3): fast-path packet classifier. See spec sections 4.3
//! and 6. Shared maps use atomic counters and last-writer-wins
//! replacement per the concurrency model in section 5 — no external
//! locking is required for correctness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const BLACKLIST_THRESHOLD: u64 = 100;
const BLACKLIST_DECAY_NS: u64 = 60_000_000_000;
const RATE_WINDOW_NS: u64 = 1_000_000_000;
const RATE_LIMIT_CAP: u64 = 10_000;
const MIN_PACKET_LEN: usize = 40;
const BLACKLIST_CAPACITY: usize = 100_000;
const RATE_LIMIT_CAPACITY: usize = 100_000;
const CONNECTION_CACHE_CAPACITY: usize = 50_000;

/// Why a packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InvalidMagic,
    RateLimit,
    Blacklist,
    TooShort,
}

/// Outcome of [`EdgeFilter::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop(DropReason),
    PassNonUdp,
}

/// Minimal parsed view of an inbound datagram the filter needs. The host
/// is responsible for Ethernet/IP/UDP parsing; this crate only classifies
/// what the host hands it.
pub struct Packet<'a> {
    pub is_udp: bool,
    pub src_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub udp_payload: &'a [u8],
    pub magic: u32,
}

struct BlacklistEntry {
    fail_count: u64,
    last_fail_ns: u64,
}

struct RateEntry {
    window_start_ns: u64,
    packet_count: u64,
}

struct CacheEntry {
    magic: u32,
    last_seen_ns: u64,
}

/// Indexed, per-CPU-friendly counter bank; each counter is a plain atomic
/// here since the filter itself is already lock-free at the map level —
/// one bank is shared across receiver threads.
#[derive(Default)]
pub struct CounterBank {
    pub passed: AtomicU64,
    pub dropped_blacklist: AtomicU64,
    pub dropped_rate_limit: AtomicU64,
    pub dropped_invalid_magic: AtomicU64,
    pub dropped_too_short: AtomicU64,
    pub dropped_not_udp: AtomicU64,
    pub total_processed: AtomicU64,
}

impl CounterBank {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Edge Filter state: blacklist, rate-limit, and connection-cache maps
/// plus the counter bank. Shared across receiver threads (spec section 5);
/// internal mutexes stand in for what a production build would implement
/// as sharded lock-free maps.
pub struct EdgeFilter {
    dst_port: u16,
    blacklist: Mutex<HashMap<u32, BlacklistEntry>>,
    rate_limit: Mutex<HashMap<u32, RateEntry>>,
    connections: Mutex<HashMap<u64, CacheEntry>>,
    pub counters: CounterBank,
}

fn evict_lru_if_full<K: Eq + std::hash::Hash + Copy, V>(
    map: &mut HashMap<K, V>,
    capacity: usize,
    incoming: K,
) {
    if map.contains_key(&incoming) {
        return;
    }
    if map.len() >= capacity {
        if let Some(&victim) = map.keys().next() {
            map.remove(&victim);
        }
    }
}

impl EdgeFilter {
    pub fn new(dst_port: u16) -> Self {
        Self {
            dst_port,
            blacklist: Mutex::new(HashMap::new()),
            rate_limit: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            counters: CounterBank::default(),
        }
    }

    fn connection_key(src_ip: u32, src_port: u16) -> u64 {
        ((src_ip as u64) << 32) | (src_port as u64)
    }

    fn record_failure(&self, src_ip: u32, now_ns: u64) {
        let mut bl = self.blacklist.lock().unwrap();
        evict_lru_if_full(&mut bl, BLACKLIST_CAPACITY, src_ip);
        let entry = bl.entry(src_ip).or_insert(BlacklistEntry {
            fail_count: 0,
            last_fail_ns: now_ns,
        });
        entry.fail_count += 1;
        entry.last_fail_ns = now_ns;
    }

    /// Classifies one inbound packet per spec section 4.3, in order:
    /// blacklist-with-decay, rate limit, length gate, connection fast
    /// path, full magic match.
    pub fn classify(&self, packet: &Packet, valid_magics: &[u32], now_ns: u64) -> Verdict {
        CounterBank::bump(&self.counters.total_processed);

        if !packet.is_udp || packet.dst_port != self.dst_port {
            CounterBank::bump(&self.counters.dropped_not_udp);
            return Verdict::PassNonUdp;
        }

        // 1. Blacklist with decay.
        {
            let mut bl = self.blacklist.lock().unwrap();
            if let Some(entry) = bl.get_mut(&packet.src_ip) {
                let periods = (now_ns.saturating_sub(entry.last_fail_ns)) / BLACKLIST_DECAY_NS;
                if periods > 0 {
                    entry.fail_count = entry.fail_count.checked_shr(periods.min(63) as u32).unwrap_or(0);
                    entry.last_fail_ns = now_ns;
                }
                if entry.fail_count >= BLACKLIST_THRESHOLD {
                    CounterBank::bump(&self.counters.dropped_blacklist);
                    return Verdict::Drop(DropReason::Blacklist);
                }
            }
        }

        // 2. Rate limit.
        {
            let mut rl = self.rate_limit.lock().unwrap();
            evict_lru_if_full(&mut rl, RATE_LIMIT_CAPACITY, packet.src_ip);
            match rl.get_mut(&packet.src_ip) {
                None => {
                    rl.insert(
                        packet.src_ip,
                        RateEntry {
                            window_start_ns: now_ns,
                            packet_count: 1,
                        },
                    );
                }
                Some(entry) => {
                    if now_ns.saturating_sub(entry.window_start_ns) < RATE_WINDOW_NS {
                        if entry.packet_count >= RATE_LIMIT_CAP {
                            CounterBank::bump(&self.counters.dropped_rate_limit);
                            return Verdict::Drop(DropReason::RateLimit);
                        }
                        entry.packet_count += 1;
                    } else {
                        entry.window_start_ns = now_ns;
                        entry.packet_count = 1;
                    }
                }
            }
        }

        // 3. Length gate.
        if packet.udp_payload.len() < MIN_PACKET_LEN {
            CounterBank::bump(&self.counters.dropped_too_short);
            return Verdict::Drop(DropReason::TooShort);
        }

        let key = Self::connection_key(packet.src_ip, packet.src_port);

        // 4. Connection fast path.
        {
            let mut conns = self.connections.lock().unwrap();
            if let Some(entry) = conns.get_mut(&key) {
                if entry.magic == packet.magic {
                    entry.last_seen_ns = now_ns;
                    CounterBank::bump(&self.counters.passed);
                    return Verdict::Pass;
                }
            }
        }

        // 5. Full magic match.
        if valid_magics.contains(&packet.magic) {
            let mut conns = self.connections.lock().unwrap();
            evict_lru_if_full(&mut conns, CONNECTION_CACHE_CAPACITY, key);
            conns.insert(
                key,
                CacheEntry {
                    magic: packet.magic,
                    last_seen_ns: now_ns,
                },
            );
            CounterBank::bump(&self.counters.passed);
            return Verdict::Pass;
        }

        self.record_failure(packet.src_ip, now_ns);
        CounterBank::bump(&self.counters.dropped_invalid_magic);
        Verdict::Drop(DropReason::InvalidMagic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000_000;

    fn make(src_ip: u32, src_port: u16, magic: u32, payload: &[u8]) -> Packet<'_> {
        Packet {
            is_udp: true,
            src_ip,
            src_port,
            dst_port: 4433,
            udp_payload: payload,
            magic,
        }
    }

    #[test]
    fn passes_valid_magic() {
        let filter = EdgeFilter::new(4433);
        let payload = [0u8; 40];
        let p = make(0x0A000001, 1234, 0xABCD, &payload);
        assert_eq!(filter.classify(&p, &[0xABCD], SEC), Verdict::Pass);
    }

    #[test]
    fn drops_too_short() {
        let filter = EdgeFilter::new(4433);
        let payload = [0u8; 10];
        let p = make(0x0A000001, 1234, 0xABCD, &payload);
        assert_eq!(
            filter.classify(&p, &[0xABCD], SEC),
            Verdict::Drop(DropReason::TooShort)
        );
    }

    #[test]
    fn non_udp_passes_through() {
        let filter = EdgeFilter::new(4433);
        let payload = [0u8; 40];
        let mut p = make(1, 1, 0xABCD, &payload);
        p.is_udp = false;
        assert_eq!(filter.classify(&p, &[0xABCD], SEC), Verdict::PassNonUdp);
    }

    #[test]
    fn blacklists_after_100_invalid_magics() {
        let filter = EdgeFilter::new(4433);
        let payload = [0u8; 40];
        let p = make(0x0A000002, 1, 0xDEAD_BEEF, &payload);
        for _ in 0..100 {
            let v = filter.classify(&p, &[0xABCD], SEC);
            assert_eq!(v, Verdict::Drop(DropReason::InvalidMagic));
        }
        for _ in 0..20 {
            let v = filter.classify(&p, &[0xABCD], SEC);
            assert_eq!(v, Verdict::Drop(DropReason::Blacklist));
        }
    }

    #[test]
    fn rate_limit_trips_after_10000_in_one_window() {
        let filter = EdgeFilter::new(4433);
        let payload = [0u8; 40];
        let p = make(0x0A000003, 1, 0xABCD, &payload);
        for _ in 0..10_000 {
            let v = filter.classify(&p, &[0xABCD], SEC);
            assert_ne!(v, Verdict::Drop(DropReason::RateLimit));
        }
        assert_eq!(
            filter.classify(&p, &[0xABCD], SEC),
            Verdict::Drop(DropReason::RateLimit)
        );
    }

    #[test]
    fn blacklist_decays_after_60_seconds() {
        let filter = EdgeFilter::new(4433);
        let payload = [0u8; 40];
        let p = make(0x0A000004, 1, 0xDEAD_BEEF, &payload);
        for _ in 0..100 {
            filter.classify(&p, &[0xABCD], SEC);
        }
        let valid = make(0x0A000004, 1, 0xABCD, &payload);
        let verdict = filter.classify(&valid, &[0xABCD], SEC + BLACKLIST_DECAY_NS);
        assert_eq!(verdict, Verdict::Pass);
    }
}
