//! Token Bucket & Congestion Controller (C4): rate pacing with burst cap,
//! RTT-sampled bandwidth estimate, loss-reactive state machine. See spec
//! section 4.4; directly ported off the original adaptive pacing engine's
//! refill/acquire/commit/ack/report_loss split, with the controller made
//! clock-free (the host passes `now_ns` instead of the core sampling a
//! monotonic clock).

use crate::error::ConfigError;

const INITIAL_TOKENS: f64 = 65_536.0;
const INITIAL_RTT_US: f64 = 100_000.0;
const INITIAL_CWND: u64 = 10 * 1400;
const MIN_BURST_BYTES: f64 = 65_536.0;
const MIN_WAIT_NS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
    Recovery,
}

/// xorshift64 PRNG (shifts 13, 7, 17), matching the Shaper's generator so
/// both consume the same jitter primitive without sharing state.
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xDEAD_BEEF } else { seed },
        }
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `[0, bound)`. `bound == 0` always yields 0.
    pub fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            0
        } else {
            self.next() % bound
        }
    }
}

/// Per-flow pacer/congestion-controller state. Owned by a single thread
/// (spec section 5); a sender pacing multiple flows instantiates one per
/// flow.
pub struct Pacer {
    target_bps: u64,
    min_bps: u64,
    max_bps: u64,
    tokens: f64,
    tokens_per_ns: f64,
    last_refill_ns: u64,
    rtt_us: f64,
    rtt_var: f64,
    rtt_min_us: u64,
    bw_estimate_bps: u64,
    bytes_in_flight: u64,
    cwnd: u64,
    ssthresh: u64,
    state: CongestionState,
    last_loss_ns: u64,
    jitter_enabled: bool,
    jitter_range_ns: u64,
    rng: Xorshift64,
    total_bytes: u64,
    total_packets: u64,
}

impl Pacer {
    pub fn new(initial_bps: u64, now_ns: u64, rng_seed: u64) -> Result<Self, ConfigError> {
        if initial_bps == 0 {
            return Err(ConfigError::MustBePositive { field: "initial_bps" });
        }
        Ok(Self {
            target_bps: initial_bps,
            min_bps: initial_bps / 10,
            max_bps: initial_bps * 2,
            tokens: INITIAL_TOKENS,
            tokens_per_ns: initial_bps as f64 / 8.0 / 1e9,
            last_refill_ns: now_ns,
            rtt_us: INITIAL_RTT_US,
            rtt_var: INITIAL_RTT_US / 2.0,
            rtt_min_us: u64::MAX,
            bw_estimate_bps: 0,
            bytes_in_flight: 0,
            cwnd: INITIAL_CWND,
            ssthresh: u64::MAX,
            state: CongestionState::SlowStart,
            last_loss_ns: 0,
            jitter_enabled: false,
            jitter_range_ns: 0,
            rng: Xorshift64::new(rng_seed),
            total_bytes: 0,
            total_packets: 0,
        })
    }

    pub fn set_range(&mut self, min_bps: u64, max_bps: u64) -> Result<(), ConfigError> {
        if min_bps > max_bps {
            return Err(ConfigError::BpsRangeInverted { min: min_bps, max: max_bps });
        }
        self.min_bps = min_bps;
        self.max_bps = max_bps;
        Ok(())
    }

    pub fn enable_jitter(&mut self, range_ns: u64) {
        self.jitter_enabled = true;
        self.jitter_range_ns = range_ns;
    }

    pub fn state(&self) -> CongestionState {
        self.state
    }

    pub fn target_bps(&self) -> u64 {
        self.target_bps
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn cwnd(&self) -> u64 {
        self.cwnd
    }

    fn max_burst(&self) -> f64 {
        let burst = self.target_bps as f64 / 8.0 * self.rtt_us / 1e6;
        burst.max(MIN_BURST_BYTES)
    }

    fn refill(&mut self, now_ns: u64) {
        let elapsed = now_ns.saturating_sub(self.last_refill_ns) as f64;
        self.tokens += elapsed * self.tokens_per_ns;
        let cap = self.max_burst();
        if self.tokens > cap {
            self.tokens = cap;
        }
        self.last_refill_ns = now_ns;
    }

    /// Returns the number of nanoseconds the host should wait before
    /// calling [`commit`](Self::commit), or 0 if emission may proceed now.
    pub fn acquire(&mut self, bytes: u64, now_ns: u64) -> u64 {
        self.refill(now_ns);

        if self.bytes_in_flight + bytes > self.cwnd {
            return (self.rtt_us * 1000.0 / 4.0) as u64;
        }

        if self.tokens >= bytes as f64 {
            return 0;
        }

        let deficit = bytes as f64 - self.tokens;
        let mut wait_ns = (deficit / self.tokens_per_ns) as u64;
        wait_ns = wait_ns.max(MIN_WAIT_NS);

        if self.jitter_enabled && self.jitter_range_ns > 0 {
            wait_ns += self.rng.below(self.jitter_range_ns);
        }
        wait_ns
    }

    /// Debits `bytes` from the token bucket and records it as in-flight.
    /// Must be totally ordered with prior successful `acquire` calls
    /// (spec section 5).
    pub fn commit(&mut self, bytes: u64) {
        // Debt carries forward rather than being clamped at 0: a caller
        // that commits immediately after acquire (without actually
        // sleeping `wait_ns`) must have that shortfall repaid by a later
        // refill, or the bucket forgives it and the steady-state rate
        // bound (spec section 8) no longer holds.
        self.tokens -= bytes as f64;
        self.bytes_in_flight += bytes;
        self.total_bytes += bytes;
        self.total_packets += 1;
    }

    /// Acknowledges `bytes` as delivered, growing `cwnd` per the current
    /// congestion state.
    pub fn ack(&mut self, bytes: u64) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes);

        match self.state {
            CongestionState::SlowStart => {
                self.cwnd += bytes;
                if self.cwnd >= self.ssthresh {
                    self.state = CongestionState::CongestionAvoidance;
                }
            }
            CongestionState::CongestionAvoidance => {
                self.cwnd += 1400 * bytes / self.cwnd.max(1);
            }
            CongestionState::Recovery => {
                if self.bytes_in_flight < self.cwnd / 2 {
                    self.state = CongestionState::CongestionAvoidance;
                }
            }
        }
    }

    /// Folds an RTT sample into the smoothed estimate (TCP-style EWMA)
    /// and derives a bandwidth estimate when bytes are in flight.
    pub fn update_rtt(&mut self, sample_us: u64) {
        let sample = sample_us as f64;
        let diff = sample - self.rtt_us;
        self.rtt_var = self.rtt_var * 0.75 + diff.abs() * 0.25;
        self.rtt_us = self.rtt_us * 0.875 + sample * 0.125;

        if sample_us < self.rtt_min_us {
            self.rtt_min_us = sample_us;
        }

        if self.bytes_in_flight > 0 && sample_us > 0 {
            let bw = self.bytes_in_flight * 8 * 1_000_000 / sample_us;
            self.bw_estimate_bps = if self.bw_estimate_bps == 0 {
                bw
            } else {
                (self.bw_estimate_bps as f64 * 0.9 + bw as f64 * 0.1) as u64
            };
            self.target_bps = self.bw_estimate_bps.clamp(self.min_bps, self.max_bps);
            self.tokens_per_ns = self.target_bps as f64 / 8.0 / 1e9;
        }
    }

    /// Reports a loss observed at `now_ns`. Debounced to at most once per
    /// RTT; multiplicatively backs off `target_bps` to 70% (floored at
    /// `min_bps`) and transitions the congestion state machine.
    pub fn report_loss(&mut self, now_ns: u64) {
        if now_ns.saturating_sub(self.last_loss_ns) < (self.rtt_us * 1000.0) as u64 {
            return;
        }
        self.last_loss_ns = now_ns;

        match self.state {
            CongestionState::SlowStart | CongestionState::CongestionAvoidance => {
                self.ssthresh = self.cwnd / 2;
                self.cwnd = self.ssthresh;
                self.state = CongestionState::Recovery;
            }
            CongestionState::Recovery => {}
        }

        self.target_bps = (self.target_bps * 7 / 10).max(self.min_bps);
        self.tokens_per_ns = self.target_bps as f64 / 8.0 / 1e9;
    }
}
