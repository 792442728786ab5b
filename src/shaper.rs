//! Traffic Shaper (C5): profile-driven padding and emission-delay
//! synthesis. See spec section 4.5. Each shaper owns an independent
//! xorshift64 PRNG instance, same generator as [`crate::pacer::Xorshift64`]
//! but never shared with it.

use crate::pacer::Xorshift64;

const HEADER_OVERHEAD: u32 = 102;
const LENGTH_SUFFIX: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    None,
    Https,
    Video,
    Voip,
    Gaming,
}

struct ProfileParams {
    size_min: usize,
    size_max: usize,
    interval_us: u64,
    interval_variance_us: u64,
    burst_probability_pct: u8,
    burst_size: u32,
    idle_probability_pct: u8,
    idle_duration_ns: u64,
}

fn params_for(profile: Profile) -> ProfileParams {
    match profile {
        Profile::None => ProfileParams {
            size_min: 0,
            size_max: 0,
            interval_us: 0,
            interval_variance_us: 0,
            burst_probability_pct: 0,
            burst_size: 0,
            idle_probability_pct: 0,
            idle_duration_ns: 0,
        },
        Profile::Https => ProfileParams {
            size_min: 200,
            size_max: 1200,
            interval_us: 20_000,
            interval_variance_us: 8_000,
            burst_probability_pct: 5,
            burst_size: 6,
            idle_probability_pct: 2,
            idle_duration_ns: 2_000_000_000,
        },
        Profile::Video => ProfileParams {
            size_min: 800,
            size_max: 1400,
            interval_us: 16_667,
            interval_variance_us: 2_000,
            burst_probability_pct: 2,
            burst_size: 3,
            idle_probability_pct: 0,
            idle_duration_ns: 0,
        },
        Profile::Voip => ProfileParams {
            size_min: 60,
            size_max: 200,
            interval_us: 20_000,
            interval_variance_us: 1_000,
            burst_probability_pct: 0,
            burst_size: 0,
            idle_probability_pct: 1,
            idle_duration_ns: 500_000_000,
        },
        Profile::Gaming => ProfileParams {
            size_min: 40,
            size_max: 300,
            interval_us: 33_000,
            interval_variance_us: 10_000,
            burst_probability_pct: 8,
            burst_size: 4,
            idle_probability_pct: 0,
            idle_duration_ns: 0,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShaperState {
    Normal,
    Burst,
    Idle,
}

/// Per-flow shaper state, owned by a single thread (spec section 5).
pub struct Shaper {
    profile: Profile,
    params: ProfileParams,
    mtu: u32,
    mss: u32,
    max_pad: usize,
    state: ShaperState,
    burst_remaining: u32,
    idle_until_ns: u64,
    last_send_ns: u64,
    rng: Xorshift64,
}

impl Shaper {
    pub fn new(profile: Profile, mtu: u32, rng_seed: u64) -> Self {
        let mss = mtu.saturating_sub(HEADER_OVERHEAD);
        let max_pad = (100usize).min(mss as usize / 10);
        Self {
            profile,
            params: params_for(profile),
            mtu,
            mss,
            max_pad,
            state: ShaperState::Normal,
            burst_remaining: 0,
            idle_until_ns: 0,
            last_send_ns: 0,
            rng: Xorshift64::new(rng_seed),
        }
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    pub fn mss(&self) -> u32 {
        self.mss
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    fn percent_hit(&mut self, pct: u8) -> bool {
        pct > 0 && self.rng.below(100) < pct as u64
    }

    /// Advances the NORMAL/BURST/IDLE state machine for one datagram,
    /// returning the delay implied purely by the state transition (not
    /// yet including the interval pacing computed afterward).
    fn advance_state(&mut self, now_ns: u64) -> Option<u64> {
        match self.state {
            ShaperState::Idle => {
                if now_ns >= self.idle_until_ns {
                    self.state = ShaperState::Normal;
                    None
                } else {
                    Some(self.idle_until_ns - now_ns)
                }
            }
            ShaperState::Burst => {
                if self.burst_remaining > 0 {
                    self.burst_remaining -= 1;
                }
                if self.burst_remaining == 0 {
                    self.state = ShaperState::Normal;
                }
                let delay = 100_000 + self.rng.below(400_000);
                Some(delay)
            }
            ShaperState::Normal => {
                if self.percent_hit(self.params.burst_probability_pct) {
                    self.state = ShaperState::Burst;
                    self.burst_remaining = self.params.burst_size;
                } else if self.percent_hit(self.params.idle_probability_pct) {
                    self.state = ShaperState::Idle;
                    self.idle_until_ns = now_ns + self.params.idle_duration_ns;
                    return Some(self.params.idle_duration_ns);
                }
                None
            }
        }
    }

    /// Pads `buf[..len]` in place (capacity `buf.len()` must be at least
    /// `max_len`), appending a 2-byte big-endian original-length suffix,
    /// and returns the emission delay in nanoseconds. Mutates shaper
    /// state. Panics if `len + LENGTH_SUFFIX` exceeds `max_len` or the
    /// buffer's capacity — the host is expected to size buffers with
    /// headroom for the worst case.
    pub fn process_outbound(&mut self, buf: &mut Vec<u8>, len: usize, max_len: usize, now_ns: u64) -> u64 {
        assert!(len + LENGTH_SUFFIX <= max_len, "buffer has no room for length suffix");
        buf.truncate(len);

        let envelope_cap = max_len.min(self.mss as usize);
        let max_total = envelope_cap.saturating_sub(LENGTH_SUFFIX);

        let skip_padding = self.params.size_min <= len
            && len <= self.params.size_max
            && self.percent_hit(40);

        let target_len = if skip_padding || self.profile == Profile::None {
            len
        } else {
            let lo = len;
            let hi = self.params.size_max.min(len + self.max_pad).max(lo);
            let span = (hi - lo) as u64 + 1;
            let sample = lo as u64 + self.rng.below(span);
            (sample as usize).min(max_total)
        };

        let mut cursor = buf.len();
        buf.resize(target_len, 0);
        while cursor < target_len {
            let chunk = self.rng.next().to_le_bytes();
            let remaining = target_len - cursor;
            let take = remaining.min(chunk.len());
            buf[cursor..cursor + take].copy_from_slice(&chunk[..take]);
            cursor += take;
        }

        buf.extend_from_slice(&(len as u16).to_be_bytes());

        let state_delay = self.advance_state(now_ns);
        let delay = match self.state {
            ShaperState::Burst => state_delay.unwrap_or(100_000),
            _ => {
                if let Some(d) = state_delay {
                    d
                } else {
                    let since_last_us = now_ns.saturating_sub(self.last_send_ns) / 1000;
                    let interval = self.params.interval_us;
                    let half_var = self.params.interval_variance_us / 2;
                    if since_last_us < interval.saturating_sub(half_var) {
                        let deficit_us = interval - since_last_us;
                        (deficit_us * 1000) + self.rng.below(self.params.interval_variance_us.max(1) * 1000)
                    } else {
                        self.rng.below((half_var.max(1)) * 1000)
                    }
                }
            }
        };

        self.last_send_ns = now_ns + delay;
        delay
    }

    /// Strips the trailing 2-byte original-length suffix; fails safe by
    /// returning `len` unchanged if the suffix is absent or implausible.
    pub fn process_inbound(&self, buf: &[u8]) -> usize {
        let len = buf.len();
        if len < LENGTH_SUFFIX {
            return len;
        }
        let suffix = u16::from_be_bytes([buf[len - 2], buf[len - 1]]) as usize;
        if suffix > 0 && suffix <= len - LENGTH_SUFFIX {
            suffix
        } else {
            len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_prefix() {
        let mut shaper = Shaper::new(Profile::Https, 1500, 7);
        let original = vec![0xAAu8; 200];
        let mut buf = original.clone();
        shaper.process_outbound(&mut buf, 200, 1200, 0);
        assert!(buf.len() >= 200 + 2);
        let recovered_len = shaper.process_inbound(&buf);
        assert_eq!(recovered_len, 200);
        assert_eq!(&buf[..200], &original[..]);
    }

    #[test]
    fn https_profile_produces_bounded_datagram() {
        let mut shaper = Shaper::new(Profile::Https, 1500, 123);
        let mut buf = vec![0u8; 200];
        shaper.process_outbound(&mut buf, 200, 1200, 0);
        assert!(buf.len() >= 200 && buf.len() <= 1200);
    }

    #[test]
    fn inbound_fails_safe_on_garbage() {
        let shaper = Shaper::new(Profile::None, 1500, 1);
        let buf = vec![0xFFu8; 10];
        assert_eq!(shaper.process_inbound(&buf), 10);
    }

    #[test]
    fn mss_derived_from_mtu() {
        let shaper = Shaper::new(Profile::None, 1500, 1);
        assert_eq!(shaper.mss(), 1500 - 102);
    }

    #[test]
    fn padding_never_exceeds_max_pad_even_when_size_min_is_far_above_payload() {
        // Profile::Video's size_min (800) is far above this 100-byte
        // payload; the pad must still stay within max_pad, not jump to
        // size_min.
        for seed in 0..20u64 {
            let mut shaper = Shaper::new(Profile::Video, 1500, seed);
            let mut buf = vec![0u8; 100];
            shaper.process_outbound(&mut buf, 100, 1200, 0);
            assert!(
                buf.len() <= 100 + shaper.max_pad + LENGTH_SUFFIX,
                "seed {seed}: padded len {} exceeds len+max_pad+suffix",
                buf.len()
            );
        }
    }
}
