//! Error taxonomy for the relay core.
//!
//! Per-packet and per-operation outcomes (dropped packets, FEC decode
//! failures, congestion signals) are never modeled as errors here — they
//! are plain status enums returned from the operation, matching the "no
//! exceptions from the data plane" rule. `thiserror` is reserved for
//! construction-time misuse that a host should treat as a programming
//! error (bad config, out-of-range parameters).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be > 0")]
    MustBePositive { field: &'static str },
    #[error("min_bps ({min}) must be <= max_bps ({max})")]
    BpsRangeInverted { min: u64, max: u64 },
    #[error("K must be in 1..=255, got {0}")]
    InvalidK(u32),
    #[error("M must be in 0..=255, got {0}")]
    InvalidM(u32),
    #[error("XOR mode requires K <= 4 and M == 1, got K={k} M={m}")]
    InvalidXorShape { k: u32, m: u32 },
    #[error("invalid TOML configuration: {0}")]
    Toml(String),
}
