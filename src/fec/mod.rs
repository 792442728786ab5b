// Copyright (c) 2024, The QuicFuscate Project Authors.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright
//       notice, this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above
//       copyright notice, this list of conditions and the following disclaimer
//       in the documentation and/or other materials provided with the
//       distribution.
//
//     * Neither the name of the copyright holder nor the names of its
//       contributors may be used to endorse or promote products derived from
//       this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Shard-based erasure codec over GF(2^8): a Reed-Solomon-style
//! Vandermonde scheme (any K of K+M shards recover the message) and an
//! XOR single-parity mode for small K. See spec section 4.2.

pub mod decoder;
pub mod encoder;
pub mod gf;
pub mod shard;

pub use decoder::{FecStatus, RsDecoder, XorDecoder};
pub use encoder::{RsEncoder, XorEncoder};
pub use shard::{Shard, ShardHeader, MAX_SHARD_PAYLOAD, SHARD_ENVELOPE_LEN, XOR_MAX_K};

/// Loss-rate-driven parity-count selection for the next RS group, per
/// spec section 4.2. XOR mode ignores this (fixed K<=4, M=1).
pub fn parity_for_loss_rate(k: u8, loss_rate: f64) -> u8 {
    if loss_rate < 0.05 {
        2
    } else if loss_rate < 0.10 {
        3
    } else if loss_rate < 0.20 {
        4
    } else if loss_rate < 0.30 {
        5
    } else {
        k
    }
}

/// Adaptive RS encoder/decoder pair that tracks an observed loss rate and
/// retargets `M` for the next group via [`parity_for_loss_rate`]. Owns one
/// encoder (per-sender, per spec section 5) and one decoder (per-receiver).
pub struct AdaptiveRs {
    encoder: RsEncoder,
    decoder: RsDecoder,
    k: u8,
    m: u8,
}

impl AdaptiveRs {
    pub fn new(k: u8, initial_m: u8) -> Self {
        Self {
            encoder: RsEncoder::new(),
            decoder: RsDecoder::new(),
            k,
            m: initial_m,
        }
    }

    /// Adjusts `M` for the *next* call to [`encode`](Self::encode); the
    /// in-flight group is unaffected.
    pub fn set_loss_rate(&mut self, loss_rate: f64) {
        let next_m = parity_for_loss_rate(self.k, loss_rate);
        if next_m != self.m {
            log::info!(
                "FEC parity retargeted: M {} -> {} (loss_rate={:.3})",
                self.m,
                next_m,
                loss_rate
            );
        }
        self.m = next_m;
    }

    pub fn encode(&mut self, buf: &[u8]) -> Result<(u32, Vec<Shard>), crate::error::ConfigError> {
        self.encoder.encode(buf, self.k, self.m)
    }

    pub fn decode(&mut self, shard: Shard) -> FecStatus {
        self.decoder.decode(shard)
    }
}
