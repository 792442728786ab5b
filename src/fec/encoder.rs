//! FEC encode: split a buffer into K data shards plus M Vandermonde
//! parity shards (RS mode), or K data shards plus one XOR parity shard
//! (XOR mode). See spec section 4.2.

use super::gf;
use super::shard::{Shard, ShardHeader, MAX_SHARD_PAYLOAD, XOR_MAX_K};
use crate::error::ConfigError;
use crate::optimize::MemoryPool;
use rayon::prelude::*;
use std::sync::Arc;

/// Shard scratch buffers are pooled rather than freshly allocated per
/// group: one block per in-flight data/parity shard, sized to the
/// largest possible shard payload.
const POOL_CAPACITY: usize = 16;

fn validate_k_m(k: u8, m: u8) -> Result<(), ConfigError> {
    if k == 0 {
        return Err(ConfigError::InvalidK(k as u32));
    }
    if (k as u32) + (m as u32) > 255 {
        return Err(ConfigError::InvalidM(m as u32));
    }
    Ok(())
}

/// `vander(x, j) = x^j` in GF(2^8), built iteratively per spec section 4.2.
fn vandermonde_row(x: u8, cols: usize) -> Vec<u8> {
    let mut row = Vec::with_capacity(cols);
    let mut v = 1u8;
    for _ in 0..cols {
        row.push(v);
        v = gf::mul(v, x);
    }
    row
}

/// Reed-Solomon-style systematic encoder over GF(2^8). Maintains a
/// monotonically increasing group id; per spec section 5, a shared
/// encoder across threads needs external synchronization — instantiate
/// one per sender.
pub struct RsEncoder {
    next_group_id: u32,
    pool: Arc<MemoryPool>,
}

impl RsEncoder {
    pub fn new() -> Self {
        gf::init();
        Self {
            next_group_id: 0,
            pool: Arc::new(MemoryPool::new(POOL_CAPACITY, MAX_SHARD_PAYLOAD)),
        }
    }

    /// Encodes `buf` into `k` data shards and `m` parity shards. Shard
    /// payload size is `ceil(len(buf)/k)`, capped at `MAX_SHARD_PAYLOAD`,
    /// and rounded up to a multiple of 16 to survive the `size_field * 16`
    /// wire encoding (spec section 9).
    pub fn encode(&mut self, buf: &[u8], k: u8, m: u8) -> Result<(u32, Vec<Shard>), ConfigError> {
        validate_k_m(k, m)?;
        let kk = k as usize;
        let shard_len = {
            let raw = (buf.len() + kk - 1) / kk;
            let raw = raw.max(16);
            let rounded = (raw + 15) / 16 * 16;
            rounded.min(MAX_SHARD_PAYLOAD / 16 * 16)
        };
        if shard_len == 0 || shard_len % 16 != 0 {
            return Err(ConfigError::MustBePositive { field: "shard_len" });
        }

        let mut data_shards: Vec<Vec<u8>> = Vec::with_capacity(kk);
        for i in 0..kk {
            let start = i * shard_len;
            let mut block = self.pool.alloc();
            if start < buf.len() {
                let end = (start + shard_len).min(buf.len());
                block[..end - start].copy_from_slice(&buf[start..end]);
            }
            data_shards.push(block[..shard_len].to_vec());
            self.pool.free(block);
        }

        let group_id = self.next_group_id;
        self.next_group_id = self.next_group_id.wrapping_add(1);

        let mut shards = Vec::with_capacity(kk + m as usize);
        for (i, data) in data_shards.iter().enumerate() {
            shards.push(Shard {
                header: ShardHeader {
                    group_id,
                    index: i as u8,
                    k,
                    m,
                    size_field: (shard_len / 16) as u8,
                    xor_mode: false,
                },
                payload: data.clone(),
            });
        }

        for p in 0..m {
            let x = k + p + 1;
            let coefs = vandermonde_row(x, kk);
            let mut block = self.pool.alloc();
            block[..shard_len].par_iter_mut().enumerate().for_each(|(byte, out)| {
                let mut acc = 0u8;
                for (d, data) in data_shards.iter().enumerate() {
                    acc = gf::mul_add(data[byte], coefs[d], acc);
                }
                *out = acc;
            });
            let parity = block[..shard_len].to_vec();
            self.pool.free(block);
            shards.push(Shard {
                header: ShardHeader {
                    group_id,
                    index: k + p,
                    k,
                    m,
                    size_field: (shard_len / 16) as u8,
                    xor_mode: false,
                },
                payload: parity,
            });
        }

        Ok((group_id, shards))
    }
}

impl Default for RsEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// XOR single-parity encoder: `K <= 4`, `M == 1`. The parity shard is the
/// byte-wise XOR of all data shards.
pub struct XorEncoder {
    next_group_id: u32,
}

impl XorEncoder {
    pub fn new() -> Self {
        Self { next_group_id: 0 }
    }

    pub fn encode(&mut self, buf: &[u8], k: u8) -> Result<(u32, Vec<Shard>), ConfigError> {
        if k == 0 || k > XOR_MAX_K {
            return Err(ConfigError::InvalidXorShape { k: k as u32, m: 1 });
        }
        let kk = k as usize;
        let shard_len = ((buf.len() + kk - 1) / kk).max(1).min(MAX_SHARD_PAYLOAD);

        let mut data_shards: Vec<Vec<u8>> = Vec::with_capacity(kk);
        for i in 0..kk {
            let start = i * shard_len;
            let mut block = vec![0u8; shard_len];
            if start < buf.len() {
                let end = (start + shard_len).min(buf.len());
                block[..end - start].copy_from_slice(&buf[start..end]);
            }
            data_shards.push(block);
        }

        let group_id = self.next_group_id;
        self.next_group_id = self.next_group_id.wrapping_add(1);

        let mut parity = vec![0u8; shard_len];
        for data in &data_shards {
            for (acc, byte) in parity.iter_mut().zip(data.iter()) {
                *acc ^= byte;
            }
        }

        let mut shards = Vec::with_capacity(kk + 1);
        for (i, data) in data_shards.into_iter().enumerate() {
            shards.push(Shard {
                header: ShardHeader {
                    group_id,
                    index: i as u8,
                    k,
                    m: 1,
                    size_field: shard_len as u8,
                    xor_mode: true,
                },
                payload: data,
            });
        }
        shards.push(Shard {
            header: ShardHeader {
                group_id,
                index: k,
                k,
                m: 1,
                size_field: shard_len as u8,
                xor_mode: true,
            },
            payload: parity,
        });

        Ok((group_id, shards))
    }
}

impl Default for XorEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rs_encode_shapes_shards() {
        let mut enc = RsEncoder::new();
        let buf: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let (_gid, shards) = enc.encode(&buf, 5, 2).unwrap();
        assert_eq!(shards.len(), 7);
        // ceil(5000/5) = 1000, rounded up to a multiple of 16 so the
        // one-byte `size_field * 16` header round-trips losslessly.
        for s in &shards {
            assert_eq!(s.payload.len(), 1008);
            assert_eq!(s.header.payload_len(), 1008);
        }
    }

    #[test]
    fn xor_encode_shapes_shards() {
        let mut enc = XorEncoder::new();
        let buf = vec![7u8; 37];
        let (_gid, shards) = enc.encode(&buf, 4).unwrap();
        assert_eq!(shards.len(), 5);
        assert!(shards.iter().all(|s| s.header.xor_mode));
    }
}
