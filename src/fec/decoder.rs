//! FEC decode: reassemble the original buffer from any K of the K+M
//! shards in a group. See spec section 4.2 for the algorithm and section
//! 7 for the WAIT/FAIL status semantics.

use super::gf;
use super::shard::{Shard, MAX_SHARD_PAYLOAD};
use crate::optimize::MemoryPool;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const POOL_CAPACITY: usize = 16;

/// Outcome of feeding a shard to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FecStatus {
    /// Fewer than K distinct shards seen so far for this group.
    Wait,
    /// K distinct data-shard payloads, concatenated in index order.
    Decoded(Vec<u8>),
    /// Malformed header (K/M/shard-size out of bounds) or a singular
    /// decode matrix.
    Fail,
}

struct GroupState {
    k: u8,
    #[allow(dead_code)]
    m: u8,
    shard_len: usize,
    shards: HashMap<u8, Vec<u8>>,
}

/// Builds the K x K generator submatrix for the present shard row
/// indices and inverts it in GF(2^8) via Gauss-Jordan elimination. A
/// present data-shard row (`idx < k`) is the standard basis vector,
/// since a data shard's payload is the raw data, never a Vandermonde
/// combination; a present parity-shard row (`idx >= k`) is
/// `vander(x = idx + 1, ..)`, matching the encoder's coefficient formula
/// exactly. Returns `None` if no pivot exists for some column.
fn invert_vandermonde(present_indices: &[u8], k: usize) -> Option<Vec<Vec<u8>>> {
    let mut m: Vec<Vec<u8>> = present_indices
        .iter()
        .map(|&idx| {
            if (idx as usize) < k {
                let mut row = vec![0u8; k];
                row[idx as usize] = 1;
                row
            } else {
                let x = idx + 1;
                let mut row = Vec::with_capacity(k);
                let mut v = 1u8;
                for _ in 0..k {
                    row.push(v);
                    v = gf::mul(v, x);
                }
                row
            }
        })
        .collect();

    let mut inv: Vec<Vec<u8>> = (0..k)
        .map(|i| {
            let mut row = vec![0u8; k];
            row[i] = 1;
            row
        })
        .collect();

    for col in 0..k {
        // Pivoting: first non-zero row at or below the diagonal, tie-break
        // by current row order (spec section 4.2 step 2).
        let pivot_row = (col..k).find(|&r| m[r][col] != 0)?;
        m.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot_val = m[col][col];
        let pivot_inv = gf::inv(pivot_val);
        for c in 0..k {
            m[col][c] = gf::mul(m[col][c], pivot_inv);
            inv[col][c] = gf::mul(inv[col][c], pivot_inv);
        }

        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0 {
                continue;
            }
            for c in 0..k {
                m[row][c] = gf::mul_add(m[col][c], factor, m[row][c]);
                inv[row][c] = gf::mul_add(inv[col][c], factor, inv[row][c]);
            }
        }
    }
    Some(inv)
}

/// Stateful Reed-Solomon decoder, caching partial groups with FIFO
/// eviction once `capacity` (64 per spec section 4.2) is reached.
pub struct RsDecoder {
    capacity: usize,
    order: VecDeque<u32>,
    groups: HashMap<u32, GroupState>,
    pool: Arc<MemoryPool>,
}

impl RsDecoder {
    pub fn new() -> Self {
        gf::init();
        Self {
            capacity: 64,
            order: VecDeque::new(),
            groups: HashMap::new(),
            pool: Arc::new(MemoryPool::new(POOL_CAPACITY, MAX_SHARD_PAYLOAD)),
        }
    }

    fn evict_if_needed(&mut self, incoming: u32) {
        if self.groups.contains_key(&incoming) {
            return;
        }
        while self.groups.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) if self.groups.remove(&oldest).is_some() => {
                    log::debug!("RS decode group {oldest} evicted (FIFO, capacity {})", self.capacity);
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        self.order.push_back(incoming);
    }

    /// Removes a completed group from both the lookup table and the FIFO
    /// order queue, so a stale id can't later be mistaken for a live one
    /// in `evict_if_needed`.
    fn remove_group(&mut self, group_id: u32) {
        self.groups.remove(&group_id);
        self.order.retain(|&id| id != group_id);
    }

    /// Feeds one shard. Idempotent: re-submitting a shard already present
    /// in the group is a no-op write.
    pub fn decode(&mut self, shard: Shard) -> FecStatus {
        let hdr = shard.header;
        if hdr.k == 0 || (hdr.k as u32) + (hdr.m as u32) > 255 {
            return FecStatus::Fail;
        }
        let payload_len = hdr.payload_len();
        if payload_len > MAX_SHARD_PAYLOAD || payload_len != shard.payload.len() {
            return FecStatus::Fail;
        }

        self.evict_if_needed(hdr.group_id);
        let group = self.groups.entry(hdr.group_id).or_insert_with(|| GroupState {
            k: hdr.k,
            m: hdr.m,
            shard_len: payload_len,
            shards: HashMap::new(),
        });
        group.shards.entry(hdr.index).or_insert(shard.payload);

        let k = group.k as usize;
        if group.shards.len() < k {
            return FecStatus::Wait;
        }

        let mut present: Vec<u8> = group.shards.keys().copied().collect();
        present.sort_unstable();
        present.truncate(k);

        // Fast path: all K data shards (indices 0..K) already present.
        if present.len() == k && present.iter().all(|&idx| (idx as usize) < k) {
            let mut out = Vec::with_capacity(k * group.shard_len);
            for idx in 0..hdr.k {
                out.extend_from_slice(&group.shards[&idx]);
            }
            self.remove_group(hdr.group_id);
            return FecStatus::Decoded(out);
        }

        let inv = match invert_vandermonde(&present, k) {
            Some(inv) => inv,
            None => return FecStatus::Fail,
        };

        let shard_len = group.shard_len;
        let mut recovered: Vec<Vec<u8>> = Vec::with_capacity(k);
        for m_idx in 0..k {
            if let Some(existing) = group.shards.get(&(m_idx as u8)) {
                recovered.push(existing.clone());
                continue;
            }
            let mut block = self.pool.alloc();
            for byte in 0..shard_len {
                let mut acc = 0u8;
                for (j, &present_idx) in present.iter().enumerate() {
                    let present_byte = group.shards[&present_idx][byte];
                    acc = gf::mul_add(present_byte, inv[m_idx][j], acc);
                }
                block[byte] = acc;
            }
            recovered.push(block[..shard_len].to_vec());
            self.pool.free(block);
        }

        self.remove_group(hdr.group_id);
        let mut out = Vec::with_capacity(k * shard_len);
        for data in recovered {
            out.extend_from_slice(&data);
        }
        FecStatus::Decoded(out)
    }
}

impl Default for RsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// XOR decoder: recovers a single missing shard (data or parity) from
/// the remaining K present shards. Capacity 32 per spec section 4.2.
pub struct XorDecoder {
    capacity: usize,
    order: VecDeque<u32>,
    groups: HashMap<u32, GroupState>,
}

impl XorDecoder {
    pub fn new() -> Self {
        Self {
            capacity: 32,
            order: VecDeque::new(),
            groups: HashMap::new(),
        }
    }

    fn evict_if_needed(&mut self, incoming: u32) {
        if self.groups.contains_key(&incoming) {
            return;
        }
        while self.groups.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) if self.groups.remove(&oldest).is_some() => break,
                Some(_) => continue,
                None => break,
            }
        }
        self.order.push_back(incoming);
    }

    fn remove_group(&mut self, group_id: u32) {
        self.groups.remove(&group_id);
        self.order.retain(|&id| id != group_id);
    }

    pub fn decode(&mut self, shard: Shard) -> FecStatus {
        let hdr = shard.header;
        if hdr.k == 0 || hdr.k > super::shard::XOR_MAX_K || hdr.m != 1 {
            return FecStatus::Fail;
        }
        let payload_len = hdr.payload_len();
        if payload_len > MAX_SHARD_PAYLOAD || payload_len != shard.payload.len() {
            return FecStatus::Fail;
        }

        self.evict_if_needed(hdr.group_id);
        let group = self.groups.entry(hdr.group_id).or_insert_with(|| GroupState {
            k: hdr.k,
            m: hdr.m,
            shard_len: payload_len,
            shards: HashMap::new(),
        });
        group.shards.entry(hdr.index).or_insert(shard.payload);

        let k = group.k as usize;
        if group.shards.len() < k {
            return FecStatus::Wait;
        }

        // All K data shards already present (indices 0..K).
        if (0..hdr.k).all(|idx| group.shards.contains_key(&idx)) {
            let mut out = Vec::with_capacity(k * group.shard_len);
            for idx in 0..hdr.k {
                out.extend_from_slice(&group.shards[&idx]);
            }
            self.remove_group(hdr.group_id);
            return FecStatus::Decoded(out);
        }

        // Exactly one data shard missing; parity (index k) must be present.
        let missing: Vec<u8> = (0..hdr.k).filter(|idx| !group.shards.contains_key(idx)).collect();
        if missing.len() != 1 || !group.shards.contains_key(&hdr.k) {
            self.remove_group(hdr.group_id);
            return FecStatus::Fail;
        }
        let missing_idx = missing[0];
        let shard_len = group.shard_len;
        let mut recovered = vec![0u8; shard_len];
        for idx in 0..=hdr.k {
            if idx == missing_idx {
                continue;
            }
            let present = &group.shards[&idx];
            for (acc, byte) in recovered.iter_mut().zip(present.iter()) {
                *acc ^= byte;
            }
        }

        let mut out = Vec::with_capacity(k * shard_len);
        for idx in 0..hdr.k {
            if idx == missing_idx {
                out.extend_from_slice(&recovered);
            } else {
                out.extend_from_slice(&group.shards[&idx]);
            }
        }
        self.remove_group(hdr.group_id);
        FecStatus::Decoded(out)
    }
}

impl Default for XorDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::encoder::{RsEncoder, XorEncoder};

    #[test]
    fn rs_round_trip_with_two_missing() {
        let mut enc = RsEncoder::new();
        let buf: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let (_gid, mut shards) = enc.encode(&buf, 5, 2).unwrap();
        assert_eq!(shards.len(), 7);
        shards.remove(3);
        shards.remove(0);

        let mut dec = RsDecoder::new();
        let mut result = FecStatus::Wait;
        for s in shards {
            result = dec.decode(s);
        }
        match result {
            FecStatus::Decoded(out) => {
                let mut expected = buf.clone();
                expected.resize(1008 * 5, 0);
                assert_eq!(out, expected);
            }
            other => panic!("expected Decoded, got {:?}", other),
        }
    }

    #[test]
    fn rs_fast_path_all_data_shards_present() {
        let mut enc = RsEncoder::new();
        let buf = vec![42u8; 100];
        let (_gid, shards) = enc.encode(&buf, 5, 2).unwrap();
        let mut dec = RsDecoder::new();
        let mut result = FecStatus::Wait;
        for s in shards.into_iter().take(5) {
            result = dec.decode(s);
        }
        assert!(matches!(result, FecStatus::Decoded(_)));
    }

    #[test]
    fn xor_round_trip_missing_each_shard() {
        for missing in 0..5usize {
            let mut enc = XorEncoder::new();
            let buf = vec![9u8; 37];
            let (_gid, mut shards) = enc.encode(&buf, 4).unwrap();
            shards.remove(missing);

            let mut dec = XorDecoder::new();
            let mut result = FecStatus::Wait;
            for s in shards {
                result = dec.decode(s);
            }
            assert!(matches!(result, FecStatus::Decoded(_)), "missing={missing}");
        }
    }

    #[test]
    fn decode_is_wait_until_k_shards() {
        let mut enc = RsEncoder::new();
        let (_gid, shards) = enc.encode(&vec![1u8; 50], 3, 2).unwrap();
        let mut dec = RsDecoder::new();
        assert_eq!(dec.decode(shards[0].clone()), FecStatus::Wait);
        assert_eq!(dec.decode(shards[1].clone()), FecStatus::Wait);
    }

    #[test]
    fn fifo_eviction_drops_oldest_group() {
        let mut dec = RsDecoder::new();
        let mut enc = RsEncoder::new();
        // Fill capacity with partial (non-decodable) groups, one shard each.
        for _ in 0..65 {
            let (_gid, shards) = enc.encode(&vec![1u8; 20], 3, 2).unwrap();
            dec.decode(shards[0].clone());
        }
        assert!(dec.groups.len() <= 64);
    }

    #[test]
    fn completed_groups_dont_linger_in_fifo_order() {
        let mut dec = RsDecoder::new();
        let mut enc = RsEncoder::new();
        // Fully decode 80 groups (one at a time, stopping as soon as each
        // decodes), well past capacity; a completed group's id must not
        // stick around in `order` and get mistaken for a live one once
        // eviction starts.
        for _ in 0..80 {
            let (_gid, shards) = enc.encode(&vec![1u8; 20], 3, 2).unwrap();
            let mut decoded = false;
            for s in shards {
                if let FecStatus::Decoded(_) = dec.decode(s) {
                    decoded = true;
                    break;
                }
            }
            assert!(decoded);
        }
        assert_eq!(dec.groups.len(), 0);
        assert_eq!(dec.order.len(), 0);
    }
}
