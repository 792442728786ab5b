//! Wire format for the fixed 1,400-byte FEC shard envelope (spec section 3).

use crate::error::ConfigError;

pub const SHARD_ENVELOPE_LEN: usize = 1_400;
pub const SHARD_HEADER_LEN: usize = 8;
pub const MAX_SHARD_PAYLOAD: usize = SHARD_ENVELOPE_LEN - SHARD_HEADER_LEN;
/// XOR mode is restricted to small fan-in groups (spec section 4.2).
pub const XOR_MAX_K: u8 = 4;

/// Parsed shard header. The wire layout is:
/// `group_id:u32 (network order) | index:u8 | k_or_k:u8 | m:u8 | size_divisor:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardHeader {
    pub group_id: u32,
    pub index: u8,
    pub k: u8,
    /// For RS mode this is the parity-shard count `M`. For XOR mode the
    /// wire byte is re-used to store `K` and the parity shard is the
    /// distinguished index `k` (see spec section 3 / section 9).
    pub m: u8,
    /// RS: actual shard payload bytes are `size_field * 16`. XOR: the
    /// field holds the raw payload byte count directly.
    pub size_field: u8,
    pub xor_mode: bool,
}

impl ShardHeader {
    pub fn payload_len(&self) -> usize {
        if self.xor_mode {
            self.size_field as usize
        } else {
            self.size_field as usize * 16
        }
    }

    pub fn encode(&self) -> [u8; SHARD_HEADER_LEN] {
        let mut buf = [0u8; SHARD_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.group_id.to_be_bytes());
        buf[4] = self.index;
        buf[5] = self.k;
        buf[6] = self.m;
        buf[7] = self.size_field;
        buf
    }

    pub fn decode(buf: &[u8], xor_mode: bool) -> Result<Self, ConfigError> {
        if buf.len() < SHARD_HEADER_LEN {
            return Err(ConfigError::MustBePositive {
                field: "shard_header_len",
            });
        }
        let group_id = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        Ok(ShardHeader {
            group_id,
            index: buf[4],
            k: buf[5],
            m: buf[6],
            size_field: buf[7],
            xor_mode,
        })
    }
}

/// A single shard: header plus payload bytes, total length always
/// `SHARD_ENVELOPE_LEN` on the wire (payload zero-padded past `payload_len`).
#[derive(Debug, Clone)]
pub struct Shard {
    pub header: ShardHeader,
    pub payload: Vec<u8>,
}

impl Shard {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SHARD_ENVELOPE_LEN);
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        out.resize(SHARD_ENVELOPE_LEN, 0);
        out
    }

    pub fn from_wire(buf: &[u8], xor_mode: bool) -> Result<Self, ConfigError> {
        let header = ShardHeader::decode(buf, xor_mode)?;
        let len = header.payload_len();
        if len > MAX_SHARD_PAYLOAD || SHARD_HEADER_LEN + len > buf.len() {
            return Err(ConfigError::MustBePositive { field: "shard_size" });
        }
        Ok(Shard {
            header,
            payload: buf[SHARD_HEADER_LEN..SHARD_HEADER_LEN + len].to_vec(),
        })
    }
}
