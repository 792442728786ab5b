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

//! GF(2^8) arithmetic over the Rijndael-style field with primitive
//! polynomial 0x11d. Tables are built once, process-wide, behind a safe
//! accessor — the `static mut` backing storage never escapes this module.

use crate::optimize;
use log::debug;
use std::sync::Once;

const GF_ORDER: usize = 256;
const IRREDUCIBLE_POLY: u16 = 0x11D;

static GF_INIT: Once = Once::new();
static mut LOG_TABLE: [u8; GF_ORDER] = [0; GF_ORDER];
static mut EXP_TABLE: [u8; GF_ORDER * 2] = [0; GF_ORDER * 2];
static mut MUL_TABLE: [[u8; GF_ORDER]; GF_ORDER] = [[0; GF_ORDER]; GF_ORDER];

/// Builds `exp`/`log`/the full multiplication table. Safe to call from
/// multiple threads; only the first call does any work. Must complete
/// before any worker thread enters [`mul`] or [`inv`].
pub fn init() {
    GF_INIT.call_once(|| unsafe {
        let mut x: u16 = 1;
        for i in 0..255usize {
            EXP_TABLE[i] = x as u8;
            EXP_TABLE[i + 255] = x as u8;
            LOG_TABLE[x as usize] = i as u8;
            x <<= 1;
            if x >= 256 {
                x ^= IRREDUCIBLE_POLY;
            }
        }
        for a in 0..GF_ORDER {
            for b in 0..GF_ORDER {
                MUL_TABLE[a][b] = mul_table_lookup(a as u8, b as u8);
            }
        }
        debug!("GF(2^8) log/exp/mul tables initialized");
    });
}

#[inline(always)]
fn mul_table_lookup(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    unsafe {
        let sum_log = LOG_TABLE[a as usize] as u16 + LOG_TABLE[b as usize] as u16;
        EXP_TABLE[sum_log as usize]
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "pclmulqdq"))]
#[target_feature(enable = "pclmulqdq")]
unsafe fn mul_pclmulqdq(a: u8, b: u8) -> u8 {
    use std::arch::x86_64::*;
    let a_v = _mm_set_epi64x(0, a as i64);
    let b_v = _mm_set_epi64x(0, b as i64);
    let res_v = _mm_clmulepi64_si128(a_v, b_v, 0x00);
    let res16 = _mm_extract_epi16(res_v, 0) as u16;
    let t = res16 ^ (res16 >> 8);
    let t = t ^ (t >> 4);
    let t = t ^ (t >> 2);
    let t = t ^ (t >> 1);
    (t & 0xFF) as u8
}

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
#[target_feature(enable = "neon")]
unsafe fn mul_neon(a: u8, b: u8) -> u8 {
    use std::arch::aarch64::*;
    let a_v = vdupq_n_u8(a);
    let b_v = vdupq_n_u8(b);
    let res = vmull_p8(vget_low_u8(a_v), vget_low_u8(b_v));
    let mut t = vgetq_lane_u16(res, 0);
    t ^= t >> 8;
    t ^= t >> 4;
    t ^= t >> 2;
    t ^= t >> 1;
    (t & 0xFF) as u8
}

/// Multiplies `a * b` in GF(2^8). Dispatches to a SIMD lane when the CPU
/// supports it; always falls back to the table lookup. Both paths are
/// required to agree bit-for-bit (see `fec::gf::tests::simd_matches_scalar`).
#[inline(always)]
pub fn mul(a: u8, b: u8) -> u8 {
    let mut result = 0u8;
    optimize::dispatch(|policy| {
        result = match policy {
            #[cfg(all(target_arch = "x86_64", target_feature = "pclmulqdq"))]
            p if p.as_any().is::<optimize::Pclmulqdq>() => unsafe { mul_pclmulqdq(a, b) },
            #[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
            p if p.as_any().is::<optimize::Neon>() => unsafe { mul_neon(a, b) },
            _ => mul_table(a, b),
        };
    });
    result
}

/// Table-only multiply; the scalar reference implementation called out
/// by spec section 4.1 and used directly wherever SIMD isn't compiled in.
#[inline(always)]
pub fn mul_table(a: u8, b: u8) -> u8 {
    unsafe { MUL_TABLE[a as usize][b as usize] }
}

/// Multiplicative inverse of `x`, undefined (panics) for `x == 0`.
#[inline(always)]
pub fn inv(x: u8) -> u8 {
    assert!(x != 0, "inverse of 0 is undefined in GF(2^8)");
    unsafe { EXP_TABLE[255 - LOG_TABLE[x as usize] as usize] }
}

/// `a * b + c`, i.e. `a * b XOR c`, as used by the FEC parity/reconstruct loops.
#[inline(always)]
pub fn mul_add(a: u8, b: u8, c: u8) -> u8 {
    mul(a, b) ^ c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_zero() {
        init();
        for a in 0..=255u8 {
            assert_eq!(mul(a, 1), a);
            assert_eq!(mul(a, 0), 0);
            assert_eq!(mul(0, a), 0);
        }
    }

    #[test]
    fn mul_is_commutative_and_matches_table() {
        init();
        for a in 1..=255u8 {
            for b in 1..=255u8 {
                assert_eq!(mul(a, b), mul(b, a));
                assert_eq!(mul(a, b), mul_table(a, b));
            }
        }
    }

    #[test]
    fn inverse_round_trips() {
        init();
        for a in 1..=255u8 {
            let inverse = inv(a);
            assert_eq!(mul(a, inverse), 1);
        }
    }
}
