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

//! Runtime CPU feature detection and SIMD-policy dispatch, plus the
//! pooled-memory primitive the FEC codec builds shards from.

use aligned_box::AlignedBox;

const BLOCK_ALIGN: usize = 64;
use crossbeam_queue::ArrayQueue;
use lazy_static::lazy_static;
use log::debug;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// CPU features relevant to the GF(2^8) codec's SIMD lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuFeature {
    Avx2,
    Pclmulqdq,
    Neon,
}

/// Singleton for accessing detected CPU features. Detection runs exactly
/// once; the GF tables must already be initialized before any worker
/// thread consults this (see `fec::gf::init`).
pub struct FeatureDetector {
    features: HashMap<CpuFeature, bool>,
}

lazy_static! {
    static ref DETECTOR: FeatureDetector = {
        let mut features = HashMap::new();
        #[cfg(target_arch = "x86_64")]
        {
            features.insert(CpuFeature::Avx2, is_x86_feature_detected!("avx2"));
            features.insert(
                CpuFeature::Pclmulqdq,
                is_x86_feature_detected!("pclmulqdq"),
            );
        }
        #[cfg(target_arch = "aarch64")]
        {
            features.insert(CpuFeature::Neon, std::arch::is_aarch64_feature_detected!("neon"));
        }
        debug!("detected CPU features: {:?}", features);
        FeatureDetector { features }
    };
}

impl FeatureDetector {
    pub fn instance() -> &'static Self {
        &DETECTOR
    }

    pub fn has_feature(&self, feature: CpuFeature) -> bool {
        *self.features.get(&feature).unwrap_or(&false)
    }
}

/// Execution policy selected by [`dispatch`]. Marker types rather than an
/// enum so a call site can match on `&dyn SimdPolicy` the way the teacher's
/// GF multiply dispatcher does.
pub trait SimdPolicy: Any {
    fn as_any(&self) -> &dyn Any;
}

macro_rules! policy {
    ($name:ident) => {
        pub struct $name;
        impl SimdPolicy for $name {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

policy!(Pclmulqdq);
policy!(Neon);
policy!(Scalar);

/// Dispatches to the best available SIMD implementation at runtime,
/// ordered from most to least specific.
pub fn dispatch<F, R>(mut f: F) -> R
where
    F: FnMut(&dyn SimdPolicy) -> R,
{
    let detector = FeatureDetector::instance();
    if detector.has_feature(CpuFeature::Pclmulqdq) {
        f(&Pclmulqdq)
    } else if detector.has_feature(CpuFeature::Neon) {
        f(&Neon)
    } else {
        f(&Scalar)
    }
}

/// A thread-safe pool of fixed-size, 64-byte-aligned memory blocks, used
/// for FEC shard payloads. Blocks are zeroed on return so the pool never
/// leaks stale shard data into a fresh allocation.
pub struct MemoryPool {
    pool: Arc<ArrayQueue<AlignedBox<[u8]>>>,
    block_size: usize,
}

impl MemoryPool {
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let pool = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            let aligned_box = AlignedBox::slice_from_value(BLOCK_ALIGN, block_size, 0u8)
                .expect("aligned allocation");
            let _ = pool.push(aligned_box);
        }
        Self {
            pool: Arc::new(pool),
            block_size,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Allocates a block from the pool, falling back to a fresh
    /// allocation when the pool is exhausted.
    pub fn alloc(&self) -> AlignedBox<[u8]> {
        self.pool.pop().unwrap_or_else(|| {
            AlignedBox::slice_from_value(BLOCK_ALIGN, self.block_size, 0u8)
                .expect("aligned allocation")
        })
    }

    pub fn free(&self, mut block: AlignedBox<[u8]>) {
        block.iter_mut().for_each(|x| *x = 0);
        let _ = self.pool.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_is_idempotent() {
        let a = FeatureDetector::instance() as *const _;
        let b = FeatureDetector::instance() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn pool_roundtrip_zeroes_blocks() {
        let pool = MemoryPool::new(2, 16);
        let mut block = pool.alloc();
        block.iter_mut().for_each(|b| *b = 0xAA);
        pool.free(block);
        let reused = pool.alloc();
        assert!(reused.iter().all(|&b| b == 0));
    }

    #[test]
    fn pool_falls_back_when_exhausted() {
        let pool = MemoryPool::new(1, 8);
        let _a = pool.alloc();
        let b = pool.alloc();
        assert_eq!(b.len(), 8);
    }
}
