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

//! Cryptographic boundary consumed by the Header Gate (spec section 4.6).
//!
//! The core never implements a concrete AEAD or keyed hash — per spec
//! section 1 these are external collaborators. What lives here are the
//! trait contracts a host's ChaCha20-Poly1305 and Blake2s-equivalent
//! keyed hash must satisfy, generalized from the single-call-surface
//! pattern the teacher uses for `CipherSuiteSelector`.

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const BLOCK_LEN: usize = 16;

/// AEAD boundary. Implementations are expected to be RFC 8439
/// ChaCha20-Poly1305 or equivalent; the core only ever calls `seal`/`open`
/// on a fixed 16-byte block with a 16-byte tag and a 6-byte AAD (spec
/// section 3/4.6).
pub trait Aead {
    /// Encrypts `plaintext` in place, returning the authentication tag.
    fn seal(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        plaintext: &mut [u8; BLOCK_LEN],
    ) -> [u8; TAG_LEN];

    /// Decrypts `ciphertext` in place given its tag. Returns `false` (and
    /// leaves the buffer contents unspecified) on authentication failure.
    fn open(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        ciphertext: &mut [u8; BLOCK_LEN],
        tag: &[u8; TAG_LEN],
    ) -> bool;
}

/// Keyed hash boundary used to derive the rotating magic (spec section 3).
/// `output_len` is always 4 for this crate's use but the trait is left
/// general so a host can reuse its hash for other derivations.
pub trait KeyedHash {
    fn hash(&self, key: &[u8; KEY_LEN], data: &[u8], out: &mut [u8]);
}

/// Derives the 32-bit rotating magic for a minute-aligned timestamp, per
/// spec section 3: `keyed_hash(master_key || floor(wall_time_s / 60))`,
/// truncated to the low 32 bits of the hash output (little-endian).
pub fn derive_magic(hash: &dyn KeyedHash, key: &[u8; KEY_LEN], minute: u64) -> u32 {
    let mut out = [0u8; 4];
    hash.hash(key, &minute.to_le_bytes(), &mut out);
    u32::from_le_bytes(out)
}

/// Builds the ordered up-to-three valid magics for `now_minute`, tolerating
/// clock skew of +/-60s (spec section 3). Slot order is current, earlier,
/// later, matching how the Header Gate and Edge Filter scan them.
pub fn valid_magics(hash: &dyn KeyedHash, key: &[u8; KEY_LEN], now_minute: u64) -> [u32; 3] {
    [
        derive_magic(hash, key, now_minute),
        derive_magic(hash, key, now_minute.wrapping_sub(1)),
        derive_magic(hash, key, now_minute.wrapping_add(1)),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Minimal XOR-stream "AEAD" and additive "hash" used only by this
    /// crate's own unit tests to exercise the Header Gate without pulling
    /// in a concrete cipher dependency (spec section 1 treats the real
    /// primitive as a host concern).
    pub struct FakeAead;

    impl Aead for FakeAead {
        fn seal(
            &self,
            key: &[u8; KEY_LEN],
            nonce: &[u8; NONCE_LEN],
            aad: &[u8],
            plaintext: &mut [u8; BLOCK_LEN],
        ) -> [u8; TAG_LEN] {
            for (i, byte) in plaintext.iter_mut().enumerate() {
                *byte ^= key[i % KEY_LEN] ^ nonce[i % NONCE_LEN];
            }
            let mut tag = [0u8; TAG_LEN];
            for (i, t) in tag.iter_mut().enumerate() {
                let mut acc = key[i] ^ nonce[i % NONCE_LEN];
                for (j, &b) in aad.iter().enumerate() {
                    acc ^= b.wrapping_add(j as u8);
                }
                for &b in plaintext.iter() {
                    acc ^= b;
                }
                *t = acc;
            }
            tag
        }

        fn open(
            &self,
            key: &[u8; KEY_LEN],
            nonce: &[u8; NONCE_LEN],
            aad: &[u8],
            ciphertext: &mut [u8; BLOCK_LEN],
            tag: &[u8; TAG_LEN],
        ) -> bool {
            let mut expected = [0u8; TAG_LEN];
            for (i, t) in expected.iter_mut().enumerate() {
                let mut acc = key[i] ^ nonce[i % NONCE_LEN];
                for (j, &b) in aad.iter().enumerate() {
                    acc ^= b.wrapping_add(j as u8);
                }
                for &b in ciphertext.iter() {
                    acc ^= b;
                }
                *t = acc;
            }
            if expected != *tag {
                return false;
            }
            for (i, byte) in ciphertext.iter_mut().enumerate() {
                *byte ^= key[i % KEY_LEN] ^ nonce[i % NONCE_LEN];
            }
            true
        }
    }

    pub struct FakeHash;

    impl KeyedHash for FakeHash {
        fn hash(&self, key: &[u8; KEY_LEN], data: &[u8], out: &mut [u8]) {
            for (i, o) in out.iter_mut().enumerate() {
                let mut acc = key[i % KEY_LEN];
                for (j, &b) in data.iter().enumerate() {
                    acc = acc.wrapping_add(b).rotate_left((j % 7) as u32);
                }
                *o = acc;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn fake_aead_round_trips() {
        let aead = FakeAead;
        let key = [1u8; KEY_LEN];
        let nonce = [2u8; NONCE_LEN];
        let aad = [3u8; 6];
        let mut block = *b"0123456789abcdef";
        let original = block;
        let tag = aead.seal(&key, &nonce, &aad, &mut block);
        assert_ne!(block, original);
        assert!(aead.open(&key, &nonce, &aad, &mut block, &tag));
        assert_eq!(block, original);
    }

    #[test]
    fn fake_aead_rejects_tampered_aad() {
        let aead = FakeAead;
        let key = [1u8; KEY_LEN];
        let nonce = [2u8; NONCE_LEN];
        let mut block = *b"0123456789abcdef";
        let tag = aead.seal(&key, &nonce, &[0u8; 6], &mut block);
        assert!(!aead.open(&key, &nonce, &[1u8; 6], &mut block, &tag));
    }

    #[test]
    fn magics_are_ordered_current_earlier_later() {
        let hash = FakeHash;
        let key = [9u8; KEY_LEN];
        let magics = valid_magics(&hash, &key, 1000);
        assert_eq!(magics[0], derive_magic(&hash, &key, 1000));
        assert_eq!(magics[1], derive_magic(&hash, &key, 999));
        assert_eq!(magics[2], derive_magic(&hash, &key, 1001));
    }
}
