// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Keyed page fingerprints and the stateless trailer hash.
//!
//! A page fingerprint is the 4-byte truncation of a keyed hash over the
//! page content: `H(prefix || page_bytes)`. For the cipher-style SipHash
//! the 4-byte salt is placed in a zero-padded key; for the SHA-256
//! alternative it is prepended to the input. Either way, changing the
//! salt deterministically changes every fingerprint, which is how the
//! engine escapes the rare fingerprint collision.
//!
//! Trailer integrity uses the same construction with an all-zero salt,
//! kept behind its own entry point ([`calc_hash`]) so the two uses stay
//! textually separate.

use core::hash::Hasher as _;

use siphasher::sip::SipHasher24;

use crate::flash::Flash;
use crate::{Error, HashArrays, PAGE_SIZE};

/// Bytes kept from the full digest.
pub const FINGERPRINT_LEN: usize = 4;

/// A keyed hasher producing 4-byte page fingerprints.
pub trait PageHasher {
    /// Bytes produced by [`PageHasher::finalize`].
    const DIGEST_LEN: usize = FINGERPRINT_LEN;

    fn init(prefix: [u8; 4]) -> Self;
    fn update(&mut self, bytes: &[u8]);
    fn finalize(self) -> [u8; FINGERPRINT_LEN];
}

/// SipHash-2-4 with the salt in a zero-padded 128-bit key.
pub struct SipFingerprint(SipHasher24);

impl PageHasher for SipFingerprint {
    fn init(prefix: [u8; 4]) -> Self {
        let mut key = [0u8; 8];
        key[..4].copy_from_slice(&prefix);
        SipFingerprint(SipHasher24::new_with_keys(u64::from_le_bytes(key), 0))
    }

    fn update(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }

    fn finalize(self) -> [u8; FINGERPRINT_LEN] {
        let digest = self.0.finish().to_le_bytes();
        [digest[0], digest[1], digest[2], digest[3]]
    }
}

/// Truncated SHA-256 with the salt prepended to the input.
#[cfg(feature = "sha256")]
pub struct Sha256Fingerprint(sha2::Sha256);

#[cfg(feature = "sha256")]
impl PageHasher for Sha256Fingerprint {
    fn init(prefix: [u8; 4]) -> Self {
        use sha2::Digest;
        let mut inner = sha2::Sha256::new();
        inner.update(prefix);
        Sha256Fingerprint(inner)
    }

    fn update(&mut self, bytes: &[u8]) {
        use sha2::Digest;
        self.0.update(bytes);
    }

    fn finalize(self) -> [u8; FINGERPRINT_LEN] {
        use sha2::Digest;
        let digest = self.0.finalize();
        [digest[0], digest[1], digest[2], digest[3]]
    }
}

/// The fingerprint implementation in use; the single configuration
/// point for swapping hashers.
#[cfg(not(feature = "sha256"))]
pub type DefaultHasher = SipFingerprint;
#[cfg(feature = "sha256")]
pub type DefaultHasher = Sha256Fingerprint;

/// Fingerprint of `data` under `prefix`.
pub fn fingerprint(prefix: [u8; 4], data: &[u8]) -> [u8; FINGERPRINT_LEN] {
    let mut hasher = DefaultHasher::init(prefix);
    hasher.update(data);
    hasher.finalize()
}

/// Stateless hash with an all-zero prefix, used for trailer integrity.
pub fn calc_hash(data: &[u8]) -> [u8; FINGERPRINT_LEN] {
    fingerprint([0; 4], data)
}

/// Fingerprint every page of an image of `size` bytes in `area`,
/// filling `out` in page order. The trailing page is hashed over its
/// used byte count only. Returns the number of pages hashed.
pub fn compute_slot<F: Flash>(
    area: &F,
    size: u32,
    prefix: [u8; 4],
    out: &mut [[u8; 4]],
) -> Result<usize, Error> {
    let size = size as usize;
    let mut tmp = [0u8; PAGE_SIZE];
    let mut pos = 0;
    let mut page = 0;
    while pos < size {
        let count = PAGE_SIZE.min(size - pos);
        if page >= out.len() {
            return Err(Error::WorkOverflow);
        }
        area.read(pos, &mut tmp[..count])?;
        out[page] = fingerprint(prefix, &tmp[..count]);
        page += 1;
        pos += PAGE_SIZE;
    }
    Ok(page)
}

/// All fingerprints in canonical order: slot 0's pages, then slot 1's.
/// Finite and restartable (the iterator is `Clone`).
pub(crate) fn hash_iter(
    hashes: &HashArrays,
    counts: [usize; 2],
) -> impl Iterator<Item = [u8; 4]> + Clone + '_ {
    hashes[0][..counts[0]]
        .iter()
        .copied()
        .chain(hashes[1][..counts[1]].iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let data = b"some page content";
        assert_eq!(fingerprint([1, 2, 3, 4], data), fingerprint([1, 2, 3, 4], data));
    }

    #[test]
    fn test_prefix_changes_fingerprint() {
        let data = b"some page content";
        assert_ne!(fingerprint([1, 2, 3, 4], data), fingerprint([1, 2, 3, 5], data));
    }

    #[test]
    fn test_content_changes_fingerprint() {
        assert_ne!(
            fingerprint([0x55; 4], b"some page content"),
            fingerprint([0x55; 4], b"some page contenu")
        );
    }

    #[test]
    fn test_calc_hash_is_zero_prefix_fingerprint() {
        let data = b"trailer bytes";
        assert_eq!(calc_hash(data), fingerprint([0; 4], data));
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let mut hasher = DefaultHasher::init([9, 8, 7, 6]);
        hasher.update(b"some page ");
        hasher.update(b"content");
        assert_eq!(hasher.finalize(), fingerprint([9, 8, 7, 6], b"some page content"));
    }
}
