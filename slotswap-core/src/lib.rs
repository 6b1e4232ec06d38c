// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Power-fail safe image-swap engine for A/B firmware updates.
//!
//! The engine exchanges the contents of two flash slots page by page, so
//! that after a completed run the primary slot holds the staged upgrade
//! image and the secondary slot holds the previous primary image. Every
//! erase and write may be cut by power loss; a persistent status trailer
//! in the tail of the secondary slot lets the next boot resume the
//! exchange from a safe step with no data loss.
//!
//! This crate supports both `no_std` (bootloader) and `std` (host tools
//! and simulation) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: enables `std` error traits for host tools
//! - `sha256` feature: truncated SHA-256 page fingerprints instead of
//!   SipHash-2-4
//!
//! The flash driver is external: the engine only consumes the [`Flash`]
//! trait and borrows the two slot areas for the duration of each call.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod flash;
pub mod hash;
pub mod plan;
pub mod status;
pub mod swap;

// Re-export the caller-facing surface.
pub use flash::{Flash, FlashError, PageState};
pub use status::Phase;
pub use swap::{request_upgrade, Resume, Swap};

// --- Compile-time geometry ---

/// Unit of both erase and write, identical for the two slots.
pub const PAGE_SIZE: usize = 512;

/// log2 of [`PAGE_SIZE`], for page-number to byte-offset conversion.
pub const PAGE_SHIFT: usize = 9;

/// Upper bound on the page count of a slot and on the length of each
/// work list. Images needing more pages are rejected at build time.
pub const MAX_PAGES: usize = 256;

const _: () = assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
const _: () = assert!(PAGE_SIZE.is_power_of_two());

/// Per-slot fingerprint storage. Canonical order is all of slot 0's
/// pages followed by all of slot 1's.
pub(crate) type HashArrays = [[[u8; 4]; MAX_PAGES]; 2];

/// Errors surfaced by the swap engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Fault reported by the underlying flash driver.
    Flash(FlashError),
    /// Two pages share a fingerprint but carry different bytes, or a
    /// page changed underneath the executor. Recoverable by restarting
    /// the upgrade under a new hash salt.
    HashCollision,
    /// The trailer carries the request magic but no record passes its
    /// integrity check, or a spill hash page failed verification.
    CorruptTrailer,
    /// The trailer scan produced an undefined combination, or an
    /// operation was attempted in a phase that does not allow it.
    State,
    /// An image needs more work items than the compile-time bound.
    WorkOverflow,
}

impl From<FlashError> for Error {
    fn from(err: FlashError) -> Error {
        Error::Flash(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Flash(err) => write!(f, "flash driver fault: {err}"),
            Error::HashCollision => write!(f, "page fingerprint collision"),
            Error::CorruptTrailer => write!(f, "status trailer corrupt"),
            Error::State => write!(f, "undefined swap state"),
            Error::WorkOverflow => write!(f, "image exceeds the work-list bound"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
