// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash driver contract consumed by the swap engine.
//!
//! The engine never owns flash. Each slot is an area handle produced by
//! the platform driver and borrowed for the duration of a call. The one
//! non-obvious requirement is [`Flash::page_state`]: it must tolerate
//! torn operations, reporting a partially completed write as `Written`
//! and a partially completed erase as `Erased`. Recovery is built on
//! that answer being available even when the page itself is unreadable.

/// Physical state of one page, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Erased,
    Written,
}

/// Faults raised by a flash driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// The page is erased or in an unsafe (torn) condition and cannot
    /// be read back.
    Unwritten,
    /// The driver's operation budget ran out (simulated power cut;
    /// test drivers only).
    Expired,
    /// Offset or length outside the area.
    Bounds,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashError::Unwritten => write!(f, "page not readable"),
            FlashError::Expired => write!(f, "operation budget expired"),
            FlashError::Bounds => write!(f, "access out of bounds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

/// One slot of flash, addressable in [`PAGE_SIZE`](crate::PAGE_SIZE)
/// units.
pub trait Flash {
    /// Read `buf.len()` bytes at `off`. The span may not cross a page
    /// boundary.
    fn read(&self, off: usize, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Erase `len` bytes at `off`; both must be page-aligned.
    fn erase(&mut self, off: usize, len: usize) -> Result<(), FlashError>;

    /// Program one full page; `off` page-aligned, `buf` one page long.
    fn write(&mut self, off: usize, buf: &[u8]) -> Result<(), FlashError>;

    /// Physical state of the page at `off`. Infallible: a torn write
    /// reports `Written`, a torn erase reports `Erased`.
    fn page_state(&self, off: usize) -> PageState;

    /// Total size of the area in bytes.
    fn capacity(&self) -> usize;
}
