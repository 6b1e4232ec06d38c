// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Deterministic page-move planning for the two swap phases.
//!
//! The slide list shifts the primary image up by one page, freeing page
//! 0 for the secondary image to migrate into. The swap list then
//! interleaves, per page, a move from the secondary slot into the
//! primary with a move of the shifted primary page into the secondary.
//! Both builders work purely from the image sizes and the per-page
//! fingerprints, so the exact same lists can be rebuilt after a reboot
//! without re-reading the images.
//!
//! Moves whose source and destination fingerprints already agree are
//! skipped. On the first build that equality is trusted; on a rebuild
//! during recovery it is byte-verified, and a mismatch surfaces as a
//! fingerprint collision so the caller can restart under a new salt.

use heapless::Vec;

use crate::flash::Flash;
use crate::{Error, MAX_PAGES, PAGE_SHIFT, PAGE_SIZE};

/// Per-slot page arithmetic for an image of `size` bytes.
#[derive(Debug, Clone, Copy)]
pub struct SlotBound {
    size: u32,
}

impl SlotBound {
    pub fn new(size: u32) -> SlotBound {
        SlotBound { size }
    }

    /// Number of pages covered by the image.
    pub fn count(&self) -> usize {
        (self.size as usize).div_ceil(PAGE_SIZE)
    }

    /// Bytes used in the trailing page.
    pub fn partial(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            ((self.size as usize - 1) % PAGE_SIZE) + 1
        }
    }

    /// Bytes of page `p` covered by the image.
    pub fn page_bytes(&self, p: usize) -> usize {
        if p + 1 == self.count() {
            self.partial()
        } else {
            PAGE_SIZE
        }
    }
}

/// One page move: erase the destination page, copy the source page into
/// it, and check the copied bytes against `hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub src_slot: u8,
    pub src_page: u16,
    pub dest_slot: u8,
    pub dest_page: u16,
    /// Bytes of the moved page covered by the image; the hashed length.
    pub size: u16,
    /// Expected fingerprint of the moved content.
    pub hash: [u8; 4],
}

/// A bounded work list for one phase.
pub type WorkList = Vec<WorkItem, MAX_PAGES>;

/// Build the slide-phase work list: every primary page moves up by one,
/// emitted destination-descending so each step's source is still intact
/// when the list is executed in order.
pub fn build_slide<F: Flash>(
    area0: &F,
    bound: SlotBound,
    hashes: &[[u8; 4]],
    initial: bool,
    out: &mut WorkList,
) -> Result<(), Error> {
    out.clear();
    let count = bound.count();
    for p in (1..=count).rev() {
        let size = bound.page_bytes(p - 1);
        if p < count && hashes[p - 1] == hashes[p] {
            if !initial {
                validate_same(area0, p - 1, area0, p, size)?;
            }
            continue;
        }
        let item = WorkItem {
            src_slot: 0,
            src_page: (p - 1) as u16,
            dest_slot: 0,
            dest_page: p as u16,
            size: size as u16,
            hash: hashes[p - 1],
        };
        out.push(item).map_err(|_| Error::WorkOverflow)?;
    }
    Ok(())
}

/// Build the swap-phase work list. For each page index, first the
/// secondary page moves into the primary slot, then the shifted primary
/// page (one index up after the slide) moves into the secondary slot.
pub fn build_swap<F: Flash>(
    areas: &[F; 2],
    bounds: [SlotBound; 2],
    hashes: [&[[u8; 4]]; 2],
    initial: bool,
    out: &mut WorkList,
) -> Result<(), Error> {
    out.clear();
    let count0 = bounds[0].count();
    let count1 = bounds[1].count();
    for p in 0..count0.max(count1) {
        if p < count1 {
            if p < count0 && hashes[1][p] == hashes[0][p] {
                if !initial {
                    validate_same(&areas[1], p, &areas[0], p, bounds[1].page_bytes(p))?;
                }
            } else {
                let item = WorkItem {
                    src_slot: 1,
                    src_page: p as u16,
                    dest_slot: 0,
                    dest_page: p as u16,
                    size: bounds[1].page_bytes(p) as u16,
                    hash: hashes[1][p],
                };
                out.push(item).map_err(|_| Error::WorkOverflow)?;
            }
        }
        if p < count0 {
            // The shifted source lives one page up; the comparison stays
            // inside the computed fingerprint range.
            if p < count1 && p + 1 < count0 && hashes[0][p + 1] == hashes[1][p] {
                if !initial {
                    validate_same(&areas[0], p + 1, &areas[1], p, bounds[0].page_bytes(p))?;
                }
            } else {
                let item = WorkItem {
                    src_slot: 0,
                    src_page: (p + 1) as u16,
                    dest_slot: 1,
                    dest_page: p as u16,
                    size: bounds[0].page_bytes(p) as u16,
                    hash: hashes[0][p],
                };
                out.push(item).map_err(|_| Error::WorkOverflow)?;
            }
        }
    }
    Ok(())
}

/// Byte-verify two pages whose fingerprints matched. Differing content
/// under equal fingerprints is a collision; the caller restarts the
/// upgrade with a new salt.
fn validate_same<F: Flash>(
    area_a: &F,
    page_a: usize,
    area_b: &F,
    page_b: usize,
    size: usize,
) -> Result<(), Error> {
    let mut a = [0u8; PAGE_SIZE];
    let mut b = [0u8; PAGE_SIZE];
    area_a.read(page_a << PAGE_SHIFT, &mut a[..size])?;
    area_b.read(page_b << PAGE_SHIFT, &mut b[..size])?;
    if a[..size] != b[..size] {
        return Err(Error::HashCollision);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_full_pages() {
        let bound = SlotBound::new(2 * PAGE_SIZE as u32);
        assert_eq!(bound.count(), 2);
        assert_eq!(bound.partial(), PAGE_SIZE);
        assert_eq!(bound.page_bytes(0), PAGE_SIZE);
        assert_eq!(bound.page_bytes(1), PAGE_SIZE);
    }

    #[test]
    fn test_bound_trailing_partial() {
        let bound = SlotBound::new(2 * PAGE_SIZE as u32 + 7);
        assert_eq!(bound.count(), 3);
        assert_eq!(bound.partial(), 7);
        assert_eq!(bound.page_bytes(1), PAGE_SIZE);
        assert_eq!(bound.page_bytes(2), 7);
    }

    #[test]
    fn test_bound_one_byte_short() {
        let bound = SlotBound::new(2 * PAGE_SIZE as u32 - 1);
        assert_eq!(bound.count(), 2);
        assert_eq!(bound.partial(), PAGE_SIZE - 1);
    }

    #[test]
    fn test_bound_empty() {
        let bound = SlotBound::new(0);
        assert_eq!(bound.count(), 0);
        assert_eq!(bound.partial(), 0);
    }
}
