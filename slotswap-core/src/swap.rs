// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The swap engine state, its executor and the recovery procedure.
//!
//! [`Swap`] is the single mutable value of the engine. It owns the
//! fingerprint arrays, the two work lists and the page scratch buffer;
//! flash areas are borrowed per call and never stored, so the trailer
//! (which lives inside slot 1) and the executor (which writes both
//! slots) share the hardware without owning it.
//!
//! A fresh upgrade runs: scan finds `Request`, both images are
//! fingerprinted, the status record is persisted with phase `Slide`,
//! the work lists are built and executed, and the phase advances
//! through `Swap` to `Done`. After an interruption the same entry point
//! reloads sizes, salt and fingerprints from the trailer, rebuilds the
//! identical lists, probes destination pages for the first unfinished
//! step and continues from there.

use crate::flash::{Flash, FlashError, PageState};
use crate::hash::{compute_slot, fingerprint, hash_iter};
use crate::plan::{build_slide, build_swap, SlotBound, WorkItem, WorkList};
use crate::status::{self, Phase, Trailer};
use crate::{Error, HashArrays, MAX_PAGES, PAGE_SHIFT, PAGE_SIZE};

/// Upgrade restarts attempted before a persistent fingerprint
/// collision is surfaced to the caller.
const COLLISION_RETRIES: usize = 3;

/// Resume point inside the work lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resume {
    /// Active list: 0 for the slide phase, 1 for the swap phase.
    pub work: usize,
    /// First step of that list still to execute.
    pub step: usize,
}

/// The image-swap engine. One value per device; no heap, no hidden
/// globals, flash borrowed per operation.
pub struct Swap {
    sizes: [u32; 2],
    prefix: [u8; 4],
    counts: [usize; 2],
    hashes: HashArrays,
    work: [WorkList; 2],
    trailer: Trailer,
    tmp: [u8; PAGE_SIZE],
}

/// Mark the secondary slot's trailer with the upgrade-request magic.
/// Precondition for [`Swap::startup`] to do anything.
pub fn request_upgrade<F: Flash>(secondary: &mut F) -> Result<(), Error> {
    status::write_magic(secondary)
}

impl Swap {
    /// Fresh engine state for a device with the given image sizes and
    /// fingerprint salt.
    pub fn init(sizes: [u32; 2], prefix: u32) -> Swap {
        Swap {
            sizes,
            prefix: prefix.to_le_bytes(),
            counts: [0; 2],
            hashes: [[[0; 4]; MAX_PAGES]; 2],
            work: [WorkList::new(), WorkList::new()],
            trailer: Trailer::new(),
            tmp: [0; PAGE_SIZE],
        }
    }

    /// Image sizes as configured or reloaded from the trailer.
    pub fn sizes(&self) -> [u32; 2] {
        self.sizes
    }

    /// The current fingerprint salt.
    pub fn prefix(&self) -> u32 {
        u32::from_le_bytes(self.prefix)
    }

    /// Idempotent entry point. Drives a requested or interrupted
    /// upgrade to completion; returns immediately when there is no
    /// work. A fingerprint collision restarts the upgrade under a
    /// bumped salt, a bounded number of times.
    pub fn startup<F: Flash>(&mut self, areas: &mut [F; 2]) -> Result<(), Error> {
        for _ in 0..COLLISION_RETRIES {
            match self.run(areas) {
                Err(Error::HashCollision) => {
                    // The fingerprints cannot be trusted; fall back to
                    // a bare request and start over with a new salt.
                    self.prefix = self.prefix().wrapping_add(1).to_le_bytes();
                    status::write_magic(&mut areas[1])?;
                }
                other => return other,
            }
        }
        Err(Error::HashCollision)
    }

    fn run<F: Flash>(&mut self, areas: &mut [F; 2]) -> Result<(), Error> {
        match self.trailer.scan(&areas[1])? {
            Phase::Unknown | Phase::Done => Ok(()),
            Phase::Request => self.begin(areas),
            phase @ (Phase::Slide | Phase::Swap) => self.resume(areas, phase),
        }
    }

    /// Start a fresh upgrade from a bare request.
    fn begin<F: Flash>(&mut self, areas: &mut [F; 2]) -> Result<(), Error> {
        self.compute_hashes(areas)?;
        self.start_status(&mut areas[1])?;
        self.build(areas, true)?;
        self.perform_work(areas, Resume { work: 0, step: 0 })
    }

    /// Continue an interrupted upgrade from the persisted status.
    fn resume<F: Flash>(&mut self, areas: &mut [F; 2], phase: Phase) -> Result<(), Error> {
        self.load_status(&areas[1])?;
        self.build(areas, false)?;
        let resume = self.recover(areas, phase)?;
        self.perform_work(areas, resume)
    }

    /// Fingerprint every page of both images under the current salt.
    pub fn compute_hashes<F: Flash>(&mut self, areas: &[F; 2]) -> Result<(), Error> {
        for slot in 0..2 {
            self.counts[slot] = compute_slot(
                &areas[slot],
                self.sizes[slot],
                self.prefix,
                &mut self.hashes[slot],
            )?;
        }
        Ok(())
    }

    /// All page fingerprints in canonical order (slot 0, then slot 1).
    pub fn fingerprints(&self) -> impl Iterator<Item = [u8; 4]> + Clone + '_ {
        hash_iter(&self.hashes, self.counts)
    }

    /// Scan the trailer and report the persisted phase.
    pub fn scan<F: Flash>(&mut self, secondary: &F) -> Result<Phase, Error> {
        self.trailer.scan(secondary)
    }

    /// Persist the initial status record (phase `Slide`, sequence 1).
    /// Requires [`Swap::compute_hashes`] to have run.
    pub fn start_status<F: Flash>(&mut self, secondary: &mut F) -> Result<(), Error> {
        self.trailer
            .start_status(secondary, self.sizes, self.prefix, &self.hashes, self.counts)
    }

    /// Advance the persisted phase with the A/B record rotation.
    pub fn update_status<F: Flash>(&mut self, secondary: &mut F, phase: Phase) -> Result<(), Error> {
        self.trailer
            .update_status(secondary, self.sizes, self.prefix, &self.hashes, self.counts, phase)
    }

    /// Reload sizes, salt and fingerprints from the scanned trailer.
    pub fn load_status<F: Flash>(&mut self, secondary: &F) -> Result<(), Error> {
        let (sizes, prefix) = self.trailer.load_status(secondary, &mut self.hashes)?;
        self.sizes = sizes;
        self.prefix = prefix;
        self.counts = [
            SlotBound::new(sizes[0]).count(),
            SlotBound::new(sizes[1]).count(),
        ];
        Ok(())
    }

    /// Build both work lists from the current sizes and fingerprints.
    fn build<F: Flash>(&mut self, areas: &[F; 2], initial: bool) -> Result<(), Error> {
        let bounds = [SlotBound::new(self.sizes[0]), SlotBound::new(self.sizes[1])];
        build_slide(
            &areas[0],
            bounds[0],
            &self.hashes[0][..self.counts[0]],
            initial,
            &mut self.work[0],
        )?;
        build_swap(
            areas,
            bounds,
            [
                &self.hashes[0][..self.counts[0]],
                &self.hashes[1][..self.counts[1]],
            ],
            initial,
            &mut self.work[1],
        )
    }

    /// Execute the work lists from `resume` to completion, advancing
    /// the persisted phase between the two lists and to `Done` at the
    /// end.
    pub fn perform_work<F: Flash>(&mut self, areas: &mut [F; 2], resume: Resume) -> Result<(), Error> {
        for w in resume.work..2 {
            let start = if w == resume.work { resume.step } else { 0 };
            for i in start..self.work[w].len() {
                let item = self.work[w][i];
                self.execute(areas, item)?;
            }
            if w == 0 {
                self.update_status(&mut areas[1], Phase::Swap)?;
            }
        }
        self.update_status(&mut areas[1], Phase::Done)
    }

    /// One page move: erase the destination, copy the source page, and
    /// check the copied bytes against the planned fingerprint.
    fn execute<F: Flash>(&mut self, areas: &mut [F; 2], item: WorkItem) -> Result<(), Error> {
        let dest_off = (item.dest_page as usize) << PAGE_SHIFT;
        let src_off = (item.src_page as usize) << PAGE_SHIFT;
        areas[item.dest_slot as usize].erase(dest_off, PAGE_SIZE)?;
        areas[item.src_slot as usize].read(src_off, &mut self.tmp)?;
        if fingerprint(self.prefix, &self.tmp[..item.size as usize]) != item.hash {
            // The source changed underneath the plan; indistinguishable
            // from a fingerprint collision.
            return Err(Error::HashCollision);
        }
        areas[item.dest_slot as usize].write(dest_off, &self.tmp)?;
        Ok(())
    }

    /// Locate the resume point inside the active work list after an
    /// interruption: walk the steps probing each destination page, stop
    /// at the first one that is not written with the planned content,
    /// then back up one step if the previous step's source is still
    /// intact: its destination may have been clobbered by the
    /// interrupted step, and re-executing a finished step is harmless.
    pub fn recover<F: Flash>(&self, areas: &[F; 2], phase: Phase) -> Result<Resume, Error> {
        let w = match phase {
            Phase::Slide => 0,
            Phase::Swap => 1,
            _ => return Err(Error::State),
        };
        let list = &self.work[w];

        let mut step = list.len();
        for (i, item) in list.iter().enumerate() {
            let done = page_matches(
                &areas[item.dest_slot as usize],
                item.dest_page,
                item.size as usize,
                self.prefix,
                item.hash,
            )?;
            if !done {
                step = i;
                break;
            }
        }

        if step > 0 {
            let prev = list[step - 1];
            let source_intact = page_matches(
                &areas[prev.src_slot as usize],
                prev.src_page,
                prev.size as usize,
                self.prefix,
                prev.hash,
            )?;
            if source_intact {
                step -= 1;
            }
        }

        Ok(Resume { work: w, step })
    }
}

/// Whether `page` is physically written and its first `size` bytes
/// fingerprint to `expect`. Unreadable (torn) pages count as no.
fn page_matches<F: Flash>(
    area: &F,
    page: u16,
    size: usize,
    prefix: [u8; 4],
    expect: [u8; 4],
) -> Result<bool, Error> {
    let off = (page as usize) << PAGE_SHIFT;
    if area.page_state(off) != PageState::Written {
        return Ok(false);
    }
    let mut buf = [0u8; PAGE_SIZE];
    match area.read(off, &mut buf) {
        Ok(()) => {}
        Err(FlashError::Unwritten) => return Ok(false),
        Err(err) => return Err(Error::Flash(err)),
    }
    Ok(fingerprint(prefix, &buf[..size]) == expect)
}
