// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Persistent status trailer in the tail of the secondary slot.
//!
//! The last two pages of slot 1 hold an A/B pair of status records.
//! Exactly one record is authoritative at any time; advancing the phase
//! writes a fresh record with a higher sequence number into the erased
//! page and only then erases the old one. A scan that finds both
//! records intact therefore knows the *older* one is the fully written
//! one, because the erase that should have removed it never completed.
//!
//! A record carries the image sizes, the hash salt, the current phase
//! and the first 110 page fingerprints; further fingerprints spill into
//! dedicated hash pages laid out below the record pair toward
//! decreasing addresses. Spill pages are written before the record so
//! that a valid record always implies valid fingerprints.
//!
//! An upgrade request is a bare magic page: both trailer pages erased,
//! then the magic constant written into the last one. A magic page that
//! fails the record integrity check reads back as phase `Request`.

use crate::flash::{Flash, FlashError, PageState};
use crate::hash::calc_hash;
use crate::plan::SlotBound;
use crate::{Error, HashArrays, MAX_PAGES, PAGE_SIZE};

/// Fingerprints held inline in the status record.
pub const LAST_PAGE_HASHES: usize = 110;

/// Fingerprints held in each spill hash page.
pub const HASH_PAGE_HASHES: usize = 127;

/// Trailer magic: a little-endian alignment word (0x0200, the page
/// size) followed by a fixed 14-byte constant. Only the constant is
/// compared.
pub const TRAILER_MAGIC: [u8; 16] = [
    0x00, 0x02, // alignment word
    0x3e, 0x04, 0xec, 0x53, 0xa0, 0x40, 0x45, 0x39, 0x4a, 0x6e, 0x00, 0xd5, 0xa2, 0xb3,
];

/// Bytes of a record page covered by its integrity hash: everything up
/// to the hash field itself and the trailing magic.
const HASHED_LEN: usize = PAGE_SIZE - 20;

/// Swap procedure phase, as persisted in the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Unknown = 0,
    Request = 1,
    Slide = 2,
    Swap = 3,
    Done = 4,
}

impl Phase {
    /// Decode a persisted phase byte.
    pub fn from_u8(raw: u8) -> Result<Phase, Error> {
        match raw {
            0 => Ok(Phase::Unknown),
            1 => Ok(Phase::Request),
            2 => Ok(Phase::Slide),
            3 => Ok(Phase::Swap),
            4 => Ok(Phase::Done),
            _ => Err(Error::State),
        }
    }
}

// --- On-flash records (little-endian integers, byte-exact) ---

/// The status record, filling one page.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct LastPage {
    pub hashes: [[u8; 4]; LAST_PAGE_HASHES],
    pub sizes: [u32; 2],
    /// Reserved for encryption keys; written as zeros.
    pub keys: [[u8; 16]; 2],
    pub prefix: [u8; 4],
    pub seq: u32,
    pub phase: u8,
    pub swap_info: u8,
    pub copy_done: u8,
    pub image_ok: u8,
    pub hash: [u8; 4],
    pub magic: [u8; 16],
}

const _: () = assert!(core::mem::size_of::<LastPage>() == PAGE_SIZE);

/// A spill page of fingerprints for image pairs past
/// [`LAST_PAGE_HASHES`] pages.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct HashPage {
    pub hashes: [[u8; 4]; HASH_PAGE_HASHES],
    pub hash: [u8; 4],
}

const _: () = assert!(core::mem::size_of::<HashPage>() == PAGE_SIZE);

impl LastPage {
    fn empty() -> LastPage {
        LastPage {
            hashes: [[0; 4]; LAST_PAGE_HASHES],
            sizes: [0; 2],
            keys: [[0; 16]; 2],
            prefix: [0; 4],
            seq: 0,
            phase: Phase::Unknown as u8,
            swap_info: 0,
            copy_done: 0,
            image_ok: 0,
            hash: [0; 4],
            magic: TRAILER_MAGIC,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, PAGE_SIZE) }
    }

    fn read_from(buf: &[u8; PAGE_SIZE]) -> LastPage {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const LastPage) }
    }

    fn seal(&mut self) {
        let hash = calc_hash(&self.as_bytes()[..HASHED_LEN]);
        self.hash = hash;
    }

    fn has_magic(buf: &[u8; PAGE_SIZE]) -> bool {
        buf[PAGE_SIZE - 14..] == TRAILER_MAGIC[2..]
    }

    fn integrity_ok(buf: &[u8; PAGE_SIZE]) -> bool {
        buf[HASHED_LEN..HASHED_LEN + 4] == calc_hash(&buf[..HASHED_LEN])
    }
}

impl HashPage {
    fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, PAGE_SIZE) }
    }

    fn read_from(buf: &[u8; PAGE_SIZE]) -> HashPage {
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const HashPage) }
    }

    fn seal(&mut self) {
        let hash = calc_hash(&self.as_bytes()[..PAGE_SIZE - 4]);
        self.hash = hash;
    }

    fn integrity_ok(buf: &[u8; PAGE_SIZE]) -> bool {
        buf[PAGE_SIZE - 4..] == calc_hash(&buf[..PAGE_SIZE - 4])
    }
}

// --- Trailer geometry ---

/// One of the two record pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrailerPage {
    /// The last page of the slot.
    Ult,
    /// The second-to-last page.
    Penult,
}

impl TrailerPage {
    fn offset<F: Flash>(self, area: &F) -> usize {
        match self {
            TrailerPage::Ult => area.capacity() - PAGE_SIZE,
            TrailerPage::Penult => area.capacity() - 2 * PAGE_SIZE,
        }
    }

    fn other(self) -> TrailerPage {
        match self {
            TrailerPage::Ult => TrailerPage::Penult,
            TrailerPage::Penult => TrailerPage::Ult,
        }
    }
}

/// Mark the secondary slot as carrying a requested upgrade: erase both
/// trailer pages, then write a page holding only the magic at the tail.
pub(crate) fn write_magic<F: Flash>(area: &mut F) -> Result<(), Error> {
    let ult = TrailerPage::Ult.offset(area);
    let penult = TrailerPage::Penult.offset(area);
    area.erase(penult, PAGE_SIZE)?;
    area.erase(ult, PAGE_SIZE)?;
    let mut buf = [0xFFu8; PAGE_SIZE];
    buf[PAGE_SIZE - 16..].copy_from_slice(&TRAILER_MAGIC);
    area.write(ult, &buf)?;
    Ok(())
}

/// Outcome of scanning the two record pages.
struct ScanResult {
    phase: Phase,
    /// Record page backing `phase`, if a record validated.
    current: Option<TrailerPage>,
    seq: u32,
}

fn scan_pages<F: Flash>(area: &F) -> Result<ScanResult, Error> {
    let mut magic_seen = false;
    let mut best: Option<(TrailerPage, u32, u8)> = None;
    for loc in [TrailerPage::Ult, TrailerPage::Penult] {
        let off = loc.offset(area);
        if area.page_state(off) != PageState::Written {
            continue;
        }
        let mut buf = [0u8; PAGE_SIZE];
        match area.read(off, &mut buf) {
            Ok(()) => {}
            Err(FlashError::Unwritten) => continue,
            Err(err) => return Err(Error::Flash(err)),
        }
        if !LastPage::has_magic(&buf) {
            continue;
        }
        magic_seen = true;
        if !LastPage::integrity_ok(&buf) {
            continue;
        }
        let rec = LastPage::read_from(&buf);
        // Keep the lower sequence number: the writer finishes the new
        // record before erasing the old, so when both survive only the
        // older one is guaranteed complete.
        match best {
            Some((_, seq, _)) if seq <= rec.seq => {}
            _ => best = Some((loc, rec.seq, rec.phase)),
        }
    }
    match best {
        Some((loc, seq, phase)) => Ok(ScanResult {
            phase: Phase::from_u8(phase)?,
            current: Some(loc),
            seq,
        }),
        None if magic_seen => Ok(ScanResult {
            phase: Phase::Request,
            current: None,
            seq: 0,
        }),
        None => Ok(ScanResult {
            phase: Phase::Unknown,
            current: None,
            seq: 0,
        }),
    }
}

/// A/B bookkeeping for the record pair.
pub(crate) struct Trailer {
    current: Option<TrailerPage>,
    seq: u32,
}

impl Trailer {
    pub(crate) const fn new() -> Trailer {
        Trailer { current: None, seq: 0 }
    }

    /// Scan the record pair and remember which page is authoritative.
    pub(crate) fn scan<F: Flash>(&mut self, area: &F) -> Result<Phase, Error> {
        let result = scan_pages(area)?;
        self.current = result.current;
        self.seq = result.seq;
        Ok(result.phase)
    }

    /// Persist the full status for a fresh upgrade: spill hash pages
    /// first, then the record itself with phase `Slide` and sequence 1.
    ///
    /// The record lands in the second-to-last page, so the request
    /// magic in the last page stays durable until the record is; only
    /// then is the last page erased for the A/B rotation. Every cut
    /// point of this sequence scans back as `Request` or `Slide`.
    pub(crate) fn start_status<F: Flash>(
        &mut self,
        area: &mut F,
        sizes: [u32; 2],
        prefix: [u8; 4],
        hashes: &HashArrays,
        counts: [usize; 2],
    ) -> Result<(), Error> {
        let total = counts[0] + counts[1];
        let spill = total.saturating_sub(LAST_PAGE_HASHES).div_ceil(HASH_PAGE_HASHES);
        let pages = area.capacity() / PAGE_SIZE;
        if counts[1] + 2 + spill > pages {
            return Err(Error::State);
        }

        let penult = TrailerPage::Penult.offset(area);
        let all = crate::hash::hash_iter(hashes, counts);

        // Spill pages go below the record pair, toward decreasing
        // addresses, and must be durable before the record that
        // recovery keys off.
        for idx in 0..spill {
            let mut page = HashPage { hashes: [[0; 4]; HASH_PAGE_HASHES], hash: [0; 4] };
            let base = LAST_PAGE_HASHES + idx * HASH_PAGE_HASHES;
            for (dst, fp) in page.hashes.iter_mut().zip(all.clone().skip(base)) {
                *dst = fp;
            }
            page.seal();
            let off = penult - (idx + 1) * PAGE_SIZE;
            area.erase(off, PAGE_SIZE)?;
            area.write(off, page.as_bytes())?;
        }

        let mut rec = LastPage::empty();
        for (dst, fp) in rec.hashes.iter_mut().zip(all.clone()) {
            *dst = fp;
        }
        rec.sizes = sizes;
        rec.prefix = prefix;
        rec.seq = 1;
        rec.phase = Phase::Slide as u8;
        rec.seal();

        area.erase(penult, PAGE_SIZE)?;
        area.write(penult, rec.as_bytes())?;
        area.erase(TrailerPage::Ult.offset(area), PAGE_SIZE)?;
        self.current = Some(TrailerPage::Penult);
        self.seq = 1;
        Ok(())
    }

    /// Advance the persisted phase: bump the sequence, write the
    /// refreshed record into the other page, then erase the page
    /// holding the previous record.
    pub(crate) fn update_status<F: Flash>(
        &mut self,
        area: &mut F,
        sizes: [u32; 2],
        prefix: [u8; 4],
        hashes: &HashArrays,
        counts: [usize; 2],
        phase: Phase,
    ) -> Result<(), Error> {
        let current = self.current.ok_or(Error::State)?;
        let target = current.other();

        let mut rec = LastPage::empty();
        for (dst, fp) in rec.hashes.iter_mut().zip(crate::hash::hash_iter(hashes, counts)) {
            *dst = fp;
        }
        rec.sizes = sizes;
        rec.prefix = prefix;
        rec.seq = self.seq + 1;
        rec.phase = phase as u8;
        rec.seal();

        // The target page may still hold a stale record from an
        // interrupted update; erase it unconditionally.
        let target_off = target.offset(area);
        area.erase(target_off, PAGE_SIZE)?;
        area.write(target_off, rec.as_bytes())?;
        area.erase(current.offset(area), PAGE_SIZE)?;
        self.current = Some(target);
        self.seq += 1;
        Ok(())
    }

    /// Rebuild the in-memory status from the authoritative record:
    /// sizes and salt from the record, fingerprints from the record and
    /// its spill pages. A spill page failing its integrity tag is
    /// unrecoverable.
    pub(crate) fn load_status<F: Flash>(
        &self,
        area: &F,
        hashes: &mut HashArrays,
    ) -> Result<([u32; 2], [u8; 4]), Error> {
        let current = self.current.ok_or(Error::State)?;
        let mut buf = [0u8; PAGE_SIZE];
        area.read(current.offset(area), &mut buf)?;
        let rec = LastPage::read_from(&buf);

        let counts = [
            SlotBound::new(rec.sizes[0]).count(),
            SlotBound::new(rec.sizes[1]).count(),
        ];
        if counts[0] > MAX_PAGES || counts[1] > MAX_PAGES {
            return Err(Error::WorkOverflow);
        }
        let total = counts[0] + counts[1];

        let mut store = |index: usize, fp: [u8; 4]| {
            if index < counts[0] {
                hashes[0][index] = fp;
            } else {
                hashes[1][index - counts[0]] = fp;
            }
        };
        for (index, fp) in rec.hashes.iter().enumerate().take(total.min(LAST_PAGE_HASHES)) {
            store(index, *fp);
        }

        let penult = TrailerPage::Penult.offset(area);
        let spill = total.saturating_sub(LAST_PAGE_HASHES).div_ceil(HASH_PAGE_HASHES);
        for idx in 0..spill {
            let off = penult - (idx + 1) * PAGE_SIZE;
            area.read(off, &mut buf)?;
            if !HashPage::integrity_ok(&buf) {
                return Err(Error::CorruptTrailer);
            }
            let page = HashPage::read_from(&buf);
            let base = LAST_PAGE_HASHES + idx * HASH_PAGE_HASHES;
            for (j, fp) in page.hashes.iter().enumerate().take(HASH_PAGE_HASHES.min(total - base)) {
                store(base + j, *fp);
            }
        }
        Ok((rec.sizes, rec.prefix))
    }
}
