// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Status-trailer protocol tests: request marker, A/B rotation,
//! sequence arbitration and integrity checking.

use slotswap_core::{request_upgrade, Error, FlashError, Phase, Swap, PAGE_SIZE};
use slotswap_sim::scenario::{LARGE, SMALL};
use slotswap_sim::SimDevice;

/// Byte offset of the second-to-last page of the secondary slot.
fn penult_off(scenario: &slotswap_sim::Scenario) -> usize {
    scenario.pages[1] * PAGE_SIZE - 2 * PAGE_SIZE
}

/// Device with images installed, upgrade requested, and the initial
/// status record written (phase `Slide`, record in the penult page).
fn started(scenario: &slotswap_sim::Scenario) -> (SimDevice, Swap) {
    let device = scenario.setup();
    let mut swap = scenario.swap();
    let mut areas = device.areas();
    swap.compute_hashes(&areas).unwrap();
    swap.start_status(&mut areas[1]).unwrap();
    (device, swap)
}

// =============================================================================
// Request marker and record scanning
// =============================================================================

#[test]
fn test_blank_trailer_scans_unknown() {
    let device = SimDevice::new(SMALL.pages);
    let mut swap = SMALL.swap();
    assert_eq!(swap.scan(&device.area(1)).unwrap(), Phase::Unknown);
}

#[test]
fn test_magic_scans_request() {
    let device = SimDevice::new(SMALL.pages);
    request_upgrade(&mut device.area(1)).unwrap();
    let mut swap = SMALL.swap();
    assert_eq!(swap.scan(&device.area(1)).unwrap(), Phase::Request);
}

#[test]
fn test_started_status_scans_slide() {
    let (device, _) = started(&SMALL);
    let mut swap = SMALL.swap();
    assert_eq!(swap.scan(&device.area(1)).unwrap(), Phase::Slide);
}

#[test]
fn test_update_advances_phase() {
    let (device, mut swap) = started(&SMALL);
    swap.update_status(&mut device.area(1), Phase::Swap).unwrap();

    let mut fresh = SMALL.swap();
    assert_eq!(fresh.scan(&device.area(1)).unwrap(), Phase::Swap);
}

// =============================================================================
// Integrity checking
// =============================================================================

#[test]
fn test_corrupt_fingerprint_degrades_to_request() {
    let (device, _) = started(&SMALL);
    // Flip one fingerprint byte inside the record. The magic survives,
    // the integrity hash does not: the scan must fall back to the bare
    // request, not report a trustworthy Slide.
    device.corrupt(1, penult_off(&SMALL) + 17, 0x01);

    let mut swap = SMALL.swap();
    assert_eq!(swap.scan(&device.area(1)).unwrap(), Phase::Request);
}

#[test]
fn test_every_covered_record_byte_is_protected() {
    // Any byte before the integrity hash must invalidate the record.
    for offset in [0, 123, 439, 444, 452, 481, 487, 491] {
        let (device, _) = started(&SMALL);
        device.corrupt(1, penult_off(&SMALL) + offset, 0x80);
        let mut swap = SMALL.swap();
        assert_eq!(
            swap.scan(&device.area(1)).unwrap(),
            Phase::Request,
            "record byte {offset} is not covered"
        );
    }
}

#[test]
fn test_corrupt_spill_page_is_fatal() {
    let (device, _) = started(&LARGE);
    // The spill page sits just below the record pair.
    device.corrupt(1, penult_off(&LARGE) - PAGE_SIZE + 33, 0x04);

    let mut swap = LARGE.swap();
    assert_eq!(swap.scan(&device.area(1)).unwrap(), Phase::Slide);
    assert_eq!(swap.load_status(&device.area(1)), Err(Error::CorruptTrailer));
}

// =============================================================================
// A/B rotation under interruption
// =============================================================================

#[test]
fn test_interrupted_update_yields_old_or_new_phase() {
    // An update is three mutations: erase target, write target, erase
    // old. Cut each one and check the scan still answers with either
    // the pre- or the post-update phase, nothing else.
    for cut in 0..3 {
        let (device, mut swap) = started(&SMALL);
        device.set_budget(cut);
        assert_eq!(
            swap.update_status(&mut device.area(1), Phase::Swap),
            Err(Error::Flash(FlashError::Expired))
        );
        device.clear_budget();

        let mut fresh = SMALL.swap();
        let phase = fresh.scan(&device.area(1)).unwrap();
        assert!(
            phase == Phase::Slide || phase == Phase::Swap,
            "cut {cut} produced {phase:?}"
        );
    }
}

#[test]
fn test_scan_prefers_lower_sequence() {
    // Rotate the record up to sequence 5 (phase Slide), then cut the
    // update to sequence 6 (phase Swap) right before the old record's
    // erase: both records are now intact and the older must win.
    let (device, mut swap) = started(&SMALL);
    for _ in 0..4 {
        swap.update_status(&mut device.area(1), Phase::Slide).unwrap();
    }
    device.set_budget(2);
    assert_eq!(
        swap.update_status(&mut device.area(1), Phase::Swap),
        Err(Error::Flash(FlashError::Expired))
    );
    device.clear_budget();

    let mut fresh = SMALL.swap();
    assert_eq!(fresh.scan(&device.area(1)).unwrap(), Phase::Slide);
}

#[test]
fn test_request_marker_survives_interrupted_start() {
    // Cut start_status at every point. Until the record is durable the
    // scan must still say Request; afterwards Slide. Never Unknown,
    // which would silently drop the upgrade.
    let mut cut = 0;
    loop {
        let device = SMALL.setup();
        let mut swap = SMALL.swap();
        let mut areas = device.areas();
        swap.compute_hashes(&areas).unwrap();
        device.set_budget(cut);
        match swap.start_status(&mut areas[1]) {
            Ok(()) => {
                device.clear_budget();
                let mut fresh = SMALL.swap();
                assert_eq!(fresh.scan(&device.area(1)).unwrap(), Phase::Slide);
                break;
            }
            Err(Error::Flash(FlashError::Expired)) => {
                device.clear_budget();
                let mut fresh = SMALL.swap();
                let phase = fresh.scan(&device.area(1)).unwrap();
                assert!(
                    phase == Phase::Request || phase == Phase::Slide,
                    "cut {cut} produced {phase:?}"
                );
            }
            Err(err) => panic!("cut {cut}: {err:?}"),
        }
        cut += 1;
    }
    assert!(cut >= 3, "sweep covered the whole write sequence");
}
