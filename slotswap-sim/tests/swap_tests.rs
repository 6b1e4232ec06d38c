// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! End-to-end swap tests on the simulated device.

use slotswap_core::{request_upgrade, Phase, Swap};
use slotswap_sim::scenario::{IDENTICAL, LARGE, PREFIX, REVERSED, SMALL};

// =============================================================================
// Uninterrupted swaps
// =============================================================================

#[test]
fn test_small_swap_exchanges_images() {
    let device = SMALL.setup();
    SMALL.boot(&device).unwrap();
    assert!(SMALL.verify_swapped(&device));
}

#[test]
fn test_large_swap_spills_hash_pages() {
    // 113 + 106 fingerprints do not fit the status record; the spill
    // page path runs for real here.
    let device = LARGE.setup();
    LARGE.boot(&device).unwrap();
    assert!(LARGE.verify_swapped(&device));
}

#[test]
fn test_duplicate_primary_pages_still_swap() {
    let device = IDENTICAL.setup();
    IDENTICAL.boot(&device).unwrap();
    assert!(IDENTICAL.verify_swapped(&device));
}

#[test]
fn test_secondary_larger_than_primary() {
    let device = REVERSED.setup();
    REVERSED.boot(&device).unwrap();
    assert!(REVERSED.verify_swapped(&device));
}

// =============================================================================
// Terminal state and idempotence
// =============================================================================

#[test]
fn test_completed_swap_scans_done() {
    let device = SMALL.setup();
    SMALL.boot(&device).unwrap();

    let mut swap = SMALL.swap();
    assert_eq!(swap.scan(&device.area(1)).unwrap(), Phase::Done);
}

#[test]
fn test_second_startup_is_a_no_op() {
    let device = SMALL.setup();
    SMALL.boot(&device).unwrap();
    let ops_after_swap = device.ops();

    SMALL.boot(&device).unwrap();
    assert_eq!(device.ops(), ops_after_swap, "no flash was touched");
    assert!(SMALL.verify_swapped(&device));
}

#[test]
fn test_startup_without_request_does_nothing() {
    let device = SMALL.setup();
    // Overwrite the request marker state with a blank trailer: erase
    // both trailer pages so the scan finds nothing.
    let capacity = SMALL.pages[1] * slotswap_core::PAGE_SIZE;
    {
        use slotswap_core::{Flash, PAGE_SIZE};
        let mut area = device.area(1);
        area.erase(capacity - 2 * PAGE_SIZE, 2 * PAGE_SIZE).unwrap();
    }
    SMALL.boot(&device).unwrap();
    assert!(SMALL.verify_original(&device));
}

#[test]
fn test_swap_back_restores_original_images() {
    let device = SMALL.setup();
    SMALL.boot(&device).unwrap();
    assert!(SMALL.verify_swapped(&device));

    // Request a second upgrade: the image sizes per slot are now
    // exchanged.
    request_upgrade(&mut device.area(1)).unwrap();
    let mut swap = Swap::init([SMALL.sizes[1], SMALL.sizes[0]], PREFIX);
    let mut areas = device.areas();
    swap.startup(&mut areas).unwrap();

    assert!(SMALL.verify_original(&device));
}

// =============================================================================
// Plan reconstruction
// =============================================================================

#[test]
fn test_fingerprints_survive_the_trailer() {
    // The fingerprints loaded back from the trailer must be the ones
    // that were computed, or recovery would rebuild a different plan.
    let device = LARGE.setup();
    let mut writer = LARGE.swap();
    let mut areas = device.areas();
    writer.compute_hashes(&areas).unwrap();
    writer.start_status(&mut areas[1]).unwrap();
    let written: Vec<[u8; 4]> = writer.fingerprints().collect();

    let mut reader = Swap::init([0, 0], 0);
    assert_eq!(reader.scan(&areas[1]).unwrap(), Phase::Slide);
    reader.load_status(&areas[1]).unwrap();

    assert_eq!(reader.sizes(), LARGE.sizes);
    assert_eq!(reader.prefix(), PREFIX);
    let loaded: Vec<[u8; 4]> = reader.fingerprints().collect();
    assert_eq!(written, loaded);
}
