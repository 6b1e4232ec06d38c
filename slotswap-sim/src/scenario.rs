// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Canned upgrade scenarios for the simulator and the test suite.
//!
//! A scenario fixes the two image sizes, the slot geometry and any
//! content tweak, and knows how to install its images and verify the
//! post-swap layout. The primary slot is always one page larger than
//! the secondary; the secondary reserves its tail pages for the status
//! trailer.

use slotswap_core::{request_upgrade, Error, Swap, PAGE_SIZE};

use crate::flash::SimDevice;
use crate::images::image_bytes;

/// Fingerprint salt used by every canned scenario.
pub const PREFIX: u32 = 0x5AB0_07ED;

const PS: u32 = PAGE_SIZE as u32;

/// One upgrade setup: sizes, geometry, and an optional content tweak.
#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    /// Image sizes: `[primary, secondary]`.
    pub sizes: [u32; 2],
    /// Slot capacities in pages: `[primary, secondary]`.
    pub pages: [usize; 2],
    /// Make the primary image's first two pages identical, so the
    /// planner has a slide step to skip.
    pub duplicate_pages: bool,
}

/// Small images with partial tails on both sides.
pub const SMALL: Scenario = Scenario {
    name: "small",
    sizes: [2 * PS + 7, PS + 511],
    pages: [9, 8],
    duplicate_pages: false,
};

/// Images large enough to spill fingerprints past the status record.
pub const LARGE: Scenario = Scenario {
    name: "large",
    sizes: [112 * PS + 7, 105 * PS + 511],
    pages: [121, 120],
    duplicate_pages: false,
};

/// Small images with two identical primary pages.
pub const IDENTICAL: Scenario = Scenario {
    name: "identical",
    sizes: [2 * PS + 7, PS + 511],
    pages: [9, 8],
    duplicate_pages: true,
};

/// Small images with the secondary larger than the primary.
pub const REVERSED: Scenario = Scenario {
    name: "reversed",
    sizes: [PS + 511, 2 * PS + 7],
    pages: [9, 8],
    duplicate_pages: false,
};

pub const ALL: [Scenario; 4] = [SMALL, LARGE, IDENTICAL, REVERSED];

pub fn find(name: &str) -> Option<Scenario> {
    ALL.into_iter().find(|scenario| scenario.name == name)
}

impl Scenario {
    /// Content originally installed in `slot`, tweaks applied.
    pub fn source_bytes(&self, slot: usize) -> Vec<u8> {
        let mut image = image_bytes(slot as u8, self.sizes[slot] as usize);
        if self.duplicate_pages && slot == 0 {
            let (head, tail) = image.split_at_mut(PAGE_SIZE);
            tail[..PAGE_SIZE].copy_from_slice(head);
        }
        image
    }

    /// Fresh device with both images installed and the upgrade
    /// requested.
    pub fn setup(&self) -> SimDevice {
        let device = SimDevice::new(self.pages);
        device.install(0, &self.source_bytes(0));
        device.install(1, &self.source_bytes(1));
        request_upgrade(&mut device.area(1)).expect("request marker");
        device
    }

    /// Engine state matching this scenario.
    pub fn swap(&self) -> Swap {
        Swap::init(self.sizes, PREFIX)
    }

    /// Run one boot: a fresh engine state entering `startup`.
    pub fn boot(&self, device: &SimDevice) -> Result<(), Error> {
        let mut areas = device.areas();
        self.swap().startup(&mut areas)
    }

    /// Whether the slots now hold each other's original images.
    pub fn verify_swapped(&self, device: &SimDevice) -> bool {
        device.read_raw(0, 0, self.sizes[1] as usize) == self.source_bytes(1)
            && device.read_raw(1, 0, self.sizes[0] as usize) == self.source_bytes(0)
    }

    /// Whether the slots still hold their original images.
    pub fn verify_original(&self, device: &SimDevice) -> bool {
        device.read_raw(0, 0, self.sizes[0] as usize) == self.source_bytes(0)
            && device.read_raw(1, 0, self.sizes[1] as usize) == self.source_bytes(1)
    }
}
