// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Brightness offset and inversion of GRAY8 frames.
//!
//! This is the configuration the plugin installs for `framewrap`. The processor
//! keeps a lookup table that is rebuilt whenever the store reports a change.

use gst::glib;
use gst::prelude::*;

use std::sync::{Arc, LazyLock, Mutex};

use crate::customizer::{Customizer, ElementDetails};
use crate::processor::FrameProcessor;
use crate::properties::{ChangeListener, FrameSize, ImageProperties, ParamTable, PropertyId};

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "framewrap-levels",
        gst::DebugColorFlags::empty(),
        Some("GRAY8 levels processor"),
    )
});

pub const PROP_OFFSET: PropertyId = PropertyId::new(1);
pub const PROP_INVERT: PropertyId = PropertyId::new(2);

const DEFAULT_OFFSET: i32 = 0;
const DEFAULT_INVERT: bool = false;

pub fn parameters(table: &mut ParamTable) {
    table.insert(
        PROP_OFFSET,
        glib::ParamSpecInt::builder("offset")
            .nick("Offset")
            .blurb("Value added to every pixel, results are clamped")
            .minimum(-255)
            .maximum(255)
            .default_value(DEFAULT_OFFSET)
            .mutable_playing()
            .readwrite()
            .build(),
    );
    table.insert(
        PROP_INVERT,
        glib::ParamSpecBoolean::builder("invert")
            .nick("Invert")
            .blurb("Invert pixel values after applying the offset")
            .default_value(DEFAULT_INVERT)
            .mutable_playing()
            .readwrite()
            .build(),
    );
}

pub fn configure() -> Option<Customizer> {
    let caps = gst::Caps::builder("video/x-raw")
        .field("format", "GRAY8")
        .build();

    let customizer = Customizer::listening(
        || {
            let mut table = ParamTable::new();
            parameters(&mut table);
            ImageProperties::new(&table).with_initial([PROP_OFFSET, PROP_INVERT])
        },
        Levels::new,
    )
    .with_parameters(parameters)
    .with_caps(caps)
    .with_details(ElementDetails {
        long_name: "Frame levels".into(),
        classification: "Filter/Effect/Video".into(),
        description: "Offsets and optionally inverts GRAY8 pixel values".into(),
        ..Default::default()
    });

    Some(customizer)
}

fn build_lut(offset: i32, invert: bool) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = (i as i32 + offset).clamp(0, 255) as u8;
        *entry = if invert { 255 - v } else { v };
    }
    lut
}

pub struct Levels {
    store: Arc<ImageProperties>,
    lut: Mutex<[u8; 256]>,
    frame_size: Mutex<FrameSize>,
}

impl Levels {
    pub fn new(store: Arc<ImageProperties>) -> Self {
        Levels {
            store,
            lut: Mutex::new(build_lut(DEFAULT_OFFSET, DEFAULT_INVERT)),
            frame_size: Mutex::new(FrameSize::default()),
        }
    }

    /// Frame size as of the last media info notification.
    pub fn frame_size(&self) -> FrameSize {
        *self.frame_size.lock().unwrap()
    }
}

impl FrameProcessor for Levels {
    fn process(&self, data: &mut [u8]) {
        let size = self.frame_size();
        if i64::from(size.width) * i64::from(size.height) > data.len() as i64 {
            gst::warning!(
                CAT,
                "Frame of {} bytes is smaller than {}x{}",
                data.len(),
                size.width,
                size.height
            );
        }

        let lut = self.lut.lock().unwrap();
        for byte in data {
            *byte = lut[usize::from(*byte)];
        }
    }
}

impl ChangeListener for Levels {
    fn property_changed(&self, id: PropertyId) {
        let offset = self
            .store
            .value::<i32>(PROP_OFFSET)
            .unwrap_or(DEFAULT_OFFSET);
        let invert = self
            .store
            .value::<bool>(PROP_INVERT)
            .unwrap_or(DEFAULT_INVERT);

        gst::debug!(
            CAT,
            "Property {id} changed, rebuilding table for offset {offset} invert {invert}"
        );
        *self.lut.lock().unwrap() = build_lut(offset, invert);
    }

    fn media_info_changed(&self) {
        let size = self.store.frame_size();
        gst::debug!(CAT, "Frame size now {}x{}", size.width, size.height);
        *self.frame_size.lock().unwrap() = size;
    }
}
