// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

/**
 * SECTION:element-framewrap
 *
 * Filter element running every buffer through an in-place frame processor.
 *
 * What the element does is decided when its type is first used: a configure
 * hook hands out the customizer that provides the properties, the pad caps and
 * the processor. The processor exists between the READY and PLAYING states, it
 * is created when going from NULL to READY and destroyed when going back. Without
 * a processor buffers are pushed downstream untouched.
 *
 * The plugin configures the element as a GRAY8 level adjustment:
 *
 * ```console
 * gst-launch-1.0 videotestsrc ! videoconvert ! video/x-raw,format=GRAY8 ! framewrap offset=40 invert=true ! videoconvert ! autovideosink
 * ```
 */
use gst::glib;
use gst::prelude::*;

use crate::customizer::{registry, ConfigureHook};

mod imp;

glib::wrapper! {
    pub struct FrameWrap(ObjectSubclass<imp::FrameWrap>) @extends gst::Element, gst::Object;
}

/// Registers the element, `configure` supplies its customizer.
pub fn register(plugin: &gst::Plugin, configure: ConfigureHook) -> Result<(), glib::BoolError> {
    registry().set_configure(configure);

    gst::Element::register(
        Some(plugin),
        "framewrap",
        gst::Rank::NONE,
        FrameWrap::static_type(),
    )
}
