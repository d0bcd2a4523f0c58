// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0
#![allow(clippy::non_send_fields_in_send_ty, unused_doc_comments)]

/**
 * plugin-framewrap:
 *
 * Filter element wrapping a pluggable in-place frame processor.
 *
 * Since: plugins-rs-0.14.0
 */
use gst::glib;

pub mod binding;
pub mod customizer;
pub mod framewrap;
pub mod levels;
pub mod processor;
pub mod properties;

pub use binding::{BindingError, ElementBinding};
pub use customizer::{
    registry, ConfigureHook, Customizer, ElementDetails, FactoryLease, FactoryRegistry, Strategy,
    StrategyKind,
};
pub use processor::FrameProcessor;
pub use properties::{
    ChangeListener, FrameSize, ImageProperties, ParamTable, PropertyError, PropertyId,
    PropertyStore, PropertyValues, StoreHandle,
};

fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    framewrap::register(plugin, levels::configure)
}

gst::plugin_define!(
    framewrap,
    env!("CARGO_PKG_DESCRIPTION"),
    plugin_init,
    concat!(env!("CARGO_PKG_VERSION"), "-", env!("COMMIT_ID")),
    "MPL",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_REPOSITORY"),
    env!("BUILD_REL_DATE")
);
