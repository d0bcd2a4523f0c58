// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;

use std::sync::LazyLock;

use crate::binding::ElementBinding;
use crate::customizer::{registry, FactoryLease};
use crate::properties::ParamTable;

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "framewrap",
        gst::DebugColorFlags::empty(),
        Some("Frame wrapper element"),
    )
});

// Filled once when the class is initialized.
static PARAMS: LazyLock<ParamTable> = LazyLock::new(|| registry().customizer().parameters());

pub struct FrameWrap {
    srcpad: gst::Pad,
    sinkpad: gst::Pad,
    binding: ElementBinding,
    // Dropped after the binding, the customizer has to outlive it.
    _lease: FactoryLease,
}

impl FrameWrap {
    fn sink_chain(
        &self,
        pad: &gst::Pad,
        mut buffer: gst::Buffer,
    ) -> Result<gst::FlowSuccess, gst::FlowError> {
        match self.binding.process_buffer(&mut buffer) {
            Ok(true) => gst::log!(CAT, obj = pad, "Processed {buffer:?}"),
            Ok(false) => gst::trace!(CAT, obj = pad, "No processor, passing through {buffer:?}"),
            Err(err) => {
                gst::error!(CAT, imp = self, "Can't process buffer: {err}");
                gst::element_imp_error!(self, gst::CoreError::Failed, ["{}", err]);
                return Err(gst::FlowError::Error);
            }
        }

        self.srcpad.push(buffer)
    }

    fn sink_event(&self, pad: &gst::Pad, event: gst::Event) -> bool {
        use gst::EventView;

        gst::log!(CAT, obj = pad, "Handling event {event:?}");

        if let EventView::Caps(c) = event.view() {
            if let Err(err) = self.binding.set_caps(c.caps()) {
                gst::warning!(CAT, imp = self, "Rejecting caps: {err}");
                return false;
            }
        }

        gst::Pad::event_default(pad, Some(&*self.obj()), event)
    }
}

#[glib::object_subclass]
impl ObjectSubclass for FrameWrap {
    const NAME: &'static str = "GstFrameWrap";
    type Type = super::FrameWrap;
    type ParentType = gst::Element;

    fn with_class(klass: &Self::Class) -> Self {
        let templ = klass.pad_template("sink").unwrap();
        let sinkpad = gst::Pad::builder_from_template(&templ)
            .chain_function(|pad, parent, buffer| {
                FrameWrap::catch_panic_pad_function(
                    parent,
                    || Err(gst::FlowError::Error),
                    |imp| imp.sink_chain(pad, buffer),
                )
            })
            .event_function(|pad, parent, event| {
                FrameWrap::catch_panic_pad_function(
                    parent,
                    || false,
                    |imp| imp.sink_event(pad, event),
                )
            })
            .flags(gst::PadFlags::PROXY_CAPS | gst::PadFlags::PROXY_ALLOCATION)
            .build();

        let templ = klass.pad_template("src").unwrap();
        let srcpad = gst::Pad::builder_from_template(&templ)
            .flags(gst::PadFlags::PROXY_CAPS | gst::PadFlags::PROXY_ALLOCATION)
            .build();

        let lease = registry().acquire();
        let binding = ElementBinding::new(lease.customizer().clone());

        Self {
            srcpad,
            sinkpad,
            binding,
            _lease: lease,
        }
    }
}

impl ObjectImpl for FrameWrap {
    fn properties() -> &'static [glib::ParamSpec] {
        static PROPERTIES: LazyLock<Vec<glib::ParamSpec>> = LazyLock::new(|| PARAMS.specs());

        PROPERTIES.as_ref()
    }

    fn set_property(&self, _id: usize, value: &glib::Value, pspec: &glib::ParamSpec) {
        let Some(id) = PARAMS.id_by_name(pspec.name()) else {
            gst::warning!(CAT, imp = self, "Unknown property {}", pspec.name());
            return;
        };

        gst::info!(
            CAT,
            imp = self,
            "Changing {} ({id}) to {value:?}",
            pspec.name()
        );

        if let Err(err) = self.binding.set_property(id, value) {
            gst::warning!(CAT, imp = self, "Failed to set {}: {err}", pspec.name());
        }
    }

    fn property(&self, _id: usize, pspec: &glib::ParamSpec) -> glib::Value {
        let value = PARAMS
            .id_by_name(pspec.name())
            .map(|id| self.binding.property(id));

        match value {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                gst::warning!(CAT, imp = self, "Failed to get {}: {err}", pspec.name());
                pspec.default_value().clone()
            }
            None => pspec.default_value().clone(),
        }
    }

    fn constructed(&self) {
        self.parent_constructed();

        let obj = self.obj();
        obj.add_pad(&self.sinkpad).unwrap();
        obj.add_pad(&self.srcpad).unwrap();
    }
}

impl GstObjectImpl for FrameWrap {}

impl ElementImpl for FrameWrap {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: LazyLock<gst::subclass::ElementMetadata> = LazyLock::new(|| {
            let customizer = registry().customizer();
            let details = customizer.details();

            gst::subclass::ElementMetadata::new(
                &details.long_name,
                &details.classification,
                &details.description,
                &details.author,
            )
        });

        Some(&*ELEMENT_METADATA)
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: LazyLock<Vec<gst::PadTemplate>> = LazyLock::new(|| {
            let caps = registry().customizer().caps();
            let src_pad_template = gst::PadTemplate::new(
                "src",
                gst::PadDirection::Src,
                gst::PadPresence::Always,
                &caps,
            )
            .unwrap();

            let sink_pad_template = gst::PadTemplate::new(
                "sink",
                gst::PadDirection::Sink,
                gst::PadPresence::Always,
                &caps,
            )
            .unwrap();

            vec![src_pad_template, sink_pad_template]
        });

        PAD_TEMPLATES.as_ref()
    }

    fn change_state(
        &self,
        transition: gst::StateChange,
    ) -> Result<gst::StateChangeSuccess, gst::StateChangeError> {
        gst::trace!(CAT, imp = self, "Changing state {transition:?}");

        self.binding
            .prepare_transition(transition)
            .map_err(|err| {
                gst::element_imp_error!(self, gst::CoreError::StateChange, ["{}", err]);
                gst::StateChangeError
            })?;

        let result = self.parent_change_state(transition);

        self.binding.complete_transition(transition, result)
    }
}
