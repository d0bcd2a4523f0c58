// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Per-instance glue between the host element and the customizer's objects.
//!
//! The property store lives as long as the binding. The frame processor is
//! created on the NULL to READY transition and released on READY to NULL, so
//! it can come and go several times during the binding's lifetime.
//!
//! The binding's own locks are never held while the store notifies its
//! listener, so a listener may call back into the binding.

use gst::glib;

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use crate::customizer::Customizer;
use crate::processor::FrameProcessor;
use crate::properties::{PropertyError, PropertyId, StoreHandle};

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "framewrap-binding",
        gst::DebugColorFlags::empty(),
        Some("Frame wrapper element binding"),
    )
});

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Frame processor was not released at null to ready state change")]
    ProcessorNotReleased,
    #[error("Caps {0} have no structure")]
    EmptyCaps(String),
    #[error("Failed to map buffer writable")]
    MapFailed,
}

pub struct ElementBinding {
    customizer: Arc<Customizer>,
    store: Option<StoreHandle>,
    processor: Mutex<Option<Arc<dyn FrameProcessor>>>,
    mime: Mutex<Option<String>>,
}

impl ElementBinding {
    /// Creates the binding together with the instance's property store.
    pub fn new(customizer: Arc<Customizer>) -> Self {
        let store = customizer.create_property_store();
        gst::debug!(
            CAT,
            "New {:?} binding, with store: {}",
            customizer.kind(),
            store.is_some()
        );

        ElementBinding {
            customizer,
            store,
            processor: Mutex::new(None),
            mime: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Option<&StoreHandle> {
        self.store.as_ref()
    }

    /// The current processor, to run without holding any binding lock.
    pub fn processor(&self) -> Option<Arc<dyn FrameProcessor>> {
        self.processor.lock().unwrap().clone()
    }

    /// Mime type of the last negotiated caps.
    pub fn mime(&self) -> Option<String> {
        self.mime.lock().unwrap().clone()
    }

    pub fn has_processor(&self) -> bool {
        self.processor.lock().unwrap().is_some()
    }

    pub fn activate(&self) -> Result<(), BindingError> {
        if self.has_processor() {
            gst::error!(CAT, "Frame processor is not clean at null to ready state change");
            return Err(BindingError::ProcessorNotReleased);
        }

        // Installing a listening processor replays the initial ids.
        let processor = self.customizer.create_frame_processor(self.store.as_ref());
        gst::debug!(CAT, "Activated, processor: {}", processor.is_some());
        *self.processor.lock().unwrap() = processor;

        Ok(())
    }

    pub fn deactivate(&self) {
        let mut processor = self.processor.lock().unwrap().take();
        self.customizer
            .delete_frame_processor(&mut processor, self.store.as_ref());
        gst::debug!(CAT, "Deactivated");
    }

    /// Work to do before the parent class changes state.
    pub fn prepare_transition(&self, transition: gst::StateChange) -> Result<(), BindingError> {
        if transition == gst::StateChange::NullToReady {
            self.activate()?;
        }

        Ok(())
    }

    /// Work to do once the parent class changed state with `result`.
    pub fn complete_transition(
        &self,
        transition: gst::StateChange,
        result: Result<gst::StateChangeSuccess, gst::StateChangeError>,
    ) -> Result<gst::StateChangeSuccess, gst::StateChangeError> {
        match result {
            Ok(success) => {
                if transition == gst::StateChange::ReadyToNull {
                    self.deactivate();
                }
                Ok(success)
            }
            Err(err) => {
                gst::debug!(CAT, "Parent failed to change state {transition:?}");
                if transition == gst::StateChange::NullToReady {
                    // The element stays in NULL and NULL never holds a
                    // processor, so the one created in prepare_transition()
                    // has to go, otherwise the next activation fails.
                    self.deactivate();
                }
                Err(err)
            }
        }
    }

    pub fn change_state<F>(
        &self,
        transition: gst::StateChange,
        parent_change_state: F,
    ) -> Result<gst::StateChangeSuccess, gst::StateChangeError>
    where
        F: FnOnce(gst::StateChange) -> Result<gst::StateChangeSuccess, gst::StateChangeError>,
    {
        self.prepare_transition(transition)
            .map_err(|_| gst::StateChangeError)?;

        let result = parent_change_state(transition);
        self.complete_transition(transition, result)
    }

    /// Forwards negotiated caps to the property store.
    pub fn set_caps(&self, caps: &gst::CapsRef) -> Result<(), BindingError> {
        let s = caps
            .structure(0)
            .ok_or_else(|| BindingError::EmptyCaps(caps.to_string()))?;

        self.set_media_info(s.name().as_str(), s);

        Ok(())
    }

    pub fn set_media_info(&self, mime: &str, params: &gst::StructureRef) {
        gst::debug!(CAT, "Media info {params}");
        *self.mime.lock().unwrap() = Some(mime.to_owned());

        if let Some(store) = &self.store {
            store.set_media_info(mime, params);
        }
    }

    /// Runs the processor over `data`, returns `false` if there is none.
    pub fn process(&self, data: &mut [u8]) -> bool {
        match self.processor() {
            Some(processor) => {
                processor.process(data);
                true
            }
            None => false,
        }
    }

    /// Runs the processor over the payload of `buffer`.
    ///
    /// Without a processor the buffer is left alone, it is neither made
    /// writable nor mapped. Returns whether a processor ran.
    pub fn process_buffer(&self, buffer: &mut gst::Buffer) -> Result<bool, BindingError> {
        let Some(processor) = self.processor() else {
            return Ok(false);
        };

        let buffer = buffer.make_mut();
        let mut map = buffer
            .map_writable()
            .map_err(|_| BindingError::MapFailed)?;
        processor.process(map.as_mut_slice());

        Ok(true)
    }

    pub fn set_property(&self, id: PropertyId, value: &glib::Value) -> Result<(), PropertyError> {
        self.store
            .as_ref()
            .ok_or(PropertyError::UnknownId(id))?
            .set(id, value)
    }

    pub fn property(&self, id: PropertyId) -> Result<glib::Value, PropertyError> {
        self.store
            .as_ref()
            .ok_or(PropertyError::UnknownId(id))?
            .get(id)
    }
}

impl Drop for ElementBinding {
    fn drop(&mut self) {
        if self.has_processor() {
            gst::debug!(CAT, "Releasing processor of dropped binding");
            self.deactivate();
        }
    }
}

impl fmt::Debug for ElementBinding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ElementBinding")
            .field("customizer", &self.customizer)
            .field("store", &self.store)
            .field("processor", &self.has_processor())
            .field("mime", &self.mime())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{
        ChangeListener, FrameSize, ImageProperties, ParamTable, PropertyValues,
    };
    use gst::prelude::*;
    use std::sync::{OnceLock, Weak};

    const THRESHOLD: PropertyId = PropertyId::new(7);

    fn parameters(table: &mut ParamTable) {
        table.insert(
            THRESHOLD,
            glib::ParamSpecInt::builder("threshold")
                .minimum(0)
                .maximum(255)
                .default_value(0)
                .build(),
        );
    }

    fn table() -> ParamTable {
        let mut table = ParamTable::new();
        parameters(&mut table);
        table
    }

    struct Threshold {
        store: Arc<PropertyValues>,
        notified: Arc<Mutex<Vec<PropertyId>>>,
    }

    impl FrameProcessor for Threshold {
        fn process(&self, data: &mut [u8]) {
            let threshold = self.store.value::<i32>(THRESHOLD).unwrap_or_default();
            for byte in data {
                *byte = if i32::from(*byte) >= threshold { 255 } else { 0 };
            }
        }
    }

    impl ChangeListener for Threshold {
        fn property_changed(&self, id: PropertyId) {
            self.notified.lock().unwrap().push(id);
        }
    }

    fn listening(notified: &Arc<Mutex<Vec<PropertyId>>>) -> Arc<Customizer> {
        let notified = notified.clone();
        Arc::new(
            Customizer::listening(
                || PropertyValues::new(&table()).with_initial([THRESHOLD]),
                move |store| Threshold {
                    store,
                    notified: notified.clone(),
                },
            )
            .with_parameters(parameters),
        )
    }

    fn parent_ok(_: gst::StateChange) -> Result<gst::StateChangeSuccess, gst::StateChangeError> {
        Ok(gst::StateChangeSuccess::Success)
    }

    fn parent_fails(
        _: gst::StateChange,
    ) -> Result<gst::StateChangeSuccess, gst::StateChangeError> {
        Err(gst::StateChangeError)
    }

    #[test]
    fn test_listener_lifecycle() {
        gst::init().unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let binding = ElementBinding::new(listening(&notified));

        assert!(binding.store().is_some());
        assert!(!binding.has_processor());
        assert!(notified.lock().unwrap().is_empty());

        binding
            .change_state(gst::StateChange::NullToReady, parent_ok)
            .unwrap();
        assert!(binding.store().unwrap().listeners().listener().is_some());
        assert_eq!(*notified.lock().unwrap(), vec![THRESHOLD]);

        binding
            .change_state(gst::StateChange::ReadyToPaused, parent_ok)
            .unwrap();
        binding.set_property(THRESHOLD, &42i32.to_value()).unwrap();
        assert_eq!(*notified.lock().unwrap(), vec![THRESHOLD, THRESHOLD]);

        binding
            .change_state(gst::StateChange::PausedToReady, parent_ok)
            .unwrap();
        assert!(binding.has_processor());
        binding
            .change_state(gst::StateChange::ReadyToNull, parent_ok)
            .unwrap();
        assert!(!binding.has_processor());
        assert!(!binding.store().unwrap().listeners().is_attached());

        binding.set_property(THRESHOLD, &99i32.to_value()).unwrap();
        assert_eq!(notified.lock().unwrap().len(), 2);
        assert_eq!(
            binding.property(THRESHOLD).unwrap().get::<i32>().unwrap(),
            99
        );
    }

    #[test]
    fn test_second_activation_fails() {
        gst::init().unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let binding = ElementBinding::new(listening(&notified));

        binding.activate().unwrap();
        let processor = binding.processor().unwrap();

        assert_eq!(binding.activate(), Err(BindingError::ProcessorNotReleased));
        assert_eq!(
            binding.change_state(gst::StateChange::NullToReady, |_| {
                panic!("parent must not be called")
            }),
            Err(gst::StateChangeError)
        );
        assert!(Arc::ptr_eq(&binding.processor().unwrap(), &processor));
        assert_eq!(notified.lock().unwrap().len(), 1);

        let weak = Arc::downgrade(&processor);
        drop(processor);
        binding.deactivate();
        assert!(weak.upgrade().is_none());

        binding.activate().unwrap();
        assert!(binding.has_processor());
        assert_eq!(notified.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_parent_keeps_prior_state() {
        gst::init().unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let binding = ElementBinding::new(listening(&notified));

        assert!(binding
            .change_state(gst::StateChange::NullToReady, parent_fails)
            .is_err());
        assert!(!binding.has_processor());
        assert!(!binding.store().unwrap().listeners().is_attached());

        binding
            .change_state(gst::StateChange::NullToReady, parent_ok)
            .unwrap();
        assert!(binding
            .change_state(gst::StateChange::ReadyToNull, parent_fails)
            .is_err());
        assert!(binding.has_processor());
        assert!(binding.store().unwrap().listeners().is_attached());
    }

    #[test]
    fn test_passthrough_leaves_data() {
        gst::init().unwrap();
        let binding = ElementBinding::new(Arc::new(Customizer::passthrough()));

        binding
            .change_state(gst::StateChange::NullToReady, parent_ok)
            .unwrap();
        assert!(!binding.has_processor());

        let mut data = [1u8, 2, 3, 4];
        assert!(!binding.process(&mut data));
        assert_eq!(data, [1, 2, 3, 4]);

        assert_eq!(
            binding.set_property(THRESHOLD, &1i32.to_value()),
            Err(PropertyError::UnknownId(THRESHOLD))
        );
        assert!(binding.property(THRESHOLD).is_err());

        // Activating again is fine, there is no processor to leak.
        binding.activate().unwrap();
    }

    #[test]
    fn test_process_uses_store_values() {
        gst::init().unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let binding = ElementBinding::new(listening(&notified));
        binding.activate().unwrap();
        binding.set_property(THRESHOLD, &128i32.to_value()).unwrap();

        let mut data = [0u8, 127, 128, 255];
        assert!(binding.process(&mut data));
        assert_eq!(data, [0, 0, 255, 255]);
    }

    #[test]
    fn test_caps_reach_store() {
        gst::init().unwrap();
        let customizer = Customizer::properties(
            || ImageProperties::new(&table()),
            |store: Arc<ImageProperties>| {
                move |_: &mut [u8]| {
                    store.frame_size();
                }
            },
        )
        .with_parameters(parameters);
        let binding = ElementBinding::new(Arc::new(customizer));

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "GRAY8")
            .field("width", 64i32)
            .field("height", 48i32)
            .build();
        binding.set_caps(&caps).unwrap();

        assert_eq!(binding.mime().as_deref(), Some("video/x-raw"));
        let store = binding
            .store()
            .unwrap()
            .downcast::<ImageProperties>()
            .unwrap();
        assert_eq!(
            store.frame_size(),
            FrameSize {
                width: 64,
                height: 48
            }
        );

        let empty = gst::Caps::new_empty();
        assert!(matches!(
            binding.set_caps(&empty),
            Err(BindingError::EmptyCaps(_))
        ));
    }

    #[test]
    fn test_drop_releases_processor() {
        gst::init().unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let binding = ElementBinding::new(listening(&notified));
        binding.activate().unwrap();

        let store = binding.store().cloned().unwrap();
        let processor: Weak<dyn FrameProcessor> = Arc::downgrade(&binding.processor().unwrap());
        drop(binding);

        assert!(processor.upgrade().is_none());
        assert!(!store.listeners().is_attached());
        assert_eq!(notified.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_process_buffer_without_processor() {
        gst::init().unwrap();
        let binding = ElementBinding::new(Arc::new(Customizer::passthrough()));
        binding.activate().unwrap();

        let mut buffer = gst::Buffer::from_slice([1u8, 2, 3, 4]);
        let shared = buffer.clone();

        assert_eq!(binding.process_buffer(&mut buffer), Ok(false));
        // Neither copied nor mapped.
        assert_eq!(buffer.as_ptr(), shared.as_ptr());
        let map = buffer.map_readable().unwrap();
        assert_eq!(map.as_slice(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_process_buffer_with_processor() {
        gst::init().unwrap();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let binding = ElementBinding::new(listening(&notified));
        binding.activate().unwrap();
        binding.set_property(THRESHOLD, &128i32.to_value()).unwrap();

        let mut buffer = gst::Buffer::from_mut_slice(vec![0u8, 127, 128, 255]);
        let shared = buffer.clone();

        assert_eq!(binding.process_buffer(&mut buffer), Ok(true));
        assert_eq!(buffer.map_readable().unwrap().as_slice(), [0, 0, 255, 255]);
        assert_eq!(shared.map_readable().unwrap().as_slice(), [0, 127, 128, 255]);

        binding.deactivate();
        let mut buffer = gst::Buffer::from_mut_slice(vec![0u8, 200]);
        assert_eq!(binding.process_buffer(&mut buffer), Ok(false));
        assert_eq!(buffer.map_readable().unwrap().as_slice(), [0, 200]);
    }

    struct ReadBack {
        binding: Arc<OnceLock<Weak<ElementBinding>>>,
        seen: Arc<Mutex<Vec<(i32, bool)>>>,
    }

    impl FrameProcessor for ReadBack {
        fn process(&self, _data: &mut [u8]) {}
    }

    impl ChangeListener for ReadBack {
        fn property_changed(&self, id: PropertyId) {
            let Some(binding) = self.binding.get().and_then(Weak::upgrade) else {
                return;
            };
            let value = binding.property(id).unwrap().get::<i32>().unwrap();
            self.seen
                .lock()
                .unwrap()
                .push((value, binding.has_processor()));
        }
    }

    #[test]
    fn test_listener_reads_back_through_binding() {
        gst::init().unwrap();
        let slot = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let customizer = {
            let slot = slot.clone();
            let seen = seen.clone();
            Customizer::listening(
                || PropertyValues::new(&table()).with_initial([THRESHOLD]),
                move |_store: Arc<PropertyValues>| ReadBack {
                    binding: slot.clone(),
                    seen: seen.clone(),
                },
            )
        };
        let binding = Arc::new(ElementBinding::new(Arc::new(customizer)));
        slot.set(Arc::downgrade(&binding)).unwrap();

        binding
            .change_state(gst::StateChange::NullToReady, parent_ok)
            .unwrap();
        binding.set_property(THRESHOLD, &42i32.to_value()).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(0, false), (42, true)]);
    }

    #[test]
    fn test_negotiated_caps_reach_levels_store() {
        gst::init().unwrap();
        let customizer = crate::levels::configure().unwrap();
        let binding = ElementBinding::new(Arc::new(customizer));
        binding.activate().unwrap();

        let caps = "video/x-raw, format=GRAY8, width=4, height=2, framerate=30/1"
            .parse::<gst::Caps>()
            .unwrap();
        binding.set_caps(&caps).unwrap();

        let store = binding
            .store()
            .unwrap()
            .downcast::<ImageProperties>()
            .unwrap();
        assert_eq!(
            store.frame_size(),
            FrameSize {
                width: 4,
                height: 2
            }
        );
    }
}
