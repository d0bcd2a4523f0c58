// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Property storage and change notification.
//!
//! A [`PropertyStore`] holds the current values of the properties an element
//! exposes, keyed by [`PropertyId`]. Whoever needs to react to changes (usually
//! the frame processor) registers itself as the store's [`ChangeListener`]. The
//! store only keeps a weak reference to its listener, and the listener must be
//! detached before it goes away.

use gst::glib;
use gst::prelude::*;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, LazyLock, Mutex, Weak};

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "framewrap-properties",
        gst::DebugColorFlags::empty(),
        Some("Frame wrapper property store"),
    )
});

/// Numeric key of one configurable property, unique within an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u32);

impl PropertyId {
    pub const fn new(id: u32) -> Self {
        PropertyId(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for PropertyId {
    fn from(id: u32) -> Self {
        PropertyId(id)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Unknown property {0}")]
    UnknownId(PropertyId),
    #[error("Property {id} expects a value of type {expected}, got {actual}")]
    TypeMismatch {
        id: PropertyId,
        expected: glib::Type,
        actual: glib::Type,
    },
    #[error("Property {id} has unsupported value type {type_}")]
    UnsupportedType { id: PropertyId, type_: glib::Type },
    #[error("Value {value} is out of range for property {id}")]
    OutOfRange { id: PropertyId, value: String },
}

/// Id to param spec mapping, filled once per element type before any instance exists.
#[derive(Debug, Default, Clone)]
pub struct ParamTable {
    specs: BTreeMap<PropertyId, glib::ParamSpec>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec` under `id`, returning the spec it replaces.
    pub fn insert(
        &mut self,
        id: impl Into<PropertyId>,
        spec: glib::ParamSpec,
    ) -> Option<glib::ParamSpec> {
        self.specs.insert(id.into(), spec)
    }

    pub fn get(&self, id: PropertyId) -> Option<&glib::ParamSpec> {
        self.specs.get(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<PropertyId> {
        self.specs
            .iter()
            .find(|(_, spec)| spec.name() == name)
            .map(|(id, _)| *id)
    }

    pub fn ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.specs.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &glib::ParamSpec)> {
        self.specs.iter().map(|(id, spec)| (*id, spec))
    }

    /// Param specs in ascending id order, as installed on the element class.
    pub fn specs(&self) -> Vec<glib::ParamSpec> {
        self.specs.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Receives notifications from a [`PropertyStore`].
///
/// Notifications are delivered synchronously from inside the store call that
/// caused them, possibly while another thread is processing a frame. Both
/// methods default to doing nothing.
pub trait ChangeListener: Send + Sync {
    fn property_changed(&self, _id: PropertyId) {}

    fn media_info_changed(&self) {}
}

/// The listener reference of a store plus the ids replayed on attach.
#[derive(Default)]
pub struct ListenerSlot {
    listener: Mutex<Option<Weak<dyn ChangeListener>>>,
    initial: BTreeSet<PropertyId>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_initial(&mut self, id: PropertyId) {
        self.initial.insert(id);
    }

    /// Replaces the listener.
    ///
    /// Attaching a live listener immediately sends it `property_changed` for
    /// every initial id, in ascending order. Detaching sends nothing.
    pub fn set_listener(&self, listener: Option<Weak<dyn ChangeListener>>) {
        let attached = listener.as_ref().and_then(Weak::upgrade);
        *self.listener.lock().unwrap() = listener;

        let Some(attached) = attached else {
            gst::debug!(CAT, "Listener detached");
            return;
        };

        gst::debug!(
            CAT,
            "Listener attached, replaying {} initial properties",
            self.initial.len()
        );
        for id in &self.initial {
            attached.property_changed(*id);
        }
    }

    pub fn listener(&self) -> Option<Arc<dyn ChangeListener>> {
        self.listener.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_attached(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    pub fn notify_property_changed(&self, id: PropertyId) {
        if let Some(listener) = self.listener() {
            gst::trace!(CAT, "Notifying change of property {id}");
            listener.property_changed(id);
        }
    }

    pub fn notify_media_info_changed(&self) {
        if let Some(listener) = self.listener() {
            gst::trace!(CAT, "Notifying media info change");
            listener.media_info_changed();
        }
    }
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("attached", &self.is_attached())
            .field("initial", &self.initial)
            .finish()
    }
}

/// Per-instance holder of property values and derived stream metadata.
///
/// Implementations accept exactly the ids registered for the element type and
/// call [`ListenerSlot::notify_property_changed`] after every successful `set`.
pub trait PropertyStore: Send + Sync + 'static {
    fn set(&self, id: PropertyId, value: &glib::Value) -> Result<(), PropertyError>;

    fn get(&self, id: PropertyId) -> Result<glib::Value, PropertyError>;

    fn listeners(&self) -> &ListenerSlot;

    /// Called once per successful caps negotiation, before frames flow.
    fn set_media_info(&self, _mime: &str, _params: &gst::StructureRef) {
        self.listeners().notify_media_info_changed();
    }

    fn set_listener(&self, listener: Option<Weak<dyn ChangeListener>>) {
        self.listeners().set_listener(listener);
    }
}

/// Shared handle to a store that still knows the store's concrete type.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn PropertyStore>,
    concrete: Arc<dyn Any + Send + Sync>,
}

impl StoreHandle {
    pub fn new<S: PropertyStore>(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc<S: PropertyStore>(store: Arc<S>) -> Self {
        StoreHandle {
            store: store.clone(),
            concrete: store,
        }
    }

    pub fn downcast<S: PropertyStore>(&self) -> Option<Arc<S>> {
        Arc::clone(&self.concrete).downcast::<S>().ok()
    }
}

impl Deref for StoreHandle {
    type Target = dyn PropertyStore;

    fn deref(&self) -> &Self::Target {
        &*self.store
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("listeners", self.store.listeners())
            .finish()
    }
}

// Values have to cross threads, so only types that are known to be Send are kept.
fn to_send_value(value: &glib::Value) -> Option<glib::SendValue> {
    macro_rules! send_as {
        ($($t:ty),+) => {
            $(
                if value.is::<$t>() {
                    return value.get::<$t>().ok().map(|v| v.to_send_value());
                }
            )+
        };
    }

    send_as!(bool, i32, u32, i64, u64, f32, f64);

    if value.is::<String>() {
        return value
            .get::<Option<String>>()
            .ok()
            .map(|v| v.to_send_value());
    }

    None
}

// Numeric values have to stay within the bounds of their param spec.
fn in_range(spec: &glib::ParamSpec, value: &glib::Value) -> bool {
    macro_rules! check_range {
        ($($spec:ty => $t:ty),+) => {
            $(
                if let Some(spec) = spec.downcast_ref::<$spec>() {
                    return value
                        .get::<$t>()
                        .is_ok_and(|v| v >= spec.minimum() && v <= spec.maximum());
                }
            )+
        };
    }

    check_range!(
        glib::ParamSpecInt => i32,
        glib::ParamSpecUInt => u32,
        glib::ParamSpecInt64 => i64,
        glib::ParamSpecUInt64 => u64,
        glib::ParamSpecFloat => f32,
        glib::ParamSpecDouble => f64
    );

    true
}

/// Store keeping one value per param spec of a [`ParamTable`].
///
/// Every id of the table is accepted and starts out at the spec's default value.
#[derive(Debug)]
pub struct PropertyValues {
    specs: ParamTable,
    values: Mutex<BTreeMap<PropertyId, glib::SendValue>>,
    listeners: ListenerSlot,
}

impl PropertyValues {
    pub fn new(specs: &ParamTable) -> Self {
        let values = specs
            .iter()
            .filter_map(|(id, spec)| match to_send_value(spec.default_value()) {
                Some(value) => Some((id, value)),
                None => {
                    gst::warning!(
                        CAT,
                        "Property {} ({id}) has unsupported type {}",
                        spec.name(),
                        spec.value_type()
                    );
                    None
                }
            })
            .collect();

        PropertyValues {
            specs: specs.clone(),
            values: Mutex::new(values),
            listeners: ListenerSlot::new(),
        }
    }

    /// Adds ids to announce to every newly attached listener.
    pub fn with_initial<I: IntoIterator<Item = PropertyId>>(mut self, ids: I) -> Self {
        for id in ids {
            self.listeners.add_initial(id);
        }
        self
    }

    pub fn specs(&self) -> &ParamTable {
        &self.specs
    }

    /// Typed read of the current value, `None` for unknown ids or another type.
    pub fn value<T>(&self, id: PropertyId) -> Option<T>
    where
        T: for<'a> glib::value::FromValue<'a> + 'static,
    {
        let value = self.get(id).ok()?;
        value.get::<T>().ok()
    }
}

impl PropertyStore for PropertyValues {
    fn set(&self, id: PropertyId, value: &glib::Value) -> Result<(), PropertyError> {
        let spec = self.specs.get(id).ok_or(PropertyError::UnknownId(id))?;

        if !value.type_().is_a(spec.value_type()) {
            return Err(PropertyError::TypeMismatch {
                id,
                expected: spec.value_type(),
                actual: value.type_(),
            });
        }

        if !in_range(spec, value) {
            return Err(PropertyError::OutOfRange {
                id,
                value: format!("{value:?}"),
            });
        }

        let send_value = to_send_value(value).ok_or(PropertyError::UnsupportedType {
            id,
            type_: value.type_(),
        })?;

        gst::debug!(
            CAT,
            "Setting {} ({id}) to {:?}",
            spec.name(),
            value
        );
        self.values.lock().unwrap().insert(id, send_value);

        // The lock is released here, listeners may read the new value.
        self.listeners.notify_property_changed(id);

        Ok(())
    }

    fn get(&self, id: PropertyId) -> Result<glib::Value, PropertyError> {
        let spec = self.specs.get(id).ok_or(PropertyError::UnknownId(id))?;

        let values = self.values.lock().unwrap();
        Ok(values
            .get(&id)
            .map(|value| (**value).clone())
            .unwrap_or_else(|| spec.default_value().clone()))
    }

    fn listeners(&self) -> &ListenerSlot {
        &self.listeners
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSize {
    pub width: i32,
    pub height: i32,
}

/// [`PropertyValues`] that also tracks the negotiated frame size.
#[derive(Debug)]
pub struct ImageProperties {
    values: PropertyValues,
    frame_size: Mutex<FrameSize>,
}

impl ImageProperties {
    pub fn new(specs: &ParamTable) -> Self {
        ImageProperties {
            values: PropertyValues::new(specs),
            frame_size: Mutex::new(FrameSize::default()),
        }
    }

    pub fn with_initial<I: IntoIterator<Item = PropertyId>>(self, ids: I) -> Self {
        ImageProperties {
            values: self.values.with_initial(ids),
            ..self
        }
    }

    /// Zero until caps carrying `width`/`height` were negotiated.
    pub fn frame_size(&self) -> FrameSize {
        *self.frame_size.lock().unwrap()
    }

    pub fn value<T>(&self, id: PropertyId) -> Option<T>
    where
        T: for<'a> glib::value::FromValue<'a> + 'static,
    {
        self.values.value(id)
    }
}

impl PropertyStore for ImageProperties {
    fn set(&self, id: PropertyId, value: &glib::Value) -> Result<(), PropertyError> {
        self.values.set(id, value)
    }

    fn get(&self, id: PropertyId) -> Result<glib::Value, PropertyError> {
        self.values.get(id)
    }

    fn listeners(&self) -> &ListenerSlot {
        self.values.listeners()
    }

    fn set_media_info(&self, mime: &str, params: &gst::StructureRef) {
        {
            let mut frame_size = self.frame_size.lock().unwrap();
            if let Ok(width) = params.get::<i32>("width") {
                frame_size.width = width;
            }
            if let Ok(height) = params.get::<i32>("height") {
                frame_size.height = height;
            }
            gst::debug!(
                CAT,
                "Media info {mime}: {}x{}",
                frame_size.width,
                frame_size.height
            );
        }

        self.values.set_media_info(mime, params);
    }
}
