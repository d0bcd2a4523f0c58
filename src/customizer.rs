// Copyright (C) 2026 The framewrap authors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Construction policy for property stores and frame processors.
//!
//! A [`Customizer`] decides which store an element instance gets, how the
//! frame processor is built on activation and how it is wired to the store.
//! The element type asks the process-wide [`FactoryRegistry`] for it, which
//! builds it lazily through a configure hook and drops it again once the last
//! element instance is gone.

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, Weak};

use crate::processor::FrameProcessor;
use crate::properties::{ChangeListener, ParamTable, PropertyStore, StoreHandle};

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "framewrap-customizer",
        gst::DebugColorFlags::empty(),
        Some("Frame wrapper customizer"),
    )
});

/// Fills the id to param spec table of the element type.
pub type ParametersGetter = fn(&mut ParamTable);

/// Supplies the customizer, `None` selects [`Customizer::passthrough`].
pub type ConfigureHook = fn() -> Option<Customizer>;

pub type StoreFn = Box<dyn Fn() -> StoreHandle + Send + Sync>;
pub type ProcessorFn = Box<dyn Fn() -> Arc<dyn FrameProcessor> + Send + Sync>;
pub type BoundProcessorFn =
    Box<dyn Fn(&StoreHandle) -> Option<Arc<dyn FrameProcessor>> + Send + Sync>;
pub type ListeningProcessorFn = Box<
    dyn Fn(&StoreHandle) -> Option<(Arc<dyn FrameProcessor>, Weak<dyn ChangeListener>)>
        + Send
        + Sync,
>;

/// How store and processor are built and tied together.
pub enum Strategy {
    /// No store and no processor, buffers pass through untouched.
    Passthrough,
    /// A processor without any properties.
    Processor(ProcessorFn),
    /// The processor reads from the store, nothing flows back.
    Properties {
        store: StoreFn,
        processor: BoundProcessorFn,
    },
    /// The processor reads from the store and listens to its changes.
    Listening {
        store: StoreFn,
        processor: ListeningProcessorFn,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Passthrough,
    Processor,
    Properties,
    Listening,
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Passthrough => StrategyKind::Passthrough,
            Strategy::Processor(..) => StrategyKind::Processor,
            Strategy::Properties { .. } => StrategyKind::Properties,
            Strategy::Listening { .. } => StrategyKind::Listening,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.kind(), f)
    }
}

/// Element metadata shown by `gst-inspect-1.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDetails {
    pub long_name: String,
    pub classification: String,
    pub description: String,
    pub author: String,
}

impl Default for ElementDetails {
    fn default() -> Self {
        ElementDetails {
            long_name: "Frame wrapper".into(),
            classification: "Filter/Effect".into(),
            description: "Applies a pluggable in-place transform to every buffer".into(),
            author: "The framewrap authors".into(),
        }
    }
}

pub struct Customizer {
    strategy: Strategy,
    parameters: Option<ParametersGetter>,
    details: ElementDetails,
    caps: Option<gst::Caps>,
}

impl Default for Customizer {
    fn default() -> Self {
        Self::passthrough()
    }
}

impl Customizer {
    pub fn passthrough() -> Self {
        Self::with_strategy(Strategy::Passthrough)
    }

    pub fn processor<P, F>(create_processor: F) -> Self
    where
        P: FrameProcessor + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::with_strategy(Strategy::Processor(Box::new(move || {
            Arc::new(create_processor()) as Arc<dyn FrameProcessor>
        })))
    }

    pub fn properties<S, P, FS, FP>(create_store: FS, create_processor: FP) -> Self
    where
        S: PropertyStore,
        P: FrameProcessor + 'static,
        FS: Fn() -> S + Send + Sync + 'static,
        FP: Fn(Arc<S>) -> P + Send + Sync + 'static,
    {
        Self::with_strategy(Strategy::Properties {
            store: Box::new(move || StoreHandle::new(create_store())),
            processor: Box::new(move |store: &StoreHandle| {
                let store = store.downcast::<S>()?;
                Some(Arc::new(create_processor(store)) as Arc<dyn FrameProcessor>)
            }),
        })
    }

    pub fn listening<S, P, FS, FP>(create_store: FS, create_processor: FP) -> Self
    where
        S: PropertyStore,
        P: FrameProcessor + ChangeListener + 'static,
        FS: Fn() -> S + Send + Sync + 'static,
        FP: Fn(Arc<S>) -> P + Send + Sync + 'static,
    {
        Self::with_strategy(Strategy::Listening {
            store: Box::new(move || StoreHandle::new(create_store())),
            processor: Box::new(move |store: &StoreHandle| {
                let store = store.downcast::<S>()?;
                let processor = Arc::new(create_processor(store));
                let listener: Weak<dyn ChangeListener> = Arc::<P>::downgrade(&processor);
                let processor: Arc<dyn FrameProcessor> = processor;
                Some((processor, listener))
            }),
        })
    }

    pub fn with_strategy(strategy: Strategy) -> Self {
        Customizer {
            strategy,
            parameters: None,
            details: ElementDetails::default(),
            caps: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ParametersGetter) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_details(mut self, details: ElementDetails) -> Self {
        self.details = details;
        self
    }

    /// Caps of both pads, `ANY` when never set.
    pub fn with_caps(mut self, caps: gst::Caps) -> Self {
        self.caps = Some(caps);
        self
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn details(&self) -> &ElementDetails {
        &self.details
    }

    pub fn caps(&self) -> gst::Caps {
        self.caps.clone().unwrap_or_else(gst::Caps::new_any)
    }

    /// Runs the parameter enumeration callback into a fresh table.
    pub fn parameters(&self) -> ParamTable {
        let mut table = ParamTable::new();
        if let Some(parameters) = self.parameters {
            parameters(&mut table);
        }
        table
    }

    pub fn create_property_store(&self) -> Option<StoreHandle> {
        match &self.strategy {
            Strategy::Passthrough | Strategy::Processor(..) => None,
            Strategy::Properties { store, .. } | Strategy::Listening { store, .. } => {
                Some(store())
            }
        }
    }

    /// Builds a processor ready for `process()` calls.
    ///
    /// With [`Strategy::Listening`] the processor is installed as the store's
    /// listener before this returns, which replays the store's initial ids.
    pub fn create_frame_processor(
        &self,
        store: Option<&StoreHandle>,
    ) -> Option<Arc<dyn FrameProcessor>> {
        match &self.strategy {
            Strategy::Passthrough => None,
            Strategy::Processor(create) => Some(create()),
            Strategy::Properties { processor, .. } => {
                let Some(store) = store else {
                    gst::error!(CAT, "No property store to bind the processor to");
                    return None;
                };
                let processor = processor(store);
                if processor.is_none() {
                    gst::error!(CAT, "Property store has an unexpected type");
                }
                processor
            }
            Strategy::Listening { processor, .. } => {
                let Some(store) = store else {
                    gst::error!(CAT, "No property store to bind the processor to");
                    return None;
                };
                let Some((processor, listener)) = processor(store) else {
                    gst::error!(CAT, "Property store has an unexpected type");
                    return None;
                };
                store.set_listener(Some(listener));
                Some(processor)
            }
        }
    }

    /// Releases `processor`, detaching it from the store first.
    pub fn delete_frame_processor(
        &self,
        processor: &mut Option<Arc<dyn FrameProcessor>>,
        store: Option<&StoreHandle>,
    ) {
        if let (Strategy::Listening { .. }, Some(store)) = (&self.strategy, store) {
            store.set_listener(None);
        }

        if processor.take().is_some() {
            gst::debug!(CAT, "Frame processor released");
        }
    }
}

impl fmt::Debug for Customizer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Customizer")
            .field("strategy", &self.strategy)
            .field("parameters", &self.parameters.is_some())
            .field("details", &self.details)
            .field("caps", &self.caps)
            .finish()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    configure: Option<ConfigureHook>,
    customizer: Option<Arc<Customizer>>,
    leases: usize,
}

impl RegistryState {
    fn customizer(&mut self) -> &Arc<Customizer> {
        let configure = self.configure;
        self.customizer.get_or_insert_with(|| {
            let customizer = configure.and_then(|configure| configure());
            let customizer = customizer.unwrap_or_else(|| {
                gst::debug!(CAT, "No customizer configured, using passthrough");
                Customizer::passthrough()
            });
            gst::info!(CAT, "Constructed {:?} customizer", customizer.kind());
            Arc::new(customizer)
        })
    }
}

/// Owner of the customizer shared by all instances of one element type.
///
/// Construction and teardown are serialized by an internal lock, the configure
/// hook must not call back into the registry.
#[derive(Debug)]
pub struct FactoryRegistry {
    state: Mutex<RegistryState>,
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryRegistry {
    pub const fn new() -> Self {
        FactoryRegistry {
            state: Mutex::new(RegistryState {
                configure: None,
                customizer: None,
                leases: 0,
            }),
        }
    }

    /// Takes effect the next time the customizer has to be constructed.
    pub fn set_configure(&self, configure: ConfigureHook) {
        self.state.lock().unwrap().configure = Some(configure);
    }

    /// The current customizer, constructed if there is none.
    pub fn customizer(&self) -> Arc<Customizer> {
        self.state.lock().unwrap().customizer().clone()
    }

    pub fn acquire(&'static self) -> FactoryLease {
        let mut state = self.state.lock().unwrap();
        let customizer = state.customizer().clone();
        state.leases += 1;

        FactoryLease {
            registry: self,
            customizer,
        }
    }

    pub fn is_constructed(&self) -> bool {
        self.state.lock().unwrap().customizer.is_some()
    }

    pub fn leases(&self) -> usize {
        self.state.lock().unwrap().leases
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.leases = state.leases.saturating_sub(1);
        if state.leases == 0 && state.customizer.take().is_some() {
            gst::info!(CAT, "Last lease released, customizer torn down");
        }
    }
}

/// Keeps the registry's customizer alive for one element instance.
#[derive(Debug)]
pub struct FactoryLease {
    registry: &'static FactoryRegistry,
    customizer: Arc<Customizer>,
}

impl FactoryLease {
    pub fn customizer(&self) -> &Arc<Customizer> {
        &self.customizer
    }
}

impl Drop for FactoryLease {
    fn drop(&mut self) {
        self.registry.release();
    }
}

/// The registry used by the `framewrap` element.
pub fn registry() -> &'static FactoryRegistry {
    static REGISTRY: FactoryRegistry = FactoryRegistry::new();
    &REGISTRY
}
