#![forbid(unsafe_code)]

//! The binding runtime.
//!
//! [`Runtime`] owns the node arena, the reactive property store, every
//! repeater and the render task queue. All mutation goes through `&mut
//! Runtime`, so user callbacks (component methods, watchers, setters,
//! injectors, custom attribute processors) receive the runtime explicitly
//! instead of capturing shared state.
//!
//! # Write path
//!
//! [`Runtime::set_property`] on a reactive property runs, in order:
//!
//! 1. the custom setter chain, if any,
//! 2. the store write,
//! 3. the owner component's `<property>Changed` hook,
//! 4. a replay of the executors registered under that property.
//!
//! Non-reactive properties are plain node properties.
//!
//! # Scheduling
//!
//! Repeater renders are deferred. [`Runtime::run_turn`] runs every render
//! queued so far; [`Runtime::settle`] keeps turning until the queue is
//! empty or `max_settle_turns` is reached.
//!
//! # Failure Modes
//!
//! - Method failures during replay are logged and do not abort the pass.
//! - Authoring errors met while rendering clones surface from `run_turn`
//!   after the rest of the batch has run.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use slim_core::dom::{Document, NodeId};
use slim_core::schedule::TaskQueue;
use slim_core::value::Value;
use smallvec::smallvec;

use crate::component::ComponentDef;
use crate::config::RuntimeConfig;
use crate::descriptor::{Descriptor, Payload, WatchCallback};
use crate::error::BindError;
use crate::expr::{ExpressionCompiler, camel_case};
use crate::repeat::Repeater;
use crate::store::{PropertyStore, Setter};

/// Factory behind an `{name}` attribute.
pub type Injector = Rc<dyn Fn(&mut Runtime, NodeId) -> Value>;

/// Handler for a custom attribute, called with the element and raw value.
pub type AttributeProcessor = Rc<dyn Fn(&mut Runtime, NodeId, &str)>;

/// Owner of all binding state.
pub struct Runtime {
    pub(crate) doc: Document,
    pub(crate) config: RuntimeConfig,
    pub(crate) compiler: ExpressionCompiler,
    pub(crate) components: AHashMap<String, Rc<ComponentDef>>,
    pub(crate) injectors: AHashMap<String, Injector>,
    pub(crate) processors: AHashMap<String, Vec<AttributeProcessor>>,
    pub(crate) store: PropertyStore,
    pub(crate) text_sources: AHashMap<NodeId, String>,
    pub(crate) repeaters: Vec<Repeater>,
    /// Table slots of released repeaters.
    pub(crate) free_repeaters: Vec<u32>,
    pub(crate) queue: TaskQueue,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.doc.len())
            .field("components", &self.components.len())
            .field("repeaters", &(self.repeaters.len() - self.free_repeaters.len()))
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            doc: Document::new(),
            compiler: ExpressionCompiler::new(&config),
            config,
            components: AHashMap::new(),
            injectors: AHashMap::new(),
            processors: AHashMap::new(),
            store: PropertyStore::new(),
            text_sources: AHashMap::new(),
            repeaters: Vec::new(),
            free_repeaters: Vec::new(),
            queue: TaskQueue::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Direct arena access. Structural edits made here bypass bindings.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    #[must_use]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    #[must_use]
    pub fn compiler(&self) -> &ExpressionCompiler {
        &self.compiler
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    /// Write a property of `owner`.
    pub fn set_property(&mut self, owner: NodeId, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if !self.store.contains(owner, name) {
            self.doc.set_property(owner, name, value);
            return;
        }
        if let Some(setter) = self.store.setter(owner, name) {
            setter(self, owner, &value);
        }
        self.store.set_value(owner, name, value.clone());
        if let Some(hook) = self.component_def(owner).and_then(|def| def.changed_hook(name)) {
            hook(self, owner, &value);
        }
        self.replay(owner, Some(name));
    }

    /// Read a property of `owner`: the reactive value, else the plain node
    /// property, else `Undefined`.
    #[must_use]
    pub fn get_property(&self, owner: NodeId, name: &str) -> Value {
        self.store
            .value(owner, name)
            .or_else(|| self.doc.property(owner, name))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_reactive(&self, owner: NodeId, name: &str) -> bool {
        self.store.contains(owner, name)
    }

    /// Make `(owner, name)` reactive and return a handle to it.
    pub fn property(&mut self, owner: NodeId, name: &str) -> ReactiveProperty {
        self.make_reactive(owner, name);
        ReactiveProperty {
            owner,
            name: Rc::from(name),
        }
    }

    pub(crate) fn make_reactive(&mut self, owner: NodeId, name: &str) {
        let seed = self.doc.property(owner, name).cloned().unwrap_or_default();
        self.store.install(owner, name, seed);
    }

    /// Add a custom setter to `(owner, name)`, making it reactive.
    ///
    /// Setters compose: earlier setters run before later ones, and all of
    /// them run before the stored value changes.
    pub fn define_setter(
        &mut self,
        owner: NodeId,
        name: &str,
        setter: impl Fn(&mut Runtime, NodeId, &Value) + 'static,
    ) {
        self.make_reactive(owner, name);
        let setter: Setter = Rc::new(setter);
        self.store.define_setter(owner, name, setter);
    }

    /// Set an attribute; when the camel-cased property is reactive the new
    /// value is written through [`set_property`](Self::set_property).
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.doc.set_attribute(node, name, value.clone());
        let property = camel_case(name);
        if self.store.contains(node, &property) {
            self.set_property(node, &property, Value::from(value));
        }
    }

    /// Call `callback` with the resolved value whenever `property` of
    /// `owner` changes. Returns the watch binding for [`unwatch`](Self::unwatch).
    pub fn watch(
        &mut self,
        owner: NodeId,
        property: &str,
        callback: impl Fn(&mut Runtime, Value) + 'static,
    ) -> Rc<Descriptor> {
        let callback: WatchCallback = Rc::new(callback);
        let descriptor = Rc::new(Descriptor {
            properties: smallvec![Rc::from(property)],
            owner,
            target: owner,
            source: Some(owner),
            payload: Payload::Watch { callback },
        });
        self.register_descriptor(Rc::clone(&descriptor));
        descriptor
    }

    pub fn unwatch(&mut self, watch: &Rc<Descriptor>) {
        self.unregister_descriptor(watch);
    }

    /// Register the factory behind `{name}` attributes.
    pub fn inject(&mut self, name: &str, factory: impl Fn(&mut Runtime, NodeId) -> Value + 'static) {
        self.injectors.insert(name.to_owned(), Rc::new(factory));
    }

    /// Register a processor for attribute `name`. Several processors may
    /// share a name; they run in registration order.
    pub fn register_custom_attribute(
        &mut self,
        name: &str,
        processor: impl Fn(&mut Runtime, NodeId, &str) + 'static,
    ) {
        self.compiler.register_custom(name);
        self.processors
            .entry(name.to_owned())
            .or_default()
            .push(Rc::new(processor));
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Renders queued for the next turn.
    #[must_use]
    pub fn pending_renders(&self) -> usize {
        self.queue.len()
    }

    /// Run every render queued so far. Renders requested while the batch
    /// runs wait for the next turn.
    ///
    /// # Errors
    ///
    /// Returns the first authoring error met while capturing new clones;
    /// the remaining renders of the batch still run.
    pub fn run_turn(&mut self) -> Result<usize, BindError> {
        let batch = self.queue.drain();
        let mut first_error = None;
        for id in &batch {
            if let Some(repeater) = self.repeater(*id) {
                repeater.ticket.checkout();
            }
            if let Err(err) = self.render(*id) {
                tracing::error!(repeater = %id, error = %err, "repeater render failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(batch.len()),
        }
    }

    /// Turn the queue until it is empty or the turn budget runs out.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by [`run_turn`](Self::run_turn).
    pub fn settle(&mut self) -> Result<SettleReport, BindError> {
        let mut report = SettleReport::default();
        while !self.queue.is_empty() {
            if report.turns >= self.config.max_settle_turns {
                tracing::warn!(
                    turns = report.turns,
                    pending = self.queue.len(),
                    "settle turn budget exhausted"
                );
                report.exhausted = true;
                break;
            }
            report.renders += self.run_turn()?;
            report.turns += 1;
        }
        Ok(report)
    }
}

/// Outcome of [`Runtime::settle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleReport {
    pub turns: usize,
    pub renders: usize,
    /// The queue was still non-empty when the turn budget ran out.
    pub exhausted: bool,
}

/// Handle to one reactive property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactiveProperty {
    owner: NodeId,
    name: Rc<str>,
}

impl ReactiveProperty {
    #[must_use]
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, rt: &Runtime) -> Value {
        rt.get_property(self.owner, &self.name)
    }

    pub fn set(&self, rt: &mut Runtime, value: impl Into<Value>) {
        rt.set_property(self.owner, &self.name, value);
    }
}
