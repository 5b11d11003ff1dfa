#![forbid(unsafe_code)]

//! Component definitions and lifecycle.
//!
//! A [`ComponentDef`] is the capability set the binding runtime consumes
//! from a component: a template, named methods reachable from bindings,
//! `<property>Changed` hooks and lifecycle hooks. Definitions are keyed by
//! tag; an element whose tag is defined is a component.
//!
//! # Lifecycle
//!
//! [`Runtime::activate`] is the forced initialization path. It runs once
//! per element:
//!
//! 1. declared properties become reactive, seeded from plain values or
//!    their defaults;
//! 2. the template is instantiated and the element's light children are
//!    moved into the template's content slot;
//! 3. the template's bindings are captured with the element as host;
//! 4. nested components are activated, then the `created` hook runs;
//! 5. [`Runtime::update`] replays every binding.
//!
//! # Failure Modes
//!
//! - Capture errors in the template propagate out of `activate`; the
//!   element stays marked created.
//! - [`Runtime::call_attribute`] reports missing holders and failed
//!   methods as [`BindError`].

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use slim_core::dom::{NodeFlags, NodeId};
use slim_core::template::{Template, instantiate_fragment};
use slim_core::value::Value;

use crate::error::{BindError, MethodError};
use crate::runtime::Runtime;

/// Method callable from bindings and delegation. Receives the node that
/// holds it and the resolved arguments.
pub type Method = Rc<dyn Fn(&mut Runtime, NodeId, &[Value]) -> Result<Value, MethodError>>;

/// Lifecycle hook.
pub type Hook = Rc<dyn Fn(&mut Runtime, NodeId)>;

/// `<property>Changed` hook, called with the new value after the store
/// write and before dependents replay.
pub type ChangedHook = Rc<dyn Fn(&mut Runtime, NodeId, &Value)>;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// Component definition builder.
#[derive(Clone)]
pub struct ComponentDef {
    tag: String,
    template: Vec<Template>,
    properties: Vec<(String, Value)>,
    methods: AHashMap<String, Method>,
    changed: AHashMap<String, ChangedHook>,
    created: Option<Hook>,
    before_update: Option<Hook>,
    after_update: Option<Hook>,
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("ComponentDef")
            .field("tag", &self.tag)
            .field("template_roots", &self.template.len())
            .field("properties", &self.properties)
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

impl ComponentDef {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            template: Vec::new(),
            properties: Vec::new(),
            methods: AHashMap::new(),
            changed: AHashMap::new(),
            created: None,
            before_update: None,
            after_update: None,
        }
    }

    /// Append a root to the component's template.
    #[must_use]
    pub fn template(mut self, root: Template) -> Self {
        self.template.push(root);
        self
    }

    /// Declare a reactive property with a default value.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.properties.push((name.into(), default.into()));
        self
    }

    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&mut Runtime, NodeId, &[Value]) -> Result<Value, MethodError> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    /// Hook run whenever reactive property `property` is written.
    #[must_use]
    pub fn on_changed(
        mut self,
        property: impl Into<String>,
        hook: impl Fn(&mut Runtime, NodeId, &Value) + 'static,
    ) -> Self {
        self.changed.insert(property.into(), Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_created(mut self, hook: impl Fn(&mut Runtime, NodeId) + 'static) -> Self {
        self.created = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn before_update(mut self, hook: impl Fn(&mut Runtime, NodeId) + 'static) -> Self {
        self.before_update = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn after_update(mut self, hook: impl Fn(&mut Runtime, NodeId) + 'static) -> Self {
        self.after_update = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn method_named(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned()
    }

    #[must_use]
    pub fn changed_hook(&self, property: &str) -> Option<ChangedHook> {
        self.changed.get(property).cloned()
    }
}

// ---------------------------------------------------------------------------
// Runtime operations
// ---------------------------------------------------------------------------

impl Runtime {
    /// Register `def` under its tag, replacing any earlier definition.
    pub fn define(&mut self, def: ComponentDef) {
        tracing::debug!(tag = %def.tag, methods = def.methods.len(), "component defined");
        self.components.insert(def.tag.clone(), Rc::new(def));
    }

    /// Definition of the component `node` is an instance of.
    #[must_use]
    pub fn component_def(&self, node: NodeId) -> Option<Rc<ComponentDef>> {
        let tag = self.doc.tag(node)?;
        self.components.get(tag).cloned()
    }

    #[must_use]
    pub fn is_component(&self, node: NodeId) -> bool {
        self.doc.tag(node).is_some_and(|tag| self.components.contains_key(tag))
    }

    /// Method `name` of the component `node`, if it defines one.
    #[must_use]
    pub fn component_method(&self, node: NodeId, name: &str) -> Option<Method> {
        self.component_def(node)?.method_named(name)
    }

    /// Create a bare element. Component tags are not activated.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.doc.create_element(tag)
    }

    /// Create and activate an instance of a defined component.
    ///
    /// # Errors
    ///
    /// [`BindError::UnknownComponent`] when `tag` has no definition, or any
    /// capture error raised by the component's template.
    pub fn create_component(&mut self, tag: &str) -> Result<NodeId, BindError> {
        if !self.components.contains_key(tag) {
            return Err(BindError::UnknownComponent { tag: tag.to_owned() });
        }
        let node = self.doc.create_element(tag);
        self.activate(node)?;
        Ok(node)
    }

    /// Instantiate `template` as a detached subtree.
    pub fn build(&mut self, template: &Template) -> NodeId {
        template.instantiate(&mut self.doc)
    }

    /// Initialize a component element. Non-components and elements already
    /// activated are left untouched.
    ///
    /// # Errors
    ///
    /// Propagates capture errors from the component's template or from
    /// nested components.
    pub fn activate(&mut self, node: NodeId) -> Result<(), BindError> {
        let Some(def) = self.component_def(node) else {
            return Ok(());
        };
        if self.doc.flags(node).contains(NodeFlags::CREATED) {
            return Ok(());
        }
        self.doc.set_flag(node, NodeFlags::CREATED, true);

        for (name, default) in &def.properties {
            self.make_reactive(node, name);
            if self.store.value(node, name).is_none_or(Value::is_undefined) {
                self.store.set_value(node, name, default.clone());
            }
        }

        let fragment = instantiate_fragment(&mut self.doc, &def.template);
        let light = self.doc.children(node).to_vec();
        if !light.is_empty() {
            if let Some(slot) = self.doc.find_by_tag(fragment, &self.config.content_tag) {
                for child in light {
                    self.doc.append_child(slot, child);
                }
            }
        }

        let roots = self.doc.children(fragment).to_vec();
        let outcome = match self.capture(node, &roots) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.doc.discard(fragment);
                return Err(err);
            }
        };
        self.doc.move_children(fragment, node);
        self.doc.discard(fragment);
        for nested in outcome.components {
            self.activate(nested)?;
        }

        if let Some(hook) = def.created.clone() {
            hook(self, node);
        }
        tracing::debug!(
            tag = %def.tag,
            bindings = outcome.descriptors.len(),
            repeaters = outcome.repeaters.len(),
            "component activated"
        );
        self.update(node);
        Ok(())
    }

    /// Replay every binding owned by `node`, between its update hooks.
    pub fn update(&mut self, node: NodeId) {
        let def = self.component_def(node);
        if let Some(hook) = def.as_ref().and_then(|d| d.before_update.clone()) {
            hook(self, node);
        }
        self.replay(node, None);
        if let Some(hook) = def.as_ref().and_then(|d| d.after_update.clone()) {
            hook(self, node);
        }
    }

    /// Call the method named by `node`'s `attribute` on the first holder
    /// among its bound parent, the bound parent's own bound parent and its
    /// bound repeater parent, passing `payload`. A component caller is
    /// updated afterwards.
    ///
    /// Returns `false` when the attribute is absent.
    ///
    /// # Errors
    ///
    /// [`BindError::NoBoundParent`] when `node` was never bound,
    /// [`BindError::Delegation`] when no candidate defines the method and
    /// [`BindError::MethodFailed`] when the method reports a failure.
    pub fn call_attribute(&mut self, node: NodeId, attribute: &str, payload: Value) -> Result<bool, BindError> {
        let tag = self.doc.tag(node).unwrap_or_default().to_owned();
        let Some(bound_parent) = self.doc.bound_parent(node) else {
            return Err(BindError::NoBoundParent {
                attribute: attribute.to_owned(),
                tag,
            });
        };
        let Some(method) = self.doc.attribute(node, attribute).map(str::to_owned) else {
            tracing::warn!(
                attribute = %attribute,
                bound_parent = %self.doc.describe(bound_parent),
                "no attribute-bound method to call"
            );
            return Ok(false);
        };

        let candidates = [
            Some(bound_parent),
            self.doc.bound_parent(bound_parent),
            self.doc.bound_repeater_parent(node),
        ];
        let found = candidates
            .into_iter()
            .flatten()
            .find_map(|holder| self.component_method(holder, &method).map(|f| (holder, f)));
        let Some((holder, function)) = found else {
            return Err(BindError::Delegation { method, tag });
        };
        tracing::trace!(method = %method, holder = ?holder, "delegating attribute-bound call");
        function(self, holder, std::slice::from_ref(&payload))
            .map_err(|error| BindError::MethodFailed {
                method: method.clone(),
                error,
            })?;

        if self.is_component(node) {
            self.update(node);
        }
        Ok(true)
    }

    /// Route an event to the `on<type>` attribute, else the `<type>`
    /// attribute, of `node`.
    ///
    /// Returns `false` when neither attribute is present.
    ///
    /// # Errors
    ///
    /// See [`call_attribute`](Self::call_attribute).
    pub fn dispatch_event(&mut self, node: NodeId, event_type: &str, payload: Value) -> Result<bool, BindError> {
        let prefixed = format!("on{event_type}");
        if self.doc.has_attribute(node, &prefixed) {
            self.call_attribute(node, &prefixed, payload)
        } else if self.doc.has_attribute(node, event_type) {
            self.call_attribute(node, event_type, payload)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn unknown_component_is_rejected() {
        let mut rt = Runtime::new();
        assert_eq!(
            rt.create_component("x-nope"),
            Err(BindError::UnknownComponent { tag: "x-nope".into() })
        );
    }

    #[test]
    fn activation_renders_template_once() {
        let mut rt = Runtime::new();
        let created = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&created);
        rt.define(
            ComponentDef::new("x-greet")
                .property("name", "world")
                .template(Template::element("p").attr("bind", "").text("Hello [[name]]"))
                .on_created(move |_, _| *counter.borrow_mut() += 1),
        );
        let node = rt.create_component("x-greet").expect("component");
        rt.activate(node).expect("activate");
        assert_eq!(*created.borrow(), 1);
        assert_eq!(rt.document().text_content(node), "Hello world");

        rt.set_property(node, "name", "ada");
        assert_eq!(rt.document().text_content(node), "Hello ada");
    }

    #[test]
    fn plain_value_wins_over_default() {
        let mut rt = Runtime::new();
        rt.define(ComponentDef::new("x-card").property("title", "untitled"));
        let node = rt.create_element("x-card");
        rt.set_property(node, "title", "kept");
        rt.activate(node).expect("activate");
        assert!(rt.is_reactive(node, "title"));
        assert_eq!(rt.get_property(node, "title"), Value::str("kept"));
    }

    #[test]
    fn light_children_move_into_content_slot() {
        let mut rt = Runtime::new();
        rt.define(
            ComponentDef::new("x-panel").template(
                Template::element("section").child(Template::element("slim-content")),
            ),
        );
        let node = rt.create_element("x-panel");
        let light = rt.create_element("em");
        rt.document_mut().append_child(node, light);
        rt.activate(node).expect("activate");

        let section = rt.document().children(node)[0];
        let slot = rt.document().children(section)[0];
        assert_eq!(rt.document().tag(slot), Some("slim-content"));
        assert_eq!(rt.document().children(slot), &[light]);
    }

    #[test]
    fn changed_hook_runs_before_dependents() {
        let mut rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        rt.define(
            ComponentDef::new("x-count")
                .property("count", 0)
                .on_changed("count", move |_, _, v| sink.borrow_mut().push(format!("changed {v}"))),
        );
        let node = rt.create_component("x-count").expect("component");
        let sink = Rc::clone(&log);
        rt.watch(node, "count", move |_, v| sink.borrow_mut().push(format!("watch {v}")));
        rt.set_property(node, "count", 3);
        assert_eq!(*log.borrow(), vec!["changed 3".to_owned(), "watch 3".to_owned()]);
    }

    #[test]
    fn update_hooks_wrap_replay() {
        let mut rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (before, after) = (Rc::clone(&log), Rc::clone(&log));
        rt.define(
            ComponentDef::new("x-hooks")
                .before_update(move |_, _| before.borrow_mut().push("before"))
                .after_update(move |_, _| after.borrow_mut().push("after")),
        );
        let node = rt.create_component("x-hooks").expect("component");
        log.borrow_mut().clear();
        rt.update(node);
        assert_eq!(*log.borrow(), vec!["before", "after"]);
    }

    #[test]
    fn call_attribute_without_bound_parent_fails() {
        let mut rt = Runtime::new();
        let node = rt.create_element("button");
        rt.document_mut().set_attribute(node, "onclick", "save");
        assert!(matches!(
            rt.dispatch_event(node, "click", Value::Null),
            Err(BindError::NoBoundParent { .. })
        ));
    }

    #[test]
    fn dispatch_without_handler_attribute_is_false() {
        let mut rt = Runtime::new();
        let host = rt.create_element("x-host");
        let node = rt.create_element("button");
        rt.document_mut().set_bound_parent(node, Some(host));
        assert_eq!(rt.dispatch_event(node, "click", Value::Null), Ok(false));
        assert_eq!(rt.call_attribute(node, "onclick", Value::Null), Ok(false));
    }
}
