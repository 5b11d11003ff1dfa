#![forbid(unsafe_code)]

//! Execution engine.
//!
//! A replay runs in two phases:
//!
//! 1. every non-text executor of the named property (or of all properties,
//!    in creation order) runs its side effect;
//! 2. every text descriptor of the owner, across all properties and each
//!    once, recomposes its target's text from the cached source text, and
//!    each target is written once.
//!
//! Phase 2 always covers the whole owner so that a target interpolating
//! several properties never shows a partially substituted string.
//! Substitutions are placed by their position in the cached source, so a
//! value that happens to contain another span's literal is written as is.
//!
//! # Failure Modes
//!
//! - A method that is missing or returns an error is logged with
//!   `tracing::error!`; the executor's side effect is skipped and the pass
//!   continues.

use std::ops::Range;
use std::rc::Rc;

use indexmap::IndexMap;
use slim_core::dom::{NodeFlags, NodeId};
use slim_core::value::Value;

use crate::descriptor::{Descriptor, Payload};
use crate::error::MethodError;
use crate::expr::camel_case;
use crate::runtime::Runtime;

impl Runtime {
    /// Re-execute the bindings of `owner` for `property`, or for every
    /// property when `None`.
    pub fn replay(&mut self, owner: NodeId, property: Option<&str>) {
        let executors = self.store.executors(owner, property);
        for executor in &executors {
            if executor.descriptor.kind().is_text() {
                continue;
            }
            self.execute(&executor.descriptor);
        }
        let texts = self.store.text_descriptors(owner);
        self.render_text(&texts);
    }

    /// Run a fixed set of descriptors: non-text ones once each, then the
    /// text phase over the text ones.
    pub(crate) fn replay_descriptors(&mut self, descriptors: &[Rc<Descriptor>]) {
        for descriptor in descriptors.iter().filter(|d| !d.kind().is_text()) {
            if self.store.is_registered(descriptor) {
                self.execute(descriptor);
            }
        }
        let texts: Vec<Rc<Descriptor>> = descriptors
            .iter()
            .filter(|d| d.kind().is_text())
            .cloned()
            .collect();
        self.render_text(&texts);
    }

    /// Apply the side effect of one non-text descriptor.
    pub(crate) fn execute(&mut self, descriptor: &Rc<Descriptor>) {
        let target = descriptor.target;
        if self.doc.flags(target).contains(NodeFlags::DISCARDED) {
            return;
        }
        tracing::trace!(kind = ?descriptor.kind(), target = ?target, "executing binding");
        match &descriptor.payload {
            Payload::Property { attribute } => {
                let value = self.resolve_primary(descriptor);
                self.write_target(target, attribute, value);
            }
            Payload::Method { attribute, method } => match self.call_bound_method(descriptor, method) {
                Ok(value) => self.write_target(target, attribute, value),
                Err(err) => self.log_method_failure(descriptor, method, &err),
            },
            Payload::Conditional {
                negated,
                placeholder,
            } => {
                let visible = self.resolve_primary(descriptor).truthy() != *negated;
                self.toggle(target, *placeholder, visible);
            }
            Payload::Repeat { repeater } => {
                self.request_render(*repeater);
            }
            Payload::Watch { callback } => {
                let value = self.resolve_primary(descriptor);
                let callback = Rc::clone(callback);
                callback(self, value);
            }
            Payload::CustomAttribute { attribute, value } => {
                let processors = self.processors.get(&**attribute).cloned().unwrap_or_default();
                for processor in processors {
                    processor(self, target, &**value);
                }
            }
            Payload::Text { .. } | Payload::TextMethod { .. } | Payload::Inject { .. } => {}
        }
    }

    fn resolve_primary(&self, descriptor: &Descriptor) -> Value {
        descriptor
            .primary_path()
            .map(|path| self.resolve_value(descriptor.target, descriptor.owner, path))
            .unwrap_or_default()
    }

    /// Write a bound result to the target's camel-cased property and mirror
    /// it as the serialized attribute.
    fn write_target(&mut self, target: NodeId, attribute: &str, value: Value) {
        let serialized = value.to_string();
        self.set_property(target, &camel_case(attribute), value);
        self.doc.set_attribute(target, attribute, serialized);
    }

    /// Resolve the arguments of a method binding and call the method on the
    /// first chain link whose component defines it.
    fn call_bound_method(&mut self, descriptor: &Descriptor, method: &str) -> Result<Value, MethodError> {
        let args: Vec<Value> = descriptor
            .properties
            .iter()
            .map(|path| self.resolve_value(descriptor.target, descriptor.owner, path))
            .collect();
        let chain = self.lookup_chain(descriptor.target, descriptor.source.or(Some(descriptor.owner)));
        let found = chain
            .iter()
            .find_map(|link| self.component_method(*link, method).map(|f| (*link, f)));
        let Some((holder, function)) = found else {
            return Err(MethodError::Missing {
                method: method.to_owned(),
            });
        };
        function(self, holder, &args)
    }

    fn log_method_failure(&self, descriptor: &Descriptor, method: &str, err: &MethodError) {
        let tag = self.doc.describe(descriptor.target);
        tracing::error!(method = %method, element = %tag, error = %err, "could not execute bound method");
    }

    /// Show or hide a conditional target. Idempotent in both directions.
    fn toggle(&mut self, target: NodeId, placeholder: NodeId, visible: bool) {
        if visible {
            if self.doc.parent(target).is_some() {
                return;
            }
            let Some(parent) = self.doc.parent(placeholder) else {
                return;
            };
            self.doc.insert_before(parent, target, Some(placeholder));
            self.doc.remove(placeholder);
            if let Err(err) = self.activate(target) {
                tracing::error!(error = %err, "could not activate conditional element");
            }
        } else if let Some(parent) = self.doc.parent(target) {
            self.doc.insert_before(parent, placeholder, Some(target));
            self.doc.remove(target);
        }
    }

    /// Recompose and write the text of every target touched by `texts`.
    fn render_text(&mut self, texts: &[Rc<Descriptor>]) {
        if texts.is_empty() {
            return;
        }
        let mut working: IndexMap<NodeId, Composition> = IndexMap::new();
        for descriptor in texts {
            let target = descriptor.target;
            if self.doc.flags(target).contains(NodeFlags::DISCARDED) {
                continue;
            }
            let (span, replacement) = match &descriptor.payload {
                Payload::Text { span } => (span, self.resolve_primary(descriptor).to_string()),
                Payload::TextMethod { span, method } => match self.call_bound_method(descriptor, method) {
                    Ok(value) => (span, value.to_string()),
                    Err(err) => {
                        self.log_method_failure(descriptor, method, &err);
                        // Keeps the literal span and its position.
                        (span, span.to_string())
                    }
                },
                _ => continue,
            };
            working
                .entry(target)
                .or_insert_with(|| Composition::new(self.text_sources.get(&target).cloned().unwrap_or_default()))
                .substitute(span, replacement);
        }
        for (target, composition) in working {
            self.doc.set_text_content(target, composition.finish());
        }
    }
}

/// A target's cached source text plus the substitutions of one text phase.
struct Composition {
    source: String,
    edits: Vec<(Range<usize>, String)>,
}

impl Composition {
    fn new(source: String) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    /// Claim the first occurrence of `span` in the source not yet claimed.
    /// Repeated spans (`[[a]]-[[a]]`) each own one occurrence.
    fn substitute(&mut self, span: &str, replacement: String) {
        let free = self
            .source
            .match_indices(span)
            .map(|(at, _)| at..at + span.len())
            .find(|range| {
                self.edits
                    .iter()
                    .all(|(taken, _)| range.end <= taken.start || taken.end <= range.start)
            });
        if let Some(range) = free {
            self.edits.push((range, replacement));
        }
    }

    /// Splice every substitution into the source, left to right.
    fn finish(mut self) -> String {
        self.edits.sort_by_key(|(range, _)| range.start);
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for (range, replacement) in &self.edits {
            out.push_str(&self.source[cursor..range.start]);
            out.push_str(replacement);
            cursor = range.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}
