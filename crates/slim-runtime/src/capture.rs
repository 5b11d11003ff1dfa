#![forbid(unsafe_code)]

//! Binding capture.
//!
//! [`Runtime::capture`] walks a subtree in document order and turns its
//! markup into registered bindings on behalf of a host scope:
//!
//! - every element not yet bound gets the host as its bound parent;
//! - `slim-id` and `#name` attributes publish the element on its owner;
//! - literal attribute values are copied to camel-cased plain properties;
//! - compiled attributes become descriptors, sorted by kind priority and
//!   registered (injections are applied on the spot);
//! - a list template is swapped for a repeater anchor and is not descended
//!   into; its subtree is captured per clone;
//! - `bind` elements get one text descriptor per `[[...]]` span.
//!
//! # Invariants
//!
//! 1. An element is captured at most once. Subtrees already captured by
//!    another scope are skipped whole.
//! 2. Descriptors of one element register in priority order, ties in
//!    attribute order.
//!
//! # Failure Modes
//!
//! - `bind` text with element children: [`BindError::NestedInterpolation`].
//! - `{factory}` naming an unregistered injector:
//!   [`BindError::UnknownInjector`].

use std::rc::Rc;

use slim_core::dom::{NodeFlags, NodeId};
use slim_core::schedule::RepeaterId;
use slim_core::value::Value;
use smallvec::{SmallVec, smallvec};

use crate::descriptor::{Descriptor, DescriptorKind, Payload, sort_by_priority};
use crate::error::BindError;
use crate::expr::{AttributeExpression, TextExpression, camel_case, is_path};
use crate::runtime::Runtime;

/// What one capture pass produced.
#[derive(Debug, Default, Clone)]
pub struct CaptureOutcome {
    /// Registered descriptors (injections excluded), in registration order.
    pub descriptors: Vec<Rc<Descriptor>>,
    /// Elements marked captured by this pass.
    pub nodes: Vec<NodeId>,
    /// Repeaters created for list templates.
    pub repeaters: Vec<RepeaterId>,
    /// Component elements met (list templates excluded), in document order.
    pub components: Vec<NodeId>,
}

impl Runtime {
    /// Capture the bindings of `roots` and their subtrees for `host`.
    ///
    /// # Errors
    ///
    /// Stops at the first authoring error; bindings registered before the
    /// error stay registered.
    pub fn capture(&mut self, host: NodeId, roots: &[NodeId]) -> Result<CaptureOutcome, BindError> {
        let mut outcome = CaptureOutcome::default();
        for &root in roots {
            self.capture_tree(host, root, &mut outcome)?;
        }
        tracing::trace!(
            host = ?host,
            nodes = outcome.nodes.len(),
            bindings = outcome.descriptors.len(),
            repeaters = outcome.repeaters.len(),
            "captured bindings"
        );
        Ok(outcome)
    }

    fn capture_tree(&mut self, host: NodeId, root: NodeId, out: &mut CaptureOutcome) -> Result<(), BindError> {
        let mut stack = vec![root];
        while let Some(el) = stack.pop() {
            if !self.doc.is_element(el) || self.doc.flags(el).contains(NodeFlags::CAPTURED) {
                continue;
            }
            self.doc.set_flag(el, NodeFlags::CAPTURED, true);
            if self.doc.bound_parent(el).is_none() {
                self.doc.set_bound_parent(el, Some(host));
            }
            out.nodes.push(el);

            if self.doc.has_attribute(el, &self.config.repeat_attribute) {
                self.capture_list_template(el, out);
                continue;
            }
            self.capture_element(el, out)?;
            if self.is_component(el) {
                out.components.push(el);
            }
            stack.extend(self.doc.children(el).iter().rev().copied());
        }
        Ok(())
    }

    fn capture_element(&mut self, el: NodeId, out: &mut CaptureOutcome) -> Result<(), BindError> {
        let owner = self.resolve_owner(el, None);
        let tag = self.doc.tag(el).unwrap_or_default().to_owned();
        let attributes = self.doc.attributes(el).to_vec();

        let mut descriptors: Vec<Rc<Descriptor>> = Vec::new();
        for (name, value) in &attributes {
            if *name == self.config.element_id_attribute && !value.is_empty() {
                self.publish_reference(owner, &camel_case(value), el);
            } else if let Some(reference) = name.strip_prefix('#').filter(|r| !r.is_empty()) {
                self.publish_reference(owner, reference, el);
            }
            match self.compiler.compile_attribute(&tag, &attributes, name, value) {
                Some(expression) => {
                    if let Some(descriptor) = self.describe(el, owner, name, expression) {
                        descriptors.push(descriptor);
                    }
                }
                None => self.doc.set_property(el, camel_case(name), Value::str(value)),
            }
        }

        sort_by_priority(&mut descriptors);
        for descriptor in descriptors {
            if descriptor.kind() == DescriptorKind::Inject {
                self.apply_injection(&descriptor, &tag)?;
                continue;
            }
            if descriptor.properties.is_empty() {
                // Custom attributes without a dependency path run once.
                self.execute(&descriptor);
                continue;
            }
            self.register_descriptor(Rc::clone(&descriptor));
            out.descriptors.push(descriptor);
        }

        if self.doc.has_attribute(el, &self.config.text_bind_attribute) {
            self.capture_text(el, owner, &tag, out)?;
        }
        Ok(())
    }

    fn publish_reference(&mut self, owner: NodeId, name: &str, el: NodeId) {
        if self.store.contains(owner, name) {
            self.store.set_value(owner, name, Value::Node(el));
        } else {
            self.doc.set_property(owner, name, Value::Node(el));
        }
    }

    fn describe(
        &mut self,
        el: NodeId,
        owner: NodeId,
        attribute: &str,
        expression: AttributeExpression,
    ) -> Option<Rc<Descriptor>> {
        let attribute: Rc<str> = Rc::from(attribute);
        let (properties, source, payload): (SmallVec<[Rc<str>; 2]>, Option<NodeId>, Payload) = match expression {
            AttributeExpression::Property { path } => (smallvec![path], None, Payload::Property { attribute }),
            AttributeExpression::Method(call) => (
                call.args,
                None,
                Payload::Method {
                    attribute,
                    method: call.method,
                },
            ),
            AttributeExpression::Conditional { path, negated } => {
                let placeholder = self.doc.create_element(self.config.placeholder_tag.clone());
                (
                    smallvec![path],
                    self.doc.bound_parent(el),
                    Payload::Conditional {
                        negated,
                        placeholder,
                    },
                )
            }
            AttributeExpression::Inject { factory } => (SmallVec::new(), None, Payload::Inject { attribute, factory }),
            AttributeExpression::CustomAttribute { value } => {
                let trimmed = value.trim();
                let properties = if is_path(trimmed) {
                    smallvec![Rc::from(trimmed)]
                } else {
                    SmallVec::new()
                };
                (properties, None, Payload::CustomAttribute { attribute, value })
            }
            // List templates never reach attribute description.
            AttributeExpression::Repeat(_) => return None,
        };
        Some(Rc::new(Descriptor {
            properties,
            owner,
            target: el,
            source,
            payload,
        }))
    }

    fn apply_injection(&mut self, descriptor: &Rc<Descriptor>, tag: &str) -> Result<(), BindError> {
        let Payload::Inject { attribute, factory } = &descriptor.payload else {
            return Ok(());
        };
        let Some(injector) = self.injectors.get(&**factory).cloned() else {
            tracing::error!(factory = %factory, tag = %tag, "could not inject");
            return Err(BindError::UnknownInjector {
                factory: factory.to_string(),
                tag: tag.to_owned(),
            });
        };
        let value = injector(self, descriptor.target);
        self.set_property(descriptor.target, &camel_case(attribute), value);
        Ok(())
    }

    fn capture_text(
        &mut self,
        el: NodeId,
        owner: NodeId,
        tag: &str,
        out: &mut CaptureOutcome,
    ) -> Result<(), BindError> {
        let text = self.doc.text_content(el);
        let spans = self.compiler.compile_text(&text);
        if spans.is_empty() {
            return Ok(());
        }
        if self.doc.has_element_children(el) {
            return Err(BindError::NestedInterpolation { tag: tag.to_owned() });
        }
        self.text_sources.insert(el, text);
        for span in spans {
            let (properties, payload) = match span.expression {
                TextExpression::Path(path) => (smallvec![path], Payload::Text { span: span.span }),
                TextExpression::Method(call) => (
                    call.args,
                    Payload::TextMethod {
                        span: span.span,
                        method: call.method,
                    },
                ),
            };
            let descriptor = Rc::new(Descriptor {
                properties,
                owner,
                target: el,
                source: Some(owner),
                payload,
            });
            self.register_descriptor(Rc::clone(&descriptor));
            out.descriptors.push(descriptor);
        }
        Ok(())
    }

    /// Swap a list template for its anchor and create the repeater.
    fn capture_list_template(&mut self, el: NodeId, out: &mut CaptureOutcome) {
        let tag = self.doc.tag(el).unwrap_or_default().to_owned();
        let attributes = self.doc.attributes(el).to_vec();
        let value = self
            .doc
            .attribute(el, &self.config.repeat_attribute)
            .unwrap_or_default()
            .to_owned();
        let Some(expression) = self.compiler.compile_repeat(&tag, &attributes, &value) else {
            tracing::warn!(tag = %tag, value = %value, "ignoring list template with an invalid source path");
            return;
        };
        let owner = self.resolve_owner(el, None);

        let anchor = self.doc.create_element(self.config.anchor_tag.clone());
        self.doc.set_attribute(anchor, "source", expression.path.to_string());
        self.doc.set_attribute(anchor, "target-attr", expression.target_attribute.to_string());
        self.doc.set_bound_parent(anchor, Some(owner));
        self.doc.set_scope(anchor, self.doc.scope(el).cloned());
        self.doc.set_flag(anchor, NodeFlags::CAPTURED, true);
        if let Some(parent) = self.doc.parent(el) {
            self.doc.insert_before(parent, anchor, Some(el));
            self.doc.remove(el);
        }

        let id = self.create_repeater(anchor, el, owner, &expression);
        let descriptor = Rc::new(Descriptor {
            properties: smallvec![Rc::clone(&expression.path)],
            owner,
            target: anchor,
            source: Some(owner),
            payload: Payload::Repeat { repeater: id },
        });
        self.register_descriptor(Rc::clone(&descriptor));
        out.descriptors.push(descriptor);
        out.repeaters.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::template::Template;

    fn build(rt: &mut Runtime, tpl: &Template) -> (NodeId, NodeId) {
        let host = rt.document_mut().create_element("x-host");
        let root = tpl.instantiate(rt.document_mut());
        rt.document_mut().append_child(host, root);
        (host, root)
    }

    #[test]
    fn literal_attributes_become_camel_properties() {
        let mut rt = Runtime::new();
        let (host, root) = build(&mut rt, &Template::element("div").attr("user-name", "ada"));
        let outcome = rt.capture(host, &[root]).expect("capture");
        assert!(outcome.descriptors.is_empty());
        assert_eq!(rt.document().property(root, "userName"), Some(&Value::str("ada")));
        assert_eq!(rt.document().bound_parent(root), Some(host));
    }

    #[test]
    fn references_are_published_on_owner() {
        let mut rt = Runtime::new();
        let tpl = Template::element("div")
            .child(Template::element("input").attr("slim-id", "name-field"))
            .child(Template::element("button").attr("#submit", ""));
        let (host, root) = build(&mut rt, &tpl);
        rt.capture(host, &[root]).expect("capture");
        let kids = rt.document().element_children(root);
        assert_eq!(rt.get_property(host, "nameField"), Value::Node(kids[0]));
        assert_eq!(rt.get_property(host, "submit"), Value::Node(kids[1]));
    }

    #[test]
    fn capture_is_once_per_element() {
        let mut rt = Runtime::new();
        let (host, root) = build(&mut rt, &Template::element("span").attr("title", "[[t]]"));
        let first = rt.capture(host, &[root]).expect("capture");
        let second = rt.capture(host, &[root]).expect("capture");
        assert_eq!(first.descriptors.len(), 1);
        assert!(second.descriptors.is_empty());
        assert_eq!(rt.store().executor_count(host), 1);
    }

    #[test]
    fn nested_interpolation_is_rejected() {
        let mut rt = Runtime::new();
        let tpl = Template::element("p")
            .attr("bind", "")
            .text("Hi [[name]]")
            .child(Template::element("b"));
        let (host, root) = build(&mut rt, &tpl);
        assert_eq!(
            rt.capture(host, &[root]).map(|_| ()),
            Err(BindError::NestedInterpolation { tag: "p".into() })
        );
    }

    #[test]
    fn unknown_injector_is_rejected() {
        let mut rt = Runtime::new();
        let (host, root) = build(&mut rt, &Template::element("div").attr("api", "{client}"));
        assert!(matches!(
            rt.capture(host, &[root]),
            Err(BindError::UnknownInjector { ref factory, .. }) if factory == "client"
        ));
    }

    #[test]
    fn injection_writes_camel_property() {
        let mut rt = Runtime::new();
        rt.inject("client", |_, _| Value::str("http"));
        let (host, root) = build(&mut rt, &Template::element("div").attr("api-client", "{client}"));
        let outcome = rt.capture(host, &[root]).expect("capture");
        assert!(outcome.descriptors.is_empty());
        assert_eq!(rt.get_property(root, "apiClient"), Value::str("http"));
    }

    #[test]
    fn list_template_is_replaced_by_anchor() {
        let mut rt = Runtime::new();
        let tpl = Template::element("ul").child(
            Template::element("li")
                .attr("slim-repeat", "items")
                .attr("title", "[[data.title]]"),
        );
        let (host, root) = build(&mut rt, &tpl);
        let outcome = rt.capture(host, &[root]).expect("capture");
        assert_eq!(outcome.repeaters.len(), 1);
        assert_eq!(outcome.descriptors.len(), 1);
        assert_eq!(outcome.descriptors[0].kind(), DescriptorKind::Repeat);
        let children = rt.document().children(root).to_vec();
        assert_eq!(children.len(), 1);
        assert_eq!(rt.document().tag(children[0]), Some("slim-repeat"));
        assert_eq!(rt.document().attribute(children[0], "source"), Some("items"));
    }

    #[test]
    fn text_spans_register_on_owner() {
        let mut rt = Runtime::new();
        let tpl = Template::element("span")
            .attr("bind", "")
            .text("[[a]] and [[b(c, d)]]");
        let (host, root) = build(&mut rt, &tpl);
        let outcome = rt.capture(host, &[root]).expect("capture");
        let kinds: Vec<_> = outcome.descriptors.iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec![DescriptorKind::Text, DescriptorKind::TextMethod]);
        assert_eq!(rt.store().properties(host).len(), 3);
    }
}
