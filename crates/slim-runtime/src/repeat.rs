#![forbid(unsafe_code)]

//! Repeater reconciliation.
//!
//! A repeater renders one clone of its template per item of a backing
//! [`ObservableSequence`]. Renders are deferred: structural mutation of the
//! sequence (or a change of the property it is read from) requests a render
//! through the repeater's [`RenderTicket`], and the pass runs on the next
//! turn of the runtime's task queue, observing the latest state.
//!
//! # State machine
//!
//! ```text
//! Idle --request_render--> RenderScheduled --turn--> Rendering --> Idle
//! ```
//!
//! # Reconciliation
//!
//! With `C` live clones and `S` items:
//!
//! | Case        | Action                                          |
//! |-------------|-------------------------------------------------|
//! | `S == C > 0`| update every clone in place                     |
//! | `0 < S < C` | retire clones `[S, C)`, update the rest         |
//! | `0 < C < S` | update the existing clones, create `[C, S)`     |
//! | otherwise   | retire every clone, create one per item         |
//!
//! # Invariants
//!
//! 1. After a settled pass the clone count equals the sequence length.
//! 2. A repeater never renders re-entrantly; a request made while a render
//!    is pending is deduplicated, and a pass reached while the repeater is
//!    already rendering is queued again for the next turn.
//! 3. A retired clone has no executor left in any store, and its nodes
//!    (hidden conditional targets and placeholders included) are released
//!    to the arena.
//! 4. A repeater observes at most one sequence; when its source path
//!    starts resolving to another sequence the registration moves.
//! 5. A disposed repeater's table slot and template are released once it is
//!    not rendering; the slot's next occupant gets a new id generation.
//!
//! # Failure Modes
//!
//! - Detached anchor or disposed repeater: the render is a silent no-op
//!   (debug log).
//! - Source that is not a list: treated as empty.

use std::rc::Rc;

use slim_core::dom::{ItemScope, NodeId};
use slim_core::schedule::{RenderTicket, RepeaterId};
use slim_core::sequence::ObservableSequence;
use slim_core::value::Value;

use crate::descriptor::{Descriptor, Payload};
use crate::error::BindError;
use crate::expr::RepeatExpression;
use crate::runtime::Runtime;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Scheduling state of a repeater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeaterState {
    Idle,
    RenderScheduled,
    Rendering,
}

/// One rendered item.
#[derive(Debug, Clone)]
pub(crate) struct CloneSlot {
    pub(crate) root: NodeId,
    /// Bindings captured in the clone, registered on the repeater's bound
    /// parent.
    pub(crate) bindings: Vec<Rc<Descriptor>>,
    /// Elements stamped with the clone's item scope.
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) components: Vec<NodeId>,
    /// Repeaters created for list templates inside the clone.
    pub(crate) repeaters: Vec<RepeaterId>,
}

/// A list template bound to a sequence.
#[derive(Debug)]
pub struct Repeater {
    pub(crate) id: RepeaterId,
    pub(crate) anchor: NodeId,
    pub(crate) template: NodeId,
    pub(crate) source_path: Rc<str>,
    pub(crate) target_attribute: Rc<str>,
    pub(crate) adjacent: bool,
    pub(crate) bound_parent: NodeId,
    pub(crate) clones: Vec<CloneSlot>,
    pub(crate) ticket: RenderTicket,
    pub(crate) rendering: bool,
    pub(crate) observed: Option<ObservableSequence<Value>>,
    pub(crate) passes: u64,
    pub(crate) disposed: bool,
}

impl Repeater {
    #[must_use]
    pub fn id(&self) -> RepeaterId {
        self.id
    }

    /// Element standing in for the template in the document.
    #[must_use]
    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    /// Detached template each clone is copied from.
    #[must_use]
    pub fn template(&self) -> NodeId {
        self.template
    }

    #[must_use]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Property each clone receives its item under.
    #[must_use]
    pub fn target_attribute(&self) -> &str {
        &self.target_attribute
    }

    #[must_use]
    pub fn is_adjacent(&self) -> bool {
        self.adjacent
    }

    #[must_use]
    pub fn bound_parent(&self) -> NodeId {
        self.bound_parent
    }

    /// Root element of every live clone, in item order.
    #[must_use]
    pub fn clones(&self) -> Vec<NodeId> {
        self.clones.iter().map(|slot| slot.root).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }

    /// Completed render passes.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[must_use]
    pub fn state(&self) -> RepeaterState {
        if self.rendering {
            RepeaterState::Rendering
        } else if self.ticket.is_pending() {
            RepeaterState::RenderScheduled
        } else {
            RepeaterState::Idle
        }
    }

    /// Sequence currently observed, if any.
    #[must_use]
    pub fn observed(&self) -> Option<&ObservableSequence<Value>> {
        self.observed.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Runtime operations
// ---------------------------------------------------------------------------

impl Runtime {
    pub(crate) fn create_repeater(
        &mut self,
        anchor: NodeId,
        template: NodeId,
        bound_parent: NodeId,
        expression: &RepeatExpression,
    ) -> RepeaterId {
        let id = match self.free_repeaters.pop() {
            Some(index) => {
                let previous = self.repeaters[index as usize].id;
                RepeaterId::with_generation(index, previous.generation().wrapping_add(1))
            }
            None => RepeaterId::new(u32::try_from(self.repeaters.len()).unwrap_or(u32::MAX)),
        };
        let ticket = self.queue.ticket(id);
        ticket.request();
        let repeater = Repeater {
            id,
            anchor,
            template,
            source_path: Rc::clone(&expression.path),
            target_attribute: Rc::clone(&expression.target_attribute),
            adjacent: expression.adjacent,
            bound_parent,
            clones: Vec::new(),
            ticket,
            rendering: false,
            observed: None,
            passes: 0,
            disposed: false,
        };
        match self.repeaters.get_mut(id.index()) {
            Some(slot) => *slot = repeater,
            None => self.repeaters.push(repeater),
        }
        tracing::debug!(
            repeater = %id,
            source = %expression.path,
            adjacent = expression.adjacent,
            "repeater created"
        );
        id
    }

    /// The repeater `id` names. `None` once its slot belongs to another
    /// repeater.
    #[must_use]
    pub fn repeater(&self, id: RepeaterId) -> Option<&Repeater> {
        self.repeaters.get(id.index()).filter(|r| r.id == id)
    }

    /// Repeater whose anchor is `anchor`.
    #[must_use]
    pub fn repeater_at(&self, anchor: NodeId) -> Option<RepeaterId> {
        self.repeaters
            .iter()
            .find(|r| r.anchor == anchor && !r.disposed)
            .map(|r| r.id)
    }

    /// Live repeaters in creation order.
    pub fn repeater_ids(&self) -> impl Iterator<Item = RepeaterId> + '_ {
        self.repeaters.iter().filter(|r| !r.disposed).map(|r| r.id)
    }

    #[must_use]
    pub fn repeater_state(&self, id: RepeaterId) -> Option<RepeaterState> {
        self.repeater(id).map(Repeater::state)
    }

    /// Schedule a render of `id` on the next turn.
    ///
    /// Returns `true` when a new task was queued, `false` when one was
    /// already pending or the repeater is disposed.
    pub fn request_render(&mut self, id: RepeaterId) -> bool {
        match self.repeater(id) {
            Some(repeater) if !repeater.disposed => repeater.ticket.request(),
            _ => false,
        }
    }

    /// Retire every clone, stop observing the sequence and ignore future
    /// render requests.
    pub fn dispose_repeater(&mut self, id: RepeaterId) {
        let Some(repeater) = self.repeaters.get_mut(id.index()).filter(|r| r.id == id) else {
            return;
        };
        if repeater.disposed {
            return;
        }
        repeater.disposed = true;
        if let Some(sequence) = repeater.observed.take() {
            sequence.unregister(id);
        }
        let rendering = repeater.rendering;
        let slots = std::mem::take(&mut repeater.clones);
        tracing::debug!(repeater = %id, clones = slots.len(), "repeater disposed");
        for slot in slots {
            self.retire_clone(slot);
        }
        // A pass in progress releases the slot when it unwinds.
        if !rendering {
            self.release_repeater(id);
        }
    }

    /// Free the template and table slot of a disposed repeater.
    fn release_repeater(&mut self, id: RepeaterId) {
        let template = self.repeaters[id.index()].template;
        self.doc.discard(template);
        self.free_repeaters.push(u32::try_from(id.index()).unwrap_or(u32::MAX));
    }

    /// Run one render pass of `id`.
    pub(crate) fn render(&mut self, id: RepeaterId) -> Result<(), BindError> {
        let idx = id.index();
        let Some(repeater) = self.repeater(id) else {
            return Ok(());
        };
        if repeater.disposed {
            tracing::debug!(repeater = %id, "render skipped: repeater disposed");
            return Ok(());
        }
        if repeater.rendering {
            repeater.ticket.request();
            tracing::debug!(repeater = %id, "render deferred: already rendering");
            return Ok(());
        }
        if self.doc.parent(repeater.anchor).is_none() {
            tracing::debug!(repeater = %id, "render skipped: anchor detached");
            return Ok(());
        }

        let (anchor, owner, path) = (
            repeater.anchor,
            repeater.bound_parent,
            Rc::clone(&repeater.source_path),
        );
        let sequence = match self.resolve_value(anchor, owner, &path) {
            Value::List(sequence) => Some(sequence),
            _ => None,
        };
        self.observe(id, sequence.as_ref());

        let source = sequence.unwrap_or_default();
        let items = source.snapshot();
        let span = tracing::debug_span!(
            "slim.repeat.render",
            repeater = %id,
            clones = self.repeaters[idx].clones.len(),
            items = items.len()
        );
        let _guard = span.enter();

        self.repeaters[idx].rendering = true;
        let result = self.reconcile(id, &source, &items);
        let repeater = &mut self.repeaters[idx];
        repeater.rendering = false;
        repeater.passes += 1;
        if repeater.disposed {
            let slots = std::mem::take(&mut repeater.clones);
            for slot in slots {
                self.retire_clone(slot);
            }
            self.release_repeater(id);
        }
        result
    }

    /// Point the repeater's registration at `sequence`.
    fn observe(&mut self, id: RepeaterId, sequence: Option<&ObservableSequence<Value>>) {
        let repeater = &mut self.repeaters[id.index()];
        let unchanged = match (&repeater.observed, sequence) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        if let Some(previous) = repeater.observed.take() {
            previous.unregister(id);
            tracing::debug!(repeater = %id, "source sequence replaced");
        }
        if let Some(next) = sequence {
            next.register(repeater.ticket.clone());
            repeater.observed = Some(next.clone());
        }
    }

    fn reconcile(
        &mut self,
        id: RepeaterId,
        source: &ObservableSequence<Value>,
        items: &[Value],
    ) -> Result<(), BindError> {
        let items_len = items.len();
        let clones_len = self.repeaters[id.index()].clones.len();
        if items_len == clones_len && items_len > 0 {
            self.update_clones(id, source, items);
        } else if items_len > 0 && items_len < clones_len {
            self.retire_from(id, items_len);
            self.update_clones(id, source, items);
        } else if clones_len > 0 && clones_len < items_len {
            self.update_clones(id, source, items);
            self.create_clones(id, source, items, clones_len)?;
        } else {
            self.retire_from(id, 0);
            self.create_clones(id, source, items, 0)?;
        }
        Ok(())
    }

    fn item_scope(
        &self,
        id: RepeaterId,
        source: &ObservableSequence<Value>,
        item: &Value,
        index: usize,
    ) -> Rc<ItemScope> {
        let repeater = &self.repeaters[id.index()];
        Rc::new(ItemScope {
            repeater: id,
            alias: Rc::clone(&repeater.target_attribute),
            item: item.clone(),
            index,
            source: source.clone(),
            parent: self.doc.scope(repeater.anchor).cloned(),
        })
    }

    /// Stamp `scope` on `node` and mirror the item, index and source as
    /// properties (reactive ones through the write path).
    fn stamp_item(&mut self, node: NodeId, scope: &Rc<ItemScope>) {
        self.doc.set_scope(node, Some(Rc::clone(scope)));
        let entries = [
            (scope.alias.to_string(), scope.item.clone()),
            (self.config.index_name.clone(), Value::from(scope.index)),
            (self.config.source_name.clone(), Value::List(scope.source.clone())),
        ];
        for (name, value) in entries {
            if self.store.contains(node, &name) {
                self.set_property(node, &name, value);
            } else {
                self.doc.set_property(node, name, value);
            }
        }
    }

    /// Restamp the first `items.len()` clones and re-run their bindings.
    fn update_clones(&mut self, id: RepeaterId, source: &ObservableSequence<Value>, items: &[Value]) {
        let slots: Vec<CloneSlot> = self.repeaters[id.index()]
            .clones
            .iter()
            .take(items.len())
            .cloned()
            .collect();
        for (index, slot) in slots.iter().enumerate() {
            let scope = self.item_scope(id, source, &items[index], index);
            for &node in &slot.nodes {
                self.stamp_item(node, &scope);
            }
            for nested in &slot.repeaters {
                if let Some(anchor) = self.repeater(*nested).map(Repeater::anchor) {
                    self.doc.set_scope(anchor, Some(Rc::clone(&scope)));
                }
            }
            for &component in &slot.components {
                self.update(component);
            }
            self.replay_descriptors(&slot.bindings);
        }
    }

    /// Create clones for `items[start..]`.
    fn create_clones(
        &mut self,
        id: RepeaterId,
        source: &ObservableSequence<Value>,
        items: &[Value],
        start: usize,
    ) -> Result<(), BindError> {
        let (template, anchor, bound_parent, adjacent) = {
            let r = &self.repeaters[id.index()];
            (r.template, r.anchor, r.bound_parent, r.adjacent)
        };
        let stripped = [
            self.config.repeat_attribute.clone(),
            self.config.repeat_as_attribute.clone(),
            self.config.repeat_adjacent_attribute.clone(),
        ];
        let index_attribute = self.config.repeat_index_attribute.clone();

        for (index, item) in items.iter().enumerate().skip(start) {
            if self.repeaters[id.index()].disposed {
                break;
            }
            let root = self.doc.deep_clone(template);
            for name in &stripped {
                self.doc.remove_attribute(root, name);
            }
            self.doc.set_attribute(root, &index_attribute, index.to_string());

            let scope = self.item_scope(id, source, item, index);
            let mut stamped = vec![root];
            stamped.extend(self.doc.descendants(root));
            for &node in &stamped {
                self.doc.set_bound_parent(node, Some(bound_parent));
                self.doc.set_bound_repeater_parent(node, Some(bound_parent));
                self.stamp_item(node, &scope);
            }

            if adjacent {
                self.doc.insert_adjacent_before(anchor, root);
            } else {
                self.doc.append_child(anchor, root);
            }

            let outcome = match self.capture(bound_parent, &[root]) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.doc.discard(root);
                    return Err(err);
                }
            };
            let slot = CloneSlot {
                root,
                bindings: outcome.descriptors,
                nodes: outcome.nodes,
                components: outcome.components,
                repeaters: outcome.repeaters,
            };
            self.repeaters[id.index()].clones.push(slot.clone());
            for &component in &slot.components {
                self.activate(component)?;
            }
            self.replay_descriptors(&slot.bindings);
        }
        Ok(())
    }

    /// Retire every clone at position `keep` and beyond.
    fn retire_from(&mut self, id: RepeaterId, keep: usize) {
        let clones = &mut self.repeaters[id.index()].clones;
        let keep = keep.min(clones.len());
        let retired = clones.split_off(keep);
        for slot in retired {
            self.retire_clone(slot);
        }
    }

    fn retire_clone(&mut self, slot: CloneSlot) {
        for descriptor in &slot.bindings {
            self.store.unregister(descriptor);
            if let Payload::Conditional { placeholder, .. } = descriptor.payload {
                self.doc.discard(placeholder);
            }
        }

        let mut nested = slot.repeaters.clone();
        nested.extend(
            self.repeaters
                .iter()
                .filter(|r| !r.disposed && self.doc.contains(slot.root, r.anchor))
                .map(|r| r.id),
        );
        for id in nested {
            self.dispose_repeater(id);
        }

        let mut released = self.doc.subtree(slot.root);
        released.extend(slot.nodes.iter().copied());
        for node in released {
            self.store.discard(node);
            self.text_sources.remove(&node);
        }
        self.doc.discard(slot.root);
        // Hidden conditional targets sit outside the clone's subtree.
        for node in slot.nodes {
            self.doc.discard(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::template::Template;

    fn list_host(rt: &mut Runtime, items: Vec<Value>) -> (NodeId, RepeaterId, ObservableSequence<Value>) {
        let host = rt.document_mut().create_element("x-host");
        let tpl = Template::element("ul").child(
            Template::element("li")
                .attr("slim-repeat", "items")
                .attr("bind", "")
                .text("[[data.n]]"),
        );
        let root = tpl.instantiate(rt.document_mut());
        rt.document_mut().append_child(host, root);
        let outcome = rt.capture(host, &[root]).expect("capture");
        let sequence = ObservableSequence::from(items);
        rt.set_property(host, "items", Value::List(sequence.clone()));
        (host, outcome.repeaters[0], sequence)
    }

    fn item(n: i32) -> Value {
        Value::record([("n", Value::from(n))])
    }

    fn texts(rt: &Runtime, id: RepeaterId) -> Vec<String> {
        let repeater = rt.repeater(id).expect("repeater");
        repeater
            .clones()
            .into_iter()
            .map(|c| rt.document().text_content(c))
            .collect()
    }

    #[test]
    fn renders_are_deferred_and_coalesced() {
        let mut rt = Runtime::new();
        let (_, id, sequence) = list_host(&mut rt, vec![item(1)]);
        assert_eq!(rt.repeater_state(id), Some(RepeaterState::RenderScheduled));
        assert!(rt.repeater(id).expect("repeater").is_empty());

        rt.settle().expect("settle");
        assert_eq!(texts(&rt, id), vec!["1"]);

        sequence.push(item(2));
        sequence.push(item(3));
        assert!(!rt.request_render(id));
        assert_eq!(rt.pending_renders(), 1);
        let report = rt.settle().expect("settle");
        assert_eq!(report.renders, 1);
        assert_eq!(texts(&rt, id), vec!["1", "2", "3"]);
        assert_eq!(rt.repeater_state(id), Some(RepeaterState::Idle));
    }

    #[test]
    fn clones_carry_index_and_linkage() {
        let mut rt = Runtime::new();
        let (host, id, _) = list_host(&mut rt, vec![item(1), item(2)]);
        rt.settle().expect("settle");
        let clones = rt.repeater(id).expect("repeater").clones();
        assert_eq!(rt.document().attribute(clones[1], "slim-repeat-index"), Some("1"));
        assert!(!rt.document().has_attribute(clones[1], "slim-repeat"));
        assert_eq!(rt.document().bound_parent(clones[0]), Some(host));
        assert_eq!(rt.document().bound_repeater_parent(clones[0]), Some(host));
        assert_eq!(rt.get_property(clones[1], "data_index"), Value::from(1));
        let anchor = rt.repeater(id).expect("repeater").anchor();
        assert_eq!(rt.document().parent(clones[0]), Some(anchor));
    }

    #[test]
    fn non_list_source_renders_nothing() {
        let mut rt = Runtime::new();
        let (host, id, _) = list_host(&mut rt, vec![item(1)]);
        rt.settle().expect("settle");
        rt.set_property(host, "items", Value::Null);
        rt.settle().expect("settle");
        let repeater = rt.repeater(id).expect("repeater");
        assert!(repeater.is_empty());
        assert!(repeater.observed().is_none());
    }

    #[test]
    fn detached_anchor_is_a_no_op() {
        let mut rt = Runtime::new();
        let (_, id, _) = list_host(&mut rt, vec![item(1)]);
        let anchor = rt.repeater(id).expect("repeater").anchor();
        rt.document_mut().remove(anchor);
        rt.settle().expect("settle");
        let repeater = rt.repeater(id).expect("repeater");
        assert!(repeater.is_empty());
        assert_eq!(repeater.passes(), 0);
    }

    #[test]
    fn dispose_unregisters_and_retires() {
        let mut rt = Runtime::new();
        let (host, id, sequence) = list_host(&mut rt, vec![item(1), item(2)]);
        rt.settle().expect("settle");
        assert!(sequence.is_registered(id));
        let before = rt.store().executor_count(host);

        rt.dispose_repeater(id);
        assert!(!sequence.is_registered(id));
        assert_eq!(rt.store().executor_count(host), before - 2);
        sequence.push(item(3));
        assert!(!rt.request_render(id));
        assert_eq!(rt.repeater_ids().count(), 0);
    }
}
