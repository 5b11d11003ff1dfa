#![forbid(unsafe_code)]

//! In-process node arena.
//!
//! [`Document`] is the node capability set the binding runtime calls into:
//! create, deep-clone, query descendants, insert/remove relative to a
//! reference node, read/write attributes, read/write text content. Nodes
//! are addressed by generational [`NodeId`]s: discarding a subtree returns
//! its slots to a free list, and a reused slot gets a new generation so
//! stale handles never alias the new node.
//!
//! Besides the structural data, every node carries the binding linkage the
//! runtime needs: its *bound parent* (the scope its unqualified paths
//! resolve against), its *bound repeater parent* (set on nodes generated by
//! list reconciliation), plain (non-reactive) properties, and an optional
//! [`ItemScope`] stamped by a repeater.
//!
//! # Invariants
//!
//! 1. A node has at most one parent and appears exactly once in that
//!    parent's child list.
//! 2. Inserting a node that already has a parent detaches it first.
//! 3. `descendants` returns elements only, in document (preorder) order,
//!    excluding the starting node.
//! 4. A stale handle reads as an empty, detached node flagged
//!    [`NodeFlags::DISCARDED`]; writes through it are dropped.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use bitflags::bitflags;
use smallvec::SmallVec;

use crate::schedule::RepeaterId;
use crate::sequence::ObservableSequence;
use crate::value::Value;

/// Handle to a node in a [`Document`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Arena slot of the node.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Times the slot had been reused when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}@{}", self.index, self.generation)
        }
    }
}

bitflags! {
    /// Lifecycle markers on a node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// The component's created callback has run.
        const CREATED = 1 << 0;
        /// The element's bindings have been captured by some scope.
        const CAPTURED = 1 << 1;
        /// The handle is stale: its node was released.
        const DISCARDED = 1 << 2;
    }
}

/// Per-item scope stamped on repeater clones and their descendants.
///
/// Resolves the repeat alias (for example `data`) and the index/source
/// names to the clone's item, walking outwards through enclosing repeaters.
#[derive(Clone)]
pub struct ItemScope {
    pub repeater: RepeaterId,
    pub alias: Rc<str>,
    pub item: Value,
    pub index: usize,
    pub source: ObservableSequence<Value>,
    pub parent: Option<Rc<ItemScope>>,
}

impl fmt::Debug for ItemScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemScope")
            .field("repeater", &self.repeater)
            .field("alias", &self.alias)
            .field("index", &self.index)
            .field("nested", &self.parent.is_some())
            .finish()
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: SmallVec<[(String, String); 4]>,
    },
    Text(String),
    Fragment,
}

/// One arena slot.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub properties: AHashMap<String, Value>,
    pub bound_parent: Option<NodeId>,
    pub bound_repeater_parent: Option<NodeId>,
    pub scope: Option<Rc<ItemScope>>,
    pub flags: NodeFlags,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            properties: AHashMap::new(),
            bound_parent: None,
            bound_repeater_parent: None,
            scope: None,
            flags: NodeFlags::empty(),
        }
    }

    fn vacant() -> Self {
        let mut node = Self::new(NodeKind::Fragment);
        node.flags = NodeFlags::DISCARDED;
        node
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    occupied: bool,
    node: Node,
}

/// Arena of nodes.
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    /// Returned for stale reads.
    vacant: Node,
    /// Absorbs writes through stale handles; reset on every use.
    scratch: Node,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            vacant: Node::vacant(),
            scratch: Node::vacant(),
        }
    }
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.occupied = true;
            slot.node = Node::new(kind);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            occupied: true,
            node: Node::new(kind),
        });
        NodeId { index, generation: 0 }
    }

    fn live_node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.occupied && slot.generation == id.generation)
            .map(|slot| &slot.node)
    }

    fn live_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.occupied && slot.generation == id.generation)
            .map(|slot| &mut slot.node)
    }

    /// Whether `id` still refers to an allocated node.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.live_node(id).is_some()
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.into(),
            attributes: SmallVec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(NodeKind::Fragment)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots ever allocated, live or free.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Borrow a node. A stale handle yields an empty discarded node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        self.live_node(id).unwrap_or(&self.vacant)
    }

    /// Mutably borrow a node. Writes through a stale handle are dropped.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        if self.is_live(id) {
            return &mut self.slots[id.index()].node;
        }
        self.scratch = Node::vacant();
        &mut self.scratch
    }

    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).tag()
    }

    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).is_element()
    }

    #[must_use]
    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.node(id).flags
    }

    pub fn set_flag(&mut self, id: NodeId, flag: NodeFlags, on: bool) {
        self.node_mut(id).flags.set(flag, on);
    }

    /// Short description for diagnostics (`<tag>`, `#text`, `#fragment`).
    #[must_use]
    pub fn describe(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Element { tag, .. } => format!("<{tag}>"),
            NodeKind::Text(_) => "#text".to_owned(),
            NodeKind::Fragment => "#fragment".to_owned(),
        }
    }

    // --- structure ---------------------------------------------------------

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    #[must_use]
    pub fn has_element_children(&self, id: NodeId) -> bool {
        self.children(id).iter().any(|c| self.is_element(*c))
    }

    /// Element children only.
    #[must_use]
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Detach `id` from its parent. No-op when already detached.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.live_node_mut(id).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent) = self.live_node_mut(parent) {
            parent.children.retain(|c| *c != id);
        }
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `reference`, or append when the
    /// reference is `None` or not a child of `parent`. No-op when either
    /// handle is stale.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if !self.is_live(parent) || !self.is_live(child) {
            return;
        }
        self.remove(child);
        let siblings = &mut self.slots[parent.index()].node.children;
        let at = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(at, child);
        self.slots[child.index()].node.parent = Some(parent);
    }

    /// Insert `child` immediately before `reference` in the reference's
    /// parent. Returns `false` (and does nothing) when `reference` is
    /// detached.
    pub fn insert_adjacent_before(&mut self, reference: NodeId, child: NodeId) -> bool {
        match self.parent(reference) {
            Some(parent) => {
                self.insert_before(parent, child, Some(reference));
                true
            }
            None => false,
        }
    }

    /// Move every child of `from` to the end of `to`, preserving order.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) {
        for child in self.children(from).to_vec() {
            self.append_child(to, child);
        }
    }

    /// Whether `node` is `ancestor` or lies below it.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Element descendants of `root` in preorder, excluding `root`.
    #[must_use]
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.is_element(id) {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// `root` and every node below it (any kind), preorder.
    #[must_use]
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// First descendant element with `tag`.
    #[must_use]
    pub fn find_by_tag(&self, root: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.tag(*id) == Some(tag))
    }

    /// Deep copy of structure, attributes and text. Properties, linkage and
    /// flags are not copied; the copy is detached.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.node(id).kind.clone();
        let copy = self.alloc(kind);
        for child in self.children(id).to_vec() {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Detach `root` and release every node in its subtree. The slots are
    /// reused by later allocations. No-op on a stale handle.
    pub fn discard(&mut self, root: NodeId) {
        if !self.is_live(root) {
            return;
        }
        self.remove(root);
        for id in self.subtree(root) {
            let slot = &mut self.slots[id.index()];
            slot.occupied = false;
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Node::vacant();
            self.free.push(id.index);
            self.live -= 1;
        }
    }

    // --- attributes --------------------------------------------------------

    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    /// Attributes in document order; empty for non-elements.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Set or replace an attribute. Ignored on non-elements.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            let value = value.into();
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, slot)) => *slot = value,
                None => attributes.push((name.to_owned(), value)),
            }
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            let pos = attributes.iter().position(|(n, _)| n == name)?;
            return Some(attributes.remove(pos).1);
        }
        None
    }

    // --- plain properties --------------------------------------------------

    #[must_use]
    pub fn property(&self, id: NodeId, name: &str) -> Option<&Value> {
        self.node(id).properties.get(name)
    }

    pub fn set_property(&mut self, id: NodeId, name: impl Into<String>, value: Value) {
        self.node_mut(id).properties.insert(name.into(), value);
    }

    // --- text --------------------------------------------------------------

    /// Concatenated text of `id` and its descendants.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.subtree(id) {
            if let NodeKind::Text(text) = &self.node(node).kind {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace the content of `id` with a single text node (or set the data
    /// of a text node). A lone text child is rewritten in place; other text
    /// children are released and element children detached.
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        let text = text.into();
        if let NodeKind::Text(data) = &mut self.node_mut(id).kind {
            *data = text;
            return;
        }
        let only = match self.children(id) {
            [only] => Some(*only),
            _ => None,
        };
        if let Some(only) = only.filter(|_| !text.is_empty()) {
            if let NodeKind::Text(data) = &mut self.node_mut(only).kind {
                *data = text;
                return;
            }
        }
        for child in self.children(id).to_vec() {
            if self.is_element(child) {
                self.remove(child);
            } else {
                self.discard(child);
            }
        }
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    // --- linkage -----------------------------------------------------------

    #[must_use]
    pub fn bound_parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).bound_parent
    }

    pub fn set_bound_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.node_mut(id).bound_parent = parent;
    }

    #[must_use]
    pub fn bound_repeater_parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).bound_repeater_parent
    }

    pub fn set_bound_repeater_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.node_mut(id).bound_repeater_parent = parent;
    }

    #[must_use]
    pub fn scope(&self, id: NodeId) -> Option<&Rc<ItemScope>> {
        self.node(id).scope.as_ref()
    }

    pub fn set_scope(&mut self, id: NodeId, scope: Option<Rc<ItemScope>>) {
        self.node_mut(id).scope = scope;
    }
}
