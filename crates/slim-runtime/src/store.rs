#![forbid(unsafe_code)]

//! Reactive property store.
//!
//! For every owner node the store keeps an ordered map from root property
//! name to a [`PropertyEntry`]: the current value, the executors to replay
//! when the property changes, and an optional custom setter.
//!
//! # Invariants
//!
//! 1. At most one entry per (owner, property); `install` is idempotent.
//! 2. Executors replay in registration order; properties iterate in
//!    creation order.
//! 3. Unregistering a descriptor removes every executor pointing at it and
//!    nothing else.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use slim_core::dom::NodeId;
use slim_core::value::Value;

use crate::descriptor::Descriptor;
use crate::runtime::Runtime;

/// Custom write hook run before the stored value changes.
pub type Setter = Rc<dyn Fn(&mut Runtime, NodeId, &Value)>;

/// A descriptor registered under one dependency path.
#[derive(Debug, Clone)]
pub struct Executor {
    pub descriptor: Rc<Descriptor>,
    pub path: Rc<str>,
}

/// Per (owner, property) state.
#[derive(Default, Clone)]
pub struct PropertyEntry {
    pub value: Value,
    pub executors: Vec<Executor>,
    pub setter: Option<Setter>,
}

impl std::fmt::Debug for PropertyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyEntry")
            .field("value", &self.value)
            .field("executors", &self.executors.len())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// All reactive entries, keyed by owner.
#[derive(Debug, Default)]
pub struct PropertyStore {
    owners: AHashMap<NodeId, IndexMap<Rc<str>, PropertyEntry>>,
}

impl PropertyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for `(owner, name)` seeded with `seed`.
    ///
    /// Returns `false` when the entry already existed (its value is kept).
    pub fn install(&mut self, owner: NodeId, name: &str, seed: Value) -> bool {
        let props = self.owners.entry(owner).or_default();
        if props.contains_key(name) {
            return false;
        }
        props.insert(Rc::from(name), PropertyEntry {
            value: seed,
            ..PropertyEntry::default()
        });
        true
    }

    #[must_use]
    pub fn contains(&self, owner: NodeId, name: &str) -> bool {
        self.entry(owner, name).is_some()
    }

    #[must_use]
    pub fn entry(&self, owner: NodeId, name: &str) -> Option<&PropertyEntry> {
        self.owners.get(&owner)?.get(name)
    }

    #[must_use]
    pub fn value(&self, owner: NodeId, name: &str) -> Option<&Value> {
        self.entry(owner, name).map(|e| &e.value)
    }

    /// Overwrite the stored value. Returns `false` when no entry exists.
    pub fn set_value(&mut self, owner: NodeId, name: &str, value: Value) -> bool {
        match self.owners.get_mut(&owner).and_then(|p| p.get_mut(name)) {
            Some(entry) => {
                entry.value = value;
                true
            }
            None => false,
        }
    }

    /// Append an executor. The entry must have been installed.
    pub fn register(&mut self, owner: NodeId, name: &str, executor: Executor) {
        if let Some(entry) = self.owners.get_mut(&owner).and_then(|p| p.get_mut(name)) {
            entry.executors.push(executor);
        }
    }

    /// Remove every executor pointing at `descriptor` from its owner.
    pub fn unregister(&mut self, descriptor: &Rc<Descriptor>) {
        if let Some(props) = self.owners.get_mut(&descriptor.owner) {
            for entry in props.values_mut() {
                entry.executors.retain(|e| !Rc::ptr_eq(&e.descriptor, descriptor));
            }
        }
    }

    /// Whether `descriptor` is still registered on its owner.
    #[must_use]
    pub fn is_registered(&self, descriptor: &Rc<Descriptor>) -> bool {
        self.owners.get(&descriptor.owner).is_some_and(|props| {
            props
                .values()
                .any(|e| e.executors.iter().any(|x| Rc::ptr_eq(&x.descriptor, descriptor)))
        })
    }

    /// Executors for one property, or for every property in creation order.
    #[must_use]
    pub fn executors(&self, owner: NodeId, name: Option<&str>) -> Vec<Executor> {
        let Some(props) = self.owners.get(&owner) else {
            return Vec::new();
        };
        match name {
            Some(name) => props.get(name).map(|e| e.executors.clone()).unwrap_or_default(),
            None => props.values().flat_map(|e| e.executors.iter().cloned()).collect(),
        }
    }

    /// Text descriptors across all properties of `owner`, each once, in
    /// first-registration order.
    #[must_use]
    pub fn text_descriptors(&self, owner: NodeId) -> Vec<Rc<Descriptor>> {
        let mut out: Vec<Rc<Descriptor>> = Vec::new();
        let Some(props) = self.owners.get(&owner) else {
            return out;
        };
        let mut seen: AHashSet<*const Descriptor> = AHashSet::new();
        for executor in props.values().flat_map(|e| e.executors.iter()) {
            let d = &executor.descriptor;
            if d.kind().is_text() && seen.insert(Rc::as_ptr(d)) {
                out.push(Rc::clone(d));
            }
        }
        out
    }

    #[must_use]
    pub fn setter(&self, owner: NodeId, name: &str) -> Option<Setter> {
        self.entry(owner, name).and_then(|e| e.setter.clone())
    }

    /// Install `setter`, composing after any setter already present.
    pub fn define_setter(&mut self, owner: NodeId, name: &str, setter: Setter) {
        let Some(entry) = self.owners.get_mut(&owner).and_then(|p| p.get_mut(name)) else {
            return;
        };
        let composed: Setter = match entry.setter.take() {
            Some(previous) => Rc::new(move |rt: &mut Runtime, node: NodeId, value: &Value| {
                previous(rt, node, value);
                setter(rt, node, value);
            }),
            None => setter,
        };
        entry.setter = Some(composed);
    }

    /// Property names of `owner` in creation order.
    #[must_use]
    pub fn properties(&self, owner: NodeId) -> Vec<Rc<str>> {
        self.owners
            .get(&owner)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every entry of `owner`.
    pub fn discard(&mut self, owner: NodeId) {
        self.owners.remove(&owner);
    }

    /// Total executors registered against `owner`.
    #[must_use]
    pub fn executor_count(&self, owner: NodeId) -> usize {
        self.owners
            .get(&owner)
            .map_or(0, |p| p.values().map(|e| e.executors.len()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Payload;
    use slim_core::dom::Document;
    use smallvec::smallvec;

    fn text(owner: NodeId, span: &str) -> Rc<Descriptor> {
        Rc::new(Descriptor {
            properties: smallvec![Rc::from("a"), Rc::from("b")],
            owner,
            target: owner,
            source: None,
            payload: Payload::Text { span: Rc::from(span) },
        })
    }

    fn executor(d: &Rc<Descriptor>, path: &str) -> Executor {
        Executor {
            descriptor: Rc::clone(d),
            path: Rc::from(path),
        }
    }

    #[test]
    fn install_is_idempotent() {
        let mut doc = Document::new();
        let owner = doc.create_element("x-app");
        let mut store = PropertyStore::new();
        assert!(store.install(owner, "count", Value::from(1)));
        assert!(!store.install(owner, "count", Value::from(9)));
        assert_eq!(store.value(owner, "count"), Some(&Value::from(1)));
        assert_eq!(store.properties(owner).len(), 1);
    }

    #[test]
    fn executors_keep_registration_order() {
        let mut doc = Document::new();
        let owner = doc.create_element("x-app");
        let mut store = PropertyStore::new();
        store.install(owner, "a", Value::Undefined);
        store.install(owner, "b", Value::Undefined);
        let first = text(owner, "[[a]]");
        let second = text(owner, "[[b]]");
        store.register(owner, "b", executor(&second, "b"));
        store.register(owner, "a", executor(&first, "a"));
        store.register(owner, "b", executor(&first, "b"));

        let all = store.executors(owner, None);
        assert_eq!(all.len(), 3);
        assert!(Rc::ptr_eq(&all[0].descriptor, &first));
        let only_b = store.executors(owner, Some("b"));
        assert!(Rc::ptr_eq(&only_b[0].descriptor, &second));

        let texts = store.text_descriptors(owner);
        assert_eq!(texts.len(), 2);
    }

    #[test]
    fn unregister_removes_only_that_descriptor() {
        let mut doc = Document::new();
        let owner = doc.create_element("x-app");
        let mut store = PropertyStore::new();
        store.install(owner, "a", Value::Undefined);
        let keep = text(owner, "[[a]]");
        let gone = text(owner, "[[a]]");
        store.register(owner, "a", executor(&keep, "a"));
        store.register(owner, "a", executor(&gone, "a"));
        store.unregister(&gone);
        assert!(store.is_registered(&keep));
        assert!(!store.is_registered(&gone));
        assert_eq!(store.executor_count(owner), 1);
    }

    #[test]
    fn set_value_requires_entry() {
        let mut doc = Document::new();
        let owner = doc.create_element("x-app");
        let mut store = PropertyStore::new();
        assert!(!store.set_value(owner, "x", Value::from(1)));
        store.install(owner, "x", Value::Undefined);
        assert!(store.set_value(owner, "x", Value::from(1)));
        store.discard(owner);
        assert!(!store.contains(owner, "x"));
    }
}
