#![forbid(unsafe_code)]

//! Binding registrar.
//!
//! Installs descriptors into the store of the right owner and resolves the
//! values they read.
//!
//! Only the root segment of a dependency path is tracked: `user.name`
//! registers under `user`, and the nested read is re-resolved every time
//! the executor runs. A descriptor with N dependency paths registers N
//! executors.
//!
//! # Lookup chain
//!
//! Owners and method holders are found along one chain: the explicit
//! source, the target's bound parent, its bound repeater parent, then its
//! structural parent. The first defined link wins.
//!
//! Values are resolved against the target's repeat item scope first (the
//! item alias, the index name and the source name, innermost repeater
//! first), then against the owner's properties.

use std::rc::Rc;

use slim_core::dom::NodeId;
use slim_core::value::Value;
use smallvec::SmallVec;

use crate::descriptor::Descriptor;
use crate::expr::root_segment;
use crate::runtime::Runtime;
use crate::store::Executor;

impl Runtime {
    /// Distinct links of the lookup chain for `target`.
    #[must_use]
    pub fn lookup_chain(&self, target: NodeId, source: Option<NodeId>) -> SmallVec<[NodeId; 4]> {
        let mut chain: SmallVec<[NodeId; 4]> = SmallVec::new();
        let links = [
            source,
            self.doc.bound_parent(target),
            self.doc.bound_repeater_parent(target),
            self.doc.parent(target),
        ];
        for link in links.into_iter().flatten() {
            if !chain.contains(&link) {
                chain.push(link);
            }
        }
        chain
    }

    /// Store owner for a binding on `target`; the target itself when the
    /// chain is empty.
    #[must_use]
    pub fn resolve_owner(&self, target: NodeId, source: Option<NodeId>) -> NodeId {
        self.lookup_chain(target, source)
            .first()
            .copied()
            .unwrap_or(target)
    }

    /// Resolve a dot path for a binding on `target` owned by `owner`.
    ///
    /// Never fails: unknown roots and absent intermediates are `Undefined`.
    #[must_use]
    pub fn resolve_value(&self, target: NodeId, owner: NodeId, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(root) = segments.next() else {
            return Value::Undefined;
        };
        let base = self
            .scope_value(target, root)
            .unwrap_or_else(|| self.get_property(owner, root));
        base.lookup(segments)
    }

    fn scope_value(&self, target: NodeId, root: &str) -> Option<Value> {
        let mut scope = self.doc.scope(target);
        while let Some(s) = scope {
            if *s.alias == *root {
                return Some(s.item.clone());
            }
            if root == self.config.index_name {
                return Some(Value::from(s.index));
            }
            if root == self.config.source_name {
                return Some(Value::List(s.source.clone()));
            }
            scope = s.parent.as_ref();
        }
        None
    }

    /// Install `descriptor` once per dependency path against the entry of
    /// the path's root segment.
    pub fn register_descriptor(&mut self, descriptor: Rc<Descriptor>) {
        let owner = descriptor.owner;
        for path in &descriptor.properties {
            let root = root_segment(path);
            self.make_reactive(owner, root);
            self.store.register(owner, root, Executor {
                descriptor: Rc::clone(&descriptor),
                path: Rc::clone(path),
            });
        }
        tracing::trace!(
            kind = ?descriptor.kind(),
            owner = ?owner,
            paths = descriptor.properties.len(),
            "binding registered"
        );
    }

    pub fn unregister_descriptor(&mut self, descriptor: &Rc<Descriptor>) {
        self.store.unregister(descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Payload;
    use slim_core::dom::ItemScope;
    use slim_core::schedule::RepeaterId;
    use slim_core::sequence::ObservableSequence;
    use smallvec::smallvec;

    fn text(owner: NodeId, target: NodeId, paths: &[&str]) -> Rc<Descriptor> {
        Rc::new(Descriptor {
            properties: paths.iter().map(|p| Rc::from(*p)).collect(),
            owner,
            target,
            source: None,
            payload: Payload::Text { span: Rc::from("[[x]]") },
        })
    }

    #[test]
    fn chain_order_and_dedup() {
        let mut rt = Runtime::new();
        let host = rt.document_mut().create_element("x-app");
        let outer = rt.document_mut().create_element("x-outer");
        let div = rt.document_mut().create_element("div");
        rt.document_mut().append_child(host, div);
        rt.document_mut().set_bound_parent(div, Some(host));
        rt.document_mut().set_bound_repeater_parent(div, Some(outer));

        assert_eq!(rt.lookup_chain(div, None).as_slice(), &[host, outer]);
        assert_eq!(rt.lookup_chain(div, Some(outer)).as_slice(), &[outer, host]);
        assert_eq!(rt.resolve_owner(div, None), host);

        let lone = rt.document_mut().create_element("p");
        assert_eq!(rt.resolve_owner(lone, None), lone);
    }

    #[test]
    fn multi_path_descriptor_registers_per_root() {
        let mut rt = Runtime::new();
        let host = rt.document_mut().create_element("x-app");
        let span = rt.document_mut().create_element("span");
        rt.register_descriptor(text(host, span, &["user.name", "user.age", "count"]));
        assert_eq!(rt.store.executors(host, Some("user")).len(), 2);
        assert_eq!(rt.store.executors(host, Some("count")).len(), 1);
        assert_eq!(rt.store.properties(host).len(), 2);
    }

    #[test]
    fn scope_shadows_owner_properties() {
        let mut rt = Runtime::new();
        let host = rt.document_mut().create_element("x-app");
        let li = rt.document_mut().create_element("li");
        rt.set_property(host, "data", "host");
        rt.set_property(host, "title", "T");

        let source = ObservableSequence::from(vec![Value::str("a"), Value::str("b")]);
        let outer = Rc::new(ItemScope {
            repeater: RepeaterId::new(0),
            alias: Rc::from("row"),
            item: Value::record([("label", Value::str("R"))]),
            index: 4,
            source: ObservableSequence::new(),
            parent: None,
        });
        rt.document_mut().set_scope(
            li,
            Some(Rc::new(ItemScope {
                repeater: RepeaterId::new(1),
                alias: Rc::from("data"),
                item: Value::str("b"),
                index: 1,
                source: source.clone(),
                parent: Some(outer),
            })),
        );

        assert_eq!(rt.resolve_value(li, host, "data"), Value::str("b"));
        assert_eq!(rt.resolve_value(li, host, "data_index"), Value::from(1));
        assert_eq!(rt.resolve_value(li, host, "data_source.length"), Value::from(2));
        assert_eq!(rt.resolve_value(li, host, "row.label"), Value::str("R"));
        assert_eq!(rt.resolve_value(li, host, "title"), Value::str("T"));
        assert!(rt.resolve_value(li, host, "missing.deep").is_undefined());
        assert_eq!(rt.resolve_value(host, host, "data"), Value::str("host"));
    }

    #[test]
    fn registration_makes_root_reactive_with_seed() {
        let mut rt = Runtime::new();
        let host = rt.document_mut().create_element("x-app");
        rt.set_property(host, "count", 7);
        let d = Rc::new(Descriptor {
            properties: smallvec![Rc::from("count")],
            owner: host,
            target: host,
            source: None,
            payload: Payload::Property { attribute: Rc::from("title") },
        });
        rt.register_descriptor(Rc::clone(&d));
        assert!(rt.is_reactive(host, "count"));
        assert_eq!(rt.get_property(host, "count"), Value::from(7));
        rt.unregister_descriptor(&d);
        assert_eq!(rt.store.executor_count(host), 0);
    }
}
