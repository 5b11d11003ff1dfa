use std::cell::Cell;
use std::rc::Rc;

use slim_core::{NodeId, Template};
use slim_runtime::{ComponentDef, Runtime};

fn panel(rt: &mut Runtime, condition: &str) -> (NodeId, NodeId, NodeId) {
    rt.define(
        ComponentDef::new("x-panel").template(
            Template::element("div").child(
                Template::element("p")
                    .attr("slim-if", condition)
                    .attr("slim-id", "body")
                    .attr("bind", "")
                    .text("[[message]]"),
            ),
        ),
    );
    let host = rt.create_component("x-panel").expect("component");
    let div = rt.document().children(host)[0];
    let p = rt.get_property(host, "body").as_node().expect("conditional element");
    (host, div, p)
}

fn visible(rt: &Runtime, container: NodeId, target: NodeId) -> bool {
    rt.document().children(container).contains(&target)
}

fn placeholder_count(rt: &Runtime, container: NodeId) -> usize {
    rt.document()
        .children(container)
        .iter()
        .filter(|c| rt.document().tag(**c) == Some("slim-if-helper"))
        .count()
}

#[test]
fn falsy_condition_hides_on_activation() {
    let mut rt = Runtime::new();
    let (_, div, p) = panel(&mut rt, "open");
    assert!(!visible(&rt, div, p));
    assert_eq!(placeholder_count(&rt, div), 1);
}

#[test]
fn target_and_placeholder_are_exclusive() {
    let mut rt = Runtime::new();
    let (host, div, p) = panel(&mut rt, "open");
    for open in [true, true, false, true, false, false, true] {
        rt.set_property(host, "open", open);
        assert_eq!(visible(&rt, div, p), open);
        assert_eq!(placeholder_count(&rt, div), usize::from(!open));
        assert_eq!(rt.document().children(div).len(), 1);
    }
}

#[test]
fn negated_condition() {
    let mut rt = Runtime::new();
    let (host, div, p) = panel(&mut rt, "!busy");
    assert!(visible(&rt, div, p));
    rt.set_property(host, "busy", 1);
    assert!(!visible(&rt, div, p));
    rt.set_property(host, "busy", "");
    assert!(visible(&rt, div, p));
}

#[test]
fn hidden_element_keeps_its_bindings() {
    let mut rt = Runtime::new();
    let (host, _, p) = panel(&mut rt, "open");
    rt.set_property(host, "message", "while hidden");
    rt.set_property(host, "open", true);
    assert_eq!(rt.document().text_content(p), "while hidden");
}

#[test]
fn revealed_component_is_activated_once() {
    let mut rt = Runtime::new();
    let created = Rc::new(Cell::new(0));
    let counter = Rc::clone(&created);
    rt.define(
        ComponentDef::new("x-badge")
            .on_created(move |_, _| counter.set(counter.get() + 1))
            .template(Template::element("b").text("badge")),
    );
    rt.define(
        ComponentDef::new("x-card")
            .template(Template::element("section").child(Template::element("x-badge").attr("slim-if", "shown"))),
    );
    let host = rt.create_component("x-card").expect("component");
    // Nested components are activated with their host, hidden or not.
    assert_eq!(created.get(), 1);
    for shown in [true, false, true] {
        rt.set_property(host, "shown", shown);
    }
    assert_eq!(created.get(), 1);
    assert_eq!(rt.document().text_content(host), "badge");
}
