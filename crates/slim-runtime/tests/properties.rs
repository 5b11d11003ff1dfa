//! Property tests for replay and reconciliation.

use proptest::prelude::*;
use slim_core::{NodeId, ObservableSequence, Template, Value};
use slim_runtime::{ComponentDef, RepeaterState, Runtime};

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
    Shift,
    Unshift(i32),
    Splice(usize, usize, Vec<i32>),
    Reverse,
    Sort,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i32>().prop_map(Op::Push),
        Just(Op::Pop),
        Just(Op::Shift),
        any::<i32>().prop_map(Op::Unshift),
        (0usize..8, 0usize..4, prop::collection::vec(any::<i32>(), 0..3))
            .prop_map(|(start, count, items)| Op::Splice(start, count, items)),
        Just(Op::Reverse),
        Just(Op::Sort),
    ]
}

fn apply(sequence: &ObservableSequence<Value>, op: &Op) {
    match op {
        Op::Push(n) => sequence.push(Value::from(*n)),
        Op::Pop => {
            sequence.pop();
        }
        Op::Shift => {
            sequence.shift();
        }
        Op::Unshift(n) => sequence.unshift(Value::from(*n)),
        Op::Splice(start, count, items) => {
            sequence.splice(*start, *count, items.iter().map(|n| Value::from(*n)));
        }
        Op::Reverse => sequence.reverse(),
        Op::Sort => sequence.sort_by(|a, b| {
            let (a, b) = (a.as_number().unwrap_or(0.0), b.as_number().unwrap_or(0.0));
            a.total_cmp(&b)
        }),
    }
}

fn numbers(rt: &mut Runtime, initial: &[i32]) -> (NodeId, ObservableSequence<Value>) {
    rt.define(
        ComponentDef::new("x-numbers").template(
            Template::element("ol").child(
                Template::element("li")
                    .attr("slim-repeat", "values")
                    .attr("slim-repeat-as", "value")
                    .attr("bind", "")
                    .text("[[value_index]]=[[value]]"),
            ),
        ),
    );
    let host = rt.create_component("x-numbers").expect("component");
    let sequence: ObservableSequence<Value> = initial.iter().map(|n| Value::from(*n)).collect();
    rt.set_property(host, "values", Value::List(sequence.clone()));
    rt.settle().expect("settle");
    (host, sequence)
}

proptest! {
    #[test]
    fn clones_converge_to_the_sequence(
        initial in prop::collection::vec(any::<i32>(), 0..6),
        batches in prop::collection::vec(prop::collection::vec(op(), 0..5), 1..5),
    ) {
        let config = slim_runtime::RuntimeConfig::default().with_scope_names("value_index", "value_source");
        let mut rt = Runtime::with_config(config);
        let (_, sequence) = numbers(&mut rt, &initial);
        let id = rt.repeater_ids().next().expect("repeater");

        for batch in &batches {
            for op in batch {
                apply(&sequence, op);
            }
            let report = rt.settle().expect("settle");
            prop_assert!(report.renders <= 1);
            prop_assert_eq!(rt.repeater_state(id), Some(RepeaterState::Idle));

            let repeater = rt.repeater(id).expect("repeater");
            let rendered: Vec<String> = repeater
                .clones()
                .into_iter()
                .map(|c| rt.document().text_content(c))
                .collect();
            let expected: Vec<String> = sequence
                .snapshot()
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{i}={v}"))
                .collect();
            prop_assert_eq!(rendered, expected);
        }
    }

    #[test]
    fn text_composition_is_order_independent(
        writes in prop::collection::vec((0usize..3, "[a-z0-9]{0,6}"), 1..12),
    ) {
        let mut rt = Runtime::new();
        rt.define(
            ComponentDef::new("x-triple")
                .property("a", "")
                .property("b", "")
                .property("c", "")
                .template(Template::element("span").attr("bind", "").text("<[[a]]|[[b]]|[[c]]>")),
        );
        let host = rt.create_component("x-triple").expect("component");
        let mut current = [String::new(), String::new(), String::new()];
        for (slot, value) in &writes {
            rt.set_property(host, ["a", "b", "c"][*slot], value.as_str());
            current[*slot].clone_from(value);
        }
        let expected = format!("<{}|{}|{}>", current[0], current[1], current[2]);
        prop_assert_eq!(rt.document().text_content(host), expected);
    }

    #[test]
    fn replay_is_idempotent(
        title in "[a-z]{0,8}",
        shown in any::<bool>(),
        items in prop::collection::vec(any::<i32>(), 0..5),
    ) {
        let mut rt = Runtime::new();
        rt.define(
            ComponentDef::new("x-page").template(
                Template::element("main")
                    .attr("data-title", "[[title]]")
                    .child(Template::element("h1").attr("slim-if", "shown").attr("bind", "").text("[[title]]"))
                    .child(Template::element("p").attr("slim-repeat", "items").attr("bind", "").text("[[data]]")),
            ),
        );
        let host = rt.create_component("x-page").expect("component");
        rt.set_property(host, "title", title.as_str());
        rt.set_property(host, "shown", shown);
        rt.set_property(host, "items", Value::list(items.iter().map(|n| Value::from(*n))));
        rt.settle().expect("settle");

        let snapshot = |rt: &Runtime| {
            let doc = rt.document();
            let nodes: Vec<NodeId> = std::iter::once(host).chain(doc.descendants(host)).collect();
            nodes
                .into_iter()
                .map(|n| (doc.describe(n), doc.attributes(n).to_vec(), doc.text_content(n), doc.children(n).len()))
                .collect::<Vec<_>>()
        };
        let first = snapshot(&rt);
        rt.update(host);
        rt.settle().expect("settle");
        let second = snapshot(&rt);
        rt.update(host);
        rt.settle().expect("settle");
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(second, snapshot(&rt));
    }

    #[test]
    fn conditional_is_exclusive(toggles in prop::collection::vec(any::<bool>(), 1..16)) {
        let mut rt = Runtime::new();
        rt.define(
            ComponentDef::new("x-toggle").template(
                Template::element("div").child(Template::element("p").attr("slim-if", "on").attr("slim-id", "target")),
            ),
        );
        let host = rt.create_component("x-toggle").expect("component");
        let div = rt.document().children(host)[0];
        let target = rt.get_property(host, "target").as_node().expect("target");
        for on in toggles {
            rt.set_property(host, "on", on);
            let children = rt.document().children(div);
            prop_assert_eq!(children.len(), 1);
            prop_assert_eq!(children[0] == target, on);
        }
    }
}
