#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use slim_core::{ObservableSequence, Template, Value};
use slim_runtime::{ComponentDef, Runtime};

#[derive(Debug, Arbitrary)]
enum Op {
    Push(i16),
    Pop,
    Shift,
    Unshift(i16),
    Splice { start: u8, delete: u8, insert: Vec<i16> },
    Reverse,
    Replace(Vec<i16>),
    Settle,
}

fn values(items: &[i16]) -> Vec<Value> {
    items.iter().map(|n| Value::from(i32::from(*n))).collect()
}

fuzz_target!(|ops: Vec<Op>| {
    let mut rt = Runtime::new();
    rt.define(
        ComponentDef::new("x-fuzz").template(
            Template::element("ul").child(
                Template::element("li")
                    .attr("slim-repeat", "items")
                    .attr("bind", "")
                    .text("[[data]]"),
            ),
        ),
    );
    let Ok(host) = rt.create_component("x-fuzz") else {
        return;
    };
    let mut sequence = ObservableSequence::<Value>::new();
    rt.set_property(host, "items", Value::List(sequence.clone()));

    for op in ops.iter().take(64) {
        match op {
            Op::Push(n) => sequence.push(Value::from(i32::from(*n))),
            Op::Pop => {
                sequence.pop();
            }
            Op::Shift => {
                sequence.shift();
            }
            Op::Unshift(n) => sequence.unshift(Value::from(i32::from(*n))),
            Op::Splice { start, delete, insert } => {
                sequence.splice(usize::from(*start), usize::from(*delete), values(insert));
            }
            Op::Reverse => sequence.reverse(),
            Op::Replace(items) => {
                sequence = ObservableSequence::from(values(items));
                rt.set_property(host, "items", Value::List(sequence.clone()));
            }
            Op::Settle => {
                let _ = rt.settle();
            }
        }
    }

    let _ = rt.settle();
    let Some(id) = rt.repeater_ids().next() else {
        return;
    };
    let clones = rt.repeater(id).map(|r| r.clones()).unwrap_or_default();
    assert_eq!(clones.len(), sequence.len());
    for (clone, item) in clones.iter().zip(sequence.snapshot()) {
        assert_eq!(rt.document().text_content(*clone), item.to_string());
    }
});
