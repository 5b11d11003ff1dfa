use proptest::prelude::*;
use slim_core::schedule::{RepeaterId, TaskQueue};
use slim_core::sequence::ObservableSequence;

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Pop,
    Shift,
    Unshift(u8),
    Splice(usize, usize, Vec<u8>),
    Sort,
    Reverse,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::Push),
        Just(Op::Pop),
        Just(Op::Shift),
        any::<u8>().prop_map(Op::Unshift),
        (0usize..10, 0usize..5, prop::collection::vec(any::<u8>(), 0..4))
            .prop_map(|(s, d, items)| Op::Splice(s, d, items)),
        Just(Op::Sort),
        Just(Op::Reverse),
    ]
}

fn apply_model(model: &mut Vec<u8>, op: &Op) {
    match op {
        Op::Push(v) => model.push(*v),
        Op::Pop => {
            model.pop();
        }
        Op::Shift => {
            if !model.is_empty() {
                model.remove(0);
            }
        }
        Op::Unshift(v) => model.insert(0, *v),
        Op::Splice(start, delete, items) => {
            let start = (*start).min(model.len());
            let end = start.saturating_add(*delete).min(model.len());
            model.splice(start..end, items.iter().copied());
        }
        Op::Sort => model.sort(),
        Op::Reverse => model.reverse(),
    }
}

fn apply_sequence(sequence: &ObservableSequence<u8>, op: &Op) {
    match op {
        Op::Push(v) => sequence.push(*v),
        Op::Pop => {
            sequence.pop();
        }
        Op::Shift => {
            sequence.shift();
        }
        Op::Unshift(v) => sequence.unshift(*v),
        Op::Splice(start, delete, items) => {
            sequence.splice(*start, *delete, items.iter().copied());
        }
        Op::Sort => sequence.sort(),
        Op::Reverse => sequence.reverse(),
    }
}

proptest! {
    #[test]
    fn mutators_match_vec(initial in prop::collection::vec(any::<u8>(), 0..8), ops in prop::collection::vec(op(), 0..24)) {
        let sequence = ObservableSequence::from(initial.clone());
        let mut model = initial;
        for op in &ops {
            apply_sequence(&sequence, op);
            apply_model(&mut model, op);
            prop_assert_eq!(sequence.snapshot(), model.clone());
        }
    }

    #[test]
    fn mutations_coalesce_per_observer(ops in prop::collection::vec(op(), 1..16), observers in 1u32..4) {
        let queue = TaskQueue::new();
        let sequence = ObservableSequence::<u8>::new();
        for id in 0..observers {
            sequence.register(queue.ticket(RepeaterId::new(id)));
            // Registration is a set.
            sequence.register(queue.ticket(RepeaterId::new(id)));
        }
        prop_assert_eq!(sequence.observer_count(), observers as usize);

        for op in &ops {
            apply_sequence(&sequence, op);
        }
        prop_assert_eq!(queue.len(), observers as usize);
        let drained = queue.drain();
        prop_assert_eq!(drained.len(), observers as usize);
        prop_assert!(queue.is_empty());
    }
}

#[test]
fn unregistered_observer_is_not_notified() {
    let queue = TaskQueue::new();
    let sequence = ObservableSequence::from(vec![1, 2, 3]);
    let id = RepeaterId::new(7);
    sequence.register(queue.ticket(id));
    sequence.unregister(id);
    sequence.unregister(id);
    sequence.reverse();
    assert!(queue.is_empty());
    assert!(!sequence.is_registered(id));
}

#[test]
fn reads_do_not_notify() {
    let queue = TaskQueue::new();
    let sequence = ObservableSequence::from(vec![3, 1, 2]);
    sequence.register(queue.ticket(RepeaterId::new(0)));
    let _ = sequence.get(0);
    let _ = sequence.snapshot();
    assert_eq!(sequence.with(|items| items.len()), 3);
    assert!(queue.is_empty());
}
