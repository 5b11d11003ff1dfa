#![forbid(unsafe_code)]

//! Dynamic values carried by bindings.
//!
//! Bound properties hold a [`Value`]: a small, cheaply clonable dynamic type
//! modelled on the values a markup-driven component sees. Lists are
//! [`ObservableSequence`]s so that repeaters can subscribe to structural
//! mutation; records are shared maps so that two clones bound to the same
//! item observe the same object.
//!
//! # Invariants
//!
//! 1. Path lookup never fails: any absent or non-container intermediate
//!    segment resolves to [`Value::Undefined`].
//! 2. `Display` output is the attribute/text serialization used by the
//!    execution engine (`undefined`, `null`, integral numbers without a
//!    fraction, lists comma-joined, records as `[object Object]`).
//! 3. Equality is structural for records and lists.
//! 4. Self-containing lists and records are safe to print and compare: a
//!    container met again while it is being walked serializes as the
//!    empty string (`[..]`/`{..}` in `Debug`) and compares equal.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::dom::NodeId;
use crate::sequence::ObservableSequence;

/// A dynamically typed binding value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value (absent property, failed lookup).
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// An observable list; structural mutation notifies subscribed repeaters.
    List(ObservableSequence<Value>),
    /// A shared key/value record.
    Record(Record),
    /// A reference to a node in the document arena.
    Node(NodeId),
}

impl Value {
    /// Build a string value.
    #[must_use]
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    /// Build a list value from items.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(ObservableSequence::from_iter(items))
    }

    /// Build a record value from `(key, value)` pairs.
    #[must_use]
    pub fn record<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Record(Record::from_pairs(pairs))
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Scripting-style truthiness.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::List(_) | Self::Record(_) | Self::Node(_) => true,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ObservableSequence<Value>> {
        match self {
            Self::List(seq) => Some(seq),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(rec) => Some(rec),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Read one segment below this value.
    ///
    /// Records are keyed by name, lists by decimal index or `length`.
    #[must_use]
    pub fn member(&self, segment: &str) -> Value {
        match self {
            Self::Record(rec) => rec.get(segment),
            Self::List(seq) => {
                if segment == "length" {
                    return Value::Number(seq.len() as f64);
                }
                segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| seq.get(idx))
                    .unwrap_or_default()
            }
            Self::Str(s) if segment == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    /// Walk `segments` starting at this value.
    #[must_use]
    pub fn lookup<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Value {
        let mut current = self.clone();
        for segment in segments {
            if current.is_undefined() {
                break;
            }
            current = current.member(segment);
        }
        current
    }
}

/// Storage addresses of the containers on the current walk.
type Visiting = SmallVec<[usize; 8]>;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut Visiting::new())
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, visiting: &mut Visiting) -> fmt::Result {
    match value {
        Value::Undefined => f.write_str("undefined"),
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write_number(f, *n),
        Value::Str(s) => f.write_str(s),
        Value::List(seq) => {
            let addr = seq.addr();
            if visiting.contains(&addr) {
                return Ok(());
            }
            visiting.push(addr);
            let result = seq.with(|items| {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    match item {
                        Value::Undefined | Value::Null => {}
                        other => write_value(f, other, visiting)?,
                    }
                }
                Ok(())
            });
            visiting.pop();
            result
        }
        Value::Record(_) => f.write_str("[object Object]"),
        Value::Node(_) => f.write_str("[object Node]"),
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visiting = RefCell::new(Visiting::new());
        fmt::Debug::fmt(&Walk { value: self, visiting: &visiting }, f)
    }
}

/// `Debug` view of a value that shares one visiting set across nesting.
struct Walk<'a> {
    value: &'a Value,
    visiting: &'a RefCell<Visiting>,
}

impl Walk<'_> {
    fn enter(&self, addr: usize) -> bool {
        let mut visiting = self.visiting.borrow_mut();
        if visiting.contains(&addr) {
            return false;
        }
        visiting.push(addr);
        true
    }

    fn leave(&self) {
        self.visiting.borrow_mut().pop();
    }
}

impl fmt::Debug for Walk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(seq) => {
                if !self.enter(seq.addr()) {
                    return f.write_str("[..]");
                }
                let result = seq.with(|items| {
                    f.debug_list()
                        .entries(items.iter().map(|value| Walk {
                            value,
                            visiting: self.visiting,
                        }))
                        .finish()
                });
                self.leave();
                result
            }
            Value::Record(rec) => {
                if !self.enter(rec.addr()) {
                    return f.write_str("{..}");
                }
                let fields = rec.fields.borrow();
                let result = f
                    .debug_map()
                    .entries(fields.iter().map(|(key, value)| {
                        (
                            key,
                            Walk {
                                value,
                                visiting: self.visiting,
                            },
                        )
                    }))
                    .finish();
                self.leave();
                result
            }
            Value::Node(id) => write!(f, "Node({id:?})"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other, &mut SmallVec::new())
    }
}

/// Structural equality. A pair of containers already being compared
/// further up the walk counts as equal.
fn values_equal(a: &Value, b: &Value, comparing: &mut SmallVec<[(usize, usize); 8]>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            if a.ptr_eq(b) {
                return true;
            }
            let pair = (a.addr(), b.addr());
            if comparing.contains(&pair) {
                return true;
            }
            comparing.push(pair);
            let equal = a.with(|left| {
                b.with(|right| {
                    left.len() == right.len()
                        && left.iter().zip(right).all(|(l, r)| values_equal(l, r, comparing))
                })
            });
            comparing.pop();
            equal
        }
        (Value::Record(a), Value::Record(b)) => {
            if a.ptr_eq(b) {
                return true;
            }
            let pair = (a.addr(), b.addr());
            if comparing.contains(&pair) {
                return true;
            }
            comparing.push(pair);
            let (left, right) = (a.fields.borrow(), b.fields.borrow());
            let equal = left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, l)| right.get(key).is_some_and(|r| values_equal(l, r, comparing)));
            drop((left, right));
            comparing.pop();
            equal
        }
        (Value::Node(a), Value::Node(b)) => a == b,
        _ => false,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<ObservableSequence<Value>> for Value {
    fn from(seq: ObservableSequence<Value>) -> Self {
        Self::List(seq)
    }
}

impl From<Record> for Value {
    fn from(rec: Record) -> Self {
        Self::Record(rec)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Shared, ordered key/value map.
///
/// Cloning a `Record` clones the handle; both handles observe the same
/// fields.
#[derive(Clone, Default)]
pub struct Record {
    fields: Rc<RefCell<IndexMap<String, Value>>>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let fields = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            fields: Rc::new(RefCell::new(fields)),
        }
    }

    /// Field value, `Undefined` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.fields.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Set a field, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.borrow_mut().insert(key.into(), value.into())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.borrow().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.borrow().is_empty()
    }

    /// Whether two handles share the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.fields, &other.fields)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.fields).cast::<()>() as usize
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        values_equal(
            &Value::Record(self.clone()),
            &Value::Record(other.clone()),
            &mut SmallVec::new(),
        )
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Record(self.clone()), f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
