#![forbid(unsafe_code)]

//! Binding descriptors.
//!
//! A [`Descriptor`] is the compiled, immutable record of one binding: what
//! it depends on, which store it registers against, which node it mutates
//! and how. Descriptors are shared as `Rc<Descriptor>`; the store holds one
//! [`Executor`](crate::store::Executor) per dependency path.

use std::fmt;
use std::rc::Rc;

use slim_core::dom::NodeId;
use slim_core::schedule::RepeaterId;
use slim_core::value::Value;
use smallvec::SmallVec;

use crate::runtime::Runtime;

/// Callback invoked by a watch binding with the resolved value.
pub type WatchCallback = Rc<dyn Fn(&mut Runtime, Value)>;

/// Binding kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Property,
    Method,
    Conditional,
    Repeat,
    Watch,
    Text,
    TextMethod,
    Inject,
    CustomAttribute,
}

impl DescriptorKind {
    /// Registration order within one element; lower runs first, ties keep
    /// attribute order.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Inject => 0,
            Self::Repeat => 2,
            Self::CustomAttribute => 3,
            _ => 1,
        }
    }

    /// Text kinds run in the second execution phase.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::Text | Self::TextMethod)
    }
}

/// Kind-specific data.
#[derive(Clone)]
pub enum Payload {
    Property {
        attribute: Rc<str>,
    },
    Method {
        attribute: Rc<str>,
        method: Rc<str>,
    },
    Conditional {
        negated: bool,
        placeholder: NodeId,
    },
    Repeat {
        repeater: RepeaterId,
    },
    Watch {
        callback: WatchCallback,
    },
    Text {
        span: Rc<str>,
    },
    TextMethod {
        span: Rc<str>,
        method: Rc<str>,
    },
    Inject {
        attribute: Rc<str>,
        factory: Rc<str>,
    },
    CustomAttribute {
        attribute: Rc<str>,
        value: Rc<str>,
    },
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property { attribute } => f.debug_struct("Property").field("attribute", attribute).finish(),
            Self::Method { attribute, method } => f
                .debug_struct("Method")
                .field("attribute", attribute)
                .field("method", method)
                .finish(),
            Self::Conditional {
                negated,
                placeholder,
            } => f
                .debug_struct("Conditional")
                .field("negated", negated)
                .field("placeholder", placeholder)
                .finish(),
            Self::Repeat { repeater } => f.debug_struct("Repeat").field("repeater", repeater).finish(),
            Self::Watch { .. } => f.write_str("Watch"),
            Self::Text { span } => f.debug_struct("Text").field("span", span).finish(),
            Self::TextMethod { span, method } => f
                .debug_struct("TextMethod")
                .field("span", span)
                .field("method", method)
                .finish(),
            Self::Inject { attribute, factory } => f
                .debug_struct("Inject")
                .field("attribute", attribute)
                .field("factory", factory)
                .finish(),
            Self::CustomAttribute { attribute, value } => f
                .debug_struct("CustomAttribute")
                .field("attribute", attribute)
                .field("value", value)
                .finish(),
        }
    }
}

/// One compiled binding.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Dependency paths, in argument order for method kinds.
    pub properties: SmallVec<[Rc<str>; 2]>,
    /// Node whose store the descriptor registers against.
    pub owner: NodeId,
    /// Node the side effect mutates.
    pub target: NodeId,
    /// Explicit lookup source, tried before the target's bound parent.
    pub source: Option<NodeId>,
    pub payload: Payload,
}

impl Descriptor {
    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        match self.payload {
            Payload::Property { .. } => DescriptorKind::Property,
            Payload::Method { .. } => DescriptorKind::Method,
            Payload::Conditional { .. } => DescriptorKind::Conditional,
            Payload::Repeat { .. } => DescriptorKind::Repeat,
            Payload::Watch { .. } => DescriptorKind::Watch,
            Payload::Text { .. } => DescriptorKind::Text,
            Payload::TextMethod { .. } => DescriptorKind::TextMethod,
            Payload::Inject { .. } => DescriptorKind::Inject,
            Payload::CustomAttribute { .. } => DescriptorKind::CustomAttribute,
        }
    }

    /// First dependency path; the single path for non-method kinds.
    #[must_use]
    pub fn primary_path(&self) -> Option<&str> {
        self.properties.first().map(|p| &**p)
    }
}

/// Stable sort by kind priority.
pub fn sort_by_priority(descriptors: &mut [Rc<Descriptor>]) {
    descriptors.sort_by_key(|d| d.kind().priority());
}
