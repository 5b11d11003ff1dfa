#![forbid(unsafe_code)]

//! Error types.
//!
//! Authoring errors (bad markup) and delegation failures surface as
//! [`BindError`]. Failures inside user methods are [`MethodError`] values;
//! during binding execution they are logged and isolated, during explicit
//! delegation they are returned to the caller.

use std::fmt;

/// Failure raised by the binding runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// A `bind` element mixes text interpolation with element children.
    NestedInterpolation { tag: String },
    /// An `{factory}` attribute names an injector that was never registered.
    UnknownInjector { factory: String, tag: String },
    /// A component was requested for a tag with no definition.
    UnknownComponent { tag: String },
    /// Attribute-bound delegation was attempted on a node with no bound parent.
    NoBoundParent { attribute: String, tag: String },
    /// No node on the delegation chain defines the attribute-bound method.
    Delegation { method: String, tag: String },
    /// The delegated method ran and reported a failure.
    MethodFailed { method: String, error: MethodError },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NestedInterpolation { tag } => write!(
                f,
                "illegal bind attribute use on <{tag}>: text interpolation with nested element children"
            ),
            Self::UnknownInjector { factory, tag } => {
                write!(f, "no injector named '{factory}' (requested by <{tag}>)")
            }
            Self::UnknownComponent { tag } => write!(f, "no component defined for <{tag}>"),
            Self::NoBoundParent { attribute, tag } => write!(
                f,
                "cannot call attribute-bound method '{attribute}' on <{tag}>: no bound parent"
            ),
            Self::Delegation { method, tag } => write!(
                f,
                "cannot delegate '{method}' from <{tag}>: no bound parent defines it"
            ),
            Self::MethodFailed { method, error } => write!(f, "method '{method}' failed: {error}"),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MethodFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Failure reported by (or while locating) a component method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    /// No node on the resolution chain defines the method.
    Missing { method: String },
    /// The method ran and rejected its input.
    Failed(String),
}

impl MethodError {
    /// Convenience constructor for method bodies.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { method } => write!(f, "no component on the lookup chain defines '{method}'"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for MethodError {}
