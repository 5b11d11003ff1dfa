#![forbid(unsafe_code)]

//! slim: declarative bindings and list reconciliation over a node arena.
//!
//! This crate re-exports:
//! - [`core`] ([`slim_core`]): values, the document arena, templates and
//!   observable sequences
//! - [`runtime`] ([`slim_runtime`]): the binding runtime, components and
//!   configuration
//!
//! Most programs only need the [`prelude`].

pub use slim_core as core;
pub use slim_runtime as runtime;

pub use slim_core::{Document, NodeId, ObservableSequence, Record, Template, Value};
pub use slim_runtime::{
    BindError, ComponentDef, ConfigError, MethodError, Runtime, RuntimeConfig, SettleReport,
};

/// Common imports for defining components and driving a runtime.
pub mod prelude {
    pub use slim_core::{NodeId, ObservableSequence, Record, Template, Value};
    pub use slim_runtime::{
        BindError, ComponentDef, MethodError, ReactiveProperty, RepeaterState, Runtime,
        RuntimeConfig, SettleReport,
    };
}
