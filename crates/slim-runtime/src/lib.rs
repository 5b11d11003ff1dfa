#![forbid(unsafe_code)]

//! Reactive binding runtime for slim components.
//!
//! The runtime turns declarative markup into a live binding graph:
//!
//! - [`expr`] compiles attribute values and `[[...]]` text spans;
//! - [`store`] keeps one reactive entry per `(owner, property)`;
//! - [`registrar`] and [`capture`] install bindings on the right owner;
//! - [`engine`] replays bindings in two phases when a property changes;
//! - [`repeat`] reconciles list templates against observable sequences
//!   with deferred, coalesced renders;
//! - [`component`] supplies component definitions and their lifecycle.
//!
//! Everything is single threaded and driven through `&mut` [`Runtime`].
//!
//! # Example
//!
//! ```
//! use slim_core::{Template, Value};
//! use slim_runtime::{ComponentDef, Runtime};
//!
//! let mut rt = Runtime::new();
//! rt.define(
//!     ComponentDef::new("x-hello")
//!         .property("name", "world")
//!         .template(Template::element("p").attr("bind", "").text("Hello [[name]]")),
//! );
//! let hello = rt.create_component("x-hello").unwrap();
//! rt.set_property(hello, "name", Value::str("slim"));
//! assert_eq!(rt.document().text_content(hello), "Hello slim");
//! ```

pub mod capture;
pub mod component;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod expr;
pub mod registrar;
pub mod repeat;
pub mod runtime;
pub mod store;

pub use capture::CaptureOutcome;
pub use component::{ChangedHook, ComponentDef, Hook, Method};
pub use config::{ConfigError, RuntimeConfig};
pub use descriptor::{Descriptor, DescriptorKind, Payload};
pub use error::{BindError, MethodError};
pub use expr::{AttributeExpression, ExpressionCompiler, MethodCall, RepeatExpression, TextExpression, TextSpan};
pub use repeat::{Repeater, RepeaterState};
pub use runtime::{AttributeProcessor, Injector, ReactiveProperty, Runtime, SettleReport};
pub use store::PropertyStore;
