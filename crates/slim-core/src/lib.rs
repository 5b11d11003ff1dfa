#![forbid(unsafe_code)]

//! Core data types for the slim binding runtime.
//!
//! This crate provides:
//! - [`Value`] and [`Record`], the dynamic values bindings carry
//! - [`Document`], an arena of elements and text nodes with binding linkage
//! - [`Template`], a builder standing in for markup
//! - [`ObservableSequence`], a list that notifies repeaters on structural
//!   mutation
//! - [`TaskQueue`] and [`RenderTicket`], the deferred render queue

pub mod dom;
pub mod schedule;
pub mod sequence;
pub mod template;
pub mod value;

pub use dom::{Document, ItemScope, Node, NodeFlags, NodeId, NodeKind};
pub use schedule::{RenderTicket, RepeaterId, TaskQueue};
pub use sequence::ObservableSequence;
pub use template::Template;
pub use value::{Record, Value};
