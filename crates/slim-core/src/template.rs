#![forbid(unsafe_code)]

//! Programmatic markup.
//!
//! A [`Template`] describes a tree of elements and text the way markup
//! would, without a parser. Component definitions and tests build their
//! trees with it:
//!
//! ```
//! use slim_core::dom::Document;
//! use slim_core::template::Template;
//!
//! let tpl = Template::element("ul").child(
//!     Template::element("li")
//!         .attr("slim-repeat", "items")
//!         .attr("bind", "")
//!         .text("[[data.label]]"),
//! );
//! let mut doc = Document::new();
//! let ul = tpl.instantiate(&mut doc);
//! assert_eq!(doc.descendants(ul).len(), 1);
//! ```

use crate::dom::{Document, NodeId};

/// A markup tree blueprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<Template>,
    },
    Text(String),
}

impl Template {
    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn text_node(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Add an attribute. No effect on text nodes.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attributes, .. } = &mut self {
            attributes.push((name.into(), value.into()));
        }
        self
    }

    /// Append a child. No effect on text nodes.
    #[must_use]
    pub fn child(mut self, child: Template) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Append a text child.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Self::Text(text.into()))
    }

    /// Build the tree in `doc`, detached. Returns its root.
    pub fn instantiate(&self, doc: &mut Document) -> NodeId {
        match self {
            Self::Text(text) => doc.create_text(text.clone()),
            Self::Element {
                tag,
                attributes,
                children,
            } => {
                let id = doc.create_element(tag.clone());
                for (name, value) in attributes {
                    doc.set_attribute(id, name, value.clone());
                }
                for child in children {
                    let child_id = child.instantiate(doc);
                    doc.append_child(id, child_id);
                }
                id
            }
        }
    }

    /// Build the tree and append it to `parent`.
    pub fn instantiate_into(&self, doc: &mut Document, parent: NodeId) -> NodeId {
        let id = self.instantiate(doc);
        doc.append_child(parent, id);
        id
    }
}

/// Build a fragment holding every tree in `roots`.
pub fn instantiate_fragment(doc: &mut Document, roots: &[Template]) -> NodeId {
    let fragment = doc.create_fragment();
    for root in roots {
        root.instantiate_into(doc, fragment);
    }
    fragment
}
