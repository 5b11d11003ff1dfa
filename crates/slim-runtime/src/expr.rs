#![forbid(unsafe_code)]

//! Expression compiler.
//!
//! Turns raw attribute values and text fragments into typed expressions.
//! Attribute values are tried against a fixed precedence:
//!
//! 1. the list-template attribute (`slim-repeat`),
//! 2. the conditional attribute (`slim-if`, a leading `!` negates),
//! 3. a registered custom attribute name,
//! 4. a method call `[[name(a, b.c)]]` with at least one argument,
//! 5. a property path `[[path.to.value]]`,
//! 6. an injection `{factory}`.
//!
//! The whole attribute value must match a pattern; anything else is a
//! literal and yields no expression. Text is scanned for every `[[...]]`
//! span independently.
//!
//! # Invariants
//!
//! 1. Compilation is pure: the same inputs always yield the same output.
//! 2. Every path in a compiled expression is a well-formed dot path.
//! 3. Method expressions carry at least one argument.

use std::rc::Rc;
use std::sync::LazyLock;

use ahash::AHashSet;
use regex::Regex;
use smallvec::SmallVec;

use crate::config::RuntimeConfig;

const PATH: &str = r"[A-Za-z_$][\w$]*(?:\.[\w$]+)*";

static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{PATH}$")).expect("path pattern is valid"));

static PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\[\[\s*({PATH})\s*\]\]$")).expect("property pattern is valid")
});

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\[\s*([A-Za-z_$][\w$]*)\s*\(([^()]*)\)\s*\]\]$").expect("method pattern is valid")
});

static INJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\s*([A-Za-z_$][\w$.-]*)\s*\}$").expect("inject pattern is valid")
});

static TEXT_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[[^\[\]]*\]\]").expect("text span pattern is valid"));

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// `name(arg, ...)` with resolved argument paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: Rc<str>,
    pub args: SmallVec<[Rc<str>; 2]>,
}

/// List template parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatExpression {
    pub path: Rc<str>,
    /// Property each clone receives its item under.
    pub target_attribute: Rc<str>,
    /// Clones are inserted before the anchor rather than inside it.
    pub adjacent: bool,
}

/// A compiled attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeExpression {
    Repeat(RepeatExpression),
    Conditional { path: Rc<str>, negated: bool },
    CustomAttribute { value: Rc<str> },
    Method(MethodCall),
    Property { path: Rc<str> },
    Inject { factory: Rc<str> },
}

/// A compiled `[[...]]` text span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextExpression {
    Path(Rc<str>),
    Method(MethodCall),
}

/// One interpolation found in a text fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// The literal `[[...]]` text replaced at execution time.
    pub span: Rc<str>,
    pub expression: TextExpression,
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Attribute and text compiler bound to one runtime's vocabulary.
#[derive(Debug, Clone)]
pub struct ExpressionCompiler {
    repeat_attribute: String,
    repeat_as_attribute: String,
    repeat_adjacent_attribute: String,
    conditional_attribute: String,
    default_target_attribute: String,
    adjacent_tags: Vec<String>,
    custom: AHashSet<String>,
}

impl ExpressionCompiler {
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            repeat_attribute: config.repeat_attribute.clone(),
            repeat_as_attribute: config.repeat_as_attribute.clone(),
            repeat_adjacent_attribute: config.repeat_adjacent_attribute.clone(),
            conditional_attribute: config.conditional_attribute.clone(),
            default_target_attribute: config.default_target_attribute.clone(),
            adjacent_tags: config.adjacent_tags.clone(),
            custom: AHashSet::new(),
        }
    }

    /// Make `name` compile as a custom attribute.
    pub fn register_custom(&mut self, name: impl Into<String>) {
        self.custom.insert(name.into());
    }

    #[must_use]
    pub fn is_custom(&self, name: &str) -> bool {
        self.custom.contains(name)
    }

    /// Compile one attribute of an element.
    ///
    /// `attributes` are the element's attributes, consulted for the repeat
    /// modifiers. Returns `None` for literal values.
    #[must_use]
    pub fn compile_attribute(
        &self,
        tag: &str,
        attributes: &[(String, String)],
        name: &str,
        value: &str,
    ) -> Option<AttributeExpression> {
        if name == self.repeat_attribute {
            return self
                .compile_repeat(tag, attributes, value)
                .map(AttributeExpression::Repeat);
        }
        if name == self.conditional_attribute {
            let trimmed = value.trim();
            let (negated, path) = match trimmed.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, trimmed),
            };
            return is_path(path).then(|| AttributeExpression::Conditional {
                path: Rc::from(path),
                negated,
            });
        }
        if self.is_custom(name) {
            return Some(AttributeExpression::CustomAttribute {
                value: Rc::from(value),
            });
        }
        if let Some(call) = parse_method(value) {
            return Some(AttributeExpression::Method(call));
        }
        if let Some(caps) = PROPERTY_RE.captures(value) {
            return Some(AttributeExpression::Property {
                path: Rc::from(&caps[1]),
            });
        }
        INJECT_RE
            .captures(value)
            .map(|caps| AttributeExpression::Inject {
                factory: Rc::from(&caps[1]),
            })
    }

    /// Compile the list-template attribute together with its modifiers.
    #[must_use]
    pub fn compile_repeat(
        &self,
        tag: &str,
        attributes: &[(String, String)],
        value: &str,
    ) -> Option<RepeatExpression> {
        let path = value.trim();
        if !is_path(path) {
            return None;
        }
        let sibling = |name: &str| {
            attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.trim())
        };
        let target_attribute = sibling(&self.repeat_as_attribute)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.default_target_attribute);
        let adjacent = sibling(&self.repeat_adjacent_attribute).is_some()
            || self.adjacent_tags.iter().any(|t| t.eq_ignore_ascii_case(tag));
        Some(RepeatExpression {
            path: Rc::from(path),
            target_attribute: Rc::from(target_attribute),
            adjacent,
        })
    }

    /// Extract every interpolation in `text`, in textual order.
    ///
    /// Spans that are neither a path nor a method call are ignored.
    #[must_use]
    pub fn compile_text(&self, text: &str) -> Vec<TextSpan> {
        TEXT_SPAN_RE
            .find_iter(text)
            .filter_map(|m| {
                let span = m.as_str();
                let expression = match parse_method(span) {
                    Some(call) => TextExpression::Method(call),
                    None => {
                        let inner = span[2..span.len() - 2].trim();
                        if !is_path(inner) {
                            return None;
                        }
                        TextExpression::Path(Rc::from(inner))
                    }
                };
                Some(TextSpan {
                    span: Rc::from(span),
                    expression,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `s` is a well-formed dot path.
#[must_use]
pub fn is_path(s: &str) -> bool {
    PATH_RE.is_match(s)
}

/// First segment of a dot path.
#[must_use]
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// `user-name` → `userName`.
#[must_use]
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '-' {
            upper = true;
        } else if upper && ch.is_ascii_lowercase() {
            out.push(ch.to_ascii_uppercase());
            upper = false;
        } else {
            if upper {
                out.push('-');
            }
            out.push(ch);
            upper = false;
        }
    }
    if upper {
        out.push('-');
    }
    out
}

/// Parse `[[name(a, b)]]`. Zero-argument calls and malformed arguments are
/// rejected.
fn parse_method(value: &str) -> Option<MethodCall> {
    let caps = METHOD_RE.captures(value)?;
    let args: SmallVec<[Rc<str>; 2]> = caps[2]
        .split(',')
        .map(str::trim)
        .map(|arg| is_path(arg).then(|| Rc::from(arg)))
        .collect::<Option<_>>()?;
    Some(MethodCall {
        method: Rc::from(&caps[1]),
        args,
    })
}
