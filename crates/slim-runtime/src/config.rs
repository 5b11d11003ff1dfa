#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`RuntimeConfig`] names every markup attribute and helper tag the
//! runtime recognizes, plus the scheduling bound used by
//! [`Runtime::settle`](crate::Runtime::settle). The defaults reproduce the
//! stock `slim-*` vocabulary.
//!
//! With the `policy-config` feature a config can be loaded from TOML or
//! JSON; absent keys keep their defaults.

use std::fmt;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Attribute names, helper tags and scheduling limits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "policy-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RuntimeConfig {
    /// Attribute marking a list template.
    /// Default: `slim-repeat`
    pub repeat_attribute: String,

    /// Attribute overriding the per-item property name.
    /// Default: `slim-repeat-as`
    pub repeat_as_attribute: String,

    /// Attribute forcing clones to be inserted as siblings of the anchor.
    /// Default: `slim-repeat-adjacent`
    pub repeat_adjacent_attribute: String,

    /// Attribute stamped on every clone with its index.
    /// Default: `slim-repeat-index`
    pub repeat_index_attribute: String,

    /// Attribute holding a conditional path (`!` prefix negates).
    /// Default: `slim-if`
    pub conditional_attribute: String,

    /// Attribute enabling `[[...]]` text interpolation on an element.
    /// Default: `bind`
    pub text_bind_attribute: String,

    /// Attribute publishing an element reference on its scope owner.
    /// Default: `slim-id`
    pub element_id_attribute: String,

    /// Tag of the anchor element that replaces a list template.
    /// Default: `slim-repeat`
    pub anchor_tag: String,

    /// Tag of the placeholder standing in for a hidden conditional element.
    /// Default: `slim-if-helper`
    pub placeholder_tag: String,

    /// Tag inside a component template that receives light-DOM children.
    /// Default: `slim-content`
    pub content_tag: String,

    /// Per-item property name when `slim-repeat-as` is absent.
    /// Default: `data`
    pub default_target_attribute: String,

    /// Tags whose list templates are always rendered adjacent to the anchor.
    /// Default: `option`, `tr`, `th`, `td`
    pub adjacent_tags: Vec<String>,

    /// Scope name resolving to a clone's index.
    /// Default: `data_index`
    pub index_name: String,

    /// Scope name resolving to a clone's backing sequence.
    /// Default: `data_source`
    pub source_name: String,

    /// Upper bound on task-queue turns run by one `settle` call.
    /// Default: 1024
    pub max_settle_turns: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            repeat_attribute: "slim-repeat".into(),
            repeat_as_attribute: "slim-repeat-as".into(),
            repeat_adjacent_attribute: "slim-repeat-adjacent".into(),
            repeat_index_attribute: "slim-repeat-index".into(),
            conditional_attribute: "slim-if".into(),
            text_bind_attribute: "bind".into(),
            element_id_attribute: "slim-id".into(),
            anchor_tag: "slim-repeat".into(),
            placeholder_tag: "slim-if-helper".into(),
            content_tag: "slim-content".into(),
            default_target_attribute: "data".into(),
            adjacent_tags: ["option", "tr", "th", "td"].map(String::from).to_vec(),
            index_name: "data_index".into(),
            source_name: "data_source".into(),
            max_settle_turns: 1024,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn with_repeat_attribute(mut self, name: impl Into<String>) -> Self {
        self.repeat_attribute = name.into();
        self
    }

    #[must_use]
    pub fn with_conditional_attribute(mut self, name: impl Into<String>) -> Self {
        self.conditional_attribute = name.into();
        self
    }

    #[must_use]
    pub fn with_text_bind_attribute(mut self, name: impl Into<String>) -> Self {
        self.text_bind_attribute = name.into();
        self
    }

    #[must_use]
    pub fn with_default_target_attribute(mut self, name: impl Into<String>) -> Self {
        self.default_target_attribute = name.into();
        self
    }

    #[must_use]
    pub fn with_adjacent_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjacent_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_scope_names(mut self, index: impl Into<String>, source: impl Into<String>) -> Self {
        self.index_name = index.into();
        self.source_name = source.into();
        self
    }

    #[must_use]
    pub fn with_max_settle_turns(mut self, turns: usize) -> Self {
        self.max_settle_turns = turns;
        self
    }

    /// Check that every name is non-empty and the turn bound is positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("repeat_attribute", &self.repeat_attribute),
            ("repeat_as_attribute", &self.repeat_as_attribute),
            ("repeat_adjacent_attribute", &self.repeat_adjacent_attribute),
            ("repeat_index_attribute", &self.repeat_index_attribute),
            ("conditional_attribute", &self.conditional_attribute),
            ("text_bind_attribute", &self.text_bind_attribute),
            ("element_id_attribute", &self.element_id_attribute),
            ("anchor_tag", &self.anchor_tag),
            ("placeholder_tag", &self.placeholder_tag),
            ("content_tag", &self.content_tag),
            ("default_target_attribute", &self.default_target_attribute),
            ("index_name", &self.index_name),
            ("source_name", &self.source_name),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty",
                });
            }
        }
        if self.max_settle_turns == 0 {
            return Err(ConfigError::Invalid {
                field: "max_settle_turns",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Whether list templates with `tag` render next to their anchor.
    #[must_use]
    pub fn is_adjacent_tag(&self, tag: &str) -> bool {
        self.adjacent_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[cfg(feature = "policy-config")]
impl RuntimeConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|err| ConfigError::Parse {
            format: "toml",
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input).map_err(|err| ConfigError::Parse {
            format: "json",
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to load or validate a [`RuntimeConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document could not be parsed.
    Parse {
        format: &'static str,
        message: String,
    },
    /// A field holds an unusable value.
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { format, message } => write!(f, "invalid {format} config: {message}"),
            Self::Invalid { field, reason } => write!(f, "config field '{field}' {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_slim_vocabulary() {
        let config = RuntimeConfig::default();
        assert_eq!(config.repeat_attribute, "slim-repeat");
        assert_eq!(config.placeholder_tag, "slim-if-helper");
        assert!(config.is_adjacent_tag("tr"));
        assert!(config.is_adjacent_tag("TD"));
        assert!(!config.is_adjacent_tag("li"));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn builders_override_fields() {
        let config = RuntimeConfig::default()
            .with_default_target_attribute("item")
            .with_adjacent_tags(["li"])
            .with_max_settle_turns(4);
        assert_eq!(config.default_target_attribute, "item");
        assert!(config.is_adjacent_tag("li"));
        assert!(!config.is_adjacent_tag("tr"));
        assert_eq!(config.max_settle_turns, 4);
    }

    #[test]
    fn validation_rejects_empty_names_and_zero_turns() {
        let config = RuntimeConfig::default().with_text_bind_attribute(" ");
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "text_bind_attribute",
                reason: "must not be empty",
            })
        );
        let config = RuntimeConfig::default().with_max_settle_turns(0);
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn loads_partial_toml_and_json() {
        let config = RuntimeConfig::from_toml_str("max_settle_turns = 8\ntext_bind_attribute = \"interp\"\n")
            .expect("valid toml");
        assert_eq!(config.max_settle_turns, 8);
        assert_eq!(config.text_bind_attribute, "interp");
        assert_eq!(config.repeat_attribute, "slim-repeat");

        let config = RuntimeConfig::from_json_str(r#"{"adjacent_tags": ["li"]}"#).expect("valid json");
        assert_eq!(config.adjacent_tags, vec!["li".to_owned()]);

        assert!(matches!(
            RuntimeConfig::from_json_str("{"),
            Err(ConfigError::Parse { format: "json", .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str("max_settle_turns = 0"),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
