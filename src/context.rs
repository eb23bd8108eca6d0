//! Per-document resolution context.
//!
//! A [`ResolutionContext`] is built once per document per output format and
//! stays immutable for the duration of one rewrite pass. It carries the
//! merged configuration (template-level config merged with document-level
//! config, the document winning on conflicting keys), a reference table
//! consulted by resolver nodes, the selected choice per named choice group,
//! and the document's position in the larger tree.
//!
//! Contexts clone cheaply: configuration and reference tables live in
//! persistent maps, so a batch can derive hundreds of per-document contexts
//! from one template context without copying.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Element, Span};
use crate::errors::{ErrorReporting, PatraError, ReportContext, SourceContext};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Merged configuration for one document.
///
/// Values are stored as JSON values; typed retrieval deserializes on demand
/// and reports a mistyped value as a configuration error - the fatal error
/// category of a rewrite, distinct from resolution failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    fields: im::HashMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a top-level key. The value may itself be an object; dotted keys
    /// in [`Config::lookup`] traverse into it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`Config::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw lookup. A dotted key (`"epub.toc.depth"`) traverses nested
    /// objects one segment at a time.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Typed lookup. A missing key is `ConfigKeyMissing`; a present but
    /// mistyped value is `ConfigTypeMismatch`. Both are fatal for the
    /// document being rewritten.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, PatraError> {
        let value = self
            .lookup(key)
            .ok_or_else(|| config_reporter().config_key_missing(key))?;
        serde_json::from_value(value.clone()).map_err(|_| {
            config_reporter().config_type_mismatch(
                key,
                std::any::type_name::<T>(),
                json_type_name(value),
            )
        })
    }

    /// Typed lookup where absence is not an error.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PatraError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|_| {
                config_reporter().config_type_mismatch(
                    key,
                    std::any::type_name::<T>(),
                    json_type_name(value),
                )
            }),
        }
    }

    /// Merges a fallback (template-level) configuration under this
    /// (document-level) one. Objects merge deeply; on any conflicting leaf
    /// the document value wins.
    pub fn merged_with(&self, fallback: &Config) -> Config {
        let mut merged = self.fields.clone();
        for (key, fallback_value) in fallback.fields.iter() {
            let replacement = match merged.get(key) {
                None => Some(fallback_value.clone()),
                Some(Value::Object(existing)) => match fallback_value {
                    Value::Object(incoming) => {
                        Some(Value::Object(merge_objects(existing, incoming)))
                    }
                    _ => None,
                },
                Some(_) => None,
            };
            if let Some(value) = replacement {
                merged.insert(key.clone(), value);
            }
        }
        Config { fields: merged }
    }
}

fn merge_objects(
    document: &serde_json::Map<String, Value>,
    template: &serde_json::Map<String, Value>,
) -> serde_json::Map<String, Value> {
    let mut merged = document.clone();
    for (key, template_value) in template {
        let replacement = match merged.get(key) {
            None => Some(template_value.clone()),
            Some(Value::Object(existing)) => match template_value {
                Value::Object(incoming) => Some(Value::Object(merge_objects(existing, incoming))),
                _ => None,
            },
            Some(_) => None,
        };
        if let Some(value) = replacement {
            merged.insert(key.clone(), value);
        }
    }
    merged
}

fn config_reporter() -> ReportContext {
    ReportContext::new(SourceContext::fallback("configuration"), "config")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// TREE POSITION
// ============================================================================

/// A document's position within a multi-document tree, as a chain of path
/// segments. Parent-chain access goes through this value rather than through
/// back-pointers stored on nodes, which keeps the tree itself acyclic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePosition {
    segments: Vec<String>,
}

impl TreePosition {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last path segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for TreePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

// ============================================================================
// RESOLUTION CONTEXT
// ============================================================================

/// Everything a resolver may consult while a document is rewritten.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    config: Config,
    references: im::HashMap<String, Element>,
    selections: im::HashMap<String, String>,
    position: TreePosition,
}

impl ResolutionContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            references: im::HashMap::new(),
            selections: im::HashMap::new(),
            position: TreePosition::root(),
        }
    }

    /// Registers a reference visible from anywhere in the tree.
    pub fn with_reference(mut self, name: impl Into<String>, element: Element) -> Self {
        self.references.insert(name.into(), element);
        self
    }

    /// Registers a reference visible only at the given position and below.
    pub fn with_scoped_reference(
        mut self,
        position: &TreePosition,
        name: &str,
        element: Element,
    ) -> Self {
        self.references.insert(scoped_key(position, name), element);
        self
    }

    /// Records the selected choice for a named choice group.
    pub fn with_selection(mut self, group: impl Into<String>, choice: impl Into<String>) -> Self {
        self.selections.insert(group.into(), choice.into());
        self
    }

    pub fn at_position(mut self, position: TreePosition) -> Self {
        self.position = position;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn position(&self) -> &TreePosition {
        &self.position
    }

    /// The recorded selection for a choice group, if any.
    pub fn selection(&self, group: &str) -> Option<&str> {
        self.selections.get(group).map(String::as_str)
    }

    /// Looks up a reference by name: scoped entries along the parent chain
    /// first (nearest ancestor wins), then tree-wide entries, then ambient
    /// configuration (`ref.<name>` keys holding a string).
    pub fn reference(&self, name: &str) -> Option<Element> {
        let mut scope = Some(self.position.clone());
        while let Some(position) = scope {
            if let Some(element) = self.references.get(&scoped_key(&position, name)) {
                return Some(element.clone());
            }
            scope = position.parent();
        }
        if let Some(element) = self.references.get(name) {
            return Some(element.clone());
        }
        match self.config.lookup(&format!("ref.{}", name)) {
            Some(Value::String(text)) => Some(Element::Span(Span::text(text.clone()))),
            _ => None,
        }
    }
}

impl ErrorReporting for ResolutionContext {
    fn report(&self, kind: crate::errors::ErrorKind, span: miette::SourceSpan) -> PatraError {
        ReportContext::new(
            SourceContext::fallback(&format!("document rewrite at {}", self.position)),
            "rewrite",
        )
        .report(kind, span)
    }
}

fn scoped_key(position: &TreePosition, name: &str) -> String {
    format!("{}#{}", position, name)
}
