use serde::Deserialize;
use serde_json::{Map, Value};

use super::{CompileError, CompileErrorType};
use crate::error_handling::Location;

// One rule's definition: a single body, or alternative bodies
#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody {
    Text(String),
    Alternatives(Vec<String>),
}

impl From<&str> for RuleBody {
    fn from(text: &str) -> Self {
        RuleBody::Text(text.to_string())
    }
}

impl From<Vec<&str>> for RuleBody {
    fn from(texts: Vec<&str>) -> Self {
        RuleBody::Alternatives(texts.into_iter().map(str::to_string).collect())
    }
}

// Everything needed to compile one grammar. Rules keep their definition
// order, which decides id assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrammarSource {
    pub name: String,
    pub private: Vec<(String, RuleBody)>,
    pub public: Vec<(String, RuleBody)>,
}

#[derive(Deserialize)]
struct Document {
    name: String,
    public: Map<String, Value>,
    #[serde(default)]
    private: Map<String, Value>,
}

fn document_error(rule: &str, message: String) -> CompileError {
    CompileError {
        location: Location::rule(rule),
        error: CompileErrorType::Document(message),
    }
}

fn rule_body(name: &str, value: &Value) -> Result<RuleBody, CompileError> {
    match value {
        Value::String(text) => Ok(RuleBody::Text(text.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                _ => Err(document_error(name, format!("Rule array \"{}\" contains a non-string rule.", name))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RuleBody::Alternatives),
        _ => Err(document_error(
            name,
            format!("Rule \"{}\" has unsupported json type. Must be a string or array of strings.", name),
        )),
    }
}

fn rule_bodies(rules: &Map<String, Value>) -> Result<Vec<(String, RuleBody)>, CompileError> {
    rules
        .iter()
        .map(|(name, value)| Ok((name.clone(), rule_body(name, value)?)))
        .collect()
}

impl GrammarSource {
    pub fn new(name: &str) -> Self {
        GrammarSource {
            name: name.to_string(),
            ..GrammarSource::default()
        }
    }

    pub fn private_rule(mut self, name: &str, body: impl Into<RuleBody>) -> Self {
        self.private.push((name.to_string(), body.into()));
        self
    }

    pub fn public_rule(mut self, name: &str, body: impl Into<RuleBody>) -> Self {
        self.public.push((name.to_string(), body.into()));
        self
    }

    // Reads a grammar document: `{"name": ..., "public": {...}, "private": {...}}`.
    // Other top-level keys are ignored.
    pub fn from_value(value: Value) -> Result<Self, CompileError> {
        let document: Document =
            serde_json::from_value(value).map_err(|e| document_error("", e.to_string()))?;
        Ok(GrammarSource {
            private: rule_bodies(&document.private)?,
            public: rule_bodies(&document.public)?,
            name: document.name,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, CompileError> {
        let value = serde_json::from_str(text).map_err(|e| document_error("", e.to_string()))?;
        Self::from_value(value)
    }
}
