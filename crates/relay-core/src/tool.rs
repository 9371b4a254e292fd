//! Provider-agnostic tool (function calling) definitions.
//!
//! These shapes are the universal representation that each adapter translates
//! into its provider's declaration format, preserving parameter names, types,
//! descriptions, and required lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The only tool kind currently supported by any provider.
pub const TOOL_KIND_FUNCTION: &str = "function";

/// Schema for a function the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool kind, always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function definition.
    pub function: FunctionSpec,
}

impl Tool {
    /// Create a function tool. Reduces boilerplate and guarantees the kind tag.
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonSchema,
    ) -> Self {
        Self {
            kind: TOOL_KIND_FUNCTION.to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Name, description and parameters of a callable function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Function name (e.g. "getCurrentWeather").
    pub name: String,
    /// What the function does. The model uses this to decide when to call it.
    pub description: String,
    /// Argument schema.
    pub parameters: JsonSchema,
}

/// Allowed schema node types. The gateway's tool schemas are restricted to
/// this subset; every provider dialect can express it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// A JSON object with named properties.
    Object,
    /// A string value.
    String,
    /// A floating-point number.
    Number,
    /// An integer.
    Integer,
}

/// A structured, type-safe subset of JSON Schema for tool parameters.
///
/// Properties use a `BTreeMap` so serialized schemas are byte-stable across
/// runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Node type.
    #[serde(rename = "type")]
    pub kind: SchemaType,
    /// What this node means, for parameter nodes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Child schemas for object nodes, keyed by parameter name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonSchema>,
    /// Names of mandatory parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl JsonSchema {
    /// An object schema with the given properties and required list.
    #[must_use]
    pub fn object(
        properties: impl IntoIterator<Item = (&'static str, JsonSchema)>,
        required: &[&str],
    ) -> Self {
        Self {
            kind: SchemaType::Object,
            description: String::new(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            required: required.iter().map(ToString::to_string).collect(),
        }
    }

    /// A described string parameter.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            kind: SchemaType::String,
            description: description.into(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// A described number parameter.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self {
            kind: SchemaType::Number,
            description: description.into(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// A described integer parameter.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self {
            kind: SchemaType::Integer,
            description: description.into(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// A request from the model to invoke a named function.
///
/// The `id` is opaque and unique within one assistant turn; the tool-result
/// message answering this call must carry it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id for matching the result back to this call.
    pub id: String,
    /// Tool kind, always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function the model wants to run.
    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a function tool call.
    #[must_use]
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TOOL_KIND_FUNCTION.to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name plus JSON-encoded arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments as a JSON-encoded string.
    pub arguments: String,
}
