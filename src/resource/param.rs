//! Configuration parameters and typed decoding.

use base64::Engine;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

/// Decoders shared by every parameter that is decoded without an explicit registry.
static STANDARD_DECODERS: LazyLock<DecoderRegistry> = LazyLock::new(DecoderRegistry::standard);

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    List(Vec<String>),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

/// Errors raised while decoding a parameter value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown parameter type '{type_name}'")]
    UnknownType { type_name: String },

    #[error("Failed to decode '{value}' as {type_name}: {reason}")]
    Invalid {
        type_name: String,
        value: String,
        reason: String,
    },
}

impl DecodeError {
    fn invalid(type_name: &str, value: &str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            type_name: type_name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Turns a raw parameter string into a typed value.
pub trait DataDecoder: Send + Sync {
    fn decode(&self, value: &str) -> Result<ParamValue, DecodeError>;
}

impl<F> DataDecoder for F
where
    F: Fn(&str) -> Result<ParamValue, DecodeError> + Send + Sync,
{
    fn decode(&self, value: &str) -> Result<ParamValue, DecodeError> {
        self(value)
    }
}

/// Decoders keyed by lowercase type name.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn DataDecoder>>,
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.decoders.keys().collect();
        types.sort();
        f.debug_struct("DecoderRegistry").field("types", &types).finish()
    }
}

impl DecoderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in decoders.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("string", |v: &str| Ok(ParamValue::String(v.to_string())));
        for name in ["integer", "int", "long"] {
            registry.register(name, move |v: &str| {
                v.trim()
                    .parse::<i64>()
                    .map(ParamValue::Integer)
                    .map_err(|e| DecodeError::invalid(name, v, e))
            });
        }
        for name in ["decimal", "float", "double"] {
            registry.register(name, move |v: &str| {
                v.trim()
                    .parse::<f64>()
                    .map(ParamValue::Decimal)
                    .map_err(|e| DecodeError::invalid(name, v, e))
            });
        }
        registry.register("boolean", |v: &str| match v.trim() {
            t if t.eq_ignore_ascii_case("true") => Ok(ParamValue::Boolean(true)),
            f if f.eq_ignore_ascii_case("false") => Ok(ParamValue::Boolean(false)),
            _ => Err(DecodeError::invalid("boolean", v, "expected 'true' or 'false'")),
        });
        registry.register("csv", |v: &str| {
            Ok(ParamValue::List(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ))
        });
        registry.register("base64", |v: &str| {
            base64::engine::general_purpose::STANDARD
                .decode(v.trim())
                .map(ParamValue::Bytes)
                .map_err(|e| DecodeError::invalid("base64", v, e))
        });
        registry.register("url", |v: &str| {
            urlencoding::decode(v)
                .map(|s| ParamValue::String(s.into_owned()))
                .map_err(|e| DecodeError::invalid("url", v, e))
        });
        registry.register("json", |v: &str| {
            serde_json::from_str(v)
                .map(ParamValue::Json)
                .map_err(|e| DecodeError::invalid("json", v, e))
        });
        registry
    }

    /// Register (or replace) a decoding function.
    pub fn register<F>(&mut self, type_name: &str, decoder: F)
    where
        F: Fn(&str) -> Result<ParamValue, DecodeError> + Send + Sync + 'static,
    {
        self.register_decoder(type_name, Arc::new(decoder));
    }

    /// Register (or replace) a decoder.
    pub fn register_decoder(&mut self, type_name: &str, decoder: Arc<dyn DataDecoder>) {
        self.decoders
            .insert(type_name.to_ascii_lowercase(), decoder);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(&type_name.to_ascii_lowercase())
    }

    /// Decode `value` with the decoder registered for `type_name`.
    pub fn decode(&self, type_name: &str, value: &str) -> Result<ParamValue, DecodeError> {
        let decoder = self
            .decoders
            .get(&type_name.to_ascii_lowercase())
            .ok_or_else(|| DecodeError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        decoder.decode(value)
    }
}

/// A named configuration parameter.
///
/// The typed value is decoded lazily and memoized per parameter. Concurrent
/// first access may decode more than once but only the first result is kept.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    value: String,
    param_type: Option<String>,
    decoded: OnceLock<Result<ParamValue, DecodeError>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            param_type: None,
            decoded: OnceLock::new(),
        }
    }

    pub fn typed(
        name: impl Into<String>,
        value: impl Into<String>,
        param_type: impl Into<String>,
    ) -> Self {
        Self {
            param_type: Some(param_type.into()),
            ..Self::new(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw string value.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn param_type(&self) -> Option<&str> {
        self.param_type.as_deref()
    }

    /// Typed value, decoded once with the built-in decoders and memoized.
    /// Untyped parameters decode as `string`.
    pub fn typed_value(&self) -> Result<&ParamValue, DecodeError> {
        self.decoded
            .get_or_init(|| STANDARD_DECODERS.decode(self.type_name(), &self.value))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Typed value, decoded with `registry` on every call. Not memoized.
    pub fn decode_with(&self, registry: &DecoderRegistry) -> Result<ParamValue, DecodeError> {
        registry.decode(self.type_name(), &self.value)
    }

    fn type_name(&self) -> &str {
        self.param_type.as_deref().unwrap_or("string")
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.param_type == other.param_type
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param_type {
            Some(t) => write!(f, "{}={} ({})", self.name, self.value, t),
            None => write!(f, "{}={}", self.name, self.value),
        }
    }
}

/// Ordered multi-map of parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter; earlier parameters of the same name are kept.
    pub fn add(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// First parameter with this name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Every parameter with this name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Parameter> + 'a {
        self.params.iter().filter(move |p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every parameter with this name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.params.len();
        self.params.retain(|p| p.name != name);
        before - self.params.len()
    }

    /// Distinct names, in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for param in &self.params {
            if !names.contains(&param.name.as_str()) {
                names.push(&param.name);
            }
        }
        names
    }

    /// Add every parameter from `other` whose name is not already present.
    pub fn merge(&mut self, other: &Parameters) {
        let existing: Vec<String> = self.names().into_iter().map(str::to_string).collect();
        for param in &other.params {
            if !existing.iter().any(|n| *n == param.name) {
                self.params.push(param.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Total count, duplicates included.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}
