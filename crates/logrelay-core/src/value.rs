//! Structured payload values and their human-readable rendering.
//!
//! On the wire a `Value` is plain JSON. Structured values are JSON objects
//! tagged with `_type`:
//!
//! ```json
//! {"_type": "exception", "class": "RuntimeException", "message": "boom",
//!  "code": 0, "file": "a.go", "line": 10, "trace": ""}
//! {"_type": "object", "class": "Uri", "value": "https://example.org"}
//! {"_type": "object", "class": "User", "properties": {"id": 7}}
//! {"_type": "resource", "type": "stream"}
//! ```
//!
//! Any other JSON object is an ordered map and renders as JSON.

use std::{error::Error as StdError, fmt, panic::Location};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

const TYPE_TAG: &str = "_type";

/// Ordered name/value pairs.
pub type Fields = Vec<(String, Value)>;

/// One item of an event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// A captured error.
    Exception(ExceptionValue),
    /// An object, either through its string form or its fields.
    Object(ObjectValue),
    /// An opaque OS handle.
    Resource { resource_type: String },
    Array(Vec<Value>),
    /// An untagged JSON object.
    Map(Fields),
}

/// Exception details as captured by the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionValue {
    pub class_name: String,
    pub message: String,
    pub code: i64,
    pub file: String,
    pub line: u64,
    pub trace: String,
}

/// A structured object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub class_name: String,
    pub repr: ObjectRepr,
}

/// How an object was captured.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectRepr {
    /// The object's own string representation.
    Display(String),
    /// The object's public fields.
    Fields(Fields),
}

impl Value {
    /// Capture an error raised at the caller's location.
    #[must_use]
    #[track_caller]
    pub fn from_error<E>(err: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        let location = Location::caller();
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self::Exception(ExceptionValue {
            class_name: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            code: 0,
            file: location.file().to_string(),
            line: u64::from(location.line()),
            trace: trace.join("\n"),
        })
    }

    /// Capture an object through its `Display` implementation.
    #[must_use]
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
        Self::Object(ObjectValue {
            class_name: std::any::type_name::<T>().to_string(),
            repr: ObjectRepr::Display(value.to_string()),
        })
    }

    /// Capture an object through its serialized fields.
    ///
    /// # Errors
    /// Returns error if `value` cannot be serialized.
    pub fn object<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let fields = match serde_json::to_value(value)? {
            Json::Object(map) => map.into_iter().map(|(k, v)| (k, Self::from(v))).collect(),
            other => vec![("value".to_string(), Self::from(other))],
        };
        Ok(Self::Object(ObjectValue {
            class_name: std::any::type_name::<T>().to_string(),
            repr: ObjectRepr::Fields(fields),
        }))
    }

    /// A resource handle of the given kind.
    #[must_use]
    pub fn resource(resource_type: impl Into<String>) -> Self {
        Self::Resource {
            resource_type: resource_type.into(),
        }
    }

    /// Render for humans.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Exception(e) => {
                format!("{}: {} in {}:{}", e.class_name, e.message, e.file, e.line)
            }
            Self::Object(ObjectValue {
                class_name,
                repr: ObjectRepr::Display(text),
            }) => format!("{class_name}: {text}"),
            Self::Object(ObjectValue {
                class_name,
                repr: ObjectRepr::Fields(fields),
            }) => format!("{class_name} {}", fields_to_json(fields)),
            Self::Resource { resource_type } => format!("Resource({resource_type})"),
            Self::Array(_) | Self::Map(_) => self.to_json().to_string(),
        }
    }

    /// Convert to plain JSON in the tagged wire format.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => Json::Number(n.clone()),
            Self::String(s) => Json::String(s.clone()),
            Self::Exception(e) => {
                let mut map = tagged("exception");
                map.insert("class".into(), e.class_name.clone().into());
                map.insert("message".into(), e.message.clone().into());
                map.insert("code".into(), e.code.into());
                map.insert("file".into(), e.file.clone().into());
                map.insert("line".into(), e.line.into());
                map.insert("trace".into(), e.trace.clone().into());
                Json::Object(map)
            }
            Self::Object(o) => {
                let mut map = tagged("object");
                map.insert("class".into(), o.class_name.clone().into());
                match &o.repr {
                    ObjectRepr::Display(text) => {
                        map.insert("value".into(), text.clone().into());
                    }
                    ObjectRepr::Fields(fields) => {
                        map.insert("properties".into(), fields_to_json(fields));
                    }
                }
                Json::Object(map)
            }
            Self::Resource { resource_type } => {
                let mut map = tagged("resource");
                map.insert("type".into(), resource_type.clone().into());
                Json::Object(map)
            }
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(fields) => fields_to_json(fields),
        }
    }
}

/// Render a payload: every item rendered, joined by a single space.
#[must_use]
pub fn render_payload(payload: &[Value]) -> String {
    payload
        .iter()
        .map(Value::render)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tagged(tag: &str) -> Map<String, Json> {
    let mut map = Map::new();
    map.insert(TYPE_TAG.into(), tag.into());
    map
}

fn fields_to_json(fields: &[(String, Value)]) -> Json {
    Json::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

fn into_fields(map: Map<String, Json>) -> Fields {
    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

fn str_field(map: &Map<String, Json>, name: &str) -> Option<String> {
    map.get(name).and_then(Json::as_str).map(str::to_string)
}

/// A scalar field as text. Numbers and booleans are stringified.
fn text_field(map: &Map<String, Json>, name: &str) -> Option<String> {
    match map.get(name)? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// An integer field. Floats are truncated and numeric strings parsed.
#[allow(clippy::cast_possible_truncation)]
fn int_field(map: &Map<String, Json>, name: &str) -> Option<i64> {
    let truncate = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    match map.get(name)? {
        Json::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Json::String(s) => s
            .trim()
            .parse()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().and_then(truncate)),
        _ => None,
    }
}

/// Decode a `_type`-tagged object, or `None` if it is not a well-formed one.
fn decode_tagged(map: &Map<String, Json>) -> Option<Value> {
    match map.get(TYPE_TAG)?.as_str()? {
        "exception" => Some(Value::Exception(ExceptionValue {
            class_name: str_field(map, "class")?,
            message: text_field(map, "message")?,
            code: int_field(map, "code").unwrap_or_default(),
            file: text_field(map, "file")?,
            line: int_field(map, "line").and_then(|l| u64::try_from(l).ok())?,
            trace: str_field(map, "trace").unwrap_or_default(),
        })),
        "object" => {
            let class_name = str_field(map, "class")?;
            let repr = if let Some(text) = str_field(map, "value") {
                ObjectRepr::Display(text)
            } else {
                match map.get("properties") {
                    Some(Json::Object(props)) => ObjectRepr::Fields(into_fields(props.clone())),
                    // An object without public fields arrives as an empty list.
                    Some(Json::Array(items)) if items.is_empty() => ObjectRepr::Fields(Vec::new()),
                    _ => return None,
                }
            };
            Some(Value::Object(ObjectValue { class_name, repr }))
        }
        "resource" => Some(Value::Resource {
            resource_type: str_field(map, "type")?,
        }),
        _ => None,
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n),
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => decode_tagged(&map).unwrap_or_else(|| Self::Map(into_fields(map))),
        }
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
