use crate::error_reporting::ReportLocation;
use crate::extract::extract_value;
use crate::level::Level;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Boxed error returned by fallible capabilities.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// One log call, as handed over by the front-end.
///
/// A record is built once per log call and consumed exactly once by a
/// handler; it is never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Record {
    /// Event time. `None` keeps the `time` field out of the output.
    pub time: Option<DateTime<Utc>>,
    pub level: Level,
    pub message: String,
    /// Call site, if the front-end captured one.
    pub source: Option<Source>,
    attrs: Vec<Attr>,
}

impl Record {
    pub fn new(time: Option<DateTime<Utc>>, level: Level, message: impl Into<String>) -> Self {
        Record {
            time,
            level,
            message: message.into(),
            source: None,
            attrs: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_attrs<I>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = Attr>,
    {
        self.attrs.extend(attrs);
        self
    }

    /// Attributes in declaration order.
    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    pub fn num_attrs(&self) -> usize {
        self.attrs.len()
    }
}

/// Call-site location captured by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl Source {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Source {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// A key/value pair attached to a record or a derived handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Attr {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Attribute whose value is a nested group.
    pub fn group<I>(key: impl Into<String>, attrs: I) -> Self
    where
        I: IntoIterator<Item = Attr>,
    {
        Attr {
            key: key.into(),
            value: Value::Group(attrs.into_iter().collect()),
        }
    }
}

/// Attribute value.
///
/// Primitives are encoded natively. `Any` wraps a [`Loggable`] whose
/// capabilities decide how it is flattened and encoded.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Time(DateTime<Utc>),
    Level(Level),
    Source(Source),
    Group(Vec<Attr>),
    Any(Arc<dyn Loggable>),
}

impl Value {
    /// Wrap an arbitrary loggable value.
    pub fn any<T: Loggable>(value: T) -> Self {
        Value::Any(Arc::new(value))
    }

    /// Wrap an error so it is flattened to its message and recognised as
    /// a plain error by error reporting.
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Value::Any(Arc::new(ErrorValue(err)))
    }

    /// Wrap a value that renders itself through `Display`.
    pub fn display<T>(value: T) -> Self
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Value::Any(Arc::new(DisplayValue(value)))
    }

    /// Wrap a value that marshals itself with serde when the record is
    /// encoded.
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Value::Any(Arc::new(JsonValue(value)))
    }

    /// Short name of the value's shape, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int64",
            Value::Uint(_) => "uint64",
            Value::Float(_) => "float64",
            Value::Bool(_) => "bool",
            Value::Time(_) => "time",
            Value::Level(_) => "level",
            Value::Source(_) => "source",
            Value::Group(_) => "group",
            Value::Any(v) => v.type_name(),
        }
    }

    pub fn as_loggable(&self) -> Option<&dyn Loggable> {
        match self {
            Value::Any(v) => Some(v.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Level(a), Value::Level(b)) => a == b,
            (Value::Source(a), Value::Source(b)) => a == b,
            (Value::Group(a), Value::Group(b)) => a == b,
            (Value::Any(a), Value::Any(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Textual form of a value, as used for message coercion and diagnostics.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Uint(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Time(t) => f.write_str(&format_time(t)),
            Value::Level(l) => write!(f, "{}", l),
            Value::Source(s) => write!(f, "{}:{}", s.file, s.line),
            Value::Group(attrs) => {
                f.write_str("[")?;
                for (i, a) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}={}", a.key, a.value)?;
                }
                f.write_str("]")
            }
            Value::Any(v) => {
                if let Some(err) = v.as_error() {
                    write!(f, "{}", err)
                } else if let Some(s) = v.render() {
                    f.write_str(&s)
                } else {
                    write!(f, "{:?}", v)
                }
            }
        }
    }
}

/// Default encoding of a value.
///
/// `Any` values are asked, in order, to marshal to JSON, marshal to text,
/// describe themselves as an error, render to a string or produce a
/// loggable representation; failing all of those their `Debug` text is
/// written.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Uint(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Time(t) => serializer.serialize_str(&format_time(t)),
            Value::Level(l) => serializer.collect_str(l),
            Value::Source(s) => s.serialize(serializer),
            Value::Group(_) => extract_value(self).serialize(serializer),
            Value::Any(v) => {
                if let Some(res) = v.marshal_json() {
                    let json = res.map_err(|e| {
                        S::Error::custom(format!("marshal {}: {}", v.type_name(), e))
                    })?;
                    return json.serialize(serializer);
                }
                if let Some(res) = v.marshal_text() {
                    let text = res.map_err(|e| {
                        S::Error::custom(format!("marshal {} as text: {}", v.type_name(), e))
                    })?;
                    return serializer.serialize_str(&text);
                }
                if let Some(err) = v.as_error() {
                    return serializer.collect_str(err);
                }
                if let Some(s) = v.render() {
                    return serializer.serialize_str(&s);
                }
                if let Some(inner) = v.log_value() {
                    return extract_value(&inner).serialize(serializer);
                }
                serializer.collect_str(&format_args!("{:?}", v))
            }
        }
    }
}

/// RFC 3339 in UTC with as many fraction digits as needed, none for whole
/// seconds.
pub(crate) fn format_time(t: &DateTime<Utc>) -> String {
    let full = t.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let secs = full.trim_end_matches('Z');
    let secs = secs.trim_end_matches('0').trim_end_matches('.');
    format!("{}Z", secs)
}

/// Optional behaviours a value may expose.
///
/// Every capability defaults to "absent"; implementors override the ones
/// they support. Handlers probe them in a fixed priority order.
pub trait Loggable: fmt::Debug + Send + Sync + 'static {
    /// Replacement value to log instead of `self`. May itself be a group.
    fn log_value(&self) -> Option<Value> {
        None
    }

    /// Whether the value marshals itself through [`Loggable::marshal_json`]
    /// or [`Loggable::marshal_text`]. Implementors of either must return
    /// `true` here. The extractor only checks this; the marshal methods
    /// are invoked once, by the encoder.
    fn marshals(&self) -> bool {
        false
    }

    /// Structured JSON form. Evaluated by the encoder, not the extractor.
    fn marshal_json(&self) -> Option<Result<serde_json::Value, BoxError>> {
        None
    }

    /// Text form. Evaluated by the encoder, not the extractor.
    fn marshal_text(&self) -> Option<Result<String, BoxError>> {
        None
    }

    /// The value viewed as an error.
    fn as_error(&self) -> Option<&(dyn Error + 'static)> {
        None
    }

    /// String rendering of the value.
    fn render(&self) -> Option<String> {
        None
    }

    /// Stack trace captured where the error was created. `None` when the
    /// value carries no trace.
    fn stack_trace(&self) -> Option<Vec<u8>> {
        None
    }

    /// Where the error was created, if known.
    fn report_location(&self) -> Option<ReportLocation> {
        None
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

struct ErrorValue<E>(E);

impl<E: fmt::Debug> fmt::Debug for ErrorValue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> Loggable for ErrorValue<E>
where
    E: Error + Send + Sync + 'static,
{
    fn as_error(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }
}

struct DisplayValue<T>(T);

impl<T: fmt::Debug> fmt::Debug for DisplayValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> Loggable for DisplayValue<T>
where
    T: fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    fn render(&self) -> Option<String> {
        Some(self.0.to_string())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

struct JsonValue<T>(T);

impl<T: fmt::Debug> fmt::Debug for JsonValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> Loggable for JsonValue<T>
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn marshals(&self) -> bool {
        true
    }

    fn marshal_json(&self) -> Option<Result<serde_json::Value, BoxError>> {
        Some(serde_json::to_value(&self.0).map_err(Into::into))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v as u64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Uint(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Level> for Value {
    fn from(v: Level) -> Self {
        Value::Level(v)
    }
}

impl From<Source> for Value {
    fn from(v: Source) -> Self {
        Value::Source(v)
    }
}

impl From<Vec<Attr>> for Value {
    fn from(v: Vec<Attr>) -> Self {
        Value::Group(v)
    }
}
