use crate::record::{Attr, Value};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// JSON-encodable result of flattening a [`Value`].
///
/// Groups become maps; everything else is kept as a [`Value`] and left to
/// the default encoding in `Value`'s `Serialize` impl.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Map(BTreeMap<String, Extracted>),
    Value(Value),
}

impl Extracted {
    pub fn as_map(&self) -> Option<&BTreeMap<String, Extracted>> {
        match self {
            Extracted::Map(m) => Some(m),
            Extracted::Value(_) => None,
        }
    }
}

impl Serialize for Extracted {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Extracted::Map(m) => m.serialize(serializer),
            Extracted::Value(v) => v.serialize(serializer),
        }
    }
}

impl From<Value> for Extracted {
    fn from(v: Value) -> Self {
        Extracted::Value(v)
    }
}

/// Flatten a value into its encodable form.
///
/// Rules, first match wins:
/// 1. groups are expanded into maps, later duplicate keys overwrite earlier ones;
/// 2. values with a loggable representation are replaced by it, recursively;
/// 3. values that marshal themselves (JSON or text) are kept as they are;
/// 4. errors become their message;
/// 5. values that render to a string become that string;
/// 6. anything else is kept for the default encoding.
pub fn extract_value(value: &Value) -> Extracted {
    match value {
        Value::Group(attrs) => Extracted::Map(extract_group(attrs)),
        Value::Any(v) => {
            if let Some(inner) = v.log_value() {
                return extract_value(&inner);
            }
            if v.marshals() {
                return Extracted::Value(value.clone());
            }
            if let Some(err) = v.as_error() {
                return Extracted::Value(Value::String(err.to_string()));
            }
            if let Some(s) = v.render() {
                return Extracted::Value(Value::String(s));
            }
            Extracted::Value(value.clone())
        }
        other => Extracted::Value(other.clone()),
    }
}

fn extract_group(attrs: &[Attr]) -> BTreeMap<String, Extracted> {
    let mut m = BTreeMap::new();
    for a in attrs {
        m.insert(a.key.clone(), extract_value(&a.value));
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BoxError, Loggable};
    use std::fmt;

    #[derive(Debug)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Loggable for Point {
        fn log_value(&self) -> Option<Value> {
            Some(Value::Group(vec![Attr::new("x", self.x), Attr::new("y", self.y)]))
        }
    }

    #[derive(Debug)]
    struct Nested;

    impl Loggable for Nested {
        fn log_value(&self) -> Option<Value> {
            Some(Value::any(Point { x: 1, y: 2 }))
        }
    }

    #[derive(Debug)]
    struct ErrAndStringer;

    impl fmt::Display for ErrAndStringer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("error text")
        }
    }

    impl std::error::Error for ErrAndStringer {}

    impl Loggable for ErrAndStringer {
        fn as_error(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(self)
        }

        fn render(&self) -> Option<String> {
            Some("string form".to_string())
        }
    }

    #[derive(Debug)]
    struct Marshaller;

    impl Loggable for Marshaller {
        fn marshals(&self) -> bool {
            true
        }

        fn marshal_json(&self) -> Option<Result<serde_json::Value, BoxError>> {
            Some(Ok(serde_json::json!({"key": "value"})))
        }

        fn render(&self) -> Option<String> {
            Some("should not be used".to_string())
        }
    }

    fn to_json(e: &Extracted) -> serde_json::Value {
        serde_json::to_value(e).unwrap()
    }

    #[test]
    fn groups_become_maps_with_last_key_winning() {
        let v = Value::Group(vec![
            Attr::new("a", 1),
            Attr::group("inner", vec![Attr::new("b", true)]),
            Attr::new("a", 2),
        ]);
        assert_eq!(
            to_json(&extract_value(&v)),
            serde_json::json!({"a": 2, "inner": {"b": true}})
        );
    }

    #[test]
    fn loggable_representation_is_followed_recursively() {
        assert_eq!(
            to_json(&extract_value(&Value::any(Nested))),
            serde_json::json!({"x": 1, "y": 2})
        );
    }

    #[test]
    fn error_wins_over_stringer() {
        let got = extract_value(&Value::any(ErrAndStringer));
        assert_eq!(got, Extracted::Value(Value::String("error text".into())));
    }

    #[test]
    fn marshallers_pass_through_untouched() {
        let v = Value::any(Marshaller);
        let got = extract_value(&v);
        assert_eq!(got, Extracted::Value(v));
        assert_eq!(to_json(&got), serde_json::json!({"key": "value"}));
    }

    #[test]
    fn stringer_renders() {
        let got = extract_value(&Value::display(std::net::Ipv4Addr::LOCALHOST));
        assert_eq!(got, Extracted::Value(Value::String("127.0.0.1".into())));
    }

    #[test]
    fn primitives_are_unchanged_when_flattened_again() {
        for v in [
            Value::String("s".into()),
            Value::Int(-3),
            Value::Uint(3),
            Value::Float(1.5),
            Value::Bool(false),
        ] {
            let once = extract_value(&v);
            assert_eq!(once, Extracted::Value(v.clone()));
            let Extracted::Value(flat) = once else { unreachable!() };
            assert_eq!(extract_value(&flat), Extracted::Value(v));
        }
    }
}
