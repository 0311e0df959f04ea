use crate::level::Severity;
use crate::record::{Attr, Value};

/// Keys of the attributes a front-end adds to every record.
pub const TIME_KEY: &str = "time";
pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "message";
pub const SOURCE_KEY: &str = "source";

/// Cloud Logging replacements for the front-end keys.
/// See <https://cloud.google.com/logging/docs/structured-logging>.
pub const SEVERITY_KEY: &str = "severity";
pub const SOURCE_LOCATION_KEY: &str = "logging.googleapis.com/sourceLocation";

/// Replace the front-end's default attributes with Cloud Logging ones.
///
/// Only attributes outside of any group are touched. The level becomes a
/// severity label (`DEFAULT` when the value is not a level), the source is
/// re-keyed, the message is re-keyed and turned into a string. The time
/// key and format already match the Cloud Logging convention.
///
/// Has the signature expected for [`HandlerOptions::replace_attr`], so it
/// can be plugged into handlers that do not special-case these keys.
///
/// [`HandlerOptions::replace_attr`]: crate::handler::HandlerOptions::replace_attr
pub fn replace_attr(groups: &[String], attr: Attr) -> Attr {
    if !groups.is_empty() {
        return attr;
    }
    match attr.key.as_str() {
        LEVEL_KEY => {
            let severity = match attr.value {
                Value::Level(level) => Severity::from_level(level),
                _ => Severity::Default,
            };
            Attr::new(SEVERITY_KEY, severity.as_str())
        }
        SOURCE_KEY => match attr.value {
            Value::Source(_) => Attr {
                key: SOURCE_LOCATION_KEY.to_string(),
                value: attr.value,
            },
            _ => attr,
        },
        MESSAGE_KEY => {
            let text = attr.value.to_string();
            Attr::new(MESSAGE_KEY, text)
        }
        _ => attr,
    }
}
