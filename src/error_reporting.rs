use crate::extract::{extract_value, Extracted};
use crate::record::{Attr, Loggable, Value};
use crate::replace::MESSAGE_KEY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key whose value triggers an error report.
///
/// The value may be a string, an error, or any [`Loggable`] exposing
/// [`Loggable::stack_trace`] and/or [`Loggable::report_location`].
pub const ERROR_KEY: &str = "error";

// Error Reporting fields.
// See https://cloud.google.com/error-reporting/docs/formatting-error-messages.
pub const ERROR_REPORT_TYPE_KEY: &str = "@type";
pub const ERROR_REPORT_TYPE_VALUE: &str =
    "type.googleapis.com/google.devtools.clouderrorreporting.v1beta1.ReportedErrorEvent";
pub const REPORT_LOCATION_KEY: &str = "reportLocation";
pub const FILE_PATH_KEY: &str = "filePath";
pub const LINE_NUMBER_KEY: &str = "lineNumber";
pub const FUNCTION_NAME_KEY: &str = "functionName";

/// Where an error was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocation {
    pub file_path: String,
    pub line_number: u32,
    pub function_name: String,
}

impl ReportLocation {
    pub fn new(file_path: impl Into<String>, line_number: u32, function_name: impl Into<String>) -> Self {
        ReportLocation {
            file_path: file_path.into(),
            line_number,
            function_name: function_name.into(),
        }
    }

    /// Capture the location of a frame on the current call stack.
    ///
    /// `skip` counts frames above the caller: 0 is the function calling
    /// `capture`, 1 its caller, and so on. Returns `None` when the stack is
    /// not that deep or the frame cannot be resolved to a file and line
    /// (e.g. a binary built without debug info).
    #[inline(never)]
    pub fn capture(skip: usize) -> Option<ReportLocation> {
        let mut frames: Vec<ResolvedFrame> = Vec::new();
        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                frames.push(ResolvedFrame {
                    function: symbol.name().map(|n| format!("{:#}", n)).unwrap_or_default(),
                    file: symbol.filename().map(|p| p.display().to_string()),
                    line: symbol.lineno(),
                });
            });
            true
        });

        // Innermost first: unwinder internals, then this function.
        let own = frames
            .iter()
            .rposition(|f| f.function.contains("ReportLocation::capture"))?;
        let frame = frames.get(own + 1 + skip)?;
        Some(ReportLocation {
            file_path: frame.file.clone()?,
            line_number: frame.line?,
            function_name: frame.function.clone(),
        })
    }
}

struct ResolvedFrame {
    function: String,
    file: Option<String>,
    line: Option<u32>,
}

/// Lets a location be logged directly, also through other handlers.
impl Loggable for ReportLocation {
    fn log_value(&self) -> Option<Value> {
        Some(Value::Group(vec![
            Attr::new(FILE_PATH_KEY, self.file_path.as_str()),
            Attr::new(LINE_NUMBER_KEY, self.line_number),
            Attr::new(FUNCTION_NAME_KEY, self.function_name.as_str()),
        ]))
    }
}

/// Capture a [`ReportLocation`] for the place the macro is expanded:
/// file, line and the path of the enclosing function.
///
/// Resolved at compile time, so it works without debug info. Use
/// [`ReportLocation::capture`] to attribute the location to a caller.
///
/// ```
/// let loc = gcp_log_sink::report_location!();
/// assert!(loc.file_path.ends_with(".rs"));
/// ```
#[macro_export]
macro_rules! report_location {
    () => {{
        fn __here() {}
        fn __name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = __name_of(__here);
        let name = name.strip_suffix("::__here").unwrap_or(name);
        $crate::error_reporting::ReportLocation::new(file!(), line!(), name)
    }};
}

/// Work out the report message and location for an error value.
///
/// A non-empty stack trace always becomes the message. A report location
/// is taken from the value when it provides one. Without a trace the
/// message comes from the value itself: the error text, the string, or a
/// diagnostic for unsupported shapes, which also pins the location to
/// this function so the misuse can be found.
pub fn assert_error_value(value: &Value) -> (String, Option<ReportLocation>) {
    let loggable = value.as_loggable();

    let trace = loggable
        .and_then(|v| v.stack_trace())
        .filter(|trace| !trace.is_empty())
        .map(|trace| String::from_utf8_lossy(&trace).into_owned());
    let location = loggable.and_then(|v| v.report_location());

    if let Some(trace) = trace {
        return (trace, location);
    }

    if let Some(err) = loggable.and_then(|v| v.as_error()) {
        return (err.to_string(), location);
    }
    if let Value::String(s) = value {
        return (s.clone(), location);
    }

    (
        format!(
            "gcp_log_sink: unsupported type {} for error with value {}",
            value.type_name(),
            value
        ),
        Some(report_location!()),
    )
}

/// Write the error report fields into `out` if `attr` is the error attribute.
///
/// Returns whether an error report was written.
pub(crate) fn check_and_set_error_report(attr: &Attr, out: &mut BTreeMap<String, Extracted>) -> bool {
    if attr.key != ERROR_KEY {
        return false;
    }
    let (message, location) = assert_error_value(&attr.value);
    out.insert(
        ERROR_REPORT_TYPE_KEY.to_string(),
        Value::from(ERROR_REPORT_TYPE_VALUE).into(),
    );
    out.insert(MESSAGE_KEY.to_string(), Value::String(message).into());
    if let Some(location) = location {
        out.insert(REPORT_LOCATION_KEY.to_string(), extract_value(&Value::any(location)));
    }
    out.insert(ERROR_KEY.to_string(), error_field(&attr.value));
    true
}

fn error_field(value: &Value) -> Extracted {
    if let Some(v) = value.as_loggable() {
        if let Some(inner) = v.log_value() {
            return extract_value(&inner);
        }
        if let Some(err) = v.as_error() {
            return Value::String(err.to_string()).into();
        }
    }
    value.clone().into()
}
