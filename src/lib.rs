//! Write structured log records as JSON lines understood by Google Cloud
//! Logging and Error Reporting.
//!
//! - <https://cloud.google.com/logging/docs/structured-logging>
//! - <https://cloud.google.com/error-reporting/docs/formatting-error-messages>

pub mod error_reporting;
pub mod extract;
pub mod handler;
pub mod level;
pub mod logger;
pub mod record;
pub mod replace;
pub mod sink;

pub mod env;

#[cfg(feature = "tracing")]
pub mod init;
#[cfg(feature = "tracing")]
pub mod layer;

pub use error_reporting::{assert_error_value, ReportLocation, ERROR_KEY};
pub use extract::{extract_value, Extracted};
pub use handler::{GcpHandler, Handler, HandlerError, HandlerOptions};
pub use level::{Level, Severity};
pub use logger::Logger;
pub use record::{Attr, Loggable, Record, Source, Value};
pub use replace::replace_attr;
