use gcp_log_sink::{
    Attr, GcpHandler, HandlerOptions, Loggable, Logger, ReportLocation, Value, ERROR_KEY,
};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Application error carrying where it was created and a stack trace.
#[derive(Debug)]
struct AppError {
    message: String,
    parent: std::io::Error,
    location: Option<ReportLocation>,
    trace: Vec<u8>,
}

impl AppError {
    /// The report location names the function that created the error.
    #[inline(never)]
    fn new(message: &str, parent: std::io::Error) -> Self {
        AppError {
            message: message.to_string(),
            parent,
            location: ReportLocation::capture(1),
            trace: std::backtrace::Backtrace::force_capture().to_string().into_bytes(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.message, self.parent)
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.parent)
    }
}

impl Loggable for AppError {
    fn as_error(&self) -> Option<&(dyn Error + 'static)> {
        Some(self)
    }

    fn stack_trace(&self) -> Option<Vec<u8>> {
        Some(self.trace.clone())
    }

    fn report_location(&self) -> Option<ReportLocation> {
        self.location.clone()
    }

    fn log_value(&self) -> Option<Value> {
        Some(Value::Group(vec![
            Attr::new("message", self.message.as_str()),
            Attr::new("parent", self.parent.to_string()),
        ]))
    }
}

#[inline(never)]
fn fetch_user_data() -> AppError {
    AppError::new(
        "failed to fetch user data",
        std::io::Error::new(std::io::ErrorKind::Other, "database connection failed"),
    )
}

fn main() {
    let handler = GcpHandler::new(
        std::io::stdout(),
        HandlerOptions {
            // Accept "err" as the error key as well.
            replace_attr: Some(Arc::new(|groups: &[String], mut a: Attr| {
                if groups.is_empty() && a.key == "err" {
                    a.key = ERROR_KEY.to_string();
                }
                a
            })),
            ..HandlerOptions::default()
        },
    );
    let logger = Logger::new(handler).with(vec![Attr::new("service", "users")]);

    let simple = std::io::Error::new(std::io::ErrorKind::Other, "something went wrong");
    if let Err(e) = logger.error("", vec![Attr::new("err", Value::error(simple))]) {
        eprintln!("{}", e);
    }

    if let Err(e) = logger.error("", vec![Attr::new("err", Value::any(fetch_user_data()))]) {
        eprintln!("{}", e);
    }

    if let Err(e) = logger
        .with_group("request")
        .info("handled", vec![Attr::new("path", "/users/42"), Attr::new("status", 200)])
    {
        eprintln!("{}", e);
    }
}
