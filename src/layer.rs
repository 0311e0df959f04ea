use crate::handler::{GcpHandler, Handler};
use crate::level::Level;
use crate::record::{Attr, Record, Source, Value};
use chrono::Utc;
use std::error::Error;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into records and writes
/// them through a [`GcpHandler`].
///
/// Span fields are attached to every event inside the span by deriving a
/// handler per span (stored in the span's extensions). With span groups
/// enabled, each span also opens a group named after it.
pub struct GcpLayer {
    root: GcpHandler,
    span_groups: bool,
}

impl GcpLayer {
    pub fn new(handler: GcpHandler) -> Self {
        GcpLayer {
            root: handler,
            span_groups: false,
        }
    }

    /// Nest span fields, and the attributes of events inside the span,
    /// under the span's name.
    pub fn with_span_groups(mut self, enabled: bool) -> Self {
        self.span_groups = enabled;
        self
    }

    fn handler_for<S>(&self, span: Option<tracing_subscriber::registry::SpanRef<'_, S>>) -> GcpHandler
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        span.and_then(|span| {
            let extensions = span.extensions();
            let handler = extensions.get::<SpanHandler>().map(|h| h.0.clone());
            handler
        })
        .unwrap_or_else(|| self.root.clone())
    }
}

/// Handler derived for a span.
struct SpanHandler(GcpHandler);

/// Map a `tracing` level onto the numeric level axis.
///
/// `TRACE` sits below debug and therefore carries the `DEFAULT` severity.
pub fn level_from_tracing(level: tracing::Level) -> Level {
    match level {
        tracing::Level::ERROR => Level::ERROR,
        tracing::Level::WARN => Level::WARNING,
        tracing::Level::INFO => Level::INFO,
        tracing::Level::DEBUG => Level::DEBUG,
        _ => Level(Level::DEBUG.0 - 4),
    }
}

impl<S> Layer<S> for GcpLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::new(false);
        attrs.record(&mut visitor);

        let mut handler = self.handler_for(span.parent());
        if self.span_groups {
            handler = handler.with_group(span.name());
        }
        handler = handler.with_attrs(visitor.attrs);
        span.extensions_mut().insert(SpanHandler(handler));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::new(false);
        values.record(&mut visitor);
        if visitor.attrs.is_empty() {
            return;
        }
        let mut extensions = span.extensions_mut();
        if let Some(SpanHandler(handler)) = extensions.get_mut::<SpanHandler>() {
            *handler = handler.with_attrs(visitor.attrs);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = level_from_tracing(*meta.level());
        if !self.root.enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::new(true);
        event.record(&mut visitor);

        let mut record = Record::new(Some(Utc::now()), level, visitor.message.unwrap_or_default())
            .with_attrs(visitor.attrs);
        if let Some(file) = meta.file() {
            let function = meta.module_path().unwrap_or_else(|| meta.target());
            record = record.with_source(Source::new(file, meta.line().unwrap_or(0), function));
        }

        let handler = self.handler_for(ctx.event_span(event));
        if let Err(e) = handler.handle(&record) {
            eprintln!("error writing log record: {}", e);
        }
    }
}

/// Collects event or span fields as attributes, in declaration order.
struct FieldVisitor {
    attrs: Vec<Attr>,
    message: Option<String>,
    capture_message: bool,
}

impl FieldVisitor {
    fn new(capture_message: bool) -> Self {
        FieldVisitor {
            attrs: Vec::new(),
            message: None,
            capture_message,
        }
    }

    fn push(&mut self, field: &Field, value: Value) {
        self.attrs.push(Attr {
            key: field.name().to_string(),
            value,
        });
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if self.capture_message && field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::Uint(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, Value::error(CapturedError::from_error(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if self.capture_message && field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, Value::String(format!("{:?}", value)));
        }
    }
}

/// Owned copy of an error recorded on an event, including its sources.
#[derive(Debug)]
pub struct CapturedError {
    message: String,
    source: Option<Box<CapturedError>>,
}

impl CapturedError {
    fn from_error(err: &(dyn Error + 'static)) -> Self {
        CapturedError {
            message: err.to_string(),
            source: err.source().map(|s| Box::new(CapturedError::from_error(s))),
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for CapturedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerOptions;
    use crate::sink::MemorySink;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn capture(opts: HandlerOptions, span_groups: bool, f: impl FnOnce()) -> Vec<serde_json::Value> {
        let sink = MemorySink::new();
        let layer = GcpLayer::new(GcpHandler::new(sink.clone(), opts)).with_span_groups(span_groups);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        sink.lines()
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn events_become_records() {
        let lines = capture(HandlerOptions::default(), false, || {
            tracing::debug!("dropped");
            tracing::info!(user_id = 42, ok = true, "signed in");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "signed in");
        assert_eq!(lines[0]["severity"], "INFO");
        assert_eq!(lines[0]["user_id"], 42);
        assert_eq!(lines[0]["ok"], true);
        assert!(lines[0]["time"].is_string());
    }

    #[test]
    fn recorded_errors_trigger_error_reports() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "timeout"));
        let lines = capture(HandlerOptions::default(), false, || {
            tracing::error!(error = &err as &(dyn Error + 'static), "ignored");
        });
        assert_eq!(lines[0]["@type"], crate::error_reporting::ERROR_REPORT_TYPE_VALUE);
        assert_eq!(lines[0]["message"], "request failed");
        assert_eq!(lines[0]["error"], "request failed");
        assert_eq!(lines[0]["severity"], "ERROR");
    }

    #[test]
    fn span_fields_are_attached() {
        let lines = capture(HandlerOptions::default(), false, || {
            let span = tracing::info_span!("request", path = "/users", attempt = tracing::field::Empty);
            let _guard = span.enter();
            span.record("attempt", 2u64);
            tracing::warn!("slow");
        });
        assert_eq!(lines[0]["path"], "/users");
        assert_eq!(lines[0]["attempt"], 2);
        assert_eq!(lines[0]["severity"], "WARNING");
    }

    #[test]
    fn span_groups_nest_fields() {
        let lines = capture(HandlerOptions::default(), true, || {
            let outer = tracing::info_span!("outer", a = 1);
            let _o = outer.enter();
            let inner = tracing::info_span!("inner");
            let _i = inner.enter();
            tracing::info!(b = 2, "nested");
            tracing::info!("bare");
        });
        assert_eq!(lines[0]["outer"], serde_json::json!({"a": 1, "inner": {"b": 2}}));
        assert_eq!(lines[1]["outer"], serde_json::json!({"a": 1}));
    }

    #[test]
    fn source_from_metadata() {
        let opts = HandlerOptions { add_source: true, ..HandlerOptions::default() };
        let lines = capture(opts, false, || tracing::info!("with source"));
        let source = &lines[0]["logging.googleapis.com/sourceLocation"];
        assert!(source["file"].as_str().unwrap().ends_with("layer.rs"));
        assert_eq!(source["function"], "gcp_log_sink::layer::tests");
    }

    #[test]
    fn trace_level_maps_below_debug() {
        assert_eq!(level_from_tracing(tracing::Level::TRACE).severity(), crate::level::Severity::Default);
        assert_eq!(level_from_tracing(tracing::Level::WARN), Level::WARNING);
    }
}
