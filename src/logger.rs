use crate::handler::{GcpHandler, Handler, HandlerError};
use crate::level::Level;
use crate::record::{Attr, Record, Source};
use chrono::Utc;
use std::panic::Location;

/// Small front-end over a [`Handler`].
///
/// Stamps records with the current time and the caller's file and line,
/// and only builds a record when the handler is enabled for its level.
#[derive(Clone, Debug)]
pub struct Logger<H = GcpHandler> {
    handler: H,
}

impl<H: Handler> Logger<H> {
    pub fn new(handler: H) -> Self {
        Logger { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Logger whose records all carry `attrs`.
    pub fn with(&self, attrs: Vec<Attr>) -> Self {
        Logger {
            handler: self.handler.with_attrs(attrs),
        }
    }

    /// Logger whose following attributes are nested under `name`.
    pub fn with_group(&self, name: &str) -> Self {
        Logger {
            handler: self.handler.with_group(name),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.handler.enabled(level)
    }

    /// Log `message` at `level`. Disabled levels never reach the handler.
    #[track_caller]
    pub fn log(&self, level: Level, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        if !self.handler.enabled(level) {
            return Ok(());
        }
        let caller = Location::caller();
        let record = Record::new(Some(Utc::now()), level, message)
            .with_source(Source::new(caller.file(), caller.line(), ""))
            .with_attrs(attrs);
        self.handler.handle(&record)
    }

    #[track_caller]
    pub fn debug(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::DEBUG, message, attrs)
    }

    #[track_caller]
    pub fn info(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::INFO, message, attrs)
    }

    #[track_caller]
    pub fn notice(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::NOTICE, message, attrs)
    }

    #[track_caller]
    pub fn warn(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::WARNING, message, attrs)
    }

    #[track_caller]
    pub fn error(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::ERROR, message, attrs)
    }

    #[track_caller]
    pub fn critical(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::CRITICAL, message, attrs)
    }

    #[track_caller]
    pub fn alert(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::ALERT, message, attrs)
    }

    #[track_caller]
    pub fn emergency(&self, message: &str, attrs: Vec<Attr>) -> Result<(), HandlerError> {
        self.log(Level::EMERGENCY, message, attrs)
    }
}
