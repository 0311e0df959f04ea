use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Numeric log level.
///
/// Levels live on a single integer axis; larger means more severe. The four
/// base thresholds (debug, info, warning, error) sit four apart and the
/// extra Cloud Logging severities are placed between or above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Level(pub i32);

impl Level {
    /// Debug or trace information.
    pub const DEBUG: Level = Level(-4);
    /// Routine information, such as ongoing status or performance.
    pub const INFO: Level = Level(0);
    /// Normal but significant events.
    pub const NOTICE: Level = Level(2);
    /// Warning events might cause problems.
    pub const WARNING: Level = Level(4);
    /// Error events are likely to cause problems.
    pub const ERROR: Level = Level(8);
    /// Critical events cause more severe problems or outages.
    pub const CRITICAL: Level = Level(10);
    /// A person must take an action immediately.
    pub const ALERT: Level = Level(12);
    /// One or more systems are unusable.
    pub const EMERGENCY: Level = Level(14);

    pub fn severity(self) -> Severity {
        Severity::from_level(self)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.severity().as_str())
    }
}

impl From<i32> for Level {
    fn from(v: i32) -> Self {
        Level(v)
    }
}

/// Error returned when a level name cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level: {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Accepts the named levels (case-insensitive, `warn` as an alias of
    /// `warning`) or a signed integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let level = match trimmed.to_ascii_lowercase().as_str() {
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "notice" => Level::NOTICE,
            "warn" | "warning" => Level::WARNING,
            "error" => Level::ERROR,
            "critical" => Level::CRITICAL,
            "alert" => Level::ALERT,
            "emergency" => Level::EMERGENCY,
            other => other
                .parse::<i32>()
                .map(Level)
                .map_err(|_| ParseLevelError(s.to_string()))?,
        };
        Ok(level)
    }
}

/// Severity labels understood by Cloud Logging.
///
/// See <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#LogSeverity>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// The log entry has no assigned severity level.
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    /// Map a numeric level to its severity label.
    ///
    /// Walks the thresholds from the highest down and returns the first one
    /// the level reaches; anything below debug is `DEFAULT`.
    pub fn from_level(level: Level) -> Severity {
        if level >= Level::EMERGENCY {
            Severity::Emergency
        } else if level >= Level::ALERT {
            Severity::Alert
        } else if level >= Level::CRITICAL {
            Severity::Critical
        } else if level >= Level::ERROR {
            Severity::Error
        } else if level >= Level::WARNING {
            Severity::Warning
        } else if level >= Level::NOTICE {
            Severity::Notice
        } else if level >= Level::INFO {
            Severity::Info
        } else if level >= Level::DEBUG {
            Severity::Debug
        } else {
            Severity::Default
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_levels_map_to_their_severity() {
        let cases = [
            (Level::DEBUG, Severity::Debug),
            (Level::INFO, Severity::Info),
            (Level::NOTICE, Severity::Notice),
            (Level::WARNING, Severity::Warning),
            (Level::ERROR, Severity::Error),
            (Level::CRITICAL, Severity::Critical),
            (Level::ALERT, Severity::Alert),
            (Level::EMERGENCY, Severity::Emergency),
            (Level(-10), Severity::Default),
        ];
        for (level, want) in cases {
            assert_eq!(Severity::from_level(level), want, "level {:?}", level);
        }
    }

    #[test]
    fn in_between_levels_round_down() {
        assert_eq!(Severity::from_level(Level(1)), Severity::Info);
        assert_eq!(Severity::from_level(Level(3)), Severity::Notice);
        assert_eq!(Severity::from_level(Level(9)), Severity::Error);
        assert_eq!(Severity::from_level(Level(100)), Severity::Emergency);
    }

    #[test]
    fn severity_is_monotonic_in_level() {
        let mut prev = Severity::from_level(Level(-20));
        for l in -20..=20 {
            let s = Severity::from_level(Level(l));
            assert!(s >= prev, "severity decreased at level {}", l);
            prev = s;
        }
    }

    #[test]
    fn parse_level_names_and_numbers() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::WARNING);
        assert_eq!("CRITICAL".parse::<Level>().unwrap(), Level::CRITICAL);
        assert_eq!(" -4 ".parse::<Level>().unwrap(), Level::DEBUG);
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::Notice).unwrap(), "\"NOTICE\"");
    }
}
