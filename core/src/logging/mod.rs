//! Leveled logging through a capability-style `Logger`.
//!
//! # Design
//! `Logger` is the only observability seam. It answers "is this level
//! enabled?" and accepts a message formatter that it calls only for enabled
//! levels, so building the message costs nothing when the level is off.
//!
//! `LoggerExt` adds the leveled helpers on top. Every message goes through
//! [`format_message`]: strings pass through verbatim, anything else is
//! rendered as filtered JSON.

mod format;
mod memory;
mod tracing_logger;

use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use format::{
    format_message, serialize_loggable, Loggable, LoggableMessage, MessageFormatter, TypeFilter,
    CRISIS_TARGET,
};
pub use memory::{LogEntry, MemoryLogger};
pub use tracing_logger::TracingLogger;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Information => "INFORMATION",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "information" | "info" => Ok(Level::Information),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" | "fatal" => Ok(Level::Critical),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

/// A log sink.
///
/// `log` must call `message` at most once, and only when `level` is enabled.
pub trait Logger: Send + Sync {
    fn is_enabled(&self, level: Level) -> bool;

    fn log(
        &self,
        level: Level,
        message: &dyn Fn() -> Option<String>,
        error: Option<&(dyn StdError + 'static)>,
    );
}

macro_rules! leveled_helpers {
    ($($level:ident => $plain:ident, $with:ident, $lazy:ident;)+) => {
        $(
            fn $plain<M>(&self, message: &M)
            where
                M: Serialize + fmt::Debug + ?Sized,
            {
                self.log_message(Level::$level, message, None);
            }

            fn $with<M>(&self, message: &M, error: &(dyn StdError + 'static))
            where
                M: Serialize + fmt::Debug + ?Sized,
            {
                self.log_message(Level::$level, message, Some(error));
            }

            fn $lazy<S, M, F>(&self, state: S, formatter: F)
            where
                M: Serialize + fmt::Debug,
                F: FnOnce(S) -> M,
            {
                self.log_lazy(Level::$level, state, None, formatter);
            }
        )+
    };
}

/// Leveled helpers available on every [`Logger`], including `dyn Logger`.
pub trait LoggerExt: Logger {
    fn log_message<M>(&self, level: Level, message: &M, error: Option<&(dyn StdError + 'static)>)
    where
        M: Serialize + fmt::Debug + ?Sized,
    {
        self.log(level, &|| format_message(message), error);
    }

    /// Logs the value produced by `formatter(state)`; the formatter only
    /// runs when `level` is enabled.
    fn log_lazy<S, M, F>(
        &self,
        level: Level,
        state: S,
        error: Option<&(dyn StdError + 'static)>,
        formatter: F,
    ) where
        M: Serialize + fmt::Debug,
        F: FnOnce(S) -> M,
    {
        let pending = Cell::new(Some((state, formatter)));
        self.log(
            level,
            &|| {
                let (state, formatter) = pending.take()?;
                format_message(&formatter(state))
            },
            error,
        );
    }

    fn is_debug_enabled(&self) -> bool {
        self.is_enabled(Level::Debug)
    }

    leveled_helpers! {
        Critical => critical, critical_with, critical_lazy;
        Error => error, error_with, error_lazy;
        Warning => warning, warning_with, warning_lazy;
        Information => information, information_with, information_lazy;
        Debug => debug, debug_with, debug_lazy;
        Trace => trace, trace_with, trace_lazy;
    }
}

impl<L: Logger + ?Sized> LoggerExt for L {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Greeting {
        message: &'static str,
        number: i32,
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Information);
        assert!(Level::Information < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
    }

    #[test]
    fn level_parses_common_spellings() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("Information".parse::<Level>().unwrap(), Level::Information);
        assert_eq!("FATAL".parse::<Level>().unwrap(), Level::Critical);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn level_displays_upper_case() {
        assert_eq!(Level::Error.to_string(), "ERROR");
        assert_eq!(Level::Information.to_string(), "INFORMATION");
    }

    #[test]
    fn plain_helper_serializes_structs() {
        let logger = MemoryLogger::new(Level::Error);
        logger.error(&Greeting {
            message: "Hello",
            number: 7,
        });
        assert_eq!(logger.messages(), [r#"ERROR: {"message":"Hello","number":7}"#]);
    }

    #[test]
    fn plain_helper_passes_strings_through() {
        let logger = MemoryLogger::new(Level::Trace);
        logger.trace("plain text");
        assert_eq!(logger.messages(), ["TRACE: plain text"]);
    }

    #[test]
    fn disabled_level_writes_nothing() {
        let logger = MemoryLogger::new(Level::Critical);
        logger.error("ignored");
        logger.warning("ignored");
        assert!(logger.messages().is_empty());
    }

    #[test]
    fn lazy_formatter_is_skipped_on_disabled_level() {
        let logger = MemoryLogger::new(Level::Critical);
        let invoked = Cell::new(false);
        logger.error_lazy(42, |number| {
            invoked.set(true);
            Greeting {
                message: "Hello",
                number,
            }
        });
        assert!(!invoked.get());
        assert!(logger.messages().is_empty());
    }

    #[test]
    fn lazy_formatter_runs_on_enabled_level() {
        let logger = MemoryLogger::new(Level::Error);
        logger.error_lazy(42, |number| Greeting {
            message: "Hello",
            number,
        });
        assert_eq!(logger.messages(), [r#"ERROR: {"message":"Hello","number":42}"#]);
    }

    #[test]
    fn lazy_formatter_with_error_attaches_it() {
        let logger = MemoryLogger::new(Level::Debug);
        let error = std::io::Error::other("OMG!");
        logger.log_lazy(Level::Critical, 3, Some(&error), |n| format!("n = {n}"));
        let entries = logger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "n = 3");
        assert_eq!(entries[0].error.as_deref(), Some("OMG!"));
    }

    #[test]
    fn helpers_work_through_dyn_logger() {
        let logger: std::sync::Arc<dyn Logger> = std::sync::Arc::new(MemoryLogger::new(Level::Warning));
        logger.warning("careful");
        logger.information("dropped");
        assert!(!logger.is_debug_enabled());
        assert!(logger.is_enabled(Level::Critical));
    }

    #[test]
    fn each_level_helper_logs_at_its_level() {
        let logger = MemoryLogger::new(Level::Trace);
        logger.critical("c");
        logger.error("e");
        logger.warning("w");
        logger.information("i");
        logger.debug("d");
        logger.trace("t");
        assert_eq!(
            logger.messages(),
            [
                "CRITICAL: c",
                "ERROR: e",
                "WARNING: w",
                "INFORMATION: i",
                "DEBUG: d",
                "TRACE: t"
            ]
        );
    }
}
