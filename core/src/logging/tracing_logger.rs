//! `Logger` backed by the `tracing` facade.

use std::error::Error as StdError;

use super::{Level, Logger};

/// Forwards entries to `tracing` events.
///
/// `Critical` has no `tracing` counterpart; it is emitted at ERROR with a
/// `critical = true` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn is_enabled(&self, level: Level) -> bool {
        match level {
            Level::Trace => tracing::enabled!(tracing::Level::TRACE),
            Level::Debug => tracing::enabled!(tracing::Level::DEBUG),
            Level::Information => tracing::enabled!(tracing::Level::INFO),
            Level::Warning => tracing::enabled!(tracing::Level::WARN),
            Level::Error | Level::Critical => tracing::enabled!(tracing::Level::ERROR),
        }
    }

    fn log(
        &self,
        level: Level,
        message: &dyn Fn() -> Option<String>,
        error: Option<&(dyn StdError + 'static)>,
    ) {
        if !self.is_enabled(level) {
            return;
        }
        let message = message().unwrap_or_default();
        let error = error.map(ToString::to_string);
        let error = error.as_deref();
        match level {
            Level::Trace => tracing::trace!(error, "{message}"),
            Level::Debug => tracing::debug!(error, "{message}"),
            Level::Information => tracing::info!(error, "{message}"),
            Level::Warning => tracing::warn!(error, "{message}"),
            Level::Error => tracing::error!(error, "{message}"),
            Level::Critical => tracing::error!(critical = true, error, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LoggerExt;

    #[test]
    fn without_subscriber_nothing_is_enabled() {
        let logger = TracingLogger;
        assert!(!logger.is_enabled(Level::Critical));
        assert!(!logger.is_debug_enabled());
    }

    #[test]
    fn disabled_logger_never_formats() {
        let logger = TracingLogger;
        let called = std::cell::Cell::new(false);
        logger.error_lazy((), |()| {
            called.set(true);
            "never"
        });
        assert!(!called.get());
    }
}
