// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Machine-level diagnostics. Each machine owns a [Logger]; messages are
//! filtered against its level mask, delegated to an installed handler, or
//! buffered for the host to drain. A fatal message on the unhandled path
//! terminates the process.

use std::{
    cell::RefCell,
    sync::{Arc, Mutex},
};

use bitflags::bitflags;
use common::components::debugger::Severity;

bitflags! {
    /// Log level mask. A message carries exactly one level; the machine's
    /// mask selects which levels pass.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct LogLevel: u8 {
        const FATAL = 1 << 0;
        const ERROR = 1 << 1;
        const WARN = 1 << 2;
        const INFO = 1 << 3;
        const DEBUG = 1 << 4;
        const STUB = 1 << 5;
    }
}

impl LogLevel {
    /// Mask enabled on a fresh machine.
    pub const DEFAULT: LogLevel = LogLevel::FATAL
        .union(LogLevel::ERROR)
        .union(LogLevel::WARN)
        .union(LogLevel::INFO);

    /// Translate a debugger diagnostic severity into a core log level.
    pub fn from_severity(severity: Severity) -> LogLevel {
        match severity {
            Severity::Debug => LogLevel::DEBUG,
            Severity::Info => LogLevel::INFO,
            Severity::Warning => LogLevel::WARN,
            Severity::Error => LogLevel::ERROR,
        }
    }
}

pub type LogHandler = Box<dyn FnMut(LogLevel, &str) + Send>;

/// A buffered log message.
#[derive(Debug)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

struct LogState {
    level: LogLevel,
    handler: Option<LogHandler>,
    events: Vec<LogEvent>,
}

/// Shared log sink of one machine. Cheap to clone; clones share state, which
/// lets the thread registry below hold on to a machine's sink.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Mutex<LogState>>,
}

impl Logger {
    /// Log a message. An installed handler receives everything and decides
    /// for itself; otherwise the mask filters (FATAL always passes) and the
    /// message is buffered. FATAL on the unhandled path ends the process.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let mut state = self.inner.lock().unwrap();
        let message = message.into();
        if let Some(handler) = state.handler.as_mut() {
            handler(level, &message);
            return;
        }
        if !state.level.intersects(level) && level != LogLevel::FATAL {
            return;
        }
        if level == LogLevel::FATAL {
            eprintln!("{message}");
            std::process::abort();
        }
        state.events.push(LogEvent { level, message });
    }

    pub fn level(&self) -> LogLevel {
        self.inner.lock().unwrap().level
    }

    pub fn set_level(&self, level: LogLevel) {
        self.inner.lock().unwrap().level = level;
    }

    pub fn set_handler(&self, handler: Option<LogHandler>) {
        self.inner.lock().unwrap().handler = handler;
    }

    /// Drain buffered messages.
    pub fn take_events(&self) -> Vec<LogEvent> {
        std::mem::take(&mut self.inner.lock().unwrap().events)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogState {
                level: LogLevel::DEFAULT,
                handler: None,
                events: Vec::new(),
            })),
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Logger>> = RefCell::new(None);
}

/// Register the machine driven by this thread. Call on thread entry.
pub fn enter_thread(log: &Logger) {
    CURRENT.with(|c| *c.borrow_mut() = Some(log.clone()));
}

/// Clear the registration. Call on thread exit.
pub fn exit_thread() {
    CURRENT.with(|c| *c.borrow_mut() = None);
}

/// Log through an explicit target, falling back to the logger registered for
/// the current thread. With neither, the message goes to stderr.
pub fn emit(target: Option<&Logger>, level: LogLevel, message: impl Into<String>) {
    match target {
        Some(log) => log.log(level, message),
        None => CURRENT.with(|c| match &*c.borrow() {
            Some(log) => log.log(level, message),
            None => eprintln!("{}", message.into()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn mask_filters_messages() {
        let log = Logger::default();
        log.set_level(LogLevel::INFO);
        log.log(LogLevel::DEBUG, "dropped");
        log.log(LogLevel::INFO, "kept");
        let events = log.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "kept");
    }

    #[test]
    fn handler_sees_everything() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Logger::default();
        log.set_level(LogLevel::empty());
        let sink = seen.clone();
        log.set_handler(Some(Box::new(move |level, msg| {
            sink.lock().unwrap().push((level, msg.to_string()));
        })));

        log.log(LogLevel::DEBUG, "filtered level");
        // FATAL through a handler must not terminate the process.
        log.log(LogLevel::FATAL, "handled fatal");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (LogLevel::FATAL, "handled fatal".to_string()));
        assert!(log.take_events().is_empty());
    }

    #[test]
    fn thread_fallback_resolves_registered_logger() {
        let log = Logger::default();
        log.set_level(LogLevel::WARN);
        enter_thread(&log);
        emit(None, LogLevel::WARN, "via thread context");
        exit_thread();
        emit(None, LogLevel::WARN, "after exit, to stderr");

        let events = log.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "via thread context");
    }

    #[test]
    fn severity_shim_maps_all_levels() {
        assert_eq!(LogLevel::from_severity(Severity::Debug), LogLevel::DEBUG);
        assert_eq!(LogLevel::from_severity(Severity::Info), LogLevel::INFO);
        assert_eq!(LogLevel::from_severity(Severity::Warning), LogLevel::WARN);
        assert_eq!(LogLevel::from_severity(Severity::Error), LogLevel::ERROR);
    }
}
