//! Diagnostic context captured when a transaction starts
//!
//! Engine failures arrive on the event dispatch path, long after the
//! caller's stack has unwound. A [`CallSite`] records where the caller
//! started the transaction so that the error surfaced to them points at
//! their own code instead of the dispatcher.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Opaque diagnostic context for one transaction
///
/// Cheap to clone: the backtrace is shared. Two call sites compare equal
/// only if one is a clone of the other.
#[derive(Clone)]
pub struct CallSite {
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl CallSite {
    /// Capture the caller's location and a backtrace
    ///
    /// The backtrace honors `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`; when
    /// those are unset only the location is recorded.
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Capture the caller's location and unconditionally capture a backtrace
    #[track_caller]
    pub fn force_capture() -> Self {
        Self {
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::force_capture()),
        }
    }

    /// Source location that started the transaction
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Backtrace captured at start (may be disabled)
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Whether a backtrace was actually captured
    pub fn has_backtrace(&self) -> bool {
        self.backtrace.status() == BacktraceStatus::Captured
    }

    /// Render the context as ordered trace lines
    ///
    /// The first line is always the start location; captured backtrace
    /// frames follow.
    pub fn trace_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("at {}", self.location)];
        if self.has_backtrace() {
            lines.extend(
                self.backtrace
                    .to_string()
                    .lines()
                    .map(|line| line.trim_end().to_string())
                    .filter(|line| !line.is_empty()),
            );
        }
        lines
    }
}

impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && Arc::ptr_eq(&self.backtrace, &other.backtrace)
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("location", &format_args!("{}", self.location))
            .field("backtrace", &self.backtrace.status())
            .finish()
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)
    }
}
