//! Non-fatal reports raised while building device properties.
//!
//! Settings files are hand edited, so unknown keys and unreadable files are
//! reported rather than treated as hard errors. Reports go to a
//! [`DiagnosticSink`]; [`LogSink`] forwards them to the `log` facade and a
//! `Vec<Diagnostic>` collects them for inspection.

use std::fmt;
use std::path::PathBuf;

/// A condition worth telling the user about that does not stop processing
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A property name with no matching setter; the value was ignored
    UnknownProperty { name: String },
    /// A settings file could not be opened; defaults were used instead
    SettingsUnreadable { path: PathBuf, reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownProperty { name } => write!(f, "Property: {name} not found!"),
            Diagnostic::SettingsUnreadable { path, reason } => {
                write!(f, "Could not open {} for reading: {reason}", path.display())
            }
        }
    }
}

/// Receiver for [`Diagnostic`] reports
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards every report to `log::warn!`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}
