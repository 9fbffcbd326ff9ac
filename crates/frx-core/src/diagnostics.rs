#![forbid(unsafe_code)]

//! Diagnostics channel.
//!
//! The engine never fails on its primary paths. Situations a host should hear
//! about (observing a primitive, writing a read-only computed, a runaway
//! trigger cascade) are reported through a [`DiagnosticsSink`] as a formatted
//! message plus a [`Severity`] tag.
//!
//! The default sink, [`TracingSink`], forwards to `tracing`. Tests and
//! embedding hosts usually install a [`CollectingSink`] or a closure.

use std::cell::RefCell;
use std::rc::Rc;

/// Severity tag attached to every diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Receiver for engine diagnostics.
pub trait DiagnosticsSink {
    fn emit(&self, severity: Severity, message: &str);
}

impl<F> DiagnosticsSink for F
where
    F: Fn(Severity, &str),
{
    fn emit(&self, severity: Severity, message: &str) {
        self(severity, message);
    }
}

/// Forwards diagnostics to `tracing` under the `frx_core::diagnostics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Warning => tracing::warn!(target: "frx_core::diagnostics", "{message}"),
            Severity::Error => tracing::error!(target: "frx_core::diagnostics", "{message}"),
        }
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Records every diagnostic in memory.
///
/// Clones share the same buffer, so a test can keep one handle and install
/// another on the runtime.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    entries: Rc<RefCell<Vec<Diagnostic>>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<Diagnostic> {
        self.entries.borrow().last().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl DiagnosticsSink for CollectingSink {
    fn emit(&self, severity: Severity, message: &str) {
        self.entries.borrow_mut().push(Diagnostic {
            severity,
            message: message.to_string(),
        });
    }
}
