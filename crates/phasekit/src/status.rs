//! Severity-leveled outcomes and their aggregation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a [`Status`], ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Error,
    Cancel,
}

impl Severity {
    /// Whether this severity ends a transaction (ERROR or CANCEL)
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Error | Self::Cancel)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of an operation
///
/// A status is either a leaf (a severity and a message) or an aggregate
/// created with [`Status::multi`]. An aggregate's severity is always the
/// maximum of its own initial severity and every child's severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    severity: Severity,
    message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Status>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    multi: bool,
}

impl Status {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            children: Vec::new(),
            multi: false,
        }
    }

    pub fn ok() -> Self {
        Self::new(Severity::Ok, "OK")
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn cancel() -> Self {
        Self::new(Severity::Cancel, "Operation canceled")
    }

    /// Create an empty aggregate with `OK` severity
    pub fn multi(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Ok,
            message: message.into(),
            children: Vec::new(),
            multi: true,
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn children(&self) -> &[Status] {
        &self.children
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Exactly `OK`; `INFO` and `WARNING` are not OK
    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    /// Whether the severity is one of `severities`
    pub fn matches(&self, severities: &[Severity]) -> bool {
        severities.contains(&self.severity)
    }

    /// ERROR or CANCEL
    pub fn is_fatal(&self) -> bool {
        self.severity.is_fatal()
    }

    /// Append a child and raise the severity to the child's if higher
    pub fn add(&mut self, child: Status) {
        self.severity = self.severity.max(child.severity);
        self.children.push(child);
    }

    /// Fold another status into this aggregate
    ///
    /// `OK` leaves are dropped. The non-OK children of an aggregate are
    /// lifted individually so nesting stays flat.
    pub fn merge(&mut self, other: Status) {
        if other.is_ok() {
            return;
        }
        if other.multi {
            for child in other.children {
                self.merge(child);
            }
            self.severity = self.severity.max(other.severity);
        } else {
            self.add(other);
        }
    }

    /// Unwrap an aggregate with a single child into that child
    pub fn into_specific(self) -> Status {
        if self.multi && self.children.len() == 1 {
            self.children
                .into_iter()
                .next()
                .unwrap_or_else(Status::ok)
        } else {
            self
        }
    }

    /// Depth-first iterator over this status and all descendants
    pub fn walk(&self) -> Vec<&Status> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        assert!(Severity::Ok < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Cancel);
    }

    #[test]
    fn multi_takes_max_child_severity() {
        let mut status = Status::multi("phase");
        status.add(Status::info("note"));
        status.add(Status::error("boom"));
        status.add(Status::warning("hmm"));
        assert_eq!(status.severity(), Severity::Error);
        assert_eq!(status.children().len(), 3);
    }

    #[test]
    fn merge_drops_ok_and_flattens() {
        let mut inner = Status::multi("inner");
        inner.add(Status::warning("a"));
        inner.add(Status::error("b"));

        let mut outer = Status::multi("outer");
        outer.merge(Status::ok());
        outer.merge(inner);

        assert_eq!(outer.children().len(), 2);
        assert_eq!(outer.severity(), Severity::Error);
        assert!(outer.children().iter().all(|c| !c.is_multi()));
    }

    #[test]
    fn warning_is_not_ok() {
        assert!(!Status::warning("w").is_ok());
        assert!(!Status::info("i").is_ok());
        assert!(Status::ok().is_ok());
        assert!(Status::multi("empty").is_ok());
    }

    #[test]
    fn into_specific_returns_sole_child() {
        let mut status = Status::multi("outer");
        status.add(Status::error("the real problem"));
        let specific = status.into_specific();
        assert_eq!(specific.message(), "the real problem");

        let mut two = Status::multi("outer");
        two.add(Status::error("a"));
        two.add(Status::error("b"));
        assert_eq!(two.into_specific().message(), "outer");
    }

    #[test]
    fn matches_severity_set() {
        let status = Status::cancel();
        assert!(status.matches(&[Severity::Error, Severity::Cancel]));
        assert!(status.is_fatal());
        assert!(!Status::warning("w").matches(&[Severity::Error, Severity::Cancel]));
    }
}
