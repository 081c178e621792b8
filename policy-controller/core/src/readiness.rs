use std::fmt;

/// Signals that data a computation depends on has not been observed yet.
///
/// This is not a failure: the caller is expected to retry once the resource
/// directory catches up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotReady {
    reason: String,
}

pub type Readiness<T> = Result<T, NotReady>;

// === impl NotReady ===

impl NotReady {
    pub fn new(reason: impl fmt::Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}
