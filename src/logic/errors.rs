use anyhow::anyhow;

/// Accumulates non-fatal failures across a multi-step resolution so one bad
/// link or category does not discard the rest of the result.
#[derive(Debug, Default)]
pub struct ErrorBag {
    messages: Vec<String>,
}

impl ErrorBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Collapse into a single error with every message joined, or `None`
    /// when nothing failed.
    pub fn into_error(self) -> Option<anyhow::Error> {
        if self.messages.is_empty() {
            None
        } else {
            Some(anyhow!(self.messages.join("; ")))
        }
    }

    /// Turn the collected failures into a `Result` for callers that treat
    /// any failure as fatal.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
