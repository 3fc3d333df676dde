use std::sync::{Arc, Mutex};

/// Append-only text sink backing the script's `print`.
///
/// One sink is allocated per request. Clones share the same buffer so the
/// engine's print hook and the environment can both hold it; nothing outside
/// the request ever sees it.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<String>>,
}

impl CapturedOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` followed by a newline, like `print`.
    pub fn write_line(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(text);
        buffer.push('\n');
    }

    /// Snapshot of everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
