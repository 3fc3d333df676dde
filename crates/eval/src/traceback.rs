//! Turning a raised script error into a traceback fit for the end user.
//!
//! Frames arrive outermost first. The evaluator's own frames come before the
//! first frame of the compiled script; everything before that boundary is
//! plumbing and is dropped. When no frame belongs to the script (the error
//! happened before any user code ran) nothing is dropped.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

/// Name used for top-level script code in frames.
pub const MAIN_FUNCTION: &str = "<main>";

/// One entry of a call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Source file path, or the sentinel source name for script code.
    pub file: String,
    pub line: Option<usize>,
    pub function: String,
    /// Text of the source line, when known.
    pub source_line: Option<String>,
}

impl Frame {
    #[must_use]
    pub fn new(file: impl Into<String>, line: Option<usize>, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            source_line: None,
        }
    }

    /// Frame at the caller's location in the host program.
    #[track_caller]
    #[must_use]
    pub fn host(function: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self::new(
            location.file(),
            Some(location.line() as usize),
            function,
        )
    }

    #[must_use]
    pub fn with_source_line(mut self, text: impl Into<String>) -> Self {
        self.source_line = Some(text.into());
        self
    }
}

/// An error raised while evaluating a script, before sanitizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedError {
    pub frames: Vec<Frame>,
    /// Error class name, e.g. `ZeroDivisionError`.
    pub kind: String,
    pub message: String,
}

/// Strips plumbing frames and working-directory prefixes from tracebacks.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    snippet_source: String,
    base_dir: PathBuf,
}

impl Sanitizer {
    #[must_use]
    pub fn new(snippet_source: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            snippet_source: snippet_source.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Index of the first frame belonging to the script, or 0 if none does.
    ///
    /// Only the first match counts: frames after it are the user's call chain
    /// and are kept even if they point back into host code.
    #[must_use]
    pub fn boundary(&self, frames: &[Frame]) -> usize {
        frames
            .iter()
            .position(|f| f.file == self.snippet_source)
            .unwrap_or(0)
    }

    /// Frames from the boundary onward with host paths relativized.
    #[must_use]
    pub fn user_frames(&self, frames: Vec<Frame>) -> Vec<Frame> {
        let start = self.boundary(&frames);
        frames
            .into_iter()
            .skip(start)
            .map(|mut frame| {
                if let Some(relative) = relativize(&frame.file, &self.base_dir) {
                    frame.file = relative;
                }
                frame
            })
            .collect()
    }

    /// Render `error` as a `Traceback (most recent call last):` block.
    #[must_use]
    pub fn sanitize(&self, error: RaisedError) -> String {
        let frames = self.user_frames(error.frames);
        render(&frames, &error.kind, &error.message)
    }
}

fn relativize(file: &str, base_dir: &Path) -> Option<String> {
    if base_dir.as_os_str().is_empty() {
        return None;
    }
    let relative = Path::new(file).strip_prefix(base_dir).ok()?;
    Some(relative.display().to_string())
}

/// Standard textual traceback followed by `kind` and, if non-empty, `: message`.
#[must_use]
pub fn render(frames: &[Frame], kind: &str, message: &str) -> String {
    let mut out = String::from("Traceback (most recent call last):\n");
    for frame in frames {
        let _ = write!(out, "  File \"{}\"", frame.file);
        if let Some(line) = frame.line {
            let _ = write!(out, ", line {line}");
        }
        let _ = writeln!(out, ", in {}", frame.function);
        if let Some(text) = frame.source_line.as_deref().map(str::trim)
            && !text.is_empty()
        {
            let _ = writeln!(out, "    {text}");
        }
    }
    out.push_str(kind);
    if !message.is_empty() {
        out.push_str(": ");
        out.push_str(message);
    }
    out
}
