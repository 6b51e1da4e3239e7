//! # Fragment Output
//!
//! What a finished fragment hands back to the orchestrator, and the text
//! form that goes into the transcript as the execution result.

use crate::error::{Error, LINE_KEY};

/// Outcome of one executed code fragment
#[derive(Debug, Default)]
pub struct Output {
    /// Everything `print` and `debug` wrote, capped at the stdout limit
    pub stdout: String,
    pub stdout_truncated: bool,
    /// Display form of the fragment's final value, when not `()`
    pub echo: Option<String>,
    /// Display form of `result`, when the fragment set or changed it
    pub result: Option<String>,
    /// The uncaught error that stopped the fragment
    pub error: Option<Error>,
}

impl Output {
    pub fn failed(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Nothing printed, echoed, assigned to `result` or raised
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.echo.is_none() && self.result.is_none() && self.error.is_none()
    }

    /// Render for the transcript: stdout, echo, `result` and then the
    /// error line. Partial stdout is kept when the fragment failed.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let stdout = self.stdout.trim_end_matches('\n');
        if !stdout.is_empty() {
            parts.push(stdout.to_string());
        }
        if self.stdout_truncated {
            parts.push("[output truncated]".to_string());
        }
        if let Some(echo) = &self.echo {
            parts.push(echo.clone());
        }
        if let Some(result) = &self.result {
            parts.push(format!("result = {}", result));
        }
        if let Some(err) = &self.error {
            parts.push(render_error(err));
        }
        if parts.is_empty() {
            return "(no output)".to_string();
        }
        parts.join("\n")
    }
}

/// `Error: <Kind>: <message>[ (line N)]`
pub fn render_error(err: &Error) -> String {
    let mut text = format!("Error: {}: {}", err.kind(), err.message());
    if let Some(line) = err.context_value(LINE_KEY) {
        text.push_str(&format!(" (line {})", line));
    }
    text
}

/// Stdout collected from `print` and `debug`, cut at a byte cap
#[derive(Debug)]
pub(crate) struct Capture {
    text: String,
    cap: usize,
    truncated: bool,
}

impl Capture {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            text: String::new(),
            cap,
            truncated: false,
        }
    }

    pub(crate) fn line(&mut self, line: &str) {
        if self.truncated {
            return;
        }
        let room = self.cap.saturating_sub(self.text.len());
        if line.len() < room {
            self.text.push_str(line);
            self.text.push('\n');
            return;
        }
        let mut end = room;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        self.text.push_str(&line[..end]);
        self.truncated = true;
    }

    pub(crate) fn take(&mut self) -> (String, bool) {
        (std::mem::take(&mut self.text), self.truncated)
    }
}
