//! Console output for one-shot commands
//!
//! Human mode prints check marks and indented detail lines; JSON mode
//! prints a single document per command on stdout.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Human
        }
    }
}

/// Writes command results in the selected format
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn success(&self, message: &str) {
        if !self.is_json() {
            println!("\u{2713} {message}");
        }
    }

    pub fn failure(&self, message: &str) {
        if !self.is_json() {
            eprintln!("\u{2717} {message}");
        }
    }

    pub fn detail(&self, message: &str) {
        if !self.is_json() {
            println!("  {message}");
        }
    }

    /// Prints `value` in JSON mode, nothing otherwise
    pub fn document(&self, value: &Value) {
        if self.is_json() {
            match serde_json::to_string_pretty(value) {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("Failed to render output: {e}"),
            }
        }
    }
}
