//! Output mode detection.
//!
//! Decides between coloured text, plain text and JSON output from CLI
//! flags and terminal capabilities.

/// How results and progress are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Coloured text for an interactive terminal
    Color,
    /// Text without escape codes, for pipes, files and `NO_COLOR`
    Plain,
    /// Structured output only
    Json,
}

impl DisplayMode {
    /// Determine display mode from CLI flags and environment.
    ///
    /// # Arguments
    /// * `json_flag` - Whether the `--json` flag was provided
    /// * `is_tty` - Whether stdout is a TTY (interactive terminal)
    /// * `no_color` - Whether `NO_COLOR` is set
    ///
    /// # Returns
    /// * `Json` when json_flag is true (regardless of the rest)
    /// * `Color` when stdout is a TTY and colour was not disabled
    /// * `Plain` otherwise
    pub fn detect(json_flag: bool, is_tty: bool, no_color: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty && !no_color {
            DisplayMode::Color
        } else {
            DisplayMode::Plain
        }
    }
}
