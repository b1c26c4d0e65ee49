//! Output formatting: table, JSON, plain.
//!
//! Table uses `tabled`, structured formats use serde.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

#[cfg(feature = "simulate")]
pub use self::color::{heading, should_color, verdict};

// ── Color helpers ────────────────────────────────────────────────────

#[cfg(feature = "simulate")]
mod color {
    use std::io::{self, IsTerminal};

    use owo_colors::OwoColorize;

    use crate::cli::ColorMode;

    /// Determine whether color output should be enabled.
    pub fn should_color(mode: ColorMode) -> bool {
        match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
        }
    }

    /// Section heading above a table.
    pub fn heading(text: &str, color: bool) -> String {
        if color {
            text.bold().cyan().to_string()
        } else {
            text.to_owned()
        }
    }

    /// Green for a good outcome, yellow otherwise.
    pub fn verdict(text: &str, good: bool, color: bool) -> String {
        match (color, good) {
            (false, _) => text.to_owned(),
            (true, true) => text.green().to_string(),
            (true, false) => text.yellow().to_string(),
        }
    }
}

// ── Renderers ────────────────────────────────────────────────────────

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Serialize for the structured formats; `None` for table / plain.
pub fn render_structured<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<Option<String>, CliError> {
    let rendered = match format {
        OutputFormat::Json => Some(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Some(serde_json::to_string(data)?),
        OutputFormat::Table | OutputFormat::Plain => None,
    };
    Ok(rendered)
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
