//! Output formatting for the CLI.

use crate::error::Result;
use colored::*;
use siphon_domain::Extracted;
use siphon_extractor::ExtractorCatalog;
use siphon_server::ExtractResponse;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

const PREVIEW_CHARS: usize = 48;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format catalog entries.
    pub fn format_catalog(&self, catalog: &ExtractorCatalog) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<serde_json::Value> = catalog
                    .extractors
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "name": e.name,
                            "entry_point": e.entry_point.to_string(),
                        })
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&entries)?)
            }
            OutputFormat::Table => {
                if catalog.extractors.is_empty() {
                    return Ok(self.colorize("No extractors in catalog.", "yellow"));
                }

                let mut builder = Builder::default();
                builder.push_record(["Name", "Entry point"]);
                for entry in &catalog.extractors {
                    builder.push_record([entry.name.clone(), entry.entry_point.to_string()]);
                }
                Ok(self.render(builder))
            }
        }
    }

    /// Format extractor outputs.
    pub fn format_outputs(&self, outputs: Vec<Extracted>) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&ExtractResponse::from(outputs))?),
            OutputFormat::Table => {
                if outputs.is_empty() {
                    return Ok(self.colorize("No outputs.", "yellow"));
                }

                let mut builder = Builder::default();
                builder.push_record(["Kind", "Type", "Name / Size", "Preview"]);
                for output in &outputs {
                    let row = match output {
                        Extracted::Content(content) => [
                            self.colorize("content", "green"),
                            content.content_type.clone(),
                            format!("{} bytes", content.len()),
                            preview(&String::from_utf8_lossy(&content.data)),
                        ],
                        Extracted::Feature(feature) => [
                            self.colorize("feature", "cyan"),
                            feature.feature_type.as_str().to_string(),
                            feature.name.clone(),
                            preview(&feature.data.to_string()),
                        ],
                    };
                    builder.push_record(row);
                }
                Ok(self.render(builder))
            }
        }
    }

    fn render(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "green" => text.green().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

/// First characters of `text` on one line
fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(PREVIEW_CHARS)
        .collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{flat}...")
    } else {
        flat
    }
}
