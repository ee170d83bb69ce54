use serde_json::json;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

/// Column-aligned text view of a command result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    footer: Option<String>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            footer: None,
        }
    }

    pub fn push<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|header| header.chars().count()).collect();
        for row in &self.rows {
            for (index, cell) in row.iter().enumerate() {
                let width = cell.chars().count();
                match widths.get_mut(index) {
                    Some(current) => *current = (*current).max(width),
                    None => widths.push(width),
                }
            }
        }
        widths
    }

    /// Renders the table as lines without trailing whitespace.
    pub fn lines(&self) -> Vec<String> {
        let widths = self.widths();
        let format_row = |cells: &[String]| {
            cells
                .iter()
                .enumerate()
                .map(|(index, cell)| format!("{cell:<width$}", width = widths[index]))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_owned()
        };

        let mut lines = Vec::with_capacity(self.rows.len() + 3);
        lines.push(format_row(&self.headers));
        lines.push(
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("  "),
        );
        for row in &self.rows {
            lines.push(format_row(row));
        }
        if let Some(footer) = &self.footer {
            lines.push(footer.clone());
        }
        lines
    }
}

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = json!({
                "data": result.data,
                "warnings": result.warnings,
            });
            let payload = if pretty {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => {
            for line in result.table.lines() {
                println!("{line}");
            }
            for warning in &result.warnings {
                eprintln!("warning: {warning}");
            }
        }
    }

    Ok(())
}
