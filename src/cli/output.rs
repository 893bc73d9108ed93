//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io::IsTerminal;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if std::io::stdout().is_terminal() {
                OutputFormat::Table
            } else {
                OutputFormat::Tsv
            }
        }
        other => other,
    }
}

/// Rows of a text rendering
#[derive(Debug, Clone, Default)]
pub struct Rows {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Rows {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn push<I, T>(&mut self, cells: I)
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.rows.push(cells.into_iter().map(|c| c.to_string()).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn print_tsv(&self) {
        println!("{}", self.headers.join("\t").to_uppercase());
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|c| c.replace(['\t', '\n'], " ")).collect();
            println!("{}", cells.join("\t"));
        }
    }

    fn print_csv(&self) -> Result<()> {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        writer.write_record(&self.headers).into_diagnostic()?;
        for row in &self.rows {
            writer.write_record(row).into_diagnostic()?;
        }
        writer.flush().into_diagnostic()?;
        Ok(())
    }

    fn print_table(&self) {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().map(|h| h.to_uppercase()));
        for row in &self.rows {
            builder.push_record(row.iter().cloned());
        }
        let mut table = builder.build();
        table.with(Style::rounded());
        println!("{}", table);
    }
}

/// Print structured data as JSON/YAML, or its rows as text
pub fn emit<T: Serialize + ?Sized>(data: &T, rows: &Rows, format: OutputFormat) -> Result<()> {
    match effective_format(format) {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(data).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Csv => rows.print_csv()?,
        OutputFormat::Tsv => rows.print_tsv(),
        OutputFormat::Table | OutputFormat::Auto => rows.print_table(),
    }
    Ok(())
}

/// Whether the format is meant for machines (no decorative messages)
pub fn is_structured(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Json | OutputFormat::Yaml)
}

/// Print a success line unless structured output was requested
pub fn success(format: OutputFormat, message: impl std::fmt::Display) {
    if !is_structured(format) {
        println!("{} {}", style("✓").green(), message);
    }
}

/// Print a warning line to stderr
pub fn warning(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("!").yellow(), message);
}
