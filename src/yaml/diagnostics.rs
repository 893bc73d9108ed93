//! YAML error diagnostics with source spans

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// A YAML syntax error pinned to its location in the source file
#[derive(Debug, Error, Diagnostic)]
#[error("YAML syntax error in {filename}: {message}")]
#[diagnostic(
    code(olt::yaml::syntax),
    help("Check indentation and quoting near the highlighted position")
)]
pub struct YamlSyntaxError {
    pub filename: String,
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl YamlSyntaxError {
    /// Build a diagnostic from a serde_yml error and the text it failed on
    pub fn from_serde_error(err: &serde_yml::Error, content: &str, filename: &str) -> Self {
        let span = err
            .location()
            .map(|loc| SourceSpan::from((loc.index().min(content.len()), 1)));

        Self {
            filename: filename.to_string(),
            message: err.to_string(),
            src: NamedSource::new(filename, content.to_string()),
            span,
        }
    }
}

/// Errors from reading YAML documents
#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(YamlSyntaxError),

    #[error("IO error: {0}")]
    #[diagnostic(code(olt::yaml::io))]
    Io(#[from] std::io::Error),
}
