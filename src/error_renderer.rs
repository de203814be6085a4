//! Error rendering using ariadne
//!
//! Compile and runtime errors point at a byte offset inside a template.
//! When the host supplied the template's source text, the error is drawn
//! as an annotated snippet of that source; otherwise it falls back to the
//! plain one-line message.

use crate::{Diagnostic, Error, Severity};
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use std::io::Write;
use std::ops::Range;

/// Character set for rendering error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharSet {
    /// Use Unicode characters for rich visual output.
    #[default]
    Unicode,
    /// Use ASCII-only characters for compatibility.
    Ascii,
}

/// Configuration for error rendering.
#[derive(Debug, Clone)]
pub struct RenderConfig<'a> {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
    /// The filename to display in error messages.
    /// Defaults to the name of the failing template.
    pub filename: Option<&'a str>,
    /// The character set to use for rendering.
    pub charset: CharSet,
}

impl Default for RenderConfig<'_> {
    fn default() -> Self {
        RenderConfig::default()
    }
}

impl RenderConfig<'_> {
    const fn default() -> Self {
        Self {
            color: true,
            filename: None,
            charset: CharSet::Unicode,
        }
    }
}

/// Render an error to stderr using the default config.
///
/// # Example
/// ```no_run
/// use quill::{Engine, EngineOptions, TemplateSet, render_error};
/// use quill::syntax::{Arg, Node, Tree};
///
/// let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
/// let tree = Tree::new("page", vec![Node::action(Arg::ident("missing").at(2))])
///     .with_source("{{missing}}");
/// if let Err(e) = engine.compile(&TemplateSet::new(tree)) {
///     render_error(&e);
/// }
/// ```
pub fn render_error(error: &Error) {
    render_error_to(error, &mut std::io::stderr(), &RenderConfig::default()).ok();
}

/// Render an error to a writer with the given configuration.
///
/// # Example
/// ```
/// use quill::{Engine, EngineOptions, RenderConfig, TemplateSet, render_error_to};
/// use quill::syntax::{Arg, Node, Tree};
///
/// let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
/// let tree = Tree::new("page", vec![Node::action(Arg::ident("missing").at(2))])
///     .with_source("{{missing}}");
/// let err = engine.compile(&TemplateSet::new(tree)).unwrap_err();
///
/// let mut buf = Vec::new();
/// let config = RenderConfig { color: false, ..Default::default() };
/// render_error_to(&err, &mut buf, &config).unwrap();
/// assert!(String::from_utf8_lossy(&buf).contains("undefined function \"missing\""));
/// ```
pub fn render_error_to(
    error: &Error,
    writer: &mut dyn Write,
    config: &RenderConfig,
) -> std::io::Result<()> {
    let diag = error.to_diagnostic();
    match (error.source_text(), &diag.location) {
        (Some(source), Some(location)) => {
            let filename = config.filename.unwrap_or(&location.template);
            render_diagnostic(source, location.offset, &diag, writer, config, filename)
        }
        _ => writeln!(writer, "{error}"),
    }
}

fn render_diagnostic(
    source: &str,
    offset: usize,
    diag: &Diagnostic,
    writer: &mut dyn Write,
    config: &RenderConfig,
    filename: &str,
) -> std::io::Result<()> {
    let mut colors = ColorGenerator::new();
    colors.next(); // Skip the first color.

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    };

    let ariadne_charset = match config.charset {
        CharSet::Unicode => ariadne::CharSet::Unicode,
        CharSet::Ascii => ariadne::CharSet::Ascii,
    };
    let ariadne_config = ariadne::Config::default()
        .with_color(config.color)
        .with_char_set(ariadne_charset);

    let span = token_span(source, offset);
    let mut report = Report::build(kind, (filename, span.clone()))
        .with_message(&diag.message)
        .with_config(ariadne_config);

    if let Some(code) = &diag.code {
        report = report.with_code(code);
    }

    report = report.with_label(
        Label::new((filename, span))
            .with_message(&diag.message)
            .with_color(colors.next()),
    );

    for help_msg in &diag.help {
        report = report.with_help(help_msg);
    }

    report
        .finish()
        .write((filename, Source::from(source)), &mut *writer)
}

/// Character range of the token starting at byte `offset`: everything up to
/// the next blank, pipe, parenthesis or closing delimiter. Never empty.
fn token_span(source: &str, offset: usize) -> Range<usize> {
    let offset = offset.min(source.len());
    let Some(before) = source.get(..offset) else {
        return 0..1;
    };
    let start = before.chars().count();
    let len = source[offset..]
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, '}' | '|' | '(' | ')'))
        .count();
    start..start + len.max(1)
}
