//! Error-handling code.

use std::fmt;

use anyhow::Error;

use crate::output::escape_data;

/// Support for displaying an error with a complete list of causes, and an
/// optional backtrace.
pub trait DisplayCausesAndBacktraceExt {
    /// Display the error and its causes, plus a backtrace (if available).
    fn display_causes_and_backtrace(&self) -> DisplayCauses<'_>;

    /// Display the error and its causes as a single `::error::` workflow
    /// command, which the runner turns into an annotation.
    fn display_as_annotation(&self) -> DisplayAnnotation<'_>;
}

impl DisplayCausesAndBacktraceExt for Error {
    fn display_causes_and_backtrace(&self) -> DisplayCauses<'_> {
        DisplayCauses { err: self }
    }

    fn display_as_annotation(&self) -> DisplayAnnotation<'_> {
        DisplayAnnotation { err: self }
    }
}

/// Helper type used to display errors.
pub struct DisplayCauses<'a> {
    /// The error to display.
    err: &'a Error,
}

impl fmt::Display for DisplayCauses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.err)?;
        for cause in self.err.chain().skip(1) {
            writeln!(f, "  caused by: {}", cause)?;
        }
        write!(f, "{}", self.err.backtrace())
    }
}

/// Helper type used to display errors as CI annotations.
pub struct DisplayAnnotation<'a> {
    /// The error to display.
    err: &'a Error,
}

impl fmt::Display for DisplayAnnotation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:#}` joins the whole chain with ": ".
        let message = format!("{:#}", self.err);
        write!(f, "::error::{}", escape_data(&message))
    }
}

/// Generate a `main` function which calls the specified function. If the
/// function returns `Result::Err(_)`, then `main` will print the error as a
/// CI annotation and exit with a non-zero status code.
#[macro_export]
macro_rules! quick_main {
    ($wrapped:ident) => {
        fn main() {
            if let Err(err) = $wrapped() {
                use $crate::errors::DisplayCausesAndBacktraceExt;
                $crate::tracing::debug!("{}", err.display_causes_and_backtrace());
                println!("{}", err.display_as_annotation());
                ::std::process::exit(1);
            }
        }
    };
}

#[test]
fn annotation_is_a_single_line() {
    use anyhow::Context;

    let err = Err::<(), _>(anyhow::format_err!("template file not found"))
        .context("failed to render template")
        .unwrap_err();
    assert_eq!(
        err.display_as_annotation().to_string(),
        "::error::failed to render template: template file not found",
    );

    let err = anyhow::format_err!("bad\nthing at 100%");
    assert_eq!(
        err.display_as_annotation().to_string(),
        "::error::bad%0Athing at 100%25",
    );
}

#[test]
fn causes_are_listed() {
    use anyhow::Context;

    let err = Err::<(), _>(anyhow::format_err!("inner"))
        .context("outer")
        .unwrap_err();
    let text = err.display_causes_and_backtrace().to_string();
    assert!(text.starts_with("ERROR: outer\n  caused by: inner\n"), "{}", text);
}
