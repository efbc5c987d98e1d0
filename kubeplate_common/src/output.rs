//! Reporting action outputs to the CI runner.

use std::fs::OpenOptions;

use crate::prelude::*;

/// Delimiter used for multi-line values in the output file.
const DELIMITER: &str = "OUTPUT";

/// Format `name` and `value` as a record for the `GITHUB_OUTPUT` file.
///
/// Values containing a newline use the delimited multi-line form, so neither
/// `=` nor line breaks in `value` can be misread. An empty value produces an
/// empty record.
pub fn format_output(name: &str, value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if value.contains('\n') {
        format!("{}<<{}\n{}\n{}", name, DELIMITER, value, DELIMITER)
    } else {
        format!("{}={}", name, value)
    }
}

/// Escape `value` for a workflow command written to standard output.
pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Format an output the way runners before 2.297.0 expected it: a
/// `set-output` workflow command on a single line.
pub fn format_legacy_output(name: &str, value: &str) -> String {
    format!("::set-output name={}::{}", name, escape_data(value))
}

/// Publish an output. If `output_file` is set, append to it, otherwise fall
/// back to a legacy workflow command on standard output.
pub fn write_output(
    name: &str,
    value: &str,
    output_file: Option<&Path>,
) -> Result<()> {
    let record = format_output(name, value);
    if record.is_empty() {
        debug!("output {:?} is empty, not writing it", name);
        return Ok(());
    }

    let path = match output_file {
        Some(path) => path,
        None => {
            debug!("no output file configured, using set-output");
            println!("{}", format_legacy_output(name, value));
            return Ok(());
        }
    };

    let mut f = OpenOptions::new().append(true).open(path).with_context(|| {
        format!(
            "failed to open result file {:?}. If you are using self-hosted \
             runners make sure they are updated to version 2.297.0 or greater",
            path,
        )
    })?;
    writeln!(f, "{}", record)
        .with_context(|| format!("failed to write result to file {:?}", path))?;
    Ok(())
}

#[test]
fn format_output_picks_single_or_multi_line_form() {
    let examples = &[
        ("", ""),
        ("text", "result=text"),
        ("%", "result=%"),
        ("a=b", "result=a=b"),
        ("some\ntext", "result<<OUTPUT\nsome\ntext\nOUTPUT"),
        ("\n", "result<<OUTPUT\n\n\nOUTPUT"),
        ("\r", "result=\r"),
    ];
    for &(input, expected) in examples {
        assert_eq!(format_output("result", input), expected, "formatting {:?}", input);
    }
}

#[test]
fn escape_data_handles_special_chars() {
    let examples = &[
        ("\n", "%0A"),
        ("%", "%25"),
        ("\r", "%0D"),
        ("text", "text"),
        ("%0A\n", "%250A%0A"),
        ("a\r\nb", "a%0D%0Ab"),
    ];
    for &(input, expected) in examples {
        assert_eq!(escape_data(input), expected);
    }
}

#[test]
fn format_legacy_output_stays_on_one_line() {
    assert_eq!(
        format_legacy_output("result", "kind: Pod\nname: web"),
        "::set-output name=result::kind: Pod%0Aname: web",
    );
}

#[test]
fn write_output_appends_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("github_output");
    fs::write(&path, "previous=1\n").unwrap();

    write_output("result", "kind: Pod\n", Some(path.as_path())).unwrap();
    write_output("result", "", Some(path.as_path())).unwrap();
    write_output("other", "value", Some(path.as_path())).unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "previous=1\nresult<<OUTPUT\nkind: Pod\n\nOUTPUT\nother=value\n",
    );
}

#[test]
fn write_output_does_not_create_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing");
    let err = write_output("result", "value", Some(path.as_path())).unwrap_err();
    assert!(err.to_string().starts_with("failed to open result file"));
    assert!(err.to_string().contains("2.297.0"));
    assert!(!path.exists());
}
