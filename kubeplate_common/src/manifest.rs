//! Tools for rendering Kubernetes manifests from templates.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperDef, HelperResult,
    JsonTruthy, Output, PathAndJson, RenderContext, RenderErrorReason,
    Renderable, ScopedJson,
};
use serde_json::Value;
use std::{fmt::Write as _, io};
use thiserror::Error;

use crate::prelude::*;
use crate::vars::Vars;

/// Why a template could not be turned into a manifest.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template file does not exist.
    #[error("template file not found ({path:?})")]
    NotFound {
        /// The path we tried to read.
        path: PathBuf,
    },

    /// The template file exists but we can't read it.
    #[error("have no permissions to read template file ({path:?})")]
    PermissionDenied {
        /// The path we tried to read.
        path: PathBuf,
    },

    /// Any other error reading the template file.
    #[error("failed to read template {path:?}: {source}")]
    Io {
        /// The path we tried to read.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The template syntax is malformed.
    #[error(transparent)]
    Parse(#[from] handlebars::TemplateError),

    /// The template refers to a variable which was never supplied.
    #[error(
        "template {template}:{line}:{column}: map has no entry for key {key:?}"
    )]
    MissingKey {
        /// The variable path we failed to look up.
        key: String,
        /// The name of the template, normally its path.
        template: String,
        /// The line of the offending expression, or 0 if unknown.
        line: usize,
        /// The column of the offending expression, or 0 if unknown.
        column: usize,
    },

    /// Rendering failed for some other reason.
    #[error(transparent)]
    Render(handlebars::RenderError),
}

impl From<handlebars::RenderError> for TemplateError {
    fn from(err: handlebars::RenderError) -> Self {
        if let RenderErrorReason::MissingVariable(key) = err.reason() {
            TemplateError::MissingKey {
                key: key.clone().unwrap_or_default(),
                template: err.template_name.clone().unwrap_or_default(),
                line: err.line_no.unwrap_or_default(),
                column: err.column_no.unwrap_or_default(),
            }
        } else {
            TemplateError::Render(err)
        }
    }
}

/// Run-wide settings consulted by template helpers.
#[derive(Clone, Debug, Default)]
pub struct RenderSettings {
    /// The IANA time zone `date` converts timestamps into, if any.
    pub timezone: Option<String>,
}

/// Read the template at `path` and render it using `vars`.
///
/// Every variable the template refers to must be present in `vars`.
pub fn render_template(
    path: &Path,
    vars: Option<&Vars>,
    settings: &RenderSettings,
) -> std::result::Result<String, TemplateError> {
    let template_yml = fs::read_to_string(path).map_err(|err| {
        let path = path.to_owned();
        match err.kind() {
            io::ErrorKind::NotFound => TemplateError::NotFound { path },
            io::ErrorKind::PermissionDenied => {
                TemplateError::PermissionDenied { path }
            }
            _ => TemplateError::Io { path, source: err },
        }
    })?;

    let empty = Vars::new();
    render_manifest(
        &path.display().to_string(),
        &template_yml,
        vars.unwrap_or(&empty),
        settings,
    )
}

/// Render the specified YAML manifest, filling in the supplied values
/// using [Handlebars][].
///
/// [Handlebars]: https://handlebarsjs.com/
pub fn render_manifest<T: Serialize>(
    template_name: &str,
    template_yml: &str,
    params: &T,
    settings: &RenderSettings,
) -> std::result::Result<String, TemplateError> {
    // Set up handlebars.
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);

    // Manifests are YAML, so substitute values exactly as given.
    handlebars.register_escape_fn(no_escape);
    register_helpers(&mut handlebars, settings);

    handlebars.register_template_string(template_name, template_yml)?;
    Ok(handlebars.render(template_name, params)?)
}

/// Install our helper functions. This is the complete set.
fn register_helpers(handlebars: &mut Handlebars<'_>, settings: &RenderSettings) {
    let functions: [(&'static str, usize, FunctionBody); 4] = [
        ("date", 2, date_function),
        ("mdlink", 2, mdlink_function),
        ("number", 1, number_function),
        ("base64", 1, base64_function),
    ];
    for (name, arity, body) in functions {
        handlebars.register_helper(
            name,
            Box::new(TemplateFunction {
                name,
                arity,
                settings: settings.clone(),
                body,
            }),
        );
    }

    // The built-in `if` and `unless` treat a missing variable as false, even
    // in strict mode.
    handlebars.register_helper("if", Box::new(StrictIf { name: "if", negate: false }));
    handlebars.register_helper(
        "unless",
        Box::new(StrictIf {
            name: "unless",
            negate: true,
        }),
    );
}

/// Look up parameter `index` of a helper call, failing if it refers to a
/// variable we don't have.
fn required_param<'a, 'rc>(
    h: &'a Helper<'rc>,
    helper_name: &'static str,
    index: usize,
) -> std::result::Result<&'a PathAndJson<'rc>, RenderErrorReason> {
    let param = h
        .param(index)
        .ok_or(RenderErrorReason::ParamNotFoundForIndex(helper_name, index))?;
    if param.is_value_missing() {
        return Err(RenderErrorReason::MissingVariable(
            param.relative_path().cloned(),
        ));
    }
    Ok(param)
}

/// The implementation of a template function, given its arguments.
type FunctionBody = fn(
    &[&Value],
    &RenderSettings,
) -> std::result::Result<String, RenderErrorReason>;

/// A template function like `{{base64 value}}`.
struct TemplateFunction {
    name: &'static str,
    arity: usize,
    settings: RenderSettings,
    body: FunctionBody,
}

impl HelperDef for TemplateFunction {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'rc>, handlebars::RenderError> {
        let mut args = Vec::with_capacity(self.arity);
        for index in 0..self.arity {
            args.push(required_param(h, self.name, index)?.value());
        }
        let result = (self.body)(&args, &self.settings)?;
        Ok(ScopedJson::Derived(Value::String(result)))
    }
}

fn string_arg<'a>(
    function: &str,
    value: &'a Value,
) -> std::result::Result<&'a str, RenderErrorReason> {
    value.as_str().ok_or_else(|| {
        RenderErrorReason::Other(format!(
            "{}: expected a string, found {}",
            function,
            json_type_name(value),
        ))
    })
}

fn date_function(
    args: &[&Value],
    settings: &RenderSettings,
) -> std::result::Result<String, RenderErrorReason> {
    let format = string_arg("date", args[0])?;
    Ok(format_date(format, args[1], settings.timezone.as_deref()))
}

fn mdlink_function(
    args: &[&Value],
    _: &RenderSettings,
) -> std::result::Result<String, RenderErrorReason> {
    Ok(markdown_link(
        string_arg("mdlink", args[0])?,
        string_arg("mdlink", args[1])?,
    ))
}

fn number_function(
    args: &[&Value],
    _: &RenderSettings,
) -> std::result::Result<String, RenderErrorReason> {
    Ok(format_number(args[0]))
}

fn base64_function(
    args: &[&Value],
    _: &RenderSettings,
) -> std::result::Result<String, RenderErrorReason> {
    Ok(encode_base64(string_arg("base64", args[0])?))
}

/// `{{#if}}` and `{{#unless}}`, failing on missing variables.
struct StrictIf {
    name: &'static str,
    negate: bool,
}

impl HelperDef for StrictIf {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let param = required_param(h, self.name, 0)?;
        let include_zero = h
            .hash_get("includeZero")
            .and_then(|v| v.value().as_bool())
            .unwrap_or(false);
        let truthy = param.value().is_truthy(include_zero) != self.negate;

        let template = if truthy { h.template() } else { h.inverse() };
        match template {
            Some(t) => t.render(r, ctx, rc, out),
            None => Ok(()),
        }
    }
}

/// Format a timestamp using a `strftime`-style pattern, optionally converting
/// it to `timezone` first.
///
/// `value` may be an RFC 3339 string or a Unix timestamp in seconds. Anything
/// we can't handle is logged and returned as-is.
pub fn format_date(format: &str, value: &Value, timezone: Option<&str>) -> String {
    let original = value_to_string(value);
    let timestamp = match value {
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(timestamp) => timestamp,
            Err(err) => {
                warn!("failed to parse date {:?}: {}", s, err);
                return original;
            }
        },
        Value::Number(n) => {
            match n.as_i64().and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)) {
                Some(timestamp) => timestamp.fixed_offset(),
                None => {
                    warn!("unsupported timestamp {} for date", n);
                    return original;
                }
            }
        }
        other => {
            warn!("unsupported type {} for date", json_type_name(other));
            return original;
        }
    };

    match timezone {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => write_timestamp(format, &timestamp.with_timezone(&tz))
                .unwrap_or(original),
            Err(err) => {
                warn!("failed to load timezone {:?}: {:?}", name, err);
                original
            }
        },
        None => write_timestamp::<FixedOffset>(format, &timestamp)
            .unwrap_or(original),
    }
}

/// Format `timestamp`, returning `None` if `format` is malformed.
fn write_timestamp<Z>(format: &str, timestamp: &DateTime<Z>) -> Option<String>
where
    Z: chrono::TimeZone,
    Z::Offset: fmt::Display,
{
    let mut out = String::new();
    if write!(out, "{}", timestamp.format(format)).is_err() {
        warn!("invalid date format {:?}", format);
        return None;
    }
    Some(out)
}

/// Build a Markdown link.
pub fn markdown_link(text: &str, url: &str) -> String {
    format!("[{}]({})", text, url)
}

/// Group the digits of an integer in thousands, like `1,234,567`.
///
/// Accepts a base-10 integer string or an integer. Anything else is logged
/// and returned unchanged.
pub fn format_number(value: &Value) -> String {
    let parsed = match value {
        Value::String(s) => s.parse::<i64>().map_err(|err| err.to_string()),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| "not a 64-bit integer".to_owned()),
        other => Err(format!("unsupported type {}", json_type_name(other))),
    };
    match parsed {
        Ok(n) => group_thousands(n),
        Err(err) => {
            let original = value_to_string(value);
            warn!("failed to parse number {:?}: {}", original, err);
            original
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Encode a string as standard, padded base64.
pub fn encode_base64(value: &str) -> String {
    STANDARD.encode(value)
}

/// Strings are used as-is, everything else is written as JSON.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
fn testdata(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
}

#[cfg(test)]
fn test_vars(value: Value) -> Vars {
    match value {
        Value::Object(map) => map,
        _ => panic!("test vars must be an object"),
    }
}

#[test]
fn render_template_substitutes_vars() {
    use serde_json::json;

    let examples = &[
        (json!({ "name": "world" }), "Hello world\n"),
        (json!({ "name": "text+text" }), "Hello text+text\n"),
        (json!({ "name": "<b>&\"" }), "Hello <b>&\"\n"),
    ];
    for (vars, expected) in examples {
        let vars = test_vars(vars.clone());
        let output = render_template(
            &testdata("template.txt"),
            Some(&vars),
            &RenderSettings::default(),
        )
        .expect("template should render");
        assert_eq!(output, *expected);
    }
}

#[test]
fn render_template_reports_missing_file() {
    let path = testdata("missing.txt");
    let err = render_template(&path, None, &RenderSettings::default())
        .unwrap_err();
    assert!(matches!(err, TemplateError::NotFound { .. }));
    assert_eq!(err.to_string(), format!("template file not found ({:?})", path));
}

#[test]
fn render_template_reports_missing_keys() {
    let path = testdata("template.txt");
    for vars in &[None, Some(Vars::new())] {
        let err = render_template(&path, vars.as_ref(), &RenderSettings::default())
            .unwrap_err();
        match &err {
            TemplateError::MissingKey { key, template, .. } => {
                assert_eq!(key, "name");
                assert_eq!(template, &path.display().to_string());
            }
            other => panic!("expected a missing key error, got {:?}", other),
        }
        assert!(err.to_string().contains("map has no entry for key \"name\""));
    }
}

#[test]
fn render_template_reports_nested_missing_keys() {
    use serde_json::json;

    let vars = test_vars(json!({ "image": { "name": "nginx" } }));
    let err = render_manifest(
        "deployment.yml",
        "image: {{image.name}}:{{image.tag}}\n",
        &vars,
        &RenderSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TemplateError::MissingKey { .. }), "{:?}", err);
}

#[test]
fn render_template_reports_other_read_errors() {
    // A directory exists and is readable, but isn't a file.
    let dir = tempfile::tempdir().unwrap();
    let err = render_template(dir.path(), None, &RenderSettings::default())
        .unwrap_err();
    assert!(matches!(err, TemplateError::Io { .. }), "{:?}", err);
    let prefix = format!("failed to read template {:?}: ", dir.path());
    assert!(err.to_string().starts_with(&prefix), "{}", err);
}

#[test]
fn helpers_report_missing_keys() {
    let templates = &[
        "{{date \"%d\" missing}}",
        "{{mdlink missing \"https://github.com\"}}",
        "{{mdlink \"download\" missing}}",
        "{{number missing}}",
        "{{base64 missing}}",
        "{{#if missing}}x{{/if}}",
        "{{#unless missing}}x{{/unless}}",
        "{{#if present}}{{else if missing}}x{{/if}}",
    ];
    let vars = test_vars(serde_json::json!({ "present": false }));
    for template in templates {
        let err = render_manifest("t", template, &vars, &RenderSettings::default())
            .unwrap_err();
        match &err {
            TemplateError::MissingKey { key, .. } => {
                assert_eq!(key, "missing", "rendering {:?}", template)
            }
            other => panic!("rendering {:?}: expected a missing key error, got {:?}", template, other),
        }
        assert!(
            err.to_string().contains("map has no entry for key \"missing\""),
            "{}",
            err,
        );
    }
}

#[test]
fn strict_if_and_unless_still_branch() {
    use serde_json::json;

    let vars = test_vars(json!({ "yes": true, "no": false, "zero": 0, "empty": [] }));
    let examples = &[
        ("{{#if yes}}a{{else}}b{{/if}}", "a"),
        ("{{#if no}}a{{else}}b{{/if}}", "b"),
        ("{{#if empty}}a{{else}}b{{/if}}", "b"),
        ("{{#if zero}}a{{else}}b{{/if}}", "b"),
        ("{{#if zero includeZero=true}}a{{else}}b{{/if}}", "a"),
        ("{{#unless no}}a{{else}}b{{/unless}}", "a"),
        ("{{#if no}}a{{else if yes}}c{{/if}}", "c"),
    ];
    for (template, expected) in examples {
        let output =
            render_manifest("t", template, &vars, &RenderSettings::default())
                .unwrap();
        assert_eq!(output, *expected, "rendering {:?}", template);
    }
}

#[test]
fn helpers_reject_non_string_arguments() {
    let vars = test_vars(serde_json::json!({ "count": 3 }));
    let err = render_manifest("t", "{{base64 count}}", &vars, &RenderSettings::default())
        .unwrap_err();
    assert!(matches!(err, TemplateError::Render(_)), "{:?}", err);
    assert!(err.to_string().contains("base64: expected a string, found number"), "{}", err);
}

#[test]
fn render_template_reports_parse_errors() {
    use serde_json::json;

    let vars = test_vars(json!({ "name": "world" }));
    let err = render_template(
        &testdata("invalid.txt"),
        Some(&vars),
        &RenderSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TemplateError::Parse(_)), "{:?}", err);
}

#[test]
fn render_template_runs_helpers() {
    use serde_json::json;

    let vars = test_vars(json!({ "time": "2023-08-06T15:08:28Z" }));
    let settings = RenderSettings {
        timezone: Some("America/New_York".to_owned()),
    };
    let output = render_template(&testdata("funcs.txt"), Some(&vars), &settings)
        .expect("template should render");
    assert_eq!(
        output,
        "06 Aug 2023 11:08:28\n06 Aug 2023 11:08:28\n[download](https://github.com)\n1,000\nQUJD\n",
    );
}

#[test]
fn render_manifest_handles_sequences_and_mappings() {
    use serde_json::json;

    let vars = test_vars(json!({
        "app": "web",
        "ports": [80, 443],
        "labels": { "tier": "frontend" },
    }));
    let template =
        "name: {{app}}\ntier: {{labels.tier}}\nports:\n{{#each ports}}  - {{this}}\n{{/each}}";
    let output =
        render_manifest("deploy.yml", template, &vars, &RenderSettings::default())
            .unwrap();
    assert_eq!(output, "name: web\ntier: frontend\nports:\n  - 80\n  - 443\n");
}

#[test]
fn format_date_handles_inputs_and_time_zones() {
    use serde_json::json;

    let format = "%d %b %Y %H:%M:%S";
    let examples = &[
        (json!("2023-08-06T15:08:28Z"), Some("America/New_York"), "06 Aug 2023 11:08:28"),
        (json!("2023-08-06T15:08:28Z"), None, "06 Aug 2023 15:08:28"),
        (json!("2023-08-06T15:08:28+02:00"), None, "06 Aug 2023 15:08:28"),
        (json!(1691334508), Some("America/New_York"), "06 Aug 2023 11:08:28"),
        (json!(1691334508), None, "06 Aug 2023 15:08:28"),
    ];
    for (value, timezone, expected) in examples {
        assert_eq!(format_date(format, value, *timezone), *expected);
    }
}

#[test]
fn format_date_falls_back_to_original_value() {
    use serde_json::json;

    let format = "%d %b %Y";
    let examples = &[
        (json!("yesterday"), Some("UTC"), "yesterday"),
        (json!("2023-08-06T15:08:28Z"), Some("Mars/Olympus_Mons"), "2023-08-06T15:08:28Z"),
        (json!(true), None, "true"),
        (json!(1.5), None, "1.5"),
        (json!(["a"]), None, "[\"a\"]"),
    ];
    for (value, timezone, expected) in examples {
        assert_eq!(format_date(format, value, *timezone), *expected);
    }
    assert_eq!(
        format_date("%Q", &json!("2023-08-06T15:08:28Z"), None),
        "2023-08-06T15:08:28Z",
    );
}

#[test]
fn format_number_groups_thousands() {
    use serde_json::json;

    let examples = &[
        (json!("0"), "0"),
        (json!("999"), "999"),
        (json!("1000"), "1,000"),
        (json!("123456"), "123,456"),
        (json!("-1234567"), "-1,234,567"),
        (json!(1000000), "1,000,000"),
        (json!("-9223372036854775808"), "-9,223,372,036,854,775,808"),
        (json!("abc"), "abc"),
        (json!("12.5"), "12.5"),
        (json!(12.5), "12.5"),
    ];
    for (value, expected) in examples {
        assert_eq!(format_number(value), *expected, "formatting {}", value);
    }
}

#[test]
fn simple_helpers() {
    assert_eq!(markdown_link("download", "https://github.com"), "[download](https://github.com)");
    assert_eq!(encode_base64("ABC"), "QUJD");
    assert_eq!(encode_base64("hello"), "aGVsbG8=");
    assert_eq!(encode_base64(""), "");
}
