//! Action configuration.
//!
//! GitHub passes action inputs as `INPUT_*` environment variables, so every
//! option falls back to one. Inputs the user left out arrive as empty
//! strings, which we treat the same as unset.

use structopt::StructOpt;

use crate::manifest::RenderSettings;
use crate::prelude::*;

/// Command-line options, parsed using `structopt`.
#[derive(Clone, Debug, StructOpt)]
#[structopt(
    name = "kubeplate",
    about = "Render a Kubernetes manifest from a template and optionally apply it."
)]
pub struct Config {
    /// Path to the manifest template.
    #[structopt(
        long = "template",
        env = "INPUT_TEMPLATE",
        default_value = ".kube.yml",
        parse(from_os_str)
    )]
    pub template: PathBuf,

    /// Template variables, as a YAML or JSON mapping.
    #[structopt(long = "vars", env = "INPUT_VARS")]
    pub vars: Option<String>,

    /// Path to a YAML file with more template variables. Variables passed
    /// with `--vars` take precedence.
    #[structopt(long = "vars-path", env = "INPUT_VARS_PATH", parse(from_os_str))]
    pub vars_path: Option<PathBuf>,

    /// Also write the rendered manifest to this file.
    #[structopt(long = "result-path", env = "INPUT_RESULT_PATH", parse(from_os_str))]
    pub result_path: Option<PathBuf>,

    /// IANA time zone used by the `date` helper, like `Europe/Paris`.
    #[structopt(long = "timezone", env = "INPUT_TIMEZONE")]
    pub timezone: Option<String>,

    /// Apply the rendered manifest to the current cluster (`true` or
    /// `false`).
    #[structopt(long = "apply", env = "INPUT_APPLY")]
    pub apply: Option<String>,

    /// The `kubectl` executable to apply manifests with.
    #[structopt(long = "kubectl", env = "INPUT_KUBECTL", default_value = "kubectl")]
    pub kubectl: String,

    /// The file the runner collects step outputs from.
    #[structopt(
        long = "github-output",
        env = "GITHUB_OUTPUT",
        hidden = true,
        parse(from_os_str)
    )]
    pub github_output: Option<PathBuf>,
}

impl Config {
    /// The inline variables, if any were given.
    pub fn vars(&self) -> Option<&str> {
        self.vars.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// The variables file, if one was given.
    pub fn vars_path(&self) -> Option<&Path> {
        non_empty_path(&self.vars_path)
    }

    /// Where to write the rendered manifest, if anywhere.
    pub fn result_path(&self) -> Option<&Path> {
        non_empty_path(&self.result_path)
    }

    /// The runner's output file, if we're running under a recent runner.
    pub fn github_output(&self) -> Option<&Path> {
        non_empty_path(&self.github_output)
    }

    /// Should we apply the rendered manifest?
    pub fn apply(&self) -> Result<bool> {
        parse_flag(self.apply.as_deref().unwrap_or_default())
            .context("invalid value for apply")
    }

    /// Settings for template helpers.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            timezone: self
                .timezone
                .as_deref()
                .map(str::trim)
                .filter(|tz| !tz.is_empty())
                .map(str::to_owned),
        }
    }
}

fn non_empty_path(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// Parse a boolean action input.
fn parse_flag(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "0" => Ok(false),
        "true" | "yes" | "1" => Ok(true),
        other => Err(format_err!("expected true or false, found {:?}", other)),
    }
}

#[cfg(test)]
fn config_from_args(args: &[&str]) -> Config {
    let mut all_args = vec!["kubeplate"];
    all_args.extend_from_slice(args);
    Config::from_iter_safe(all_args).expect("arguments should parse")
}

#[test]
fn parse_flag_accepts_common_spellings() {
    for input in &["true", "TRUE", "yes", "1", " True "] {
        assert!(parse_flag(input).unwrap(), "{:?}", input);
    }
    for input in &["", "false", "No", "0"] {
        assert!(!parse_flag(input).unwrap(), "{:?}", input);
    }
    assert!(parse_flag("maybe").is_err());
}

#[test]
fn bad_apply_values_are_configuration_errors() {
    let config = config_from_args(&["--apply", "sometimes"]);
    let err = config.apply().unwrap_err();
    assert_eq!(
        format!("{:#}", err),
        "invalid value for apply: expected true or false, found \"sometimes\"",
    );
}

#[test]
fn flags_configure_the_action() {
    let config = config_from_args(&[
        "--template",
        "deploy.yml",
        "--vars",
        "name: web",
        "--vars-path",
        "vars.yml",
        "--result-path",
        "out.yml",
        "--timezone",
        "Europe/Paris",
        "--apply",
        "true",
        "--kubectl",
        "/usr/local/bin/kubectl",
        "--github-output",
        "/tmp/output",
    ]);
    assert_eq!(config.template, Path::new("deploy.yml"));
    assert_eq!(config.vars(), Some("name: web"));
    assert_eq!(config.vars_path(), Some(Path::new("vars.yml")));
    assert_eq!(config.result_path(), Some(Path::new("out.yml")));
    assert_eq!(
        config.render_settings().timezone.as_deref(),
        Some("Europe/Paris"),
    );
    assert!(config.apply().unwrap());
    assert_eq!(config.kubectl, "/usr/local/bin/kubectl");
    assert_eq!(config.github_output(), Some(Path::new("/tmp/output")));
}

#[test]
fn empty_inputs_count_as_unset() {
    let config = config_from_args(&[
        "--vars",
        "",
        "--vars-path",
        "",
        "--result-path",
        "",
        "--timezone",
        "",
        "--apply",
        "",
    ]);
    assert_eq!(config.vars(), None);
    assert_eq!(config.vars_path(), None);
    assert_eq!(config.result_path(), None);
    assert_eq!(config.render_settings().timezone, None);
    assert!(!config.apply().unwrap());
}
