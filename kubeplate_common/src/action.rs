//! The action itself: gather variables, render the manifest, publish it and
//! optionally apply it.

use crate::config::Config;
use crate::kubernetes::Kubectl;
use crate::manifest::render_template;
use crate::output::write_output;
use crate::prelude::*;
use crate::vars::{load_vars_file, merge_vars, parse_vars};

/// The name of the output holding the rendered manifest.
pub const RESULT_OUTPUT: &str = "result";

/// Run the action once. Stops at the first error.
pub fn run(config: &Config) -> Result<()> {
    debug!("config: {:?}", config);

    // Check configuration before touching any files.
    let inline = match config.vars() {
        Some(vars) => parse_vars(vars)?,
        None => None,
    };
    let apply = config.apply()?;

    let from_file = match config.vars_path() {
        Some(path) => load_vars_file(path)?,
        None => None,
    };
    let vars = merge_vars(inline, from_file);

    let manifest = render_template(
        &config.template,
        vars.as_ref(),
        &config.render_settings(),
    )
    .context("failed to render template")?;

    write_output(RESULT_OUTPUT, &manifest, config.github_output())?;

    if let Some(path) = config.result_path() {
        fs::write(path, &manifest)
            .with_context(|| format!("failed to write file {:?}", path))?;
    }

    if apply {
        Kubectl::new(config.kubectl.as_str()).apply(&manifest)?;
    }
    Ok(())
}

#[cfg(test)]
fn test_config(dir: &Path, template: &str) -> Config {
    let template_path = dir.join("template.yml");
    fs::write(&template_path, template).unwrap();
    let github_output = dir.join("github_output");
    fs::write(&github_output, "").unwrap();
    Config {
        template: template_path,
        vars: None,
        vars_path: None,
        result_path: None,
        timezone: None,
        apply: None,
        kubectl: "kubectl".to_owned(),
        github_output: Some(github_output),
    }
}

#[test]
fn run_renders_merged_vars_to_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(
        dir.path(),
        "kind: Deployment\nname: {{name}}\nimage: {{image}}\n",
    );
    let vars_path = dir.path().join("vars.yml");
    fs::write(&vars_path, "name: from-file\nimage: nginx:1.25\n").unwrap();
    config.vars = Some("name: inline".to_owned());
    config.vars_path = Some(vars_path);
    config.result_path = Some(dir.path().join("result.yml"));

    run(&config).unwrap();

    let manifest = "kind: Deployment\nname: inline\nimage: nginx:1.25\n";
    assert_eq!(
        fs::read_to_string(dir.path().join("result.yml")).unwrap(),
        manifest,
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("github_output")).unwrap(),
        format!("result<<OUTPUT\n{}\nOUTPUT\n", manifest),
    );
}

#[test]
fn run_rejects_bad_inline_vars_before_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), "name: {{name}}\n");
    // An unterminated flow sequence is never valid YAML.
    config.vars = Some("name: [web, api\n".to_owned());
    config.result_path = Some(dir.path().join("result.yml"));

    let err = run(&config).unwrap_err();
    assert!(err.to_string().starts_with("unable to parse vars"), "{}", err);
    assert!(!dir.path().join("result.yml").exists());
}

#[test]
fn run_fails_on_missing_keys_without_writing_anything() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), "name: {{name}}\n");
    config.result_path = Some(dir.path().join("result.yml"));

    let err = run(&config).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.starts_with("failed to render template: "), "{}", message);
    assert!(message.contains("\"name\""), "{}", message);
    assert_eq!(
        fs::read_to_string(dir.path().join("github_output")).unwrap(),
        "",
    );
    assert!(!dir.path().join("result.yml").exists());
}

#[cfg(unix)]
#[test]
fn run_applies_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), "kind: Namespace\n");
    config.apply = Some("true".to_owned());
    config.kubectl = "false".to_owned();

    let err = run(&config).unwrap_err();
    assert!(err.to_string().starts_with("failed to run command false"), "{}", err);
    // The output was published before we tried to apply.
    assert_eq!(
        fs::read_to_string(dir.path().join("github_output")).unwrap(),
        "result<<OUTPUT\nkind: Namespace\n\nOUTPUT\n",
    );
}
