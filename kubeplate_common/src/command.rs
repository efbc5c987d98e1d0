//! Running external programs.

use std::process::Command;

use crate::prelude::*;

/// The captured output of a command which exited successfully.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    /// Everything the command wrote to standard output.
    pub stdout: String,
    /// Everything the command wrote to standard error.
    pub stderr: String,
}

/// Run `program` with `args`, wait for it to finish and capture its output.
///
/// A non-zero exit status is an error carrying whatever the command wrote to
/// standard error.
pub fn run_command(program: &str, args: &[&str]) -> Result<CommandOutput> {
    info!("Running: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("error starting {}", program))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(format_err!(
            "failed to run command {}: {}",
            program,
            stderr.trim_end(),
        ));
    }

    info!("Output: {}", stdout.trim_end());
    Ok(CommandOutput { stdout, stderr })
}

#[cfg(unix)]
#[test]
fn run_command_captures_output() {
    let output = run_command("sh", &["-c", "echo out; echo err >&2"]).unwrap();
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
}

#[cfg(unix)]
#[test]
fn run_command_reports_stderr_on_failure() {
    let err = run_command("sh", &["-c", "echo out; echo 'no such resource' >&2; exit 3"])
        .unwrap_err();
    assert_eq!(err.to_string(), "failed to run command sh: no such resource");
}

#[test]
fn run_command_reports_missing_programs() {
    let err = run_command("kubeplate-no-such-program", &[]).unwrap_err();
    assert_eq!(err.to_string(), "error starting kubeplate-no-such-program");
}
