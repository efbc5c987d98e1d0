//! Tools for talking to Kubernetes.

use tempfile::Builder;

use crate::command::{run_command, CommandOutput};
use crate::prelude::*;

/// The `kubectl` executable we should run.
#[derive(Clone, Debug)]
pub struct Kubectl {
    program: String,
}

impl Kubectl {
    /// Use the specified executable as `kubectl`.
    pub fn new<S: Into<String>>(program: S) -> Self {
        Kubectl {
            program: program.into(),
        }
    }

    /// Run `kubectl`, capturing its output.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        run_command(&self.program, args)
    }

    /// Deploy a manifest to our Kubernetes cluster.
    ///
    /// The manifest is written to a temporary file, which is removed once
    /// `kubectl apply` has finished.
    pub fn apply(&self, manifest: &str) -> Result<CommandOutput> {
        let mut file = Builder::new()
            .prefix("kubeplate-")
            .suffix(".yml")
            .tempfile()
            .context("error creating temporary manifest file")?;
        file.write_all(manifest.as_bytes()).with_context(|| {
            format!("error writing manifest to {:?}", file.path())
        })?;

        let path = file.path().to_string_lossy().into_owned();
        debug!("applying manifest from {}", path);
        self.run(&["apply", "-f", &path])
    }
}

#[cfg(unix)]
#[test]
fn apply_passes_manifest_file_to_kubectl() {
    // `echo` stands in for `kubectl` and shows us the arguments.
    let output = Kubectl::new("echo").apply("kind: Namespace\n").unwrap();
    let args = output.stdout.trim_end();
    assert!(args.starts_with("apply -f "), "{}", args);
    assert!(args.ends_with(".yml"), "{}", args);

    // The temporary manifest is cleaned up afterwards.
    let path = Path::new(args.trim_start_matches("apply -f "));
    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn apply_fails_when_kubectl_fails() {
    let err = Kubectl::new("false").apply("kind: Nope\n").unwrap_err();
    assert!(err.to_string().starts_with("failed to run command false"), "{}", err);
}
