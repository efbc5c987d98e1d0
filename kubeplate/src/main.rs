//! Render a Kubernetes manifest from a template and optionally apply it.
//! Meant to run as a GitHub Action step.

use kubeplate_common::{
    action, config::Config, prelude::*, quick_main,
    tracing_support::initialize_tracing,
};
use structopt::StructOpt;

quick_main!(run);

/// Our main entry point.
fn run() -> Result<()> {
    initialize_tracing();
    let config = Config::from_args();
    action::run(&config)
}
