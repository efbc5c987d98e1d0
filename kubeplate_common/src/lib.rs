//! Code shared by the `kubeplate` action: variable handling, manifest
//! rendering, CI output and talking to the cluster.

#![warn(missing_docs)]

pub use tracing;

pub mod action;
pub mod command;
pub mod config;
pub mod errors;
pub mod kubernetes;
pub mod manifest;
pub mod output;
pub mod tracing_support;
pub mod vars;

/// Common imports used by many modules.
pub mod prelude {
    pub use anyhow::{format_err, Context};
    pub use serde::Serialize;
    pub use std::{
        fmt, fs,
        io::Write,
        path::{Path, PathBuf},
    };
    pub use tracing::{debug, info, trace, warn};

    pub use super::{Error, Result};
}

/// Error type for this crate's functions.
pub use anyhow::Error;

/// Result type for this crate's functions.
pub use anyhow::Result;
