//! Optimized build of the profiled program.

use std::path::PathBuf;

use crate::{Config, Invocation, ProflowResult, Stage};

/// Runs the configured build and returns the path of the build artifact.
///
/// The binary is rebuilt on every call; an existing artifact is never trusted.
/// Only the build tool's exit status is inspected.
pub fn build_target(config: &Config) -> ProflowResult<PathBuf> {
    let artifact = config.artifact_path()?;
    Invocation::in_config(Stage::Build, &config.tools.build, config)
        .args(&config.build_args)
        .run()?;
    tracing::info!(artifact = %artifact.display(), "build finished");
    Ok(artifact)
}
