//! CLI profiling commands (`proflow profile-sampling`, `proflow profile-instrumentation`, ...).

use clap::{Args, Subcommand};
use serde::Serialize;

use std::path::{Path, PathBuf};

use crate::{
    Config, InstrumentationReport, ProflowResult, SamplingReport, Tool, clean_outputs,
    profile_instrumentation, profile_sampling,
};

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Build, record with the sampling profiler, and render a flamegraph.
    #[command(name = "profile-sampling", alias = "sampling")]
    Sampling {
        /// Program arguments for the sampled run (default from config: 1000).
        /// Arguments starting with `-` go after `--`.
        #[arg(value_name = "ARGS")]
        args: Vec<String>,
        /// Flamegraph output path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Clean old outputs, build, run under the instrumentation simulator, and
    /// print the hottest project source lines.
    #[command(name = "profile-instrumentation", alias = "instrumentation")]
    Instrumentation {
        /// Program arguments for the instrumented run (default: none).
        /// Arguments starting with `-` go after `--`.
        #[arg(value_name = "ARGS")]
        args: Vec<String>,
        /// Maximum number of report lines.
        #[arg(long)]
        limit: Option<usize>,
        /// Project source directory; report lines outside it are dropped.
        #[arg(long)]
        source_dir: Option<PathBuf>,
    },
    /// Delete instrumentation output files left by earlier runs.
    Clean,
    /// Show the configured tools and whether each one can be found.
    Tools,
    /// Print the effective configuration.
    Config,
}

/// Tool overrides; each beats the config file.
#[derive(Debug, Default, Args)]
pub struct ToolOverrides {
    #[arg(long, env = "PROFLOW_BUILD_TOOL", global = true)]
    pub build_tool: Option<String>,
    #[arg(long, env = "PROFLOW_SAMPLER", global = true)]
    pub sampler: Option<String>,
    #[arg(long, env = "PROFLOW_FOLDER", global = true)]
    pub folder: Option<String>,
    #[arg(long, env = "PROFLOW_RENDERER", global = true)]
    pub renderer: Option<String>,
    #[arg(long, env = "PROFLOW_INSTRUMENTER", global = true)]
    pub instrumenter: Option<String>,
    #[arg(long, env = "PROFLOW_ANNOTATOR", global = true)]
    pub annotator: Option<String>,
}

impl ToolOverrides {
    pub fn apply(&self, config: &mut Config) -> ProflowResult<()> {
        let tools = &mut config.tools;
        for (spec, slot) in [
            (&self.build_tool, &mut tools.build),
            (&self.sampler, &mut tools.sampler),
            (&self.folder, &mut tools.folder),
            (&self.renderer, &mut tools.renderer),
            (&self.instrumenter, &mut tools.instrumenter),
            (&self.annotator, &mut tools.annotator),
        ] {
            if let Some(spec) = spec {
                *slot = Tool::parse(spec)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub pattern: String,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: &'static str,
    pub command: String,
    pub resolved: Option<PathBuf>,
    pub found: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsReport {
    #[serde(rename = "schemaVersion")]
    pub schema_version: &'static str,
    #[serde(rename = "workingDir")]
    pub working_dir: PathBuf,
    pub tools: Vec<ToolStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Sampling(SamplingReport),
    Instrumentation(InstrumentationReport),
    Clean(CleanReport),
    Tools(ToolsReport),
    Config(Config),
}

pub fn profile_command(config: &Config, command: &ProfileCommand) -> ProflowResult<CommandOutput> {
    match command {
        ProfileCommand::Sampling { args, out } => {
            let mut config = config.clone();
            if !args.is_empty() {
                config.sampling.args = args.clone();
            }
            if let Some(out) = out {
                config.sampling.flamegraph = out.clone();
            }
            Ok(CommandOutput::Sampling(profile_sampling(&config)?))
        }

        ProfileCommand::Instrumentation {
            args,
            limit,
            source_dir,
        } => {
            let mut config = config.clone();
            if !args.is_empty() {
                config.instrumentation.args = args.clone();
            }
            if let Some(limit) = limit {
                config.instrumentation.limit = *limit;
            }
            if let Some(dir) = source_dir {
                config.instrumentation.source_dir = dir.clone();
            }
            Ok(CommandOutput::Instrumentation(profile_instrumentation(&config)?))
        }

        ProfileCommand::Clean => Ok(CommandOutput::Clean(CleanReport {
            pattern: config.instrumentation.output_pattern.clone(),
            removed: clean_outputs(config)?,
        })),

        ProfileCommand::Tools => Ok(CommandOutput::Tools(tools_report(config))),

        ProfileCommand::Config => Ok(CommandOutput::Config(config.clone())),
    }
}

fn tools_report(config: &Config) -> ToolsReport {
    let tools = config
        .tools
        .entries()
        .into_iter()
        .map(|(name, tool)| {
            let resolved = locate(&tool.resolve(&config.working_dir));
            ToolStatus {
                name,
                command: tool.display(),
                found: resolved.is_some(),
                resolved,
            }
        })
        .collect();
    ToolsReport {
        schema_version: "proflow.tools.v1",
        working_dir: config.working_dir.clone(),
        tools,
    }
}

fn locate(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
