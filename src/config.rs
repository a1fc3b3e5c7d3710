//! `proflow.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{InterruptFlag, ProflowError, ProflowResult};

pub const CONFIG_FILE_NAME: &str = "proflow.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory every stage runs in and resolves artifact paths against.
    /// Never read from the config file.
    #[serde(skip, default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Name of the built executable. Defaults to the `[package].name` of the
    /// working directory's `Cargo.toml`.
    #[serde(default)]
    pub binary: Option<String>,

    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    /// Build profile directory under `target_dir`.
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default = "default_build_args")]
    pub build_args: Vec<String>,

    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub sampling: SamplingOptions,

    #[serde(default)]
    pub instrumentation: InstrumentationOptions,

    /// Set on Ctrl-C; checked before and after every stage.
    #[serde(skip)]
    pub interrupt: InterruptFlag,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("target")
}

fn default_profile() -> String {
    "release".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["build".to_string(), "--release".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            binary: None,
            target_dir: default_target_dir(),
            profile: default_profile(),
            build_args: default_build_args(),
            tools: ToolPaths::default(),
            sampling: SamplingOptions::default(),
            instrumentation: InstrumentationOptions::default(),
            interrupt: InterruptFlag::default(),
        }
    }
}

/// An external program plus the arguments that always precede the
/// stage-specific ones (e.g. `cargo +nightly`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ToolRepr", into = "ToolRepr")]
pub struct Tool {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Config-file form of a [`Tool`]: a program path or `[program, args...]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolRepr {
    Program(PathBuf),
    Command(Vec<String>),
}

impl TryFrom<ToolRepr> for Tool {
    type Error = String;

    fn try_from(value: ToolRepr) -> Result<Self, Self::Error> {
        let (program, args) = match value {
            ToolRepr::Program(program) => (program, Vec::new()),
            ToolRepr::Command(mut parts) => {
                if parts.is_empty() {
                    return Err("empty tool command []".to_string());
                }
                let program = PathBuf::from(parts.remove(0));
                (program, parts)
            }
        };
        if program.as_os_str().is_empty() {
            return Err("tool program must not be empty".to_string());
        }
        Ok(Self { program, args })
    }
}

impl From<Tool> for ToolRepr {
    fn from(value: Tool) -> Self {
        if value.args.is_empty() {
            return ToolRepr::Program(value.program);
        }
        let mut parts = vec![value.program.to_string_lossy().to_string()];
        parts.extend(value.args);
        ToolRepr::Command(parts)
    }
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Parses a whitespace-separated command line such as `cargo +nightly`.
    pub fn parse(spec: &str) -> ProflowResult<Self> {
        let mut parts = spec.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(ProflowError::InvalidArgument(format!("empty tool command {spec:?}")));
        };
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Relative paths with a directory component are taken relative to the
    /// working directory; bare names are left for `PATH` lookup.
    pub fn resolve(&self, working_dir: &Path) -> PathBuf {
        if self.program.is_relative() && self.program.components().count() > 1 {
            working_dir.join(&self.program)
        } else {
            self.program.clone()
        }
    }

    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolPaths {
    #[serde(default = "default_build_tool")]
    pub build: Tool,
    #[serde(default = "default_sampler")]
    pub sampler: Tool,
    #[serde(default = "default_folder")]
    pub folder: Tool,
    #[serde(default = "default_renderer")]
    pub renderer: Tool,
    #[serde(default = "default_instrumenter")]
    pub instrumenter: Tool,
    #[serde(default = "default_annotator")]
    pub annotator: Tool,
}

fn default_build_tool() -> Tool {
    Tool::new("cargo")
}

fn default_sampler() -> Tool {
    Tool::new("perf")
}

fn default_folder() -> Tool {
    Tool::new("stackcollapse-perf.pl")
}

fn default_renderer() -> Tool {
    Tool::new("flamegraph.pl")
}

fn default_instrumenter() -> Tool {
    Tool::new("valgrind")
}

fn default_annotator() -> Tool {
    Tool::new("cg_annotate")
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            build: default_build_tool(),
            sampler: default_sampler(),
            folder: default_folder(),
            renderer: default_renderer(),
            instrumenter: default_instrumenter(),
            annotator: default_annotator(),
        }
    }
}

impl ToolPaths {
    pub fn entries(&self) -> [(&'static str, &Tool); 6] {
        [
            ("build", &self.build),
            ("sampler", &self.sampler),
            ("folder", &self.folder),
            ("renderer", &self.renderer),
            ("instrumenter", &self.instrumenter),
            ("annotator", &self.annotator),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SamplingOptions {
    /// Program arguments for the sampled run (the workload size).
    #[serde(default = "default_sampling_args")]
    pub args: Vec<String>,

    /// Sampler arguments placed before `-o <raw_trace> -- <binary>`.
    #[serde(default = "default_record_args")]
    pub record_args: Vec<String>,

    #[serde(default = "default_raw_trace")]
    pub raw_trace: PathBuf,

    #[serde(default = "default_flamegraph")]
    pub flamegraph: PathBuf,
}

fn default_sampling_args() -> Vec<String> {
    vec!["1000".to_string()]
}

fn default_record_args() -> Vec<String> {
    vec!["record".to_string(), "-g".to_string()]
}

fn default_raw_trace() -> PathBuf {
    PathBuf::from("perf.data")
}

fn default_flamegraph() -> PathBuf {
    PathBuf::from("flamegraph.svg")
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            args: default_sampling_args(),
            record_args: default_record_args(),
            raw_trace: default_raw_trace(),
            flamegraph: default_flamegraph(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InstrumentationOptions {
    /// Program arguments for the instrumented run. Empty runs the program
    /// with its default behavior.
    #[serde(default)]
    pub args: Vec<String>,

    /// Instrumenter arguments placed before the binary.
    #[serde(default = "default_tool_args")]
    pub tool_args: Vec<String>,

    /// Annotator arguments placed before the output files.
    #[serde(default)]
    pub annotate_args: Vec<String>,

    /// Glob (relative to the working directory) naming instrumentation output files.
    #[serde(default = "default_output_pattern")]
    pub output_pattern: String,

    /// The project's own source directory; report lines outside it are dropped.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_tool_args() -> Vec<String> {
    vec!["--tool=cachegrind".to_string(), "--cache-sim=yes".to_string()]
}

fn default_output_pattern() -> String {
    "cachegrind.out.*".to_string()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_limit() -> usize {
    10
}

impl Default for InstrumentationOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            tool_args: default_tool_args(),
            annotate_args: Vec::new(),
            output_pattern: default_output_pattern(),
            source_dir: default_source_dir(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CargoManifest {
    package: Option<CargoPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoPackage {
    name: String,
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Loads `<working_dir>/proflow.toml` (or `explicit` when given) and pins
    /// the working directory.
    pub fn for_working_dir(working_dir: &Path, explicit: Option<&Path>) -> Self {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| working_dir.join(CONFIG_FILE_NAME));
        let mut cfg = Self::load_optional(&path);
        cfg.working_dir = working_dir.to_path_buf();
        cfg
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    pub fn binary_name(&self) -> ProflowResult<String> {
        if let Some(name) = &self.binary {
            return Ok(name.clone());
        }
        let manifest_path = self.working_dir.join("Cargo.toml");
        let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
            ProflowError::Config(format!(
                "no `binary` configured and {} is unreadable: {e}",
                manifest_path.display()
            ))
        })?;
        let manifest: CargoManifest = toml::from_str(&text)?;
        manifest.package.map(|p| p.name).ok_or_else(|| {
            ProflowError::Config(format!(
                "no `binary` configured and {} has no [package] section",
                manifest_path.display()
            ))
        })
    }

    pub fn artifact_path(&self) -> ProflowResult<PathBuf> {
        let name = self.binary_name()?;
        Ok(self.resolve(&self.target_dir).join(&self.profile).join(name))
    }

    pub fn raw_trace_path(&self) -> PathBuf {
        self.resolve(&self.sampling.raw_trace)
    }

    pub fn flamegraph_path(&self) -> PathBuf {
        self.resolve(&self.sampling.flamegraph)
    }
}
