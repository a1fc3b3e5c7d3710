//! External tool invocation.
//!
//! Every stage runs one child process in the configured working directory.
//! Stderr is always passed through; stdout is passed through unless the stage
//! captures it as data.

use std::ffi::OsString;
use std::io::{Read as _, Write as _};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Config, ProflowError, ProflowResult, Stage, StageExit, StageFailure, Tool};

/// Shared cancellation flag for one pipeline run. Clones observe the same
/// flag, so a signal handler can hold one while the stages check another.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Marks the run as interrupted. The stage currently running fails once
    /// its child returns and no further stage starts.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fully specified tool invocation for one stage.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    stage: Stage,
    tool: &'a Tool,
    working_dir: &'a Path,
    interrupt: &'a InterruptFlag,
    args: Vec<OsString>,
}

impl<'a> Invocation<'a> {
    pub fn new(
        stage: Stage,
        tool: &'a Tool,
        working_dir: &'a Path,
        interrupt: &'a InterruptFlag,
    ) -> Self {
        let args = tool.args.iter().map(OsString::from).collect();
        Self { stage, tool, working_dir, interrupt, args }
    }

    /// Runs `tool` in the config's working directory under its interrupt flag.
    pub fn in_config(stage: Stage, tool: &'a Tool, config: &'a Config) -> Self {
        Self::new(stage, tool, &config.working_dir, &config.interrupt)
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs with stdout and stderr inherited.
    pub fn run(&self) -> ProflowResult<()> {
        self.before_spawn()?;
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.launch_error(&e))?;
        self.check(status)
    }

    /// Runs with stdout captured and returned.
    pub fn capture(&self) -> ProflowResult<Vec<u8>> {
        self.before_spawn()?;
        let output = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| self.launch_error(&e))?;
        self.check(output.status)?;
        Ok(output.stdout)
    }

    /// Feeds `input` to the child's stdin and returns its stdout.
    pub fn filter(&self, input: &[u8]) -> ProflowResult<Vec<u8>> {
        self.before_spawn()?;
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.launch_error(&e))?;

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let (written, read) = std::thread::scope(|s| {
            let writer = s.spawn(move || -> std::io::Result<()> {
                if let Some(mut pipe) = stdin {
                    match pipe.write_all(input) {
                        Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => return Err(err),
                        _ => {}
                    }
                }
                Ok(())
            });
            let mut out = Vec::new();
            let read = match stdout.as_mut() {
                Some(pipe) => pipe.read_to_end(&mut out).map(|_| out),
                None => Ok(out),
            };
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, read)
        });

        let status = child.wait()?;
        self.check(status)?;
        written?;
        Ok(read?)
    }

    fn command(&self) -> Command {
        let program = self.tool.resolve(self.working_dir);
        tracing::info!(stage = %self.stage, tool = %program.display(), "starting stage");
        tracing::debug!(stage = %self.stage, args = ?self.args, dir = %self.working_dir.display(), "invocation");
        let mut cmd = Command::new(program);
        cmd.args(&self.args).current_dir(self.working_dir);
        cmd
    }

    fn before_spawn(&self) -> ProflowResult<()> {
        if self.interrupt.is_set() {
            return Err(self.failure(StageExit::Interrupted));
        }
        Ok(())
    }

    fn check(&self, status: ExitStatus) -> ProflowResult<()> {
        if self.interrupt.is_set() {
            return Err(self.failure(StageExit::Interrupted));
        }
        if status.success() {
            tracing::info!(stage = %self.stage, "stage finished");
            return Ok(());
        }
        Err(self.failure(exit_of(status)))
    }

    fn launch_error(&self, err: &std::io::Error) -> ProflowError {
        self.failure(StageExit::Launch(err.to_string()))
    }

    fn failure(&self, exit: StageExit) -> ProflowError {
        let failure = StageFailure {
            stage: self.stage,
            tool: self.tool.display(),
            exit,
        };
        tracing::debug!("{failure}");
        ProflowError::stage(failure)
    }
}

#[cfg(unix)]
fn exit_of(status: ExitStatus) -> StageExit {
    use std::os::unix::process::ExitStatusExt as _;

    match (status.code(), status.signal()) {
        (Some(code), _) => StageExit::Code(code),
        (None, Some(sig)) => StageExit::Signal(sig),
        (None, None) => StageExit::Code(1),
    }
}

#[cfg(not(unix))]
fn exit_of(status: ExitStatus) -> StageExit {
    StageExit::Code(status.code().unwrap_or(1))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("proflow-process-{name}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn sh_tool(dir: &Path, name: &str, body: &str) -> Tool {
        let script = dir.join(name);
        std::fs::write(&script, body).expect("write script");
        Tool {
            program: PathBuf::from("sh"),
            args: vec![script.to_string_lossy().to_string()],
        }
    }

    #[test]
    fn run_executes_in_working_dir() {
        let dir = temp_dir("cwd");
        let tool = sh_tool(&dir, "touch.sh", "touch \"$1\"\n");
        Invocation::new(Stage::Build, &tool, &dir, &InterruptFlag::default())
            .arg("marker")
            .run()
            .expect("run");
        assert!(dir.join("marker").exists());
    }

    #[test]
    fn non_zero_exit_maps_to_stage_kind() {
        let dir = temp_dir("exit");
        let tool = sh_tool(&dir, "fail.sh", "exit 7\n");
        let err = Invocation::new(Stage::Record, &tool, &dir, &InterruptFlag::default())
            .run()
            .expect_err("fails");
        assert!(matches!(err, ProflowError::Profiler(_)));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let dir = temp_dir("missing");
        let tool = Tool::new("proflow-definitely-not-installed");
        let err = Invocation::new(Stage::Fold, &tool, &dir, &InterruptFlag::default())
            .capture()
            .expect_err("missing");
        let failure = err.stage_failure().expect("stage failure");
        assert!(matches!(failure.exit, StageExit::Launch(_)));
        assert!(matches!(err, ProflowError::Transform(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn filter_pipes_input_through_child() {
        let dir = temp_dir("filter");
        let tool = sh_tool(&dir, "upper.sh", "tr 'a-z' 'A-Z'\n");
        let input = "main;work 1\n".repeat(20_000);
        let out = Invocation::new(Stage::Fold, &tool, &dir, &InterruptFlag::default())
            .filter(input.as_bytes())
            .expect("filter");
        assert_eq!(out, input.to_uppercase().into_bytes());
    }

    #[test]
    fn filter_tolerates_child_ignoring_stdin() {
        let dir = temp_dir("ignore-stdin");
        let tool = sh_tool(&dir, "ignore.sh", "echo done\n");
        let input = vec![b'x'; 1 << 20];
        let out = Invocation::new(Stage::Render, &tool, &dir, &InterruptFlag::default())
            .filter(&input)
            .expect("filter");
        assert_eq!(out, b"done\n");
    }

    #[test]
    fn capture_returns_stdout_only_on_success() {
        let dir = temp_dir("capture");
        let ok = sh_tool(&dir, "ok.sh", "printf 'a\\nb\\n'\n");
        let out = Invocation::new(Stage::ReadTrace, &ok, &dir, &InterruptFlag::default())
            .capture()
            .expect("capture");
        assert_eq!(out, b"a\nb\n");

        let bad = sh_tool(&dir, "bad.sh", "echo partial; exit 3\n");
        let err = Invocation::new(Stage::Annotate, &bad, &dir, &InterruptFlag::default())
            .capture()
            .expect_err("fails");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn interrupted_flag_prevents_spawn() {
        let dir = temp_dir("interrupted");
        let tool = sh_tool(&dir, "touch.sh", "touch marker\n");
        let interrupt = InterruptFlag::default();
        interrupt.clone().request();
        let err = Invocation::new(Stage::Build, &tool, &dir, &interrupt)
            .run()
            .expect_err("interrupted");
        let failure = err.stage_failure().expect("stage failure");
        assert_eq!(failure.exit, StageExit::Interrupted);
        assert_eq!(err.exit_code(), 130);
        assert!(!dir.join("marker").exists());
    }
}
