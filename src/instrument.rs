//! Instrumentation runs and their output files.

use std::path::{Path, PathBuf};

use crate::{
    AnnotatedReport, Config, Invocation, ProflowResult, SourceScope, Stage, fsutil,
    select_hot_lines,
};

/// Current members of the instrumentation output set, sorted.
pub fn list_outputs(config: &Config) -> ProflowResult<Vec<PathBuf>> {
    fsutil::find_matching_files(&config.working_dir, &config.instrumentation.output_pattern)
}

/// Deletes every instrumentation output file. Finding nothing to delete is
/// success.
pub fn clean_outputs(config: &Config) -> ProflowResult<Vec<PathBuf>> {
    let removed =
        fsutil::remove_matching_files(&config.working_dir, &config.instrumentation.output_pattern)?;
    tracing::info!(removed = removed.len(), "instrumentation outputs cleaned");
    Ok(removed)
}

/// Runs `binary` under the instrumentation simulator. The simulator appends
/// one output file per run; anything it leaves behind on failure stays.
pub fn run_instrumented(config: &Config, binary: &Path) -> ProflowResult<()> {
    Invocation::in_config(Stage::Instrument, &config.tools.instrumenter, config)
        .args(&config.instrumentation.tool_args)
        .arg(binary)
        .args(&config.instrumentation.args)
        .run()
}

/// Annotates every output file and keeps the hottest project source lines.
/// An empty output set gives an empty report without running the annotator.
pub fn annotate_outputs(config: &Config) -> ProflowResult<AnnotatedReport> {
    let opts = &config.instrumentation;
    let inputs = list_outputs(config)?;
    if inputs.is_empty() {
        tracing::info!(pattern = %opts.output_pattern, "no instrumentation outputs to annotate");
        return Ok(AnnotatedReport::empty(opts.source_dir.clone(), opts.limit));
    }

    let stdout = Invocation::in_config(Stage::Annotate, &config.tools.annotator, config)
        .args(&opts.annotate_args)
        .args(&inputs)
        .capture()?;
    let text = String::from_utf8_lossy(&stdout);
    let scope = SourceScope::new(&config.working_dir, &opts.source_dir);
    let lines = select_hot_lines(&text, &scope, opts.limit);

    Ok(AnnotatedReport {
        inputs,
        source_dir: opts.source_dir.clone(),
        limit: opts.limit,
        lines,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{ProflowError, Tool};
    use uuid::Uuid;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("proflow-instrument-{name}-{}", Uuid::new_v4()));
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

    fn config(dir: &Path) -> Config {
        let mut cfg = Config {
            working_dir: dir.to_path_buf(),
            ..Config::default()
        };
        cfg.tools.annotator = sh_tool(dir, "annotate.sh", "cat \"$@\"\n");
        cfg
    }

    #[test]
    fn clean_succeeds_for_zero_one_and_many_files() {
        for count in [0usize, 1, 5] {
            let dir = temp_dir("clean");
            let cfg = config(&dir);
            for i in 0..count {
                std::fs::write(dir.join(format!("cachegrind.out.{i}")), "x").expect("write");
            }
            std::fs::write(dir.join("keep.txt"), "keep").expect("write");
            let removed = clean_outputs(&cfg).expect("clean");
            assert_eq!(removed.len(), count);
            assert!(list_outputs(&cfg).expect("list").is_empty());
            assert!(dir.join("keep.txt").exists());
            assert!(clean_outputs(&cfg).expect("clean again").is_empty());
        }
    }

    #[test]
    fn empty_output_set_gives_empty_report() {
        let dir = temp_dir("empty");
        let mut cfg = config(&dir);
        cfg.tools.annotator = Tool::new("proflow-annotator-not-installed");
        let report = annotate_outputs(&cfg).expect("report");
        assert!(report.lines.is_empty());
        assert!(report.inputs.is_empty());
    }

    #[test]
    fn report_merges_all_outputs_and_filters() {
        let dir = temp_dir("merge");
        let cfg = config(&dir);
        std::fs::write(
            dir.join("cachegrind.out.1"),
            "100 src/a.rs:a\n900 /rustc/x/library/std/src/rt.rs:std::rt\n",
        )
        .expect("write");
        std::fs::write(dir.join("cachegrind.out.2"), "300 src/b.rs:b\n").expect("write");
        let report = annotate_outputs(&cfg).expect("report");
        assert_eq!(report.inputs.len(), 2);
        let locations = report.lines.iter().map(|l| l.location.as_str()).collect::<Vec<_>>();
        assert_eq!(locations, vec!["src/b.rs:b", "src/a.rs:a"]);
    }

    #[test]
    fn annotator_failure_is_transform_failure() {
        let dir = temp_dir("annotate-fail");
        let mut cfg = config(&dir);
        std::fs::write(dir.join("cachegrind.out.1"), "1 src/a.rs:a\n").expect("write");
        cfg.tools.annotator = sh_tool(&dir, "bad.sh", "exit 4\n");
        let err = annotate_outputs(&cfg).expect_err("annotator fails");
        assert!(matches!(err, ProflowError::Transform(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn instrumented_run_passes_tool_args_and_program_args() {
        let dir = temp_dir("run");
        let mut cfg = config(&dir);
        cfg.instrumentation.args = vec!["--quick".to_string()];
        cfg.tools.instrumenter =
            sh_tool(&dir, "valgrind.sh", "echo \"$@\" > cachegrind.out.$$\n");
        run_instrumented(&cfg, Path::new("/bin/demo")).expect("run");
        let outputs = list_outputs(&cfg).expect("list");
        assert_eq!(outputs.len(), 1);
        let args = std::fs::read_to_string(&outputs[0]).expect("read");
        assert_eq!(args.trim(), "--tool=cachegrind --cache-sim=yes /bin/demo --quick");
    }
}
