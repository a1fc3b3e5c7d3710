//! Sampling capture and flamegraph rendering.
//!
//! `record_samples` leaves the raw trace in the working directory. The raw
//! trace is dumped as text, folded, and rendered entirely in memory; only the
//! final SVG is written.

use std::path::{Path, PathBuf};

use crate::{Config, Invocation, ProflowResult, Stage, fsutil};

/// Runs `binary` under the sampler with the configured workload arguments.
/// The sampler's exit status is authoritative for the whole run.
pub fn record_samples(config: &Config, binary: &Path) -> ProflowResult<PathBuf> {
    let raw_trace = config.raw_trace_path();
    Invocation::in_config(Stage::Record, &config.tools.sampler, config)
        .args(&config.sampling.record_args)
        .arg("-o")
        .arg(&raw_trace)
        .arg("--")
        .arg(binary)
        .args(&config.sampling.args)
        .run()?;
    Ok(raw_trace)
}

/// Dumps the raw trace as the sampler's textual event listing.
pub fn read_trace(config: &Config) -> ProflowResult<Vec<u8>> {
    Invocation::in_config(Stage::ReadTrace, &config.tools.sampler, config)
        .arg("script")
        .arg("-i")
        .arg(config.raw_trace_path())
        .capture()
}

/// Collapses an event listing into folded stacks, one line per call path.
pub fn fold_stacks(config: &Config, trace: &[u8]) -> ProflowResult<Vec<u8>> {
    Invocation::in_config(Stage::Fold, &config.tools.folder, config).filter(trace)
}

/// Renders folded stacks into an SVG document.
pub fn render_flamegraph(config: &Config, folded: &[u8]) -> ProflowResult<Vec<u8>> {
    Invocation::in_config(Stage::Render, &config.tools.renderer, config).filter(folded)
}

/// Replaces the flamegraph file with `svg`.
pub fn write_flamegraph(config: &Config, svg: &[u8]) -> ProflowResult<PathBuf> {
    let path = config.flamegraph_path();
    fsutil::write_bytes(&path, svg)?;
    tracing::info!(path = %path.display(), bytes = svg.len(), "flamegraph written");
    Ok(path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{ProflowError, Tool};
    use uuid::Uuid;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("proflow-sampling-{name}-{}", Uuid::new_v4()));
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
    fn record_passes_trace_path_binary_and_workload() {
        let dir = temp_dir("record");
        let mut cfg = Config {
            working_dir: dir.clone(),
            ..Config::default()
        };
        cfg.tools.sampler = sh_tool(&dir, "perf.sh", "echo \"$@\" > args.txt\n");
        let raw = record_samples(&cfg, Path::new("/bin/demo")).expect("record");
        assert_eq!(raw, dir.join("perf.data"));
        let args = std::fs::read_to_string(dir.join("args.txt")).expect("args");
        assert_eq!(
            args.trim(),
            format!("record -g -o {} -- /bin/demo 1000", dir.join("perf.data").display())
        );
    }

    #[test]
    fn fold_and_render_chain_in_memory() {
        let dir = temp_dir("chain");
        let mut cfg = Config {
            working_dir: dir.clone(),
            ..Config::default()
        };
        cfg.tools.folder = sh_tool(&dir, "fold.sh", "sort | uniq -c | awk '{print $2\" \"$1}'\n");
        cfg.tools.renderer = sh_tool(&dir, "render.sh", "echo '<svg>'; cat; echo '</svg>'\n");

        let folded = fold_stacks(&cfg, b"main;b\nmain;a\nmain;b\n").expect("fold");
        assert_eq!(String::from_utf8_lossy(&folded), "main;a 1\nmain;b 2\n");
        let svg = render_flamegraph(&cfg, &folded).expect("render");
        assert_eq!(String::from_utf8_lossy(&svg), "<svg>\nmain;a 1\nmain;b 2\n</svg>\n");
    }

    #[test]
    fn render_failure_is_transform_failure_and_keeps_old_svg() {
        let dir = temp_dir("render-fail");
        let mut cfg = Config {
            working_dir: dir.clone(),
            ..Config::default()
        };
        std::fs::write(dir.join("flamegraph.svg"), "old").expect("old svg");
        cfg.tools.renderer = sh_tool(&dir, "render.sh", "cat > /dev/null; exit 2\n");
        let err = render_flamegraph(&cfg, b"main 1\n").expect_err("render fails");
        assert!(matches!(err, ProflowError::Transform(_)));
        assert_eq!(
            std::fs::read_to_string(dir.join("flamegraph.svg")).expect("svg"),
            "old"
        );
    }
}
