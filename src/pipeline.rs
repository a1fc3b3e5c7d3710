//! The two profiling pipelines.
//!
//! Stages run strictly in order and the first failure aborts the rest.
//! Artifacts produced before the failure are left as they are.

use serde::Serialize;

use std::path::PathBuf;

use crate::{
    AnnotatedReport, Config, ProflowResult, annotate_outputs, build_target, clean_outputs,
    fold_stacks, list_outputs, read_trace, record_samples, render_flamegraph, run_instrumented,
    write_flamegraph,
};

#[derive(Debug, Clone, Serialize)]
pub struct SamplingReport {
    pub binary: PathBuf,
    #[serde(rename = "rawTrace")]
    pub raw_trace: PathBuf,
    pub flamegraph: PathBuf,
    #[serde(rename = "foldedStacks")]
    pub folded_stacks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentationReport {
    pub binary: PathBuf,
    pub cleaned: Vec<PathBuf>,
    pub report: AnnotatedReport,
}

/// build → record → read trace → fold → render.
pub fn profile_sampling(config: &Config) -> ProflowResult<SamplingReport> {
    let binary = build_target(config)?;
    let raw_trace = record_samples(config, &binary)?;
    let trace = read_trace(config)?;
    let folded = fold_stacks(config, &trace)?;
    let folded_stacks = folded.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count();
    let svg = render_flamegraph(config, &folded)?;
    let flamegraph = write_flamegraph(config, &svg)?;
    Ok(SamplingReport {
        binary,
        raw_trace,
        flamegraph,
        folded_stacks,
    })
}

/// clean → build → instrument → annotate.
pub fn profile_instrumentation(config: &Config) -> ProflowResult<InstrumentationReport> {
    let cleaned = clean_outputs(config)?;
    let binary = build_target(config)?;
    run_instrumented(config, &binary)?;
    tracing::info!(outputs = list_outputs(config)?.len(), "instrumented run finished");
    let report = annotate_outputs(config)?;
    Ok(InstrumentationReport {
        binary,
        cleaned,
        report,
    })
}
