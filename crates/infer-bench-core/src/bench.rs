use std::path::Path;

use tracing::{info, instrument};

use crate::{
    write_predictions, Error, InferenceEndpoint, ProfileReport, Profiler, Result, TestCase,
};

pub const PERF_STATS_FILE: &str = "perf_stats.log";
pub const PREDICT_RESULTS_FILE: &str = "predict_results.json";

const PROGRESS_EVERY: usize = 100;

/// Classifies every case in order, one request per case, with profiling
/// switched on for the duration of the loop.
///
/// The first failing request aborts the run; nothing is retried.
pub fn run_inference<E: InferenceEndpoint>(
    endpoint: &mut E,
    cases: Vec<TestCase>,
    profiler: &Profiler,
    debug: bool,
) -> Result<(Vec<TestCase>, ProfileReport)> {
    profiler.reset();
    profiler.enable();
    let predictions = infer_cases(endpoint, cases, debug);
    profiler.disable();

    Ok((predictions?, profiler.report()))
}

#[instrument(name = "infer_cases", level = "debug", skip_all, fields(cases = cases.len()))]
fn infer_cases<E: InferenceEndpoint>(
    endpoint: &mut E,
    cases: Vec<TestCase>,
    debug: bool,
) -> Result<Vec<TestCase>> {
    let mut predictions = Vec::with_capacity(cases.len());
    for (i, mut case) in cases.into_iter().enumerate() {
        case.pred = Some(infer_case(endpoint, &case.text)?);
        predictions.push(case);
        if debug && (i + 1) % PROGRESS_EVERY == 0 {
            info!("infer {} test cases", i + 1);
        }
    }
    Ok(predictions)
}

#[instrument(name = "infer_case", level = "debug", skip_all)]
fn infer_case<E: InferenceEndpoint>(endpoint: &mut E, text: &str) -> Result<String> {
    endpoint.classify(text)
}

/// Writes `perf_stats.log` and `predict_results.json` under `output_dir`,
/// creating the directory if needed and replacing existing files.
pub fn write_outputs(
    report: &ProfileReport,
    predictions: &[TestCase],
    output_dir: impl AsRef<Path>,
) -> Result<()> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let perf_file = output_dir.join(PERF_STATS_FILE);
    info!(file = %perf_file.display(), "save perf logs");
    report.write_to(&perf_file)?;

    let predict_file = output_dir.join(PREDICT_RESULTS_FILE);
    info!(
        cases = predictions.len(),
        file = %predict_file.display(),
        "save predict examples"
    );
    write_predictions(&predict_file, predictions)
}
