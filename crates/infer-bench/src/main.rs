mod cli;
mod telemetry;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use infer_bench_client::{ConnectOptions, TritonClient};
use infer_bench_core::{
    load_cases, run_inference, write_outputs, EndpointInfo, InferenceEndpoint, Profiler,
};
use telemetry::Telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let telemetry = Telemetry::new(&cli.log)?;
    let _guard = telemetry.enter();

    run(cli, telemetry.profiler(), TritonClient::connect)
}

/// connect -> load -> infer -> persist. Any failure ends the run; the output
/// directory is only touched once every prediction is in memory.
fn run<E, F>(cli: Cli, profiler: &Profiler, connect: F) -> Result<()>
where
    E: InferenceEndpoint,
    F: FnOnce(EndpointInfo, ConnectOptions) -> infer_bench_core::Result<E>,
{
    let info = EndpointInfo::new(cli.model_endpoint, cli.model_name, cli.model_version);
    let options = ConnectOptions {
        timeout: cli.timeout_secs.map(Duration::from_secs),
    };
    let mut client = connect(info, options).context("inference endpoint is not usable")?;

    let cases = load_cases(&cli.test_file, cli.num_cases)
        .with_context(|| format!("failed to load test cases from {}", cli.test_file.display()))?;

    let (predictions, report) =
        run_inference(&mut client, cases, profiler, cli.debug).context("inference failed")?;

    write_outputs(&report, &predictions, &cli.output_dir).with_context(|| {
        format!("failed to write results to {}", cli.output_dir.display())
    })?;

    tracing::info!(
        cases = predictions.len(),
        operations = report.entries.len(),
        "benchmark finished"
    );
    Ok(())
}
