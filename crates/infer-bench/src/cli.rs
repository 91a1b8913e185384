use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "infer-bench",
    version,
    about = "Benchmark a text classifier served over the KServe v2 gRPC protocol"
)]
pub struct Cli {
    /// Newline-delimited JSON test cases, one object with a "text" field per line
    #[arg(long = "test_file")]
    pub test_file: PathBuf,

    /// gRPC address of the inference server (host:port or URI)
    #[arg(long = "model_endpoint")]
    pub model_endpoint: String,

    /// Model name
    #[arg(long = "model_name")]
    pub model_name: String,

    /// Model version
    #[arg(long = "model_version")]
    pub model_version: String,

    /// Directory for perf_stats.log and predict_results.json
    #[arg(long = "output_dir")]
    pub output_dir: PathBuf,

    /// Number of test cases to run; zero or negative runs all of them
    #[arg(long = "num_cases", default_value_t = -1, allow_negative_numbers = true)]
    pub num_cases: i64,

    /// Log progress every 100 cases
    #[arg(long)]
    pub debug: bool,

    /// Log filter (RUST_LOG syntax)
    #[arg(long, default_value = "info")]
    pub log: String,

    /// Per-request timeout in seconds
    #[arg(long = "timeout_secs")]
    pub timeout_secs: Option<u64>,
}
