//! llmboot - Entry Point
//!
//! First-boot provisioning for a single-host LLM inference workload.
//! Runs once from the instance user data, then hands model download off to a
//! detached background task.

use std::env;

use llmboot::app::options::{parse_args, AppOptions};
use llmboot::app::run::run;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli_args = parse_args(env::args().skip(1));

    let options = match AppOptions::from_args(&cli_args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = run(options).await {
        eprintln!("[ERROR] {}", e);
        std::process::exit(e.exit_code());
    }
}
