//! capture-probe entrypoint

use clap::Parser;

use capture_worker::cli::init_tracing;
use capture_worker::cli::probe::ProbeCli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = ProbeCli::parse();
    let code = match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
