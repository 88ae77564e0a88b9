//! capture-worker entrypoint

use capture_worker::cli::{init_tracing, worker_main};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    // Exit from inside the runtime so a blocked stdin read cannot hold it open
    let code = worker_main(std::env::args_os()).await;
    std::process::exit(code);
}
