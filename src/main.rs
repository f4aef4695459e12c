// src/main.rs

use tracing::error;

use ibazel::{cli, logging, run, ulimit};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ibazel error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level, args.log_to_file.as_deref())?;

    if let Err(err) = ulimit::raise_fd_limit() {
        error!(error = %err, "error setting higher file descriptor limit for this process");
    }

    Ok(run(args).await?)
}
