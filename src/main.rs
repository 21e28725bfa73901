use std::process::ExitCode;

use roombook::cli;

#[tokio::main]
async fn main() -> ExitCode {
    cli::run().await
}
