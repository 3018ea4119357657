pub mod adapters;
pub mod core;
pub mod runtime;

pub async fn run() -> std::process::ExitCode {
    runtime::cli::run().await
}
