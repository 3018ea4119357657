#[tokio::main]
async fn main() -> std::process::ExitCode {
    agent_os_lib::run().await
}
