use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    wukan_ai_lib::run(wukan_ai_lib::Cli::parse()).await
}
