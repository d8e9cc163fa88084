use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    glow_cli::run().await
}
