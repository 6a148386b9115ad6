use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    serendipity_cli::main_entry().await
}
