#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradewise::run().await {
        eprintln!("gradewise fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
