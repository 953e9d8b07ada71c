#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradewise::run_worker().await {
        eprintln!("gradewise-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
