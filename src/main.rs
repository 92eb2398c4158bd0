#[tokio::main]
async fn main() {
    if let Err(e) = heartshield::run().await {
        tracing::error!("{e}");
        eprintln!("heartshield: {e}");
        std::process::exit(1);
    }
}
