use anyhow::Result;
use axum::Router;
use clap::Parser;
use medsearch_core::{EngineConfig, IdfMode};
use medsearch_server::build_app;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Blob store directory for original uploads
    #[arg(long)]
    blobs: Option<String>,
    /// Maximum results per search; larger requests are clamped
    #[arg(long, default_value_t = 100)]
    max_limit: usize,
    /// IDF variant used for ranking: smoothed or plain
    #[arg(long, default_value = "smoothed")]
    idf: IdfMode,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = EngineConfig::new(&args.index).with_idf(args.idf);
    config.max_limit = args.max_limit.max(1);
    if let Some(dir) = &args.blobs {
        config = config.with_blob_dir(dir);
    }
    let app: Router = build_app(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
