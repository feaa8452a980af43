//! Canvas image edit service
//!
//! Runs the HTTP API (`serve`, default) or the remote GPU worker (`worker`).

#[cfg(feature = "cli")]
use canvas_image_edit::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
