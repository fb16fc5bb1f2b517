//! IMG.LY Video Object Removal CLI Tool
//!
//! Command-line interface for erasing an object class from videos with the
//! imgly-objremove library, using ONNX Runtime or Tract for detection.

#[cfg(feature = "cli")]
use imgly_objremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
