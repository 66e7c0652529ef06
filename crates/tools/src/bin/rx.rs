//! limg-rx - receive an image over the chunked LoRa link

use anyhow::Result;
use clap::Parser;
use loraimg_tools::common::{load_config, print_summary};
use loraimg_tools::{ImageReceiver, RxConfig};

fn main() -> Result<()> {
    let mut config = RxConfig::parse();
    if let Some(path) = config.config.take() {
        config = load_config(&path)?;
    }

    if config.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt().init();
    }

    println!("limg-rx listening...");

    let mut receiver = ImageReceiver::new(config)?;
    let report = receiver.receive()?;

    print_summary("reception", &report);

    Ok(())
}
