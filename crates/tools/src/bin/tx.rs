//! limg-tx - transmit an image over the chunked LoRa link

use anyhow::Result;
use clap::Parser;
use loraimg_tools::common::{load_config, print_summary};
use loraimg_tools::{Transmitter, TxConfig};

fn main() -> Result<()> {
    let mut config = TxConfig::parse();
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

    println!("limg-tx starting...");

    let mut transmitter = Transmitter::new(config)?;
    let report = transmitter.transmit()?;

    print_summary("transmission", &report);

    Ok(())
}
