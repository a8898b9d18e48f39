//! hubdesk CLI - headless front end for the hub core
//!
//! # Usage
//!
//! ```bash
//! # Build the CLI binary
//! cargo build --features cli --bin hubdesk-cli
//!
//! # Log in once; the token is kept in ~/.hubdesk/settings.toml
//! ./target/debug/hubdesk-cli login --token hf_xxx
//!
//! # List your datasets as JSON
//! ./target/debug/hubdesk-cli repos list -t dataset --json | jq .
//!
//! # Commit two files and a deletion in one go
//! ./target/debug/hubdesk-cli files commit alice/demo -m "Update docs" \
//!     --add README.md --add conf/config.json=./config.json --delete old.txt --yes
//! ```

use anyhow::Result;
use clap::Parser;

use hubdesk_lib::cli::{execute, initialize, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut ctx = initialize(&args).await?;

    let result = execute(&mut ctx).await;

    // Favorites and last selections are saved even when the command failed
    if let Err(e) = ctx.shutdown().await {
        tracing::warn!("{:#}", e);
    }

    result
}
