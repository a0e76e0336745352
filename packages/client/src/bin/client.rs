//! Moyeo room client.
//!
//! Authenticates as a guest, enters a room and keeps its restaurant candidates in sync
//! with the room's broker. Candidates, votes and favorites are changed from the prompt.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin moyeo-client -- --room ROOM1
//! MOYEO_API_URL=https://api.example.com MOYEO_WS_URL=wss://api.example.com/ws \
//!     cargo run --bin moyeo-client -- -r ROOM1
//! ```

use clap::Parser;

use moyeo_client::cli::{Args, run_client};
use moyeo_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    setup_logger("moyeo_client", env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = run_client(args).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
