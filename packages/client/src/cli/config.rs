//! Command line and environment configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    domain::{GuestIdentity, RoomCode, ValueObjectError},
    usecase::ChannelSettings,
};

/// File under the data directory holding the durable key-value storage.
const STORAGE_FILE: &str = "storage.json";

#[derive(Parser, Debug, Clone)]
#[command(name = "moyeo-client")]
#[command(about = "Nominate and vote on restaurants in a Moyeo room", long_about = None)]
pub struct Args {
    /// Room code to enter
    #[arg(short = 'r', long, env = "MOYEO_ROOM")]
    pub room: String,

    /// Base URL of the REST backend
    #[arg(short = 'a', long, env = "MOYEO_API_URL", default_value = "http://127.0.0.1:8080")]
    pub api_url: String,

    /// WebSocket endpoint of the STOMP broker
    #[arg(short = 'w', long, env = "MOYEO_WS_URL", default_value = "ws://127.0.0.1:8080/ws")]
    pub ws_url: String,

    /// Directory for tokens, tombstones and the persisted store
    #[arg(short = 'd', long, env = "MOYEO_DATA_DIR", default_value = ".moyeo")]
    pub data_dir: PathBuf,

    /// Delay between broker reconnect attempts (milliseconds)
    #[arg(long, env = "MOYEO_RECONNECT_MS", default_value_t = 1500)]
    pub reconnect_ms: u64,
}

impl Args {
    pub fn room_code(&self) -> Result<RoomCode, ValueObjectError> {
        RoomCode::new(self.room.clone())
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(STORAGE_FILE)
    }

    pub fn channel_settings(&self, identity: &GuestIdentity) -> ChannelSettings {
        ChannelSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_ms),
            access_token: Some(identity.access_token.clone()),
            current_user: Some(identity.user_id),
            ..ChannelSettings::default()
        }
    }
}
