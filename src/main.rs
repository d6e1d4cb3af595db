#[macro_use]
extern crate log;

use crate::error::SkipwardenError;
use crate::file_io::blacklist::BlacklistStore;
use crate::file_io::credential::CredentialStore;
use crate::file_io::storage::FileStore;
use crate::http::spotify::client::{self, SpotifyPlayer};
use crate::poll::{PollLoop, PollSettings};
use crate::render::LogRenderer;

mod config;
mod engine;
mod error;
mod file_io;
mod http;
mod messaging;
mod model;
mod player;
mod poll;
mod render;

const APPLICATION_NAME: &str = "skipwarden";

fn main() -> Result<(), SkipwardenError> {
    env_logger::init();
    let config = config::get_config();
    debug!("Using configuration: {:?}", config);

    let store = FileStore::in_state_directory();
    let credentials = CredentialStore::new(store.clone());
    client::ensure_login(&config, &credentials)?;

    let messages = messaging::setup_channel();
    let player = SpotifyPlayer::new(&config, credentials);
    let mut poll_loop = PollLoop::new(
        player,
        BlacklistStore::new(store),
        LogRenderer::default(),
        PollSettings::from(&config),
    );
    info!(
        "Checking playback every {} seconds.",
        config.poll_interval.as_secs()
    );
    poll_loop.run(messages)
}
