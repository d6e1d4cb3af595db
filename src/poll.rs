use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::engine::{self, BlockReason, Decision, PollState};
use crate::file_io::blacklist::BlacklistStore;
use crate::file_io::storage::KeyValueStore;
use crate::messaging::ClientMessage;
use crate::model::{Blacklist, BlacklistKind, PlaybackItem, PlaybackSnapshot};
use crate::player::Player;
use crate::render::Renderer;

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_rechecks: u32,
    pub recheck_delay: Duration,
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            max_rechecks: config.max_rechecks,
            recheck_delay: config.recheck_delay,
        }
    }
}

/// One poll cycle moves through these phases until it is back to `Idle`. `rechecks` counts how
/// often the cycle has gone back to `Polling` without waiting for the timer.
#[derive(Debug)]
enum Phase {
    Idle,
    Polling { rechecks: u32 },
    Rendering(PlaybackSnapshot, Blacklist),
    Skipping {
        item: PlaybackItem,
        reason: BlockReason,
        rechecks: u32,
    },
    AwaitingAdvance { item: PlaybackItem, rechecks: u32 },
}

/// Drives the decision engine on a fixed cadence. Everything that reads or modifies the
/// blacklist, including client commands, runs on the thread that calls `run`.
pub struct PollLoop<P: Player, S: KeyValueStore, R: Renderer> {
    player: P,
    blacklist_store: BlacklistStore<S>,
    renderer: R,
    settings: PollSettings,
    state: PollState,
}

impl<P: Player, S: KeyValueStore, R: Renderer> PollLoop<P, S, R> {
    pub fn new(
        player: P,
        blacklist_store: BlacklistStore<S>,
        renderer: R,
        settings: PollSettings,
    ) -> Self {
        Self {
            player,
            blacklist_store,
            renderer,
            settings,
            state: PollState::default(),
        }
    }

    /// Never returns: the loop ends with the process.
    pub fn run(&mut self, messages: Receiver<ClientMessage>) -> ! {
        self.renderer.render_blacklist(&self.blacklist_store.load());
        loop {
            self.run_cycle();
            self.handle_messages_until(&messages, Instant::now() + self.settings.interval);
        }
    }

    /// Waits for the next tick, applying client commands as they come in.
    fn handle_messages_until(&mut self, messages: &Receiver<ClientMessage>, deadline: Instant) {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match messages.recv_timeout(remaining) {
                Ok(message) => self.handle_message(message),
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => {
                    // Nobody can send commands anymore, but polling must go on.
                    thread::sleep(remaining);
                    return;
                }
            }
        }
    }

    pub fn run_cycle(&mut self) {
        let mut phase = Phase::Polling { rechecks: 0 };
        loop {
            phase = match phase {
                Phase::Idle => return,
                Phase::Polling { rechecks } => self.poll(rechecks),
                Phase::Rendering(snapshot, blacklist) => {
                    self.renderer.render_playback(&snapshot, &blacklist);
                    Phase::Idle
                }
                Phase::Skipping {
                    item,
                    reason,
                    rechecks,
                } => self.skip(item, reason, rechecks),
                Phase::AwaitingAdvance { item, rechecks } => {
                    debug!(
                        "Skip for {} was already issued, waiting for playback to advance.",
                        item.item_id
                    );
                    self.recheck(rechecks)
                }
            };
        }
    }

    fn poll(&mut self, rechecks: u32) -> Phase {
        let snapshot = self.fetch_snapshot();
        let blacklist = self.blacklist_store.load();
        match engine::decide(&snapshot, &blacklist, &mut self.state) {
            Decision::Render(snapshot) => Phase::Rendering(snapshot, blacklist),
            Decision::Skip(item, reason) => Phase::Skipping {
                item,
                reason,
                rechecks,
            },
            Decision::AwaitAdvance(item) => Phase::AwaitingAdvance { item, rechecks },
        }
    }

    fn skip(&mut self, item: PlaybackItem, reason: BlockReason, rechecks: u32) -> Phase {
        info!("{} [BLOCKED] via {}", item, reason);
        match self.player.skip() {
            Ok(()) => self.recheck(rechecks),
            Err(e) => {
                // No retry within this cycle. Dropping the guard makes the next tick issue a
                // fresh skip if the item is still playing.
                error!("Unable to skip {}: {:?}", item.item_id, e);
                self.state.last_skipped_item_id = None;
                Phase::Idle
            }
        }
    }

    fn recheck(&self, rechecks: u32) -> Phase {
        if rechecks >= self.settings.max_rechecks {
            warn!(
                "Playback did not advance after {} re-checks, waiting for the next poll.",
                rechecks
            );
            return Phase::Idle;
        }
        if !self.settings.recheck_delay.is_zero() {
            thread::sleep(self.settings.recheck_delay);
        }
        Phase::Polling {
            rechecks: rechecks + 1,
        }
    }

    /// A failed fetch counts as "nothing playing".
    fn fetch_snapshot(&mut self) -> PlaybackSnapshot {
        match self.player.current_item() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Unable to determine current song: {:?}", e);
                PlaybackSnapshot::Empty
            }
        }
    }

    pub fn handle_message(&mut self, message: ClientMessage) {
        debug!("Handling {:?}", message);
        match message {
            ClientMessage::BlockCurrent(kind) => {
                if let Some(item) = self.current_item() {
                    for (id, name) in entities_of(&item, kind) {
                        self.add(kind, &id, &name);
                    }
                    self.renderer.render_blacklist(&self.blacklist_store.load());
                    // Don't wait for the next tick to skip what was just blocked.
                    self.run_cycle();
                }
            }
            ClientMessage::UnblockCurrent(kind) => {
                if let Some(item) = self.current_item() {
                    for (id, _) in entities_of(&item, kind) {
                        self.remove(kind, &id);
                    }
                    self.forget_skip();
                    self.renderer.render_blacklist(&self.blacklist_store.load());
                }
            }
            ClientMessage::Block { kind, id, name } => {
                self.add(kind, &id, &name);
                self.renderer.render_blacklist(&self.blacklist_store.load());
                self.run_cycle();
            }
            ClientMessage::Unblock { kind, id } => {
                self.remove(kind, &id);
                self.forget_skip();
                self.renderer.render_blacklist(&self.blacklist_store.load());
            }
            ClientMessage::Skip => {
                if let Err(e) = self.player.skip() {
                    error!("Unable to skip: {:?}", e);
                }
                self.run_cycle();
            }
            ClientMessage::ShowBlacklist => {
                self.renderer.render_blacklist(&self.blacklist_store.load());
            }
        }
    }

    /// After an unblock, the item skipped last may be allowed to play. If it gets blocked again
    /// before the next tick, it must be skipped again.
    fn forget_skip(&mut self) {
        self.state.last_skipped_item_id = None;
    }

    fn current_item(&mut self) -> Option<PlaybackItem> {
        match self.fetch_snapshot() {
            PlaybackSnapshot::Playing(item) => Some(item),
            PlaybackSnapshot::Empty => {
                warn!("Nothing is playing right now, ignoring command.");
                None
            }
        }
    }

    fn add(&mut self, kind: BlacklistKind, id: &str, name: &str) {
        if let Err(e) = self.blacklist_store.add(kind, id, name) {
            error!("Unable to add {} {} to the blacklist: {:?}", kind, id, e);
        }
    }

    fn remove(&mut self, kind: BlacklistKind, id: &str) {
        if let Err(e) = self.blacklist_store.remove(kind, id) {
            error!("Unable to remove {} {} from the blacklist: {:?}", kind, id, e);
        }
    }
}

/// The ids and names of the item's entities of the given kind.
fn entities_of(item: &PlaybackItem, kind: BlacklistKind) -> Vec<(String, String)> {
    match kind {
        BlacklistKind::Song => vec![(item.item_id.clone(), item.item_name.clone())],
        BlacklistKind::Artist => item
            .artists
            .iter()
            .map(|artist| (artist.id.clone(), artist.name.clone()))
            .collect(),
        BlacklistKind::Album => vec![(item.album_id.clone(), item.album_name.clone())],
    }
}
