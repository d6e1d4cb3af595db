use std::fmt::{Display, Formatter};

use crate::model::{Blacklist, BlacklistKind, PlaybackItem, PlaybackSnapshot};

/// State that survives between polls. Owned by the poll loop, lent to `decide`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollState {
    /// The item for which a skip command was issued most recently. As long as this item keeps
    /// playing, no further skip is issued for it.
    pub last_skipped_item_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Song,
    Artist(String),
    Album,
}

impl Display for BlockReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Song => write!(f, "song"),
            BlockReason::Artist(id) => write!(f, "artist {}", id),
            BlockReason::Album => write!(f, "album"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Show the snapshot, nothing to suppress.
    Render(PlaybackSnapshot),
    /// The item is blocked and was not skipped yet: skip it, then check again right away.
    Skip(PlaybackItem, BlockReason),
    /// The item is blocked, but a skip for it was already issued and playback has not advanced
    /// yet: check again right away without skipping a second time.
    AwaitAdvance(PlaybackItem),
}

/// Returns why the item is blocked, or None if it isn't. Songs are checked first, then artists,
/// then the album.
pub fn block_reason(item: &PlaybackItem, blacklist: &Blacklist) -> Option<BlockReason> {
    if blacklist.contains(BlacklistKind::Song, &item.item_id) {
        return Some(BlockReason::Song);
    }
    if let Some(artist) = item
        .artists
        .iter()
        .find(|artist| blacklist.contains(BlacklistKind::Artist, &artist.id))
    {
        return Some(BlockReason::Artist(artist.id.clone()));
    }
    if blacklist.contains(BlacklistKind::Album, &item.album_id) {
        return Some(BlockReason::Album);
    }
    None
}

pub fn decide(
    snapshot: &PlaybackSnapshot,
    blacklist: &Blacklist,
    state: &mut PollState,
) -> Decision {
    let item = match snapshot {
        PlaybackSnapshot::Empty => return Decision::Render(PlaybackSnapshot::Empty),
        PlaybackSnapshot::Playing(item) => item,
    };
    let already_skipped = state.last_skipped_item_id.as_deref() == Some(item.item_id.as_str());

    match block_reason(item, blacklist) {
        None => {
            // Whatever plays now is allowed: either playback has moved on, or the skipped item
            // was unblocked meanwhile. Either way, blocking it again must lead to a new skip.
            state.last_skipped_item_id = None;
            Decision::Render(snapshot.clone())
        }
        Some(_) if already_skipped => Decision::AwaitAdvance(item.clone()),
        Some(reason) => {
            state.last_skipped_item_id = Some(item.item_id.clone());
            Decision::Skip(item.clone(), reason)
        }
    }
}
