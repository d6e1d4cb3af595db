use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlacklistEntry {
    pub id: String,
    // Display only: never refreshed, so it may be stale if the entity was renamed upstream.
    pub name: String,
}

impl BlacklistEntry {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlacklistKind {
    Song,
    Artist,
    Album,
}

impl BlacklistKind {
    pub const ALL: [BlacklistKind; 3] = [
        BlacklistKind::Song,
        BlacklistKind::Artist,
        BlacklistKind::Album,
    ];

    /// The name of the partition, as used in the persisted blacklist.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlacklistKind::Song => "songs",
            BlacklistKind::Artist => "artists",
            BlacklistKind::Album => "albums",
        }
    }
}

impl Display for BlacklistKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BlacklistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "song" | "songs" => Ok(BlacklistKind::Song),
            "artist" | "artists" => Ok(BlacklistKind::Artist),
            "album" | "albums" => Ok(BlacklistKind::Album),
            other => Err(format!("Unknown blacklist kind: {}", other)),
        }
    }
}

/// All blacklisted entities, partitioned by kind. Within a kind, ids are unique and entries keep
/// their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    pub songs: Vec<BlacklistEntry>,
    pub artists: Vec<BlacklistEntry>,
    pub albums: Vec<BlacklistEntry>,
}

impl Blacklist {
    pub fn entries(&self, kind: BlacklistKind) -> &[BlacklistEntry] {
        match kind {
            BlacklistKind::Song => &self.songs,
            BlacklistKind::Artist => &self.artists,
            BlacklistKind::Album => &self.albums,
        }
    }

    fn entries_mut(&mut self, kind: BlacklistKind) -> &mut Vec<BlacklistEntry> {
        match kind {
            BlacklistKind::Song => &mut self.songs,
            BlacklistKind::Artist => &mut self.artists,
            BlacklistKind::Album => &mut self.albums,
        }
    }

    pub fn contains(&self, kind: BlacklistKind, id: &str) -> bool {
        self.entries(kind).iter().any(|entry| entry.id == id)
    }

    /// Appends the entry unless its id is already present, in which case the existing entry
    /// (and its name) is kept. Returns true if the blacklist was modified.
    pub fn insert(&mut self, kind: BlacklistKind, entry: BlacklistEntry) -> bool {
        if self.contains(kind, &entry.id) {
            false
        } else {
            self.entries_mut(kind).push(entry);
            true
        }
    }

    /// Returns true if the blacklist was modified.
    pub fn remove(&mut self, kind: BlacklistKind, id: &str) -> bool {
        let entries = self.entries_mut(kind);
        let len_before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != len_before
    }

    pub fn len(&self) -> usize {
        self.songs.len() + self.artists.len() + self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackItem {
    pub item_id: String,
    pub item_name: String,
    pub album_id: String,
    pub album_name: String,
    pub artists: Vec<ArtistRef>,
    pub album_art_url: Option<String>,
}

impl Display for PlaybackItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let artists: Vec<&str> = self.artists.iter().map(|a| a.name.as_str()).collect();
        let artists = if artists.is_empty() {
            "Unknown".to_string()
        } else {
            artists.join(", ")
        };
        write!(
            f,
            "Artist: {}, Title: {}, Album: {}, ID: {}",
            artists, self.item_name, self.album_name, self.item_id
        )
    }
}

/// What is playing right now. Produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSnapshot {
    Playing(PlaybackItem),
    Empty,
}
