use std::io;

use serde::{Deserialize, Serialize};
use ureq::serde_json;

use crate::file_io::model::Versioned;
use crate::file_io::storage::KeyValueStore;
use crate::model::{Blacklist, BlacklistEntry, BlacklistKind};

/// Persists the blacklist as a single document. Every mutation is a read-modify-write of the
/// whole document: if two mutations interleave between their read and their write, the last
/// writer wins.
pub struct BlacklistStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> BlacklistStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Absent or malformed data yields the empty blacklist. So does a read error, which is
    /// logged.
    pub fn load(&self) -> Blacklist {
        match self.read() {
            Ok(blacklist) => blacklist,
            Err(e) => {
                error!("Unable to read blacklist: {:?}", e);
                Blacklist::default()
            }
        }
    }

    /// Like `load`, but read errors are returned: a mutation must not overwrite a document it
    /// could not read.
    fn read(&self) -> io::Result<Blacklist> {
        let stored = match self.store.get(BLACKLIST_KEY)? {
            Some(s) => s,
            None => return Ok(Blacklist::default()),
        };
        match parse_blacklist(&stored) {
            Ok(blacklist) => Ok(blacklist),
            Err(reason) => {
                warn!("Stored blacklist is malformed, using an empty one: {}", reason);
                Ok(Blacklist::default())
            }
        }
    }

    pub fn add(&self, kind: BlacklistKind, id: &str, name: &str) -> io::Result<()> {
        let mut blacklist = self.read()?;
        if blacklist.insert(kind, BlacklistEntry::new(id, name)) {
            info!("Added {} <{}> ({}) to the blacklist.", kind, name, id);
            self.store_blacklist(blacklist)
        } else {
            debug!("{} {} is already blacklisted.", kind, id);
            Ok(())
        }
    }

    pub fn remove(&self, kind: BlacklistKind, id: &str) -> io::Result<()> {
        let mut blacklist = self.read()?;
        if blacklist.remove(kind, id) {
            info!("Removed {} {} from the blacklist.", kind, id);
        } else {
            debug!("{} {} is not blacklisted, nothing to remove.", kind, id);
        }
        self.store_blacklist(blacklist)
    }

    pub fn contains(&self, kind: BlacklistKind, id: &str) -> bool {
        self.load().contains(kind, id)
    }

    fn store_blacklist(&self, blacklist: Blacklist) -> io::Result<()> {
        let blacklist_v1 = BlacklistV1::from(blacklist);
        let blacklist_as_json = serde_json::to_string(&blacklist_v1)?;
        self.store.set(BLACKLIST_KEY, &blacklist_as_json)
    }
}

fn parse_blacklist(stored: &str) -> Result<Blacklist, String> {
    let blacklist: BlacklistV1 = serde_json::from_str(stored).map_err(|e| e.to_string())?;
    if blacklist.version != 1 {
        return Err(format!("unsupported version {}", blacklist.version));
    }

    Ok(blacklist.into())
}

#[derive(Serialize, Deserialize)]
struct BlacklistV1 {
    // Blacklists written before the version field was introduced don't have it.
    #[serde(default = "legacy_version")]
    version: u32,
    #[serde(default)]
    songs: Vec<BlacklistEntryV1>,
    #[serde(default)]
    artists: Vec<BlacklistEntryV1>,
    #[serde(default)]
    albums: Vec<BlacklistEntryV1>,
}

fn legacy_version() -> u32 {
    1
}

#[derive(Serialize, Deserialize)]
struct BlacklistEntryV1 {
    id: String,
    name: String,
}

impl Versioned<Blacklist> for BlacklistV1 {}

impl From<Blacklist> for BlacklistV1 {
    fn from(value: Blacklist) -> Self {
        let entries = |entries: Vec<BlacklistEntry>| {
            entries
                .into_iter()
                .map(|e| BlacklistEntryV1 {
                    id: e.id,
                    name: e.name,
                })
                .collect()
        };
        Self {
            version: 1,
            songs: entries(value.songs),
            artists: entries(value.artists),
            albums: entries(value.albums),
        }
    }
}

impl From<BlacklistV1> for Blacklist {
    fn from(value: BlacklistV1) -> Self {
        let mut blacklist = Blacklist::default();
        let partitions = [
            (BlacklistKind::Song, value.songs),
            (BlacklistKind::Artist, value.artists),
            (BlacklistKind::Album, value.albums),
        ];
        for (kind, entries) in partitions {
            for entry in entries {
                // insert drops duplicate ids, so hand-edited files can't break uniqueness.
                blacklist.insert(kind, BlacklistEntry::new(&entry.id, &entry.name));
            }
        }
        blacklist
    }
}

const BLACKLIST_KEY: &str = "blacklist";

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::ErrorKind;

    use super::*;
    use crate::file_io::storage::memory::MemoryStore;
    use crate::file_io::storage::FileStore;

    /// Fails the next `get` once `fail_next_get` is set, like a file that is briefly unreadable.
    #[derive(Default)]
    struct UnreadableStore {
        inner: MemoryStore,
        fail_next_get: Cell<bool>,
    }

    impl KeyValueStore for UnreadableStore {
        fn get(&self, key: &str) -> io::Result<Option<String>> {
            if self.fail_next_get.replace(false) {
                Err(io::Error::new(ErrorKind::PermissionDenied, "permission denied"))
            } else {
                self.inner.get(key)
            }
        }

        fn set(&self, key: &str, value: &str) -> io::Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> io::Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn load_without_stored_blacklist() {
        let blacklist_store = BlacklistStore::new(MemoryStore::default());

        assert_eq!(blacklist_store.load(), Blacklist::default());
    }

    #[test]
    fn load_malformed_blacklist() {
        for malformed in ["", "null", "not json", "{\"songs\": 3}", "{\"version\": 2}"] {
            let store = MemoryStore::default();
            store.set(BLACKLIST_KEY, malformed).unwrap();

            assert_eq!(
                BlacklistStore::new(store).load(),
                Blacklist::default(),
                "input: {}",
                malformed
            );
        }
    }

    #[test]
    fn add_twice_keeps_one_entry_with_first_name() {
        let blacklist_store = BlacklistStore::new(MemoryStore::default());
        blacklist_store
            .add(BlacklistKind::Song, "s1", "Original")
            .unwrap();
        blacklist_store
            .add(BlacklistKind::Song, "s1", "Renamed")
            .unwrap();

        assert_eq!(
            blacklist_store.load().songs,
            vec![BlacklistEntry::new("s1", "Original")]
        );
    }

    #[test]
    fn remove_is_total() {
        let blacklist_store = BlacklistStore::new(MemoryStore::default());
        blacklist_store
            .add(BlacklistKind::Artist, "ar1", "Artist")
            .unwrap();

        blacklist_store.remove(BlacklistKind::Artist, "ar1").unwrap();
        assert!(!blacklist_store.contains(BlacklistKind::Artist, "ar1"));

        // Removing something that was never there is fine, too.
        blacklist_store.remove(BlacklistKind::Album, "nope").unwrap();
        assert!(!blacklist_store.contains(BlacklistKind::Album, "nope"));
    }

    #[test]
    fn round_trip_through_persisted_form() {
        let dir = tempfile::tempdir().unwrap();
        let blacklist_store = BlacklistStore::new(FileStore::new(dir.path().to_path_buf()));
        let blacklist = Blacklist {
            songs: vec![BlacklistEntry::new("s1", "Song")],
            artists: vec![],
            albums: vec![BlacklistEntry::new("a1", "Album")],
        };

        blacklist_store.store_blacklist(blacklist.clone()).unwrap();

        let reopened = BlacklistStore::new(FileStore::new(dir.path().to_path_buf()));
        assert_eq!(reopened.load(), blacklist);
    }

    #[test]
    fn load_legacy_blacklist_without_version() {
        let store = MemoryStore::default();
        store
            .set(
                BLACKLIST_KEY,
                r#"{"songs":[{"id":"s1","name":"Song"}],"artists":[{"id":"ar1","name":"Artist"}],"albums":[]}"#,
            )
            .unwrap();

        let blacklist = BlacklistStore::new(store).load();

        assert!(blacklist.contains(BlacklistKind::Song, "s1"));
        assert!(blacklist.contains(BlacklistKind::Artist, "ar1"));
        assert!(blacklist.albums.is_empty());
    }

    #[test]
    fn load_drops_duplicate_ids_and_keeps_order() {
        let store = MemoryStore::default();
        store
            .set(
                BLACKLIST_KEY,
                r#"{"version":1,"songs":[{"id":"b","name":"B"},{"id":"a","name":"A"},{"id":"b","name":"B2"}]}"#,
            )
            .unwrap();

        let blacklist = BlacklistStore::new(store).load();

        assert_eq!(
            blacklist.songs,
            vec![BlacklistEntry::new("b", "B"), BlacklistEntry::new("a", "A")]
        );
    }

    #[test]
    fn add_overwrites_malformed_document() {
        let store = MemoryStore::default();
        store.set(BLACKLIST_KEY, "{broken").unwrap();
        let blacklist_store = BlacklistStore::new(store.clone());

        blacklist_store.add(BlacklistKind::Album, "al1", "Album").unwrap();

        let stored = store.get(BLACKLIST_KEY).unwrap().unwrap();
        assert_eq!(
            stored,
            r#"{"version":1,"songs":[],"artists":[],"albums":[{"id":"al1","name":"Album"}]}"#
        );
    }

    #[test]
    fn mutations_do_not_overwrite_unreadable_blacklist() {
        let store = UnreadableStore::default();
        let blacklist_store = BlacklistStore::new(store);
        blacklist_store.add(BlacklistKind::Song, "s1", "Song").unwrap();
        blacklist_store
            .add(BlacklistKind::Artist, "ar1", "Artist")
            .unwrap();

        blacklist_store.store.fail_next_get.set(true);
        let result = blacklist_store.add(BlacklistKind::Album, "al1", "Album");
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(ErrorKind::PermissionDenied)
        );

        blacklist_store.store.fail_next_get.set(true);
        assert!(blacklist_store.remove(BlacklistKind::Song, "s1").is_err());

        let blacklist = blacklist_store.load();
        assert!(blacklist.contains(BlacklistKind::Song, "s1"));
        assert!(blacklist.contains(BlacklistKind::Artist, "ar1"));
        assert!(blacklist.albums.is_empty());
    }

    #[test]
    fn load_falls_back_to_empty_on_read_error() {
        let store = UnreadableStore::default();
        let blacklist_store = BlacklistStore::new(store);
        blacklist_store.add(BlacklistKind::Song, "s1", "Song").unwrap();

        blacklist_store.store.fail_next_get.set(true);
        assert!(blacklist_store.load().is_empty());
        assert!(blacklist_store.load().contains(BlacklistKind::Song, "s1"));
    }
}
