use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config;

/// Synchronous key/value string storage that survives restarts of skipwarden.
pub trait KeyValueStore {
    /// Returns None if nothing is stored under `key`.
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    /// Removing a key that does not exist is not an error.
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Stores each key as a separate JSON document `<key>.json` inside one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn in_state_directory() -> Self {
        Self::new(config::get_state_directory())
    }

    fn filename(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }

    fn create_directory(&self) -> io::Result<()> {
        fs::create_dir_all(&self.directory)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.filename(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // This is not an error: If skipwarden starts for the first time, for example, then
                // the file does not exist yet.
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let filename = self.filename(key);
        let tmp_filename = filename.with_extension("json.tmp");
        let file = match File::create(&tmp_filename) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.create_directory()?;
                File::create(&tmp_filename)?
            }
            Err(e) => return Err(e),
        };
        let mut writer = BufWriter::new(file);
        writer.write_all(value.as_bytes())?;
        writer.flush()?;
        drop(writer);

        // A reader sees either the old or the new document, never a partially written one.
        fs::rename(&tmp_filename, &filename)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        remove_file(&self.filename(key))
    }
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        err => err,
    }
}
