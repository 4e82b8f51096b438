use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::{KeyStore, StoredValue, decode_entry, encode_entry};
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;

const ENTRY_EXTENSION: &str = "txt";
const TEMP_EXTENSION: &str = "tmp";

/// Returns the location of the entry for `key`, relative to the store root.
///
/// The SHA-1 digest of the key, as 40 lowercase hex characters, is split into
/// `hex[0..2]/hex[2..4]/hex.txt`. This bounds the fan-out of any directory to
/// 256 entries regardless of how many keys are stored.
pub fn entry_path(key: &str) -> PathBuf {
    let hex = format!("{:x}", Sha1::digest(key.as_bytes()));
    let mut path = PathBuf::from(&hex[0..2]);
    path.push(&hex[2..4]);
    path.push(format!("{hex}.{ENTRY_EXTENSION}"));
    path
}

fn is_hex_segment(name: &str, len: usize) -> bool {
    name.len() == len && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A [`KeyStore`] persisting one file per key under a two-level directory tree.
///
/// The filesystem is the index: there is no in-memory state besides the started
/// flag, so the store can be reopened by a later run to replay its keys.
#[derive(Debug)]
pub struct HierarchicalKeyStore {
    root: PathBuf,
    overwrite: bool,
    store_values: bool,
    started: Mutex<bool>,
    writes: AtomicU64,
}

impl HierarchicalKeyStore {
    /// Creates a store rooted at `root`. Nothing is touched until [`start`](Lifecycle::start).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overwrite: false,
            store_values: false,
            started: Mutex::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Allows starting against an existing directory. Its contents are kept.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Also persists written payloads.
    pub fn with_values(mut self, store_values: bool) -> Self {
        self.store_values = store_values;
        self
    }

    /// The root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the absolute location of the entry for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(entry_path(key))
    }

    fn prepare_root(&self) -> Result<()> {
        let root = &self.root;
        if root.is_file() {
            return Err(Error::Config(format!(
                "key store location {} is a file, not a directory",
                root.display()
            )));
        }

        if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(Error::Config(format!(
                    "parent directory {} of the key store does not exist",
                    parent.display()
                )));
            }
        }

        if !root.exists() {
            debug!(path = %root.display(), "creating key store directory");
            fs::create_dir(root)?;
        } else if !self.overwrite {
            return Err(Error::Config(format!(
                "key store directory {} already exists; enable `overwrite` to reuse it",
                root.display()
            )));
        } else {
            debug!(path = %root.display(), "reusing existing key store directory");
        }

        Ok(())
    }

    fn read_key(path: &Path) -> Result<String> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;

        if line.pop() != Some(b'\n') {
            return Err(Error::Corrupt {
                path: path.to_owned(),
                reason: "missing newline separator".into(),
            });
        }
        String::from_utf8(line).map_err(|err| Error::Corrupt {
            path: path.to_owned(),
            reason: format!("key is not valid UTF-8: {err}"),
        })
    }

    fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_dir() && is_hex_segment(&name.to_string_lossy(), 2) {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }
}

impl Lifecycle for HierarchicalKeyStore {
    fn start(&self) -> Result<()> {
        let mut started = self.started.lock().unwrap();
        if !*started {
            self.prepare_root()?;
            *started = true;
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        *self.started.lock().unwrap() = false;
        Ok(())
    }

    fn is_started(&self) -> bool {
        *self.started.lock().unwrap()
    }
}

impl KeyStore for HierarchicalKeyStore {
    fn store(&self, key: &str, value: &StoredValue) -> Result<()> {
        if !self.is_started() {
            return Err(Error::Lifecycle("key store is not started".into()));
        }
        let contents = encode_entry(key, value)?;

        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() {
            warn!(key, path = %path.display(), "overwriting existing key store entry");
        }

        // Write to a sibling file first, so a crash never leaves a torn entry
        // behind. Every write gets its own file, even for the same key.
        let write = self.writes.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!(
            "{}.{write}.{TEMP_EXTENSION}",
            std::process::id()
        ));
        let mut file = File::create(&temp)?;
        file.write_all(&contents)?;
        file.sync_data()?;
        drop(file);
        fs::rename(&temp, &path)?;

        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<StoredValue>> {
        let path = self.path_for(key);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let (stored_key, value) = decode_entry(&contents).map_err(|reason| Error::Corrupt {
            path: path.clone(),
            reason,
        })?;
        if stored_key != key {
            return Err(Error::Corrupt {
                path,
                reason: format!("entry holds key {stored_key:?}, expected {key:?}"),
            });
        }

        Ok(Some(value))
    }

    fn keys(&self) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        let top = match Self::subdirectories(&self.root) {
            Ok(top) => top,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => return Ok(keys),
            Err(err) => return Err(err),
        };

        for first in top {
            for second in Self::subdirectories(&first)? {
                for entry in fs::read_dir(&second)? {
                    let path = entry?.path();
                    let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                        && path
                            .file_stem()
                            .is_some_and(|stem| is_hex_segment(&stem.to_string_lossy(), 40));
                    if is_entry {
                        keys.insert(Self::read_key(&path)?);
                    }
                }
            }
        }

        Ok(keys)
    }

    fn store_values(&self) -> bool {
        self.store_values
    }
}
