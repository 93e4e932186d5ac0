// Content-hash keyed store of rendered images. Entries live in an append-only JSON-lines journal
// next to a directory of PNG blobs; the journal is replayed on open and compacted on close.
use crate::backend::Backend;
use crate::canvas;
use crate::error::{Error, Result};
use image::RgbaImage;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const INDEX_FILE_NAME: &str = "cache.jsonl";
pub const BLOB_DIR_NAME: &str = "images";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub svg_path: PathBuf,
    pub backend: Backend,
    /// SHA-256 of the SVG bytes at the time the image was stored.
    pub hash: String,
    pub png_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Insert {
        svg_path: PathBuf,
        backend: Backend,
        png: String,
        hash: String,
    },
    Remove {
        svg_path: PathBuf,
        backend: Backend,
    },
}

type Key = (PathBuf, Backend);

#[derive(Debug)]
struct CacheState {
    entries: FxHashMap<Key, CacheEntry>,
    journal: File,
}

/// Process-wide image cache.
///
/// Reads may run concurrently from many workers; the index is guarded by a mutex so journal
/// appends are serialized.
#[derive(Debug)]
pub struct ImageCache {
    journal_path: PathBuf,
    blob_dir: PathBuf,
    state: Mutex<CacheState>,
}

impl ImageCache {
    /// Opens the cache under `work_dir`, creating the journal and blob directory if absent.
    pub fn open(work_dir: &Path) -> Result<Self> {
        let blob_dir = work_dir.join(BLOB_DIR_NAME);
        fs::create_dir_all(&blob_dir).map_err(|source| Error::Write {
            path: blob_dir.clone(),
            source,
        })?;

        let journal_path = work_dir.join(INDEX_FILE_NAME);
        let entries = replay_journal(&journal_path, &blob_dir)?;
        let journal = open_journal(&journal_path)?;

        tracing::debug!(
            path = %journal_path.display(),
            entries = entries.len(),
            "opened image cache"
        );

        Ok(Self {
            journal_path,
            blob_dir,
            state: Mutex::new(CacheState { entries, journal }),
        })
    }

    /// Returns the cached image for `(backend, svg_path)` if the SVG is unchanged.
    ///
    /// A stale entry (content hash mismatch) or an unreadable blob is deleted and reported as
    /// a miss.
    pub fn get(&self, backend: Backend, svg_path: &Path) -> Option<RgbaImage> {
        let entry = self.entry(backend, svg_path)?;

        let hash = match file_hash(svg_path) {
            Ok(hash) => hash,
            Err(err) => {
                tracing::debug!(error = %err, "cannot hash SVG; treating as cache miss");
                return None;
            }
        };

        if hash != entry.hash {
            tracing::debug!(
                backend = %backend,
                svg = %svg_path.display(),
                "cache entry is stale"
            );
            self.invalidate(&entry);
            return None;
        }

        match canvas::load(&entry.png_path) {
            Ok(image) => {
                tracing::debug!(backend = %backend, svg = %svg_path.display(), "cache hit");
                Some(image)
            }
            Err(err) => {
                tracing::warn!(error = %err, "cached image is unreadable");
                self.invalidate(&entry);
                None
            }
        }
    }

    /// Stores `image` as the current render of `svg_path` by `backend`, replacing any previous
    /// entry for the same key.
    pub fn put(&self, backend: Backend, svg_path: &Path, image: &RgbaImage) -> Result<()> {
        let hash = file_hash(svg_path)?;
        let png = format!("{}.png", uuid::Uuid::new_v4().simple());
        let png_path = self.blob_dir.join(&png);
        canvas::save_png(image, &png_path)?;

        let entry = CacheEntry {
            svg_path: svg_path.to_path_buf(),
            backend,
            hash: hash.clone(),
            png_path: png_path.clone(),
        };
        let record = JournalRecord::Insert {
            svg_path: svg_path.to_path_buf(),
            backend,
            png,
            hash,
        };

        let mut state = self.lock();
        if let Err(err) = append_record(&mut state.journal, &self.journal_path, &record) {
            // Nothing references the blob without its journal record.
            let _ = fs::remove_file(&png_path);
            return Err(err);
        }
        if let Some(old) = state.entries.insert((svg_path.to_path_buf(), backend), entry) {
            let _ = fs::remove_file(&old.png_path);
        }
        Ok(())
    }

    pub fn entry(&self, backend: Backend, svg_path: &Path) -> Option<CacheEntry> {
        self.lock()
            .entries
            .get(&(svg_path.to_path_buf(), backend))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compacts the journal down to live entries and closes the cache.
    pub fn close(self) -> Result<()> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        drop(state.journal);

        let tmp = self.journal_path.with_extension("jsonl.tmp");
        let mut out = File::create(&tmp).map_err(|source| Error::Write {
            path: tmp.clone(),
            source,
        })?;
        let mut entries: Vec<&CacheEntry> = state.entries.values().collect();
        entries.sort_by(|a, b| (&a.svg_path, a.backend).cmp(&(&b.svg_path, b.backend)));
        for entry in entries {
            let png = entry
                .png_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let record = JournalRecord::Insert {
                svg_path: entry.svg_path.clone(),
                backend: entry.backend,
                png,
                hash: entry.hash.clone(),
            };
            append_record(&mut out, &tmp, &record)?;
        }
        fs::rename(&tmp, &self.journal_path).map_err(|source| Error::Write {
            path: self.journal_path.clone(),
            source,
        })
    }

    fn invalidate(&self, stale: &CacheEntry) {
        let mut state = self.lock();
        let key = (stale.svg_path.clone(), stale.backend);
        // A concurrent put may already have replaced the stale entry.
        if state.entries.get(&key) != Some(stale) {
            return;
        }
        state.entries.remove(&key);
        let _ = fs::remove_file(&stale.png_path);
        let record = JournalRecord::Remove {
            svg_path: stale.svg_path.clone(),
            backend: stale.backend,
        };
        if let Err(err) = append_record(&mut state.journal, &self.journal_path, &record) {
            tracing::warn!(error = %err, "failed to journal cache removal");
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = Sha256::digest(&bytes);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(64);
    for &b in digest.iter() {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    Ok(out)
}

fn open_journal(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn append_record(file: &mut File, path: &Path, record: &JournalRecord) -> Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn replay_journal(path: &Path, blob_dir: &Path) -> Result<FxHashMap<Key, CacheEntry>> {
    let mut entries = FxHashMap::default();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(source) => {
            return Err(Error::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JournalRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(line = idx + 1, error = %err, "skipping corrupt cache journal line");
                continue;
            }
        };
        match record {
            JournalRecord::Insert {
                svg_path,
                backend,
                png,
                hash,
            } => {
                let entry = CacheEntry {
                    svg_path: svg_path.clone(),
                    backend,
                    hash,
                    png_path: blob_dir.join(png),
                };
                entries.insert((svg_path, backend), entry);
            }
            JournalRecord::Remove { svg_path, backend } => {
                entries.remove(&(svg_path, backend));
            }
        }
    }
    Ok(entries)
}
