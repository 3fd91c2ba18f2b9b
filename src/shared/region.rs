// Shared memory region backing the frame and detection slots.
//
// Two flavours:
// - anonymous: a private shared mapping, visible to every thread of the rig
// - named: a file in tmpfs (/dev/shm on Linux) so external tools can attach
//
// The region is only ever accessed through atomics, so a reader racing a
// writer observes a mix of old and new words, never undefined behaviour.

use crate::{Error, Result};
use log::{debug, warn};
use memmap2::{MmapOptions, MmapRaw};
use std::{
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicI64, AtomicU64},
};

const WORD: usize = std::mem::size_of::<u64>();

/// Directory used for named regions: `/dev/shm` when present, else the temp dir
#[must_use]
pub fn default_shm_dir() -> PathBuf {
    let dev_shm = PathBuf::from("/dev/shm");
    if dev_shm.is_dir() {
        dev_shm
    } else {
        std::env::temp_dir()
    }
}

/// Fixed-size memory mapping addressed as 64-bit atomic words
#[derive(Debug)]
pub struct SharedRegion {
    map: MmapRaw,
    words: usize,
    path: Option<PathBuf>,
    _file: Option<File>,
    owner: bool,
}

impl SharedRegion {
    /// Number of words needed to hold `len` bytes
    #[must_use]
    pub const fn words_for(len: usize) -> usize {
        len.div_ceil(WORD)
    }

    /// Anonymous zero-filled region of at least `len` bytes
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is zero or the mapping fails
    pub fn anonymous(len: usize) -> Result<Self> {
        let words = Self::checked_words(len)?;
        let map = MmapOptions::new().len(words * WORD).map_anon()?;
        debug!("Mapped anonymous region of {} bytes", words * WORD);
        Ok(Self {
            map: MmapRaw::from(map),
            words,
            path: None,
            _file: None,
            owner: true,
        })
    }

    /// Create or open the named region `name` under `dir`
    ///
    /// Whoever creates the backing file owns it and removes it on drop;
    /// later callers attach to the existing file.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or path-like names, zero length, or I/O failures
    pub fn named(dir: &Path, name: &str, len: usize) -> Result<Self> {
        let (path, words) = Self::prepare(dir, name, len)?;
        match Self::create_file(&path, words) {
            Ok(file) => Self::map_file(file, path, words, true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let file = OpenOptions::new().read(true).write(true).open(&path)?;
                Self::map_file(file, path, words, false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create the named region as its owner, replacing a file left by a previous run
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names or lengths, or if the file cannot be
    /// replaced or created
    pub fn create(dir: &Path, name: &str, len: usize) -> Result<Self> {
        let (path, words) = Self::prepare(dir, name, len)?;
        let file = match Self::create_file(&path, words) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("Replacing stale shared region {}", path.display());
                std::fs::remove_file(&path)?;
                Self::create_file(&path, words)?
            }
            Err(e) => return Err(e.into()),
        };
        Self::map_file(file, path, words, true)
    }

    fn prepare(dir: &Path, name: &str, len: usize) -> Result<(PathBuf, usize)> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(Error::SharedMemory(format!("Invalid region name '{name}'")));
        }
        let words = Self::checked_words(len)?;
        std::fs::create_dir_all(dir)?;
        Ok((dir.join(format!("face_tracker_{name}")), words))
    }

    fn create_file(path: &Path, words: usize) -> std::io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len((words * WORD) as u64)?;
        Ok(file)
    }

    fn map_file(file: File, path: PathBuf, words: usize, owner: bool) -> Result<Self> {
        let size = (words * WORD) as u64;
        if file.metadata()?.len() < size {
            file.set_len(size)?;
        }
        let map = MmapOptions::new().len(words * WORD).map_raw(&file)?;
        let region = Self {
            map,
            words,
            path: Some(path),
            _file: Some(file),
            owner,
        };
        if owner {
            region.clear();
        }
        debug!(
            "Mapped named region {:?} ({} bytes, owner={})",
            region.path, size, owner
        );
        Ok(region)
    }

    fn checked_words(len: usize) -> Result<usize> {
        if len == 0 {
            return Err(Error::SharedMemory("Region length must be non-zero".to_string()));
        }
        Ok(Self::words_for(len))
    }

    /// Region size in bytes (a multiple of 8)
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.words * WORD
    }

    /// Backing file, for named regions
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Region contents as unsigned atomic words
    #[must_use]
    pub fn words(&self) -> &[AtomicU64] {
        // SAFETY: the mapping is page aligned, spans `words * 8` bytes and lives
        // as long as `self`. AtomicU64 has the size and alignment of u64, and
        // all access goes through atomic operations.
        unsafe { std::slice::from_raw_parts(self.map.as_mut_ptr().cast::<AtomicU64>(), self.words) }
    }

    /// Region contents as signed atomic words
    #[must_use]
    pub fn signed_words(&self) -> &[AtomicI64] {
        // SAFETY: same layout argument as `words`; AtomicI64 matches i64.
        unsafe { std::slice::from_raw_parts(self.map.as_mut_ptr().cast::<AtomicI64>(), self.words) }
    }

    /// Zero every word
    pub fn clear(&self) {
        for word in self.words() {
            word.store(0, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let (true, Some(path)) = (self.owner, &self.path) {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}
