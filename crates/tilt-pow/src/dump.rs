//! Memory-mapped dump files for caches and datasets.
//!
//! A dump is a stream of 32-bit words in host byte order, prefixed with a
//! two-word magic header. Generation writes into a read-write map over a
//! temporary file which is renamed into place once filled, so a partial
//! dump is never visible under the canonical name.

use crate::error::{PowError, PowResult};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sanity header of every dump file
pub const DUMP_MAGIC: [u32; 2] = [0xbaddcafe, 0xfee1dead];

/// Filename suffix separating byte orders so maps are never confused
/// across hosts
pub(crate) fn endian_suffix() -> &'static str {
    if cfg!(target_endian = "big") {
        ".be"
    } else {
        ""
    }
}

/// A read-only memory-mapped dump. Dropping unmaps before the file
/// handle closes (field order), and dropping twice is impossible, so
/// release is idempotent by construction.
pub struct Dump {
    mmap: Mmap,
    _file: File,
}

impl Dump {
    /// The payload words, header excluded
    pub fn words(&self) -> &[u32] {
        let payload = &self.mmap[DUMP_MAGIC.len() * 4..];
        // The map is page-aligned and the header is 8 bytes, so the
        // payload is 4-byte aligned and the prefix/suffix are empty
        let (_, words, _) = unsafe { payload.align_to::<u32>() };
        words
    }
}

/// Memory map an existing dump for read-only access, verifying the magic
/// header
pub fn memory_map(path: &Path) -> PowResult<Dump> {
    let file = OpenOptions::new().read(true).open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    if mmap.len() < DUMP_MAGIC.len() * 4 || mmap.len() % 4 != 0 {
        return Err(PowError::InvalidDumpMagic);
    }
    for (i, magic) in DUMP_MAGIC.iter().enumerate() {
        let mut word = [0u8; 4];
        word.copy_from_slice(&mmap[i * 4..i * 4 + 4]);
        if u32::from_ne_bytes(word) != *magic {
            return Err(PowError::InvalidDumpMagic);
        }
    }
    Ok(Dump { mmap, _file: file })
}

/// Create a dump at `path` holding `size` payload bytes: truncate a
/// temporary file, fill it through a writable map with `generate`, then
/// rename into place and reopen read-only.
pub fn memory_map_and_generate(
    path: &Path,
    size: u64,
    generate: impl FnOnce(&mut [u32]),
) -> PowResult<Dump> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique));

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp)?;
    file.set_len(DUMP_MAGIC.len() as u64 * 4 + size)?;

    let mut mmap = unsafe { MmapMut::map_mut(&file)? };
    for (i, magic) in DUMP_MAGIC.iter().enumerate() {
        mmap[i * 4..i * 4 + 4].copy_from_slice(&magic.to_ne_bytes());
    }
    {
        let payload = &mut mmap[DUMP_MAGIC.len() * 4..];
        let (_, words, _) = unsafe { payload.align_to_mut::<u32>() };
        generate(words);
    }
    mmap.flush()?;
    drop(mmap);
    drop(file);

    std::fs::rename(&temp, path)?;
    memory_map(path)
}
