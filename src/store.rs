//! Store engine — the backing file plus its in-memory header and table.
//!
//! # Write-through discipline
//! [`ImgFs`] keeps the header and the full metadata table in memory; the
//! in-memory copy is authoritative for reads.  Every mutation is written
//! through to disk before the operation returns, so at every operation
//! boundary the file and memory agree.  Blob bytes are append-only: once
//! written they are never moved, rewritten, or freed (`delete` only clears
//! the metadata slot).
//!
//! # Insert atomicity
//! `insert` takes an owned snapshot of the claimed slot before touching it.
//! Any failure up to the final metadata/header write restores the snapshot,
//! so a failed insert leaves no trace in the table.  Bytes appended before
//! a late failure are unreachable garbage in the blob region, which the
//! format tolerates.
//!
//! # Deduplication
//! The dedup key is SHA-256 of the original bytes.  An insert whose content
//! matches an existing entry copies that entry's (offset, size) pair for
//! every resolution instead of appending; the original blob is stored once.

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{ImageCodec, JpegCodec};
use crate::error::ImgFsError;
use crate::header::{
    StoreHeader, DEFAULT_MAX_FILES, DEFAULT_SMALL_RES, DEFAULT_THUMB_RES, HEADER_SIZE,
};
use crate::metadata::{ImgMetadata, Resolution, ENTRY_SIZE, MAX_IMG_ID, NON_EMPTY};

// ── CreateOptions ────────────────────────────────────────────────────────────

/// Configuration for [`ImgFs::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub max_files: u32,
    pub thumb_res: (u16, u16),
    pub small_res: (u16, u16),
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            thumb_res: (DEFAULT_THUMB_RES, DEFAULT_THUMB_RES),
            small_res: (DEFAULT_SMALL_RES, DEFAULT_SMALL_RES),
        }
    }
}

// ── List output ──────────────────────────────────────────────────────────────

/// Output flavor of [`ImgFs::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Header summary plus one line per image.
    Text,
    /// `{"Images":[id, …]}`, ascending slot order.
    Json,
}

#[derive(Serialize)]
struct ImageList<'a> {
    #[serde(rename = "Images")]
    images: Vec<&'a str>,
}

// ── ImgFs ────────────────────────────────────────────────────────────────────

/// An open store.  All writes go straight to the file, so dropping the
/// handle is the close operation: nothing is buffered, nothing to flush.
pub struct ImgFs {
    file:         File,
    path:         PathBuf,
    pub header:   StoreHeader,
    pub metadata: Vec<ImgMetadata>,
    codec:        Box<dyn ImageCodec>,
}

impl ImgFs {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Create a new store file: header (`version = 0`, `nb_files = 0`)
    /// followed by `max_files` zeroed (all-EMPTY) metadata entries.
    /// Truncates an existing file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, opts: CreateOptions) -> Result<Self, ImgFsError> {
        let header = StoreHeader::new(opts.max_files, opts.thumb_res, opts.small_res)?;

        let path = path.as_ref().to_owned();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        header.write(&mut file)?;
        // A zeroed record is exactly an EMPTY entry, so the whole table can
        // go out as one write.
        file.write_all(&vec![0u8; opts.max_files as usize * ENTRY_SIZE])?;

        debug!("created store {} ({} slots)", path.display(), opts.max_files);
        Ok(Self {
            file,
            path,
            header,
            metadata: vec![ImgMetadata::default(); opts.max_files as usize],
            codec: Box::new(JpegCodec),
        })
    }

    /// Open an existing store read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImgFsError> {
        Self::open_with(path, false)
    }

    /// Open an existing store read-only.  Mutating operations (including
    /// the lazy resize inside `read`) will fail with an I/O error.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, ImgFsError> {
        Self::open_with(path, true)
    }

    fn open_with<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self, ImgFsError> {
        let path = path.as_ref().to_owned();
        let file = OpenOptions::new().read(true).write(!read_only).open(&path)?;

        let header = StoreHeader::read(&file)?;
        let mut metadata = Vec::with_capacity(header.max_files as usize);
        for _ in 0..header.max_files {
            metadata.push(ImgMetadata::read(&file)?);
        }

        let occupied = metadata.iter().filter(|m| m.is_non_empty()).count() as u32;
        if occupied != header.nb_files {
            return Err(ImgFsError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "header claims {} image(s) but the table holds {}",
                    header.nb_files, occupied
                ),
            )));
        }
        let orig = Resolution::Orig.index();
        if metadata
            .iter()
            .any(|m| m.is_non_empty() && (m.size[orig] == 0 || m.offset[orig] < header.blob_start()))
        {
            return Err(ImgFsError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "metadata entry points outside the blob region",
            )));
        }

        Ok(Self { file, path, header, metadata, codec: Box::new(JpegCodec) })
    }

    /// Swap in a different codec implementation (tests use this to count
    /// or fail codec calls).
    pub fn with_codec(mut self, codec: Box<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── list ─────────────────────────────────────────────────────────────────

    /// Enumerate NON_EMPTY entries, ascending slot order.
    pub fn list(&self, mode: ListMode) -> Result<String, ImgFsError> {
        match mode {
            ListMode::Json => {
                let images = self
                    .metadata
                    .iter()
                    .filter(|m| m.is_non_empty())
                    .map(|m| m.img_id.as_str())
                    .collect();
                serde_json::to_string(&ImageList { images })
                    .map_err(|e| ImgFsError::Runtime(e.to_string()))
            }
            ListMode::Text => {
                let mut out = format!("{}\n", self.header);
                if self.header.nb_files == 0 {
                    out.push_str("<< empty store >>");
                    return Ok(out);
                }
                let _ = writeln!(
                    out,
                    "{:<28} {:>10} {:>11}  SHA-256",
                    "Image ID", "Size", "Resolution"
                );
                for m in self.metadata.iter().filter(|m| m.is_non_empty()) {
                    let _ = writeln!(
                        out,
                        "{:<28} {:>8} B {:>5}x{:<5}  {}",
                        m.img_id,
                        m.size[Resolution::Orig.index()],
                        m.orig_res[0],
                        m.orig_res[1],
                        hex::encode(m.sha),
                    );
                }
                out.truncate(out.trim_end().len());
                Ok(out)
            }
        }
    }

    // ── insert ───────────────────────────────────────────────────────────────

    /// Insert a JPEG under `img_id`.
    ///
    /// Claims the lowest-indexed EMPTY slot, deduplicates by id and by
    /// content hash, appends the blob only when its content is new, then
    /// commits the entry and the header.  Atomic in effect: any failure
    /// restores the claimed slot.
    pub fn insert(&mut self, image: &[u8], img_id: &str) -> Result<(), ImgFsError> {
        if img_id.is_empty()
            || img_id.len() > MAX_IMG_ID
            || !img_id.bytes().all(|b| b.is_ascii_graphic())
        {
            return Err(ImgFsError::InvalidImgId);
        }
        if image.is_empty() {
            return Err(ImgFsError::InvalidArgument);
        }
        if self.header.nb_files >= self.header.max_files {
            return Err(ImgFsError::Full);
        }
        let k = self
            .metadata
            .iter()
            .position(|m| m.is_empty())
            .ok_or(ImgFsError::Full)?;

        let sha: [u8; 32] = Sha256::digest(image).into();
        let (width, height) = self.codec.dimensions(image)?;

        let snapshot = self.metadata[k].clone();
        self.metadata[k] = ImgMetadata {
            img_id:   img_id.to_owned(),
            sha,
            orig_res: [width, height],
            size:     [0, 0, image.len() as u32],
            offset:   [0; 3],
            is_valid: NON_EMPTY,
        };

        let shared = match self.dedup_slot(k) {
            Ok(shared) => shared,
            Err(e) => {
                self.metadata[k] = snapshot;
                return Err(e);
            }
        };

        if !shared {
            match self.append_blob(image) {
                Ok(start) => self.metadata[k].offset[Resolution::Orig.index()] = start,
                Err(e) => {
                    self.metadata[k] = snapshot;
                    return Err(e);
                }
            }
        }

        self.header.nb_files += 1;
        self.header.version += 1;
        if let Err(e) = self
            .write_entry_through(k)
            .and_then(|()| self.write_header_through())
        {
            self.metadata[k] = snapshot;
            self.header.nb_files -= 1;
            self.header.version -= 1;
            return Err(e);
        }

        debug!(
            "inserted '{img_id}' into slot {k} ({} B, {})",
            image.len(),
            if shared { "deduplicated" } else { "appended" }
        );
        Ok(())
    }

    /// Name-and-content dedup pass for the freshly populated slot `k`.
    ///
    /// Scans every other NON_EMPTY entry: an id match anywhere fails with
    /// `DuplicateId`; otherwise the first content match donates its
    /// (offset, size) pair for every resolution.  Returns whether the
    /// content was already stored.
    fn dedup_slot(&mut self, k: usize) -> Result<bool, ImgFsError> {
        let mut same_content: Option<usize> = None;
        for j in 0..self.metadata.len() {
            if j == k || self.metadata[j].is_empty() {
                continue;
            }
            if self.metadata[j].img_id == self.metadata[k].img_id {
                return Err(ImgFsError::DuplicateId);
            }
            if same_content.is_none() && self.metadata[j].sha == self.metadata[k].sha {
                same_content = Some(j);
            }
        }

        if let Some(j) = same_content {
            self.metadata[k].size = self.metadata[j].size;
            self.metadata[k].offset = self.metadata[j].offset;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ── read ─────────────────────────────────────────────────────────────────

    /// Return the bytes of `img_id` at `resolution`, materializing a
    /// derived variant on first request.
    pub fn read(&mut self, img_id: &str, resolution: Resolution) -> Result<Vec<u8>, ImgFsError> {
        let k = self.find(img_id).ok_or(ImgFsError::ImageNotFound)?;

        if self.metadata[k].size[resolution.index()] == 0 {
            if resolution == Resolution::Orig {
                // Invariant: every NON_EMPTY entry has an original blob.
                return Err(ImgFsError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("entry '{img_id}' has no original blob"),
                )));
            }
            self.lazily_resize(resolution, k)?;
        }

        let size = self.metadata[k].size[resolution.index()] as usize;
        let offset = self.metadata[k].offset[resolution.index()];
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| ImgFsError::OutOfMemory)?;
        buf.resize(size, 0u8);

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Materialize resolution `r` for slot `k` from the original blob.
    ///
    /// If another entry with the same content already carries this variant,
    /// its (offset, size) pair is reused and the codec is never invoked —
    /// entries sharing a SHA always share materialized variants.
    ///
    /// `version` is untouched: materialization does not change the store's
    /// logical contents.  On failure `size[r]` stays 0 and the next read
    /// retries.
    fn lazily_resize(&mut self, r: Resolution, k: usize) -> Result<(), ImgFsError> {
        if r == Resolution::Orig || !self.metadata[k].is_non_empty() {
            return Err(ImgFsError::InvalidArgument);
        }
        if self.metadata[k].size[r.index()] != 0 {
            return Ok(());
        }

        let sha = self.metadata[k].sha;
        let reusable = self.metadata.iter().enumerate().find_map(|(j, m)| {
            (j != k && m.is_non_empty() && m.sha == sha && m.size[r.index()] > 0)
                .then(|| (m.offset[r.index()], m.size[r.index()]))
        });
        if let Some((offset, size)) = reusable {
            self.metadata[k].offset[r.index()] = offset;
            self.metadata[k].size[r.index()] = size;
            if let Err(e) = self.write_entry_through(k) {
                self.metadata[k].offset[r.index()] = 0;
                self.metadata[k].size[r.index()] = 0;
                return Err(e);
            }
            return Ok(());
        }

        let orig_size = self.metadata[k].size[Resolution::Orig.index()] as usize;
        let orig_offset = self.metadata[k].offset[Resolution::Orig.index()];
        let mut orig = Vec::new();
        orig.try_reserve_exact(orig_size).map_err(|_| ImgFsError::OutOfMemory)?;
        orig.resize(orig_size, 0u8);
        self.file.seek(SeekFrom::Start(orig_offset))?;
        self.file.read_exact(&mut orig)?;

        let (w, h) = self
            .header
            .target_res(r)
            .ok_or(ImgFsError::InvalidArgument)?;
        let rendered = self.codec.resize(&orig, w, h)?;

        let start = self.append_blob(&rendered)?;
        self.metadata[k].offset[r.index()] = start;
        self.metadata[k].size[r.index()] = rendered.len() as u32;
        if let Err(e) = self.write_entry_through(k) {
            self.metadata[k].offset[r.index()] = 0;
            self.metadata[k].size[r.index()] = 0;
            return Err(e);
        }

        debug!(
            "materialized {} variant of slot {k} ({} B at {start})",
            r.name(),
            rendered.len()
        );
        Ok(())
    }

    // ── delete ───────────────────────────────────────────────────────────────

    /// Clear the first NON_EMPTY entry matching `img_id`.  Blob bytes are
    /// not reclaimed.
    pub fn delete(&mut self, img_id: &str) -> Result<(), ImgFsError> {
        let k = self.find(img_id).ok_or(ImgFsError::ImageNotFound)?;

        let snapshot = self.metadata[k].clone();
        self.metadata[k].is_valid = crate::metadata::EMPTY;
        if let Err(e) = self.write_entry_through(k) {
            self.metadata[k] = snapshot;
            return Err(e);
        }

        self.header.nb_files -= 1;
        self.header.version += 1;
        if let Err(e) = self.write_header_through() {
            self.header.nb_files += 1;
            self.header.version -= 1;
            return Err(e);
        }

        debug!("deleted '{img_id}' from slot {k}");
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// First NON_EMPTY slot whose id matches — lowest index wins.
    fn find(&self, img_id: &str) -> Option<usize> {
        self.metadata
            .iter()
            .position(|m| m.is_non_empty() && m.img_id == img_id)
    }

    /// Append `data` at end of file, returning the offset where it begins.
    fn append_blob(&mut self, data: &[u8]) -> Result<u64, ImgFsError> {
        let start = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        Ok(start)
    }

    fn write_header_through(&mut self) -> Result<(), ImgFsError> {
        self.file.seek(SeekFrom::Start(0))?;
        self.header.write(&mut self.file)?;
        Ok(())
    }

    fn write_entry_through(&mut self, index: usize) -> Result<(), ImgFsError> {
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE as u64 + index as u64 * ENTRY_SIZE as u64))?;
        self.metadata[index].write(&mut self.file)?;
        Ok(())
    }
}
