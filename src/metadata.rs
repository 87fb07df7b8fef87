//! Metadata entry — one fixed-size record per image slot.
//!
//! # On-disk layout (208 bytes, all numeric fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0    128   img_id     printable ASCII, zero-padded (≤ 127 bytes used)
//!  128     32   sha        SHA-256 of the original bytes (dedup key)
//!  160      8   orig_res   2 × LE u32: width, height of the original
//!  168     12   size       3 × LE u32, one per resolution; 0 = not materialized
//!  180     24   offset     3 × LE u64, one per resolution
//!  204      2   is_valid   LE u16: 0 = EMPTY, 1 = NON_EMPTY
//!  206      2   reserved   zero
//! ```
//!
//! The table holds `max_files` of these records back to back, starting at
//! offset 64.  A slot's position in the table is its index; `insert` always
//! claims the lowest-indexed EMPTY slot.
//!
//! `size[r] == 0` means resolution `r` has never been materialized; the
//! paired `offset[r]` is meaningless in that case and is kept at 0.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::error::ImgFsError;

/// Fixed byte size of one metadata record.
pub const ENTRY_SIZE: usize = 208;

/// Maximum image-id length in bytes (the 128-byte field keeps a trailing NUL).
pub const MAX_IMG_ID: usize = 127;

/// `is_valid` values.  Anything else marks the table as corrupt.
pub const EMPTY:     u16 = 0;
pub const NON_EMPTY: u16 = 1;

// ── Resolution ───────────────────────────────────────────────────────────────

/// The three renderings of one logical image.  The discriminant is the
/// index into the `size` and `offset` arrays and is frozen on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Resolution {
    Thumb = 0,
    Small = 1,
    Orig  = 2,
}

pub const NB_RES: usize = 3;

impl Resolution {
    pub const ALL: [Resolution; NB_RES] =
        [Resolution::Thumb, Resolution::Small, Resolution::Orig];

    #[inline]
    pub fn index(self) -> usize { self as usize }

    /// Parse a resolution name as it appears in URLs and on the command
    /// line.  Matching is case-sensitive.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "thumb" | "thumbnail" => Some(Resolution::Thumb),
            "small"               => Some(Resolution::Small),
            "orig" | "original"   => Some(Resolution::Orig),
            _                     => None,
        }
    }

    /// Canonical short name (diagnostics and file suffixes).
    pub fn name(self) -> &'static str {
        match self {
            Resolution::Thumb => "thumb",
            Resolution::Small => "small",
            Resolution::Orig  => "orig",
        }
    }
}

// ── Metadata record ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImgMetadata {
    pub img_id:   String,
    pub sha:      [u8; 32],
    /// Decoded width and height of the original JPEG.
    pub orig_res: [u32; 2],
    /// Bytes per resolution, indexed by [`Resolution`]; 0 = not materialized.
    pub size:     [u32; NB_RES],
    /// Absolute file offset per resolution, indexed by [`Resolution`].
    pub offset:   [u64; NB_RES],
    pub is_valid: u16,
}

impl Default for ImgMetadata {
    fn default() -> Self {
        Self {
            img_id:   String::new(),
            sha:      [0u8; 32],
            orig_res: [0; 2],
            size:     [0; NB_RES],
            offset:   [0; NB_RES],
            is_valid: EMPTY,
        }
    }
}

impl ImgMetadata {
    #[inline]
    pub fn is_empty(&self) -> bool { self.is_valid == EMPTY }

    #[inline]
    pub fn is_non_empty(&self) -> bool { self.is_valid == NON_EMPTY }

    /// Write the record as exactly [`ENTRY_SIZE`] bytes.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(ENTRY_SIZE);

        let mut id = [0u8; MAX_IMG_ID + 1];
        let n = self.img_id.len().min(MAX_IMG_ID);
        id[..n].copy_from_slice(&self.img_id.as_bytes()[..n]);
        buf.extend_from_slice(&id);

        buf.extend_from_slice(&self.sha);
        for v in self.orig_res {
            buf.write_u32::<LittleEndian>(v)?;
        }
        for v in self.size {
            buf.write_u32::<LittleEndian>(v)?;
        }
        for v in self.offset {
            buf.write_u64::<LittleEndian>(v)?;
        }
        buf.write_u16::<LittleEndian>(self.is_valid)?;
        buf.resize(ENTRY_SIZE, 0u8);

        w.write_all(&buf)
    }

    /// Read and validate one record.  An `is_valid` outside {EMPTY,
    /// NON_EMPTY} means the table is corrupt and the store must not open.
    pub fn read<R: Read>(mut r: R) -> Result<Self, ImgFsError> {
        let mut buf = [0u8; ENTRY_SIZE];
        r.read_exact(&mut buf)?;

        let nul = buf[..=MAX_IMG_ID].iter().position(|&b| b == 0).unwrap_or(MAX_IMG_ID + 1);
        let img_id = String::from_utf8_lossy(&buf[..nul]).into_owned();

        let mut sha = [0u8; 32];
        sha.copy_from_slice(&buf[MAX_IMG_ID + 1..MAX_IMG_ID + 33]);

        let mut c = Cursor::new(&buf[MAX_IMG_ID + 33..]);
        let mut orig_res = [0u32; 2];
        for v in &mut orig_res {
            *v = c.read_u32::<LittleEndian>()?;
        }
        let mut size = [0u32; NB_RES];
        for v in &mut size {
            *v = c.read_u32::<LittleEndian>()?;
        }
        let mut offset = [0u64; NB_RES];
        for v in &mut offset {
            *v = c.read_u64::<LittleEndian>()?;
        }
        let is_valid = c.read_u16::<LittleEndian>()?;
        if is_valid != EMPTY && is_valid != NON_EMPTY {
            return Err(ImgFsError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("corrupt metadata entry (is_valid = {is_valid})"),
            )));
        }

        Ok(Self { img_id, sha, orig_res, size, offset, is_valid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut m = ImgMetadata::default();
        m.img_id = "pic1".to_owned();
        m.sha = [0xAB; 32];
        m.orig_res = [1024, 768];
        m.size = [0, 0, 12_345];
        m.offset = [0, 0, 64 + 10 * ENTRY_SIZE as u64];
        m.is_valid = NON_EMPTY;

        let mut buf = Vec::new();
        m.write(&mut buf).unwrap();
        assert_eq!(buf.len(), ENTRY_SIZE);

        let back = ImgMetadata::read(&buf[..]).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn empty_slot_roundtrip() {
        let zeroed = vec![0u8; ENTRY_SIZE];
        let m = ImgMetadata::read(&zeroed[..]).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.img_id, "");
    }

    #[test]
    fn rejects_bad_validity_flag() {
        let mut buf = vec![0u8; ENTRY_SIZE];
        buf[204] = 7;
        assert!(ImgMetadata::read(&buf[..]).is_err());
    }

    #[test]
    fn resolution_names() {
        assert_eq!(Resolution::from_name("thumb"), Some(Resolution::Thumb));
        assert_eq!(Resolution::from_name("thumbnail"), Some(Resolution::Thumb));
        assert_eq!(Resolution::from_name("small"), Some(Resolution::Small));
        assert_eq!(Resolution::from_name("orig"), Some(Resolution::Orig));
        assert_eq!(Resolution::from_name("original"), Some(Resolution::Orig));
        assert_eq!(Resolution::from_name("Thumb"), None); // case-sensitive
        assert_eq!(Resolution::from_name("large"), None);
    }
}
