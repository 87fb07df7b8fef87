//! Store header — format anchor at offset 0.
//!
//! # On-disk layout (64 bytes, all numeric fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0     32   name         store name, ASCII, zero-padded
//!   32      4   version      LE u32, bumped on every insert/delete
//!   36      4   nb_files     LE u32, current number of images
//!   40      4   max_files    LE u32, slot capacity, fixed at creation
//!   44      8   resized_res  4 × LE u16: thumb_w, thumb_h, small_w, small_h
//!   52      4   reserved     zero
//!   56      8   reserved     zero
//! ```
//!
//! # Endianness
//! All numeric fields are little-endian, serialized field by field.  The
//! file is portable across hosts; a reader never sees native struct dumps.
//!
//! The metadata table starts at offset 64 and holds exactly `max_files`
//! entries; the append-only blob region starts right after the table.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read, Write};

use crate::error::ImgFsError;
use crate::metadata::Resolution;

/// Fixed byte size of the on-disk header.
pub const HEADER_SIZE: usize = 64;

/// Maximum store-name length (the 32-byte field keeps a trailing NUL).
pub const MAX_STORE_NAME: usize = 31;

/// Name written into every store created by this build.
pub const STORE_NAME: &str = "imgfs 1.0";

pub const DEFAULT_MAX_FILES: u32 = 128;
pub const DEFAULT_THUMB_RES: u16 = 64;
pub const DEFAULT_SMALL_RES: u16 = 256;

/// Hard per-axis caps for the two derived resolutions.
pub const MAX_THUMB_RES: u16 = 128;
pub const MAX_SMALL_RES: u16 = 512;

#[derive(Debug, Clone)]
pub struct StoreHeader {
    pub name:        String,
    pub version:     u32,
    pub nb_files:    u32,
    pub max_files:   u32,
    /// thumb_w, thumb_h, small_w, small_h.
    pub resized_res: [u16; 4],
}

impl StoreHeader {
    /// Build a fresh header (`version = 0`, `nb_files = 0`), validating the
    /// creation bounds: `max_files ≥ 1`, thumbnail axes in (0, 128],
    /// small axes in (0, 512].
    pub fn new(
        max_files: u32,
        thumb_res: (u16, u16),
        small_res: (u16, u16),
    ) -> Result<Self, ImgFsError> {
        if max_files == 0 {
            return Err(ImgFsError::MaxFiles);
        }
        let (tw, th) = thumb_res;
        if tw == 0 || th == 0 || tw > MAX_THUMB_RES || th > MAX_THUMB_RES {
            return Err(ImgFsError::Resolutions);
        }
        let (sw, sh) = small_res;
        if sw == 0 || sh == 0 || sw > MAX_SMALL_RES || sh > MAX_SMALL_RES {
            return Err(ImgFsError::Resolutions);
        }
        Ok(Self {
            name:        STORE_NAME.to_owned(),
            version:     0,
            nb_files:    0,
            max_files,
            resized_res: [tw, th, sw, sh],
        })
    }

    /// Target dimensions for a derived resolution; `None` for [`Resolution::Orig`]
    /// (originals keep their decoded dimensions).
    pub fn target_res(&self, res: Resolution) -> Option<(u16, u16)> {
        match res {
            Resolution::Thumb => Some((self.resized_res[0], self.resized_res[1])),
            Resolution::Small => Some((self.resized_res[2], self.resized_res[3])),
            Resolution::Orig  => None,
        }
    }

    /// Byte offset where the blob region begins for this header.
    pub fn blob_start(&self) -> u64 {
        HEADER_SIZE as u64 + self.max_files as u64 * crate::metadata::ENTRY_SIZE as u64
    }

    /// Write the header as exactly [`HEADER_SIZE`] bytes.
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);

        let mut name = [0u8; MAX_STORE_NAME + 1];
        let n = self.name.len().min(MAX_STORE_NAME);
        name[..n].copy_from_slice(&self.name.as_bytes()[..n]);
        buf.extend_from_slice(&name);

        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_u32::<LittleEndian>(self.nb_files)?;
        buf.write_u32::<LittleEndian>(self.max_files)?;
        for r in self.resized_res {
            buf.write_u16::<LittleEndian>(r)?;
        }
        buf.resize(HEADER_SIZE, 0u8);

        w.write_all(&buf)
    }

    /// Read and validate a header.
    ///
    /// Rejects a zero `max_files`, `nb_files > max_files`, and zero derived
    /// resolutions — any of these means the file is not a healthy store.
    pub fn read<R: Read>(mut r: R) -> Result<Self, ImgFsError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)?;

        let nul = buf[..=MAX_STORE_NAME].iter().position(|&b| b == 0).unwrap_or(MAX_STORE_NAME + 1);
        let name = String::from_utf8_lossy(&buf[..nul]).into_owned();

        let mut c = Cursor::new(&buf[MAX_STORE_NAME + 1..]);
        let version   = c.read_u32::<LittleEndian>()?;
        let nb_files  = c.read_u32::<LittleEndian>()?;
        let max_files = c.read_u32::<LittleEndian>()?;
        let mut resized_res = [0u16; 4];
        for r in &mut resized_res {
            *r = c.read_u16::<LittleEndian>()?;
        }

        if max_files == 0 || nb_files > max_files || resized_res.contains(&0) {
            return Err(ImgFsError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "corrupt store header",
            )));
        }

        Ok(Self { name, version, nb_files, max_files, resized_res })
    }
}

impl fmt::Display for StoreHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "── ImgFS header ──────────────────────────")?;
        writeln!(f, "  Name       {}", self.name)?;
        writeln!(f, "  Version    {}", self.version)?;
        writeln!(f, "  Images     {} / {}", self.nb_files, self.max_files)?;
        writeln!(f, "  Thumbnail  {}x{}", self.resized_res[0], self.resized_res[1])?;
        write!(f,   "  Small      {}x{}", self.resized_res[2], self.resized_res[3])
    }
}
