//! Error taxonomy — one stable kind per observable failure.
//!
//! Every store, HTTP, and CLI failure maps to exactly one [`ImgFsError`]
//! variant.  The variant set, the `kind()` names, and the `exit_code()`
//! values are stable: the HTTP dispatcher puts `kind()` in 500 bodies and
//! the CLI exits with `exit_code()`, so both are part of the external
//! interface.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImgFsError {
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Not enough arguments")]
    NotEnoughArguments,
    #[error("Invalid command")]
    InvalidCommand,
    #[error("Invalid image ID")]
    InvalidImgId,
    #[error("Image not found")]
    ImageNotFound,
    #[error("Duplicate image ID")]
    DuplicateId,
    #[error("Image store is full")]
    Full,
    #[error("Invalid max_files value")]
    MaxFiles,
    #[error("Invalid resolution(s)")]
    Resolutions,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Image codec error: {0}")]
    Codec(String),
    #[error("Threading error: {0}")]
    Threading(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ImgFsError {
    /// Stable taxonomy name.  This exact string appears in HTTP 500 bodies
    /// and is matched by clients; never reword an existing entry.
    pub fn kind(&self) -> &'static str {
        match self {
            ImgFsError::InvalidArgument    => "InvalidArgument",
            ImgFsError::NotEnoughArguments => "NotEnoughArguments",
            ImgFsError::InvalidCommand     => "InvalidCommand",
            ImgFsError::InvalidImgId       => "InvalidImgId",
            ImgFsError::ImageNotFound      => "ImageNotFound",
            ImgFsError::DuplicateId        => "DuplicateId",
            ImgFsError::Full               => "Full",
            ImgFsError::MaxFiles           => "MaxFiles",
            ImgFsError::Resolutions        => "Resolutions",
            ImgFsError::Io(_)              => "IO",
            ImgFsError::OutOfMemory        => "OutOfMemory",
            ImgFsError::Codec(_)           => "CodecFailure",
            ImgFsError::Threading(_)       => "Threading",
            ImgFsError::Runtime(_)         => "Runtime",
        }
    }

    /// Process exit code for the CLI.  0 is success; each kind maps 1:1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ImgFsError::InvalidArgument    => 1,
            ImgFsError::NotEnoughArguments => 2,
            ImgFsError::InvalidCommand     => 3,
            ImgFsError::InvalidImgId       => 4,
            ImgFsError::ImageNotFound      => 5,
            ImgFsError::DuplicateId        => 6,
            ImgFsError::Full               => 7,
            ImgFsError::MaxFiles           => 8,
            ImgFsError::Resolutions        => 9,
            ImgFsError::Io(_)              => 10,
            ImgFsError::OutOfMemory        => 11,
            ImgFsError::Codec(_)           => 12,
            ImgFsError::Threading(_)       => 13,
            ImgFsError::Runtime(_)         => 14,
        }
    }
}
