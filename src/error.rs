use thiserror::Error;

/// Everything the engine can report back to a caller.
///
/// `Corrupt` is the unrecoverable class: the volume (or the caller) broke a
/// structural invariant and nothing should be retried. The rest are ordinary
/// outcomes a caller is expected to branch on.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("no free blocks or inodes left on the volume")]
    NoSpace,
    #[error("no such file or directory")]
    NotFound,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("file already exists")]
    AlreadyExists,
    #[error("path component too long")]
    BadPath,
    #[error("directory not empty")]
    DirNotEmpty,
    #[error("device i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("on-disk record codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("volume invariant violated: {0}")]
    Corrupt(String),
}

impl FsError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FsError::Corrupt(_))
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Bail out of the current function with `FsError::Corrupt`.
macro_rules! corrupt {
    ($($arg:tt)*) => {
        return Err($crate::error::FsError::Corrupt(format!($($arg)*)))
    };
}

pub(crate) use corrupt;
