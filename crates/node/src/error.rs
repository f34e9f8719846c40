//! A bunch of wrap errors.

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
/// The error type can be expressed in decimal, where the high decs represent
/// the error category and the low decs represent the error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[repr(u32)]
pub enum Error {
    #[error("Ring error: {0}")]
    CoreError(#[from] chordkv_core::error::Error) = 100,
    #[error("Join failed: {0}")]
    JoinError(chordkv_core::error::Error) = 101,
    #[error("Open storage failed: {0}")]
    StorageError(chordkv_core::error::Error) = 102,
    #[error("Decode error.")]
    DecodeError = 300,
    #[error("Encode error.")]
    EncodeError = 301,
    #[error("Bincode error: {0}")]
    BincodeError(#[from] bincode::Error) = 302,
    #[error("Invalid address {0}")]
    InvalidAddress(String) = 400,
    #[error("Bind {0} failed: {1}")]
    BindError(String, std::io::Error) = 401,
    #[error("Connect {0} failed: {1}")]
    ConnectError(String, std::io::Error) = 402,
    #[error("Connection closed by {0}")]
    ConnectionClosed(String) = 403,
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error) = 404,
    #[error("Invalid config: {0}")]
    InvalidConfig(String) = 500,
    #[error("Yaml error: {0}")]
    YamlError(#[from] serde_yaml::Error) = 501,
    #[error("Open file error: {0}")]
    OpenFileError(String) = 600,
    #[error("Create file error: {0}")]
    CreateFileError(String) = 601,
    #[error("Cannot resolve home dir")]
    HomeDirError = 602,
    #[error("Cannot resolve parent dir")]
    ParentDirError = 603,
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String) = 700,
}

impl Error {
    pub fn code(&self) -> u32 {
        // SAFETY: Because `Self` is marked `repr(u32)`, its layout is a `repr(C)` `union`
        // between `repr(C)` structs, each of which has the `u32` discriminant as its first
        // field, so we can read the discriminant without offsetting the pointer.
        unsafe { *<*const _>::from(self).cast::<u32>() }
    }
}

impl From<Error> for chordkv_core::error::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::CoreError(e) => e,
            e => chordkv_core::error::Error::Transport(e.to_string()),
        }
    }
}
