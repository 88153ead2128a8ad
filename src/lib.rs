pub mod cli;
pub mod innodb;
pub mod util;

use thiserror::Error;

/// Error kinds for every fallible operation in the toolkit.
///
/// Per-page failures in the read-only modes are logged and skipped by the
/// callers; in rebuild mode any error is fatal because the output file's
/// structural consistency depends on every page being written correctly.
#[derive(Error, Debug)]
pub enum IbxError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("short read: {0}")]
    ShortRead(String),

    #[error("invalid FSP flags on page 0: 0x{0:x}")]
    InvalidFspFlags(u32),

    #[error("unsupported page size: {0}")]
    UnsupportedPageSize(usize),

    #[error("bad magic: {0}")]
    BadMagic(String),

    #[error("master key not found: {0}")]
    MasterKeyMissing(String),

    #[error("wrapped tablespace key CRC mismatch (computed=0x{computed:08X}, stored=0x{stored:08X}); wrong keyring?")]
    WrappedCrcMismatch { computed: u32, stored: u32 },

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("SDI root page {0} is invalid for this tablespace")]
    SdiRootInvalid(u32),

    #[error("SDI capacity exceeded: {0}")]
    SdiCapacityExceeded(String),

    #[error("cfg write error: {0}")]
    CfgWrite(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub use IbxError as Error;
