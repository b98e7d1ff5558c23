// Failure kinds for record reads and writes. End-of-stream is not an error;
// readers report it as the absence of a record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("bad magic number 0x{found:08x}")]
    BadMagic { found: u32 },

    #[error("truncated {what}: {got} of {want} bytes")]
    Truncated {
        what: &'static str,
        got: usize,
        want: usize,
    },

    #[error("invalid record header: {0}")]
    Header(anyhow::Error),

    #[error("malformed message: {0}")]
    Message(anyhow::Error),

    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("decompressed size mismatch: got {got}, header says {want}")]
    SizeMismatch { got: u64, want: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
