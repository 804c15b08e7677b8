use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("vote carries {0} hashes, allowed 1..=255")]
    InvalidHashCount(usize),

    #[error("confirm_req carries {0} roots, allowed 1..=255")]
    InvalidRootCount(usize),

    #[error("trailing bytes after message: {0}")]
    TrailingBytes(usize),

    #[error("malformed message: {0}")]
    Malformed(String),
}
