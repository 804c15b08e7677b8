use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("block {0} not found in ledger")]
    BlockNotFound(String),

    #[error("ledger commit failed: {0}")]
    Commit(String),

    #[error("component stopped")]
    Stopped,
}
