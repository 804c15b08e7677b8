//! ORV consensus node: runs the consensus core against a ledger, a network
//! and a set of local representative keys.
//!
//! The node is the coordinator that:
//! - Routes inbound peer messages to the consensus components
//! - Commits confirmed winners and notifies observers
//! - Solicits votes for undecided elections
//! - Owns configuration, logging, metrics and shutdown

pub mod config;
pub mod confirmation;
pub mod error;
pub mod logging;
pub mod message_processor;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod solicitor;

pub use config::NodeConfig;
pub use confirmation::ConfirmationHandler;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use message_processor::MessageProcessor;
pub use metrics::{Gauges, NodeMetrics};
pub use node::ConsensusNode;
pub use shutdown::ShutdownController;
pub use solicitor::Solicitor;
