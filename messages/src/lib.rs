//! Network message types for ORV node-to-node communication.
//!
//! Only the messages the consensus core reacts to are modelled here:
//! block publication, confirmation requests, and confirmation acknowledgements
//! (which carry a [`Vote`]). Framing and transport belong to the network layer.

pub mod codec;
pub mod error;
pub mod message;
pub mod vote;

pub use codec::{decode_message, encode_message, MAX_MESSAGE_SIZE};
pub use error::MessageError;
pub use message::{ConfirmReq, Message, MessageType};
pub use vote::{Vote, CONFIRM_ACK_HASHES_MAX};
