//! Client wire protocol
//!
//! JSON text frames tagged by `type`, binary frames carrying audio. Replies
//! from the client carry no request id, so a session may have at most one
//! clarification outstanding; [`ClientLink`] enforces that.

mod link;
mod messages;

pub use link::{ChannelError, ClientLink};
pub use messages::{ClientEvent, ClientMessage, ServerMessage};
