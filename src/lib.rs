//! Client side of the outboard protocol: a process connects to a group communication daemon
//!  over a single TCP connection and multiplexes any number of group memberships over it.
//!
//! Upcalls are received in two steps: [Connection::receive_metadata] reads an upcall's header, and
//!  [Connection::receive_view] or [Connection::receive_message] reads its body.
//!  [Connection::poll] checks for pending upcalls without consuming anything, and
//!  [Connection::recv] and [Connection::run_upcall_loop] are conveniences built on top.

pub mod client;
pub mod util;
pub mod wire;

#[cfg(test)]
pub mod test_util;

pub use client::client_config::ClientConfig;
pub use client::connection::Connection;
pub use client::error::{ClientError, ClientResult};
pub use client::member::{JoinOptions, Member, MemberId, MemberStatus, Rank};
pub use client::upcall_handler::UpcallHandler;
pub use client::upcalls::{ReceivedMessage, Upcall, UpcallEvent, UpcallInfo};
pub use client::view::{View, ViewId};
