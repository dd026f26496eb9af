use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tracing::{debug, info};

use crate::client::connection::Connection;
use crate::client::error::{ClientError, ClientResult};
use crate::client::member::{Member, Rank};
use crate::client::upcalls::UpcallEvent;
use crate::client::view::View;

/// Application callbacks for [Connection::run_upcall_loop]. Member state is updated before the
///  callback is invoked, e.g. a member is already in [crate::MemberStatus::Left] when `on_exit` is
///  called.
///
/// Downcalls can be made from inside the callbacks. Receiving from the same connection inside a
///  callback waits forever.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpcallHandler: Send + Sync {
    async fn on_view(&self, member: &Member, view: Arc<View>) -> anyhow::Result<()>;
    async fn on_cast(&self, member: &Member, origin: Rank, payload: Bytes) -> anyhow::Result<()>;
    async fn on_send(&self, member: &Member, origin: Rank, payload: Bytes) -> anyhow::Result<()>;
    /// The handler is expected to call [Member::block_ok] eventually
    async fn on_block(&self, member: &Member) -> anyhow::Result<()>;
    async fn on_exit(&self, member: &Member) -> anyhow::Result<()>;
}

impl Connection {
    /// Receives upcalls and dispatches them to `handler` until the last member of this connection
    ///  exited. Returns immediately if there are no members.
    pub async fn run_upcall_loop<H: UpcallHandler + ?Sized>(&self, handler: &H) -> ClientResult<()> {
        info!("starting upcall loop");

        while self.num_members().await > 0 {
            let event = self.recv().await?;
            debug!(id = %event.member().id(), "dispatching upcall");

            let result = match event {
                UpcallEvent::View { member, view } => handler.on_view(&member, view).await,
                UpcallEvent::Cast { member, msg } => handler.on_cast(&member, msg.origin, msg.payload).await,
                UpcallEvent::Send { member, msg } => handler.on_send(&member, msg.origin, msg.payload).await,
                UpcallEvent::Block { member } => handler.on_block(&member).await,
                UpcallEvent::Exit { member } => handler.on_exit(&member).await,
            };
            result.map_err(ClientError::Handler)?;
        }

        info!("no more members, upcall loop terminates");
        Ok(())
    }
}
