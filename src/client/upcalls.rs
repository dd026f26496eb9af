use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace, warn};

use crate::client::connection::{Connection, DaemonReader};
use crate::client::error::{ClientError, ClientResult};
use crate::client::member::{Member, MemberId, MemberStatus, Rank};
use crate::client::view::View;
use crate::wire::limits::MEMBERS_MAX_SIZE;
use crate::wire::message_kind::UpcallKind;

/// What [Connection::receive_metadata] learned about an upcall from its header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpcallInfo {
    /// The view itself must be read with [Connection::receive_view]
    View { nmembers: usize },
    /// The message must be read with [Connection::receive_message] or
    ///  [Connection::receive_message_into]
    Cast { origin: Rank, msg_size: usize },
    Send { origin: Rank, msg_size: usize },
    Block,
    Exit,
}

impl UpcallInfo {
    pub fn kind(&self) -> UpcallKind {
        match self {
            UpcallInfo::View { .. } => UpcallKind::View,
            UpcallInfo::Cast { .. } => UpcallKind::Cast,
            UpcallInfo::Send { .. } => UpcallKind::Send,
            UpcallInfo::Block => UpcallKind::Block,
            UpcallInfo::Exit => UpcallKind::Exit,
        }
    }
}

/// An upcall whose header was received.
///
/// VIEW, CAST and SEND upcalls have a body that is still in the stream, and the upcall holds the
///  connection's receive path until the body was read. Other tasks' receive calls wait in the
///  meantime. Dropping such an upcall without reading its body leaves the receive path unusable.
pub struct Upcall {
    member: Member,
    info: UpcallInfo,
    pending: Option<OwnedMutexGuard<DaemonReader>>,
}

impl Debug for Upcall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Upcall{{member:{:?}, info:{:?}}}", self.member, self.info)
    }
}

impl Drop for Upcall {
    fn drop(&mut self) {
        if self.pending.is_some() {
            warn!("{} upcall for member {} dropped without reading its body - the connection can not receive any more upcalls", self.info.kind(), self.member.id());
        }
    }
}

impl Upcall {
    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn info(&self) -> UpcallInfo {
        self.info
    }

    pub fn kind(&self) -> UpcallKind {
        self.info.kind()
    }

    /// Skips the pending body (if any) so the connection can go on receiving, and returns `err`
    ///  unless skipping fails.
    async fn discard_body(&mut self, err: ClientError) -> ClientError {
        let Some(mut reader) = self.pending.take() else {
            return err;
        };
        debug!(id = %self.member.id(), kind = %self.kind(), "discarding upcall body: {}", err);
        match reader.skip_remainder().await {
            Ok(()) => err,
            Err(e) => e,
        }
    }
}

/// A CAST or SEND message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// the sender's rank in the current view
    pub origin: Rank,
    pub payload: Bytes,
}

/// A complete upcall, as delivered by [Connection::recv]
#[derive(Debug)]
pub enum UpcallEvent {
    View { member: Member, view: Arc<View> },
    Cast { member: Member, msg: ReceivedMessage },
    Send { member: Member, msg: ReceivedMessage },
    Block { member: Member },
    Exit { member: Member },
}

impl UpcallEvent {
    pub fn member(&self) -> &Member {
        match self {
            UpcallEvent::View { member, .. } => member,
            UpcallEvent::Cast { member, .. } => member,
            UpcallEvent::Send { member, .. } => member,
            UpcallEvent::Block { member } => member,
            UpcallEvent::Exit { member } => member,
        }
    }
}


impl Connection {
    /// Waits for the next upcall and reads its header, applying the member state changes it
    ///  implies:
    ///
    /// * VIEW makes the member operational again (unless it is leaving) and records the view size
    /// * EXIT is only valid for a leaving member. It deregisters the member and marks it as left
    ///
    /// For VIEW, CAST and SEND the body must be read next (see [Upcall]).
    pub async fn receive_metadata(&self) -> ClientResult<Upcall> {
        let mut reader = self.inner.receive.clone().lock_owned().await;

        reader.begin_read().await?;
        let id = MemberId(reader.read_int()?);
        let kind = UpcallKind::from_tag(reader.read_int()?)?;

        let shared = self.inner.registry.get(id).await
            .ok_or_else(|| ClientError::Protocol(format!("{} upcall for unknown member {}", kind, id)))?;
        trace!(%id, %kind, "received upcall");

        let (info, pending) = match kind {
            UpcallKind::View => {
                let declared = reader.read_int()?;
                let nmembers = usize::try_from(declared).ok()
                    .filter(|&n| n > 0 && n <= MEMBERS_MAX_SIZE)
                    .ok_or_else(|| ClientError::Protocol(format!("VIEW for member {} with {} members", id, declared)))?;

                let mut state = shared.state.write().await;
                let status = state.status;
                match status {
                    MemberStatus::Leaving => {
                        debug!(%id, "view while leaving - staying in status Leaving");
                    }
                    MemberStatus::Pre | MemberStatus::Left => {
                        return Err(ClientError::Protocol(format!("VIEW for member {} in status {}", id, status)));
                    }
                    _ => state.status = MemberStatus::Normal,
                }
                state.nmembers = nmembers;
                (UpcallInfo::View { nmembers }, Some(reader))
            }
            UpcallKind::Cast | UpcallKind::Send => {
                let origin = reader.read_int()?;
                let msg_size = reader.bulk_len();
                let info = if kind == UpcallKind::Cast {
                    UpcallInfo::Cast { origin, msg_size }
                }
                else {
                    UpcallInfo::Send { origin, msg_size }
                };
                (info, Some(reader))
            }
            UpcallKind::Block => {
                reader.end_read()?;
                debug!(%id, "block requested");
                (UpcallInfo::Block, None)
            }
            UpcallKind::Exit => {
                let mut state = shared.state.write().await;
                if state.status != MemberStatus::Leaving {
                    return Err(ClientError::Protocol(format!("EXIT for member {} in status {}", id, state.status)));
                }
                reader.end_read()?;
                self.inner.registry.remove(id).await?;
                state.status = MemberStatus::Left;
                debug!(%id, "member left");
                (UpcallInfo::Exit, None)
            }
        };

        Ok(Upcall {
            member: Member {
                shared,
                conn: self.clone(),
            },
            info,
            pending,
        })
    }

    /// Reads the view following a VIEW upcall's header. The view becomes the member's current view.
    pub async fn receive_view(&self, mut upcall: Upcall) -> ClientResult<Arc<View>> {
        let UpcallInfo::View { nmembers } = upcall.info else {
            let err = ClientError::Precondition(format!("receive_view for a {} upcall", upcall.kind()));
            return Err(upcall.discard_body(err).await);
        };
        let mut reader = self.take_pending(&mut upcall).await?;

        let view = Arc::new(reader.read(|buf| View::deser(buf, nmembers))?);
        reader.end_read()?;

        let mut state = upcall.member.shared.state.write().await;
        state.rank = Some(view.rank);
        state.current_view = Some(view.clone());
        debug!(id = %upcall.member.id(), rank = view.rank, nmembers, view_id = %view.view_id, "installed view");

        Ok(view)
    }

    /// Reads the message following a CAST or SEND upcall's header
    pub async fn receive_message(&self, mut upcall: Upcall) -> ClientResult<ReceivedMessage> {
        let origin = Self::message_origin(&mut upcall).await?;
        let mut reader = self.take_pending(&mut upcall).await?;

        let payload = reader.read_bulk().await?;
        reader.end_read()?;
        Ok(ReceivedMessage { origin, payload })
    }

    /// Reads the message following a CAST or SEND upcall's header into `buf`, returning the
    ///  sender's rank and the message length.
    ///
    /// If `buf` is too small for the message, the message is discarded and an error is returned.
    ///  The connection remains usable in that case.
    pub async fn receive_message_into(&self, mut upcall: Upcall, buf: &mut [u8]) -> ClientResult<(Rank, usize)> {
        let origin = Self::message_origin(&mut upcall).await?;
        let mut reader = self.take_pending(&mut upcall).await?;

        let msg_size = reader.bulk_len();
        if buf.len() < msg_size {
            reader.skip_bulk().await?;
            reader.end_read()?;
            return Err(ClientError::Precondition(format!("receive buffer of {} bytes is too small for a message of {} bytes", buf.len(), msg_size)));
        }

        let len = reader.read_bulk_into(buf).await?;
        reader.end_read()?;
        Ok((origin, len))
    }

    /// Receives a complete upcall, i.e. its header and its body if it has one
    pub async fn recv(&self) -> ClientResult<UpcallEvent> {
        let upcall = self.receive_metadata().await?;
        let member = upcall.member.clone();

        let event = match upcall.info {
            UpcallInfo::View { .. } => UpcallEvent::View { member, view: self.receive_view(upcall).await? },
            UpcallInfo::Cast { .. } => UpcallEvent::Cast { member, msg: self.receive_message(upcall).await? },
            UpcallInfo::Send { .. } => UpcallEvent::Send { member, msg: self.receive_message(upcall).await? },
            UpcallInfo::Block => UpcallEvent::Block { member },
            UpcallInfo::Exit => UpcallEvent::Exit { member },
        };
        Ok(event)
    }

    async fn message_origin(upcall: &mut Upcall) -> ClientResult<Rank> {
        match upcall.info {
            UpcallInfo::Cast { origin, .. } | UpcallInfo::Send { origin, .. } => Ok(origin),
            other => {
                let err = ClientError::Precondition(format!("receiving a message for a {} upcall", other.kind()));
                Err(upcall.discard_body(err).await)
            }
        }
    }

    /// A body call that does not match the upcall consumes and discards the body, leaving the
    ///  receive path usable.
    async fn take_pending(&self, upcall: &mut Upcall) -> ClientResult<OwnedMutexGuard<DaemonReader>> {
        if !Arc::ptr_eq(&upcall.member.conn.inner, &self.inner) {
            let err = ClientError::Precondition("upcall was received on a different connection".to_string());
            return Err(upcall.discard_body(err).await);
        }
        upcall.pending.take()
            .ok_or_else(|| ClientError::Precondition(format!("{} upcall has no pending body", upcall.kind())))
    }
}
