use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::client::client_config::ClientConfig;
use crate::client::error::{ClientError, ClientResult};
use crate::client::member::{JoinOptions, Member, MemberId, MemberShared, MemberState, MemberStatus};
use crate::client::member_registry::MemberRegistry;
use crate::wire::codec;
use crate::wire::frame::{FrameReader, FrameWriter};
use crate::wire::message_kind::DowncallKind;

pub(crate) type DaemonReader = FrameReader<BufReader<OwnedReadHalf>>;
type DaemonWriter = FrameWriter<OwnedWriteHalf>;

/// The link between this process and a group communication daemon. Any number of group memberships
///  can share a single connection.
///
/// A connection is a handle that can be cloned and used from several tasks concurrently. Sending
///  (downcalls) and receiving (upcalls) are independent of each other: a task waiting for the next
///  upcall does not prevent other tasks from sending. Concurrent downcalls are serialized, as are
///  concurrent receivers.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    pub config: ClientConfig,
    next_member_id: AtomicI32,
    pub registry: MemberRegistry,
    send: Mutex<DaemonWriter>,
    pub receive: Arc<Mutex<DaemonReader>>,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection{{{}:{}}}", self.inner.config.daemon_host, self.inner.config.daemon_port)
    }
}

impl Connection {
    pub async fn connect(config: ClientConfig) -> ClientResult<Connection> {
        config.validate()?;

        info!("connecting to daemon at {}:{}", config.daemon_host, config.daemon_port);
        let stream = TcpStream::connect((config.daemon_host.as_str(), config.daemon_port)).await?;
        stream.set_nodelay(config.tcp_nodelay)?;
        debug!("connected to daemon from {:?}", stream.local_addr()?);

        Ok(Connection::from_stream(stream, config))
    }

    fn from_stream(stream: TcpStream, config: ClientConfig) -> Connection {
        let (read_half, write_half) = stream.into_split();
        let policy = config.buffer_policy();

        Connection {
            inner: Arc::new(ConnectionInner {
                next_member_id: AtomicI32::new(1),
                registry: MemberRegistry::default(),
                send: Mutex::new(FrameWriter::new(write_half, policy)),
                receive: Arc::new(Mutex::new(FrameReader::new(BufReader::new(read_half), config.max_incoming_frame_part, policy))),
                config,
            })
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// the number of members that joined through this connection and did not receive their EXIT yet
    pub async fn num_members(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Waits up to `timeout` for incoming data, returning `true` if there is something to receive.
    ///  This does not consume any data, and it does not change any member's state.
    ///
    /// A closed connection counts as 'data available' - the next receive call reports it. `false`
    ///  is also returned if another task is in the middle of receiving.
    pub async fn poll(&self, timeout: Duration) -> ClientResult<bool> {
        let Ok(mut reader) = self.inner.receive.try_lock() else {
            trace!("poll: receive path is busy");
            return Ok(false);
        };

        if reader.is_desynchronized() {
            // let the next receive call report the problem
            return Ok(true);
        }

        match tokio::time::timeout(timeout, reader.reader_mut().fill_buf()).await {
            Err(_) => Ok(false),
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Joins a group. The new member is registered for upcalls before the JOIN is sent, and it
    ///  becomes operational when the first VIEW arrives for it.
    ///
    /// `context` is arbitrary application data that is attached to the member and can be retrieved
    ///  through [Member::context].
    pub async fn join(&self, options: JoinOptions, context: Option<Arc<dyn Any + Send + Sync>>) -> ClientResult<Member> {
        options.validate()?;

        let id = self.allocate_member_id()?;
        let shared = Arc::new(MemberShared::new(id, context));

        let mut writer = self.inner.send.lock().await;
        let header = writer.begin_write()?;

        shared.state.write().await.status = MemberStatus::Joining;
        self.inner.registry.insert(shared.clone()).await?;

        debug!(%id, group = %options.group_name, "joining");

        codec::write_int(header, id.0);
        codec::write_int(header, DowncallKind::Join.into());
        codec::write_c_string(header, &options.group_name);
        codec::write_c_string(header, &options.properties);
        codec::write_c_string(header, &options.params);
        codec::write_c_string(header, &options.principal);
        codec::write_bool(header, options.secure);

        if let Err(e) = writer.end_write(&[]).await {
            debug!(%id, "join failed, deregistering: {}", e);
            if let Err(remove_err) = self.inner.registry.remove(id).await {
                warn!(%id, "member was removed while its JOIN was being sent: {}", remove_err);
            }
            return Err(e);
        }

        Ok(Member {
            shared,
            conn: self.clone(),
        })
    }

    fn allocate_member_id(&self) -> ClientResult<MemberId> {
        let id = self.inner.next_member_id.fetch_add(1, Ordering::AcqRel);
        if id <= 0 {
            return Err(ClientError::Precondition("member ids are exhausted for this connection".to_string()));
        }
        Ok(MemberId(id))
    }

    /// Sends a downcall on behalf of a member that must be in [MemberStatus::Normal].
    ///
    /// `body` validates the call's arguments against the member's state and writes the fields
    ///  following the tag. If it fails, nothing is sent and the member is unchanged.
    pub(crate) async fn downcall(
        &self,
        member: &MemberShared,
        kind: DowncallKind,
        bulk: &[u8],
        new_status: Option<MemberStatus>,
        body: impl FnOnce(&mut BytesMut, &MemberState) -> ClientResult<()>,
    ) -> ClientResult<()> {
        if bulk.len() > self.inner.config.max_message_size {
            return Err(ClientError::Precondition(format!("{}: message of {} bytes exceeds the maximum of {} bytes", kind, bulk.len(), self.inner.config.max_message_size)));
        }

        let mut writer = self.inner.send.lock().await;

        {
            let mut state = member.state.write().await;
            if state.status != MemberStatus::Normal {
                return Err(ClientError::Precondition(format!("{} for member {} in status {}", kind, member.id, state.status)));
            }

            let header = writer.begin_write()?;
            codec::write_int(header, member.id.0);
            codec::write_int(header, kind.into());
            body(header, &*state)?;

            if let Some(new_status) = new_status {
                trace!(id = %member.id, "{} -> {}", state.status, new_status);
                state.status = new_status;
            }
        }

        // member state must not be locked while waiting for the daemon to accept data
        trace!(id = %member.id, %kind, bulk_len = bulk.len(), "downcall");
        writer.end_write(bulk).await?;
        Ok(())
    }

    /// Shuts down the sending direction. The daemon treats this as all members leaving.
    pub async fn close(&self) -> ClientResult<()> {
        info!("closing connection to daemon");
        let mut writer = self.inner.send.lock().await;
        writer.writer_mut().shutdown().await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn from_test_stream(stream: TcpStream, config: ClientConfig) -> Connection {
        Connection::from_stream(stream, config)
    }
}
