use crate::client::error::{ClientError, ClientResult};
use crate::wire::frame::BufferPolicy;
use crate::wire::limits::MSG_MAX_SIZE;

pub const DEFAULT_DAEMON_HOST: &str = "127.0.0.1";
pub const DEFAULT_DAEMON_PORT: u16 = 5002;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub daemon_host: String,
    pub daemon_port: u16,

    pub tcp_nodelay: bool,

    /// This is the biggest message body the client accepts for sending. The daemon has a fixed
    ///  limit for this, so increasing it beyond the daemon's setting only moves the failure to the
    ///  daemon side.
    pub max_message_size: usize,

    /// Incoming header and bulk lengths are checked against this before anything is allocated. A
    ///  frame exceeding it means the stream is corrupt (or the peer is not a daemon).
    pub max_incoming_frame_part: usize,

    pub initial_buffer_capacity: usize,
    /// A header buffer that grew beyond this is replaced by one of `buffer_shrink_capacity` once the
    ///  message is done
    pub buffer_shrink_threshold: usize,
    pub buffer_shrink_capacity: usize,
}

impl ClientConfig {
    pub fn default_localhost() -> ClientConfig {
        ClientConfig {
            daemon_host: DEFAULT_DAEMON_HOST.to_string(),
            daemon_port: DEFAULT_DAEMON_PORT,
            tcp_nodelay: true,
            max_message_size: MSG_MAX_SIZE,
            max_incoming_frame_part: 16 * 1024 * 1024,
            initial_buffer_capacity: 512,
            buffer_shrink_threshold: 64 * 1024,
            buffer_shrink_capacity: 4 * 1024,
        }
    }

    /// `None` for the host means the local machine
    pub fn new(host: Option<&str>, port: u16) -> ClientConfig {
        ClientConfig {
            daemon_host: host.unwrap_or(DEFAULT_DAEMON_HOST).to_string(),
            daemon_port: port,
            ..Self::default_localhost()
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.daemon_host.is_empty() {
            return Err(ClientError::Config("daemon host is empty".to_string()));
        }
        if self.daemon_port == 0 {
            return Err(ClientError::Config("daemon port must not be 0".to_string()));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ClientError::Config(format!("max message size {} does not fit the frame format", self.max_message_size)));
        }
        if self.max_incoming_frame_part < self.max_message_size {
            return Err(ClientError::Config("max incoming frame part must not be smaller than max message size".to_string()));
        }
        if self.buffer_shrink_capacity > self.buffer_shrink_threshold {
            return Err(ClientError::Config("buffer shrink capacity must not exceed the shrink threshold".to_string()));
        }
        Ok(())
    }

    pub fn buffer_policy(&self) -> BufferPolicy {
        BufferPolicy {
            initial_capacity: self.initial_buffer_capacity,
            shrink_threshold: self.buffer_shrink_threshold,
            shrink_capacity: self.buffer_shrink_capacity,
        }
    }
}
