//! Maximum sizes of the string fields exchanged with the daemon. The daemon side keeps these
//!  in fixed-size buffers, so they are part of the protocol.

pub const VERSION_MAX_SIZE: usize = 8;
pub const GROUP_NAME_MAX_SIZE: usize = 64;
pub const PROTOCOL_MAX_SIZE: usize = 256;
pub const PROPERTIES_MAX_SIZE: usize = 128;
pub const PARAMS_MAX_SIZE: usize = 256;
pub const ENDPT_MAX_SIZE: usize = 48;
pub const ADDR_MAX_SIZE: usize = 48;
pub const PRINCIPAL_MAX_SIZE: usize = 32;
pub const NAME_MAX_SIZE: usize = ENDPT_MAX_SIZE + 24;

/// maximum number of members in a view
pub const MEMBERS_MAX_SIZE: usize = 1000;

/// maximum number of destinations in a single send or suspect downcall
pub const DESTS_MAX_SIZE: usize = 10;

/// maximum size of a single message body
pub const MSG_MAX_SIZE: usize = 32 * 1024;
