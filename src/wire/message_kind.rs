use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::client::error::{ClientError, ClientResult};

/// Tags of messages sent from the client to the daemon. There is no version field on the wire, so
///  these values must match the daemon's exactly.
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum DowncallKind {
    Join = 1,
    Cast = 2,
    Send = 3,
    Send1 = 4,
    Suspect = 5,
    Leave = 6,
    BlockOk = 7,
}

/// Tags of messages sent from the daemon to the client.
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum UpcallKind {
    /// A new view was installed
    View = 1,
    /// A multicast message
    Cast = 2,
    /// A point-to-point message
    Send = 3,
    /// The group is about to change views, the member should stop sending and acknowledge
    Block = 4,
    /// The final notification for a member that left - it is no longer valid afterwards
    Exit = 5,
}

impl UpcallKind {
    pub fn from_tag(tag: i32) -> ClientResult<UpcallKind> {
        UpcallKind::try_from(tag)
            .map_err(|_| ClientError::Protocol(format!("unknown upcall tag {}", tag)))
    }

    /// upcalls that carry bulk data after the header
    pub fn has_body(&self) -> bool {
        matches!(self, UpcallKind::Cast | UpcallKind::Send)
    }
}

impl Display for UpcallKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpcallKind::View => "VIEW",
            UpcallKind::Cast => "CAST",
            UpcallKind::Send => "SEND",
            UpcallKind::Block => "BLOCK",
            UpcallKind::Exit => "EXIT",
        };
        f.write_str(s)
    }
}

impl Display for DowncallKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DowncallKind::Join => "JOIN",
            DowncallKind::Cast => "CAST",
            DowncallKind::Send => "SEND",
            DowncallKind::Send1 => "SEND1",
            DowncallKind::Suspect => "SUSPECT",
            DowncallKind::Leave => "LEAVE",
            DowncallKind::BlockOk => "BLOCK_OK",
        };
        f.write_str(s)
    }
}
