use std::fmt::{Display, Formatter};

use bytes::{Buf, BufMut};

use crate::client::error::{ClientError, ClientResult};
use crate::client::member::Rank;
use crate::util::safe_converter::PrecheckedCast;
use crate::wire::codec;
use crate::wire::limits::*;

/// Identifies a view: the logical time at which it was installed, and the endpoint of the
///  coordinator that installed it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewId {
    pub ltime: i32,
    pub endpt: String,
}

impl Display for ViewId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ltime, self.endpt)
    }
}

/// A snapshot of a group's composition as seen by one member.
///
/// `addresses` and `endpts` are indexed by rank, and both have exactly `nmembers` entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    pub nmembers: usize,
    pub version: String,
    pub group: String,
    pub proto: String,
    pub ltime: i32,
    pub primary: bool,
    pub params: String,
    pub addresses: Vec<String>,
    pub endpts: Vec<String>,
    pub endpt: String,
    pub addr: String,
    pub rank: Rank,
    pub name: String,
    pub view_id: ViewId,
}

impl View {
    /// Writes the view body, i.e. everything following the member count in a VIEW upcall. This is
    ///  the daemon side of the conversation.
    pub fn ser(&self, buf: &mut impl BufMut) {
        codec::write_c_string(buf, &self.version);
        codec::write_c_string(buf, &self.group);
        codec::write_c_string(buf, &self.proto);
        codec::write_int(buf, self.ltime);
        codec::write_bool(buf, self.primary);
        codec::write_c_string(buf, &self.params);
        codec::write_string_array(buf, &self.addresses);
        codec::write_string_array(buf, &self.endpts);
        codec::write_c_string(buf, &self.endpt);
        codec::write_c_string(buf, &self.addr);
        codec::write_int(buf, self.rank);
        codec::write_c_string(buf, &self.name);
        codec::write_int(buf, self.view_id.ltime);
        codec::write_c_string(buf, &self.view_id.endpt);
    }

    /// `nmembers` is the member count from the VIEW header. It is authoritative: member arrays of a
    ///  different length, or an own rank outside of the view, are protocol errors.
    pub fn deser(buf: &mut impl Buf, nmembers: usize) -> ClientResult<View> {
        if nmembers > MEMBERS_MAX_SIZE {
            return Err(ClientError::Protocol(format!("view with {} members exceeds the maximum of {}", nmembers, MEMBERS_MAX_SIZE)));
        }

        let version = codec::read_string(buf, VERSION_MAX_SIZE)?;
        let group = codec::read_string(buf, GROUP_NAME_MAX_SIZE)?;
        let proto = codec::read_string(buf, PROTOCOL_MAX_SIZE)?;
        let ltime = codec::read_int(buf)?;
        let primary = codec::read_bool(buf)?;
        let params = codec::read_string(buf, PARAMS_MAX_SIZE)?;
        let addresses = codec::read_string_array(buf, nmembers, ADDR_MAX_SIZE)?;
        let endpts = codec::read_string_array(buf, nmembers, ENDPT_MAX_SIZE)?;
        let endpt = codec::read_string(buf, ENDPT_MAX_SIZE)?;
        let addr = codec::read_string(buf, ADDR_MAX_SIZE)?;
        let rank = codec::read_int(buf)?;
        let name = codec::read_string(buf, NAME_MAX_SIZE)?;
        let view_id = ViewId {
            ltime: codec::read_int(buf)?,
            endpt: codec::read_string(buf, ENDPT_MAX_SIZE)?,
        };

        let view_size: Rank = nmembers.prechecked_cast();
        if rank < 0 || rank >= view_size {
            return Err(ClientError::Protocol(format!("own rank {} is outside of a view with {} members", rank, nmembers)));
        }

        Ok(View {
            nmembers,
            version,
            group,
            proto,
            ltime,
            primary,
            params,
            addresses,
            endpts,
            endpt,
            addr,
            rank,
            name,
            view_id,
        })
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }

    /// the endpoint of the member with a given rank, if that rank is part of the view
    pub fn endpt_of(&self, rank: Rank) -> Option<&str> {
        usize::try_from(rank).ok()
            .and_then(|r| self.endpts.get(r))
            .map(|s| s.as_str())
    }
}
