use std::collections::hash_map::Entry;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::client::error::{ClientError, ClientResult};
use crate::client::member::{MemberId, MemberShared};

/// All members of a connection that can still receive upcalls, i.e. from join until EXIT.
#[derive(Default)]
pub(crate) struct MemberRegistry {
    members: RwLock<FxHashMap<MemberId, Arc<MemberShared>>>,
}

impl MemberRegistry {
    pub async fn insert(&self, member: Arc<MemberShared>) -> ClientResult<()> {
        match self.members.write().await
            .entry(member.id)
        {
            Entry::Occupied(_) => {
                Err(ClientError::Protocol(format!("registering a second member with id {}", member.id)))
            }
            Entry::Vacant(e) => {
                trace!(id = %member.id, "registering member");
                e.insert(member);
                Ok(())
            }
        }
    }

    pub async fn get(&self, id: MemberId) -> Option<Arc<MemberShared>> {
        self.members.read().await
            .get(&id)
            .cloned()
    }

    pub async fn remove(&self, id: MemberId) -> ClientResult<Arc<MemberShared>> {
        trace!(%id, "deregistering member");
        self.members.write().await
            .remove(&id)
            .ok_or_else(|| ClientError::Protocol(format!("deregistering member {} that was not registered", id)))
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }
}
