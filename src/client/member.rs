use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::client::connection::Connection;
use crate::client::error::{ClientError, ClientResult};
use crate::client::view::View;
use crate::wire::limits::*;

/// A member's position in a view, `0..nmembers`
pub type Rank = i32;

/// Identifies a member within its connection. Ids are handed out in ascending order starting at 1,
///  and they are never reused for the lifetime of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub i32);

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// ```ascii
/// Pre --join--> Joining --VIEW--> Normal --leave--> Leaving --EXIT--> Left
///                                 |    ^
///                          block_ok    VIEW
///                                 v    |
///                                 Blocked
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Pre,
    Joining,
    Normal,
    Blocked,
    Leaving,
    Left,
}

impl Display for MemberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberStatus::Pre => "Pre",
            MemberStatus::Joining => "Joining",
            MemberStatus::Normal => "Normal",
            MemberStatus::Blocked => "Blocked",
            MemberStatus::Leaving => "Leaving",
            MemberStatus::Left => "Left",
        };
        f.write_str(s)
    }
}

pub(crate) struct MemberState {
    pub status: MemberStatus,
    /// size of the most recently installed view, 0 before the first view
    pub nmembers: usize,
    pub rank: Option<Rank>,
    pub current_view: Option<Arc<View>>,
}

pub(crate) struct MemberShared {
    pub id: MemberId,
    pub state: RwLock<MemberState>,
    pub context: Option<Arc<dyn Any + Send + Sync>>,
}

impl MemberShared {
    pub fn new(id: MemberId, context: Option<Arc<dyn Any + Send + Sync>>) -> MemberShared {
        MemberShared {
            id,
            state: RwLock::new(MemberState {
                status: MemberStatus::Pre,
                nmembers: 0,
                rank: None,
                current_view: None,
            }),
            context,
        }
    }
}

/// A handle to one group membership. Handles are cheap to clone, and all clones refer to the same
///  membership.
///
/// A member stays valid after it left the group, but every downcall fails once its status is
///  [MemberStatus::Left].
#[derive(Clone)]
pub struct Member {
    pub(crate) shared: Arc<MemberShared>,
    pub(crate) conn: Connection,
}

impl Debug for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Member{{{}}}", self.shared.id)
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Member {
    pub fn id(&self) -> MemberId {
        self.shared.id
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn status(&self) -> MemberStatus {
        self.shared.state.read().await.status
    }

    pub async fn nmembers(&self) -> usize {
        self.shared.state.read().await.nmembers
    }

    /// This member's rank in the current view, `None` before the first view was received
    pub async fn rank(&self) -> Option<Rank> {
        self.shared.state.read().await.rank
    }

    pub async fn current_view(&self) -> Option<Arc<View>> {
        self.shared.state.read().await.current_view.clone()
    }

    /// The context passed to [Connection::join], if it has type `T`
    pub fn context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.shared.context.clone()
            .and_then(|ctx| ctx.downcast::<T>().ok())
    }
}


/// Parameters of a join downcall
#[derive(Clone, Debug)]
pub struct JoinOptions {
    pub group_name: String,
    /// the daemon builds the member's protocol stack from these
    pub properties: String,
    pub params: String,
    pub principal: String,
    pub secure: bool,
}

impl JoinOptions {
    pub const DEFAULT_PROPERTIES: &'static str = "Vsync";

    pub fn new(group_name: &str) -> JoinOptions {
        JoinOptions {
            group_name: group_name.to_string(),
            properties: Self::DEFAULT_PROPERTIES.to_string(),
            params: "".to_string(),
            principal: "".to_string(),
            secure: false,
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.group_name.is_empty() {
            return Err(ClientError::Precondition("group name must not be empty".to_string()));
        }

        for (name, value, max_size) in [
            ("group name", &self.group_name, GROUP_NAME_MAX_SIZE),
            ("properties", &self.properties, PROPERTIES_MAX_SIZE),
            ("params", &self.params, PARAMS_MAX_SIZE),
            ("principal", &self.principal, PRINCIPAL_MAX_SIZE),
        ] {
            if value.len() > max_size {
                return Err(ClientError::Precondition(format!("{} has {} bytes, the maximum is {}", name, value.len(), max_size)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_join_options_defaults() {
        let options = JoinOptions::new("G");
        assert_eq!(options.group_name, "G");
        assert_eq!(options.properties, "Vsync");
        assert!(options.params.is_empty());
        assert!(options.principal.is_empty());
        assert!(!options.secure);
        options.validate().unwrap();
    }

    #[rstest]
    #[case::empty_group(JoinOptions::new(""))]
    #[case::long_group(JoinOptions::new(&"g".repeat(GROUP_NAME_MAX_SIZE + 1)))]
    #[case::long_properties(JoinOptions { properties: "p".repeat(PROPERTIES_MAX_SIZE + 1), ..JoinOptions::new("G") })]
    #[case::long_params(JoinOptions { params: "p".repeat(PARAMS_MAX_SIZE + 1), ..JoinOptions::new("G") })]
    #[case::long_principal(JoinOptions { principal: "p".repeat(PRINCIPAL_MAX_SIZE + 1), ..JoinOptions::new("G") })]
    fn test_join_options_invalid(#[case] options: JoinOptions) {
        assert!(matches!(options.validate(), Err(ClientError::Precondition(_))));
    }

    #[test]
    fn test_join_options_at_max() {
        let options = JoinOptions::new(&"g".repeat(GROUP_NAME_MAX_SIZE));
        options.validate().unwrap();
    }

    #[rstest]
    #[case(MemberStatus::Pre, "Pre")]
    #[case(MemberStatus::Joining, "Joining")]
    #[case(MemberStatus::Normal, "Normal")]
    #[case(MemberStatus::Blocked, "Blocked")]
    #[case(MemberStatus::Leaving, "Leaving")]
    #[case(MemberStatus::Left, "Left")]
    fn test_status_display(#[case] status: MemberStatus, #[case] expected: &str) {
        assert_eq!(status.to_string(), expected);
    }

    #[tokio::test]
    async fn test_new_member_state() {
        let shared = MemberShared::new(MemberId(4), Some(Arc::new("ctx".to_string())));
        let state = shared.state.read().await;
        assert_eq!(state.status, MemberStatus::Pre);
        assert_eq!(state.nmembers, 0);
        assert!(state.rank.is_none());
        assert!(state.current_view.is_none());
    }
}
