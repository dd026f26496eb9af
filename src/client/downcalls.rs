//! Downcalls are requests from a member to the daemon. They all require the member to be in
//!  [MemberStatus::Normal], and none of them waits for a reply: their effect is reported through
//!  upcalls, if at all.

use tracing::debug;

use crate::client::error::{ClientError, ClientResult};
use crate::client::member::{Member, MemberState, MemberStatus, Rank};
use crate::util::safe_converter::PrecheckedCast;
use crate::wire::codec;
use crate::wire::limits::DESTS_MAX_SIZE;
use crate::wire::message_kind::DowncallKind;

impl Member {
    /// Asks the daemon to remove this member from its group. The member keeps receiving upcalls
    ///  until its EXIT arrives.
    pub async fn leave(&self) -> ClientResult<()> {
        debug!(id = %self.id(), "leaving");
        self.conn.downcall(&self.shared, DowncallKind::Leave, &[], Some(MemberStatus::Leaving), |_, _| Ok(()))
            .await
    }

    /// Sends a message to all members of the current view, including this one
    pub async fn cast(&self, msg: &[u8]) -> ClientResult<()> {
        self.conn.downcall(&self.shared, DowncallKind::Cast, msg, None, |_, _| Ok(()))
            .await
    }

    /// Sends a message to a list of members, identified by their ranks in the current view
    pub async fn send(&self, dests: &[Rank], msg: &[u8]) -> ClientResult<()> {
        self.conn.downcall(&self.shared, DowncallKind::Send, msg, None, |header, state| {
            check_ranks(DowncallKind::Send, dests, state)?;
            codec::write_int_array(header, dests);
            Ok(())
        })
            .await
    }

    /// Sends a message to a single member
    pub async fn send1(&self, dest: Rank, msg: &[u8]) -> ClientResult<()> {
        self.conn.downcall(&self.shared, DowncallKind::Send1, msg, None, |header, state| {
            check_ranks(DowncallKind::Send1, &[dest], state)?;
            codec::write_int(header, dest);
            Ok(())
        })
            .await
    }

    /// Reports members that this member believes to have failed. The daemon decides whether to
    ///  act on it.
    pub async fn suspect(&self, suspects: &[Rank]) -> ClientResult<()> {
        debug!(id = %self.id(), ?suspects, "suspecting");
        self.conn.downcall(&self.shared, DowncallKind::Suspect, &[], None, |header, state| {
            check_ranks(DowncallKind::Suspect, suspects, state)?;
            codec::write_int_array(header, suspects);
            Ok(())
        })
            .await
    }

    /// Acknowledges a BLOCK upcall. The member must not send messages until the next view.
    pub async fn block_ok(&self) -> ClientResult<()> {
        self.conn.downcall(&self.shared, DowncallKind::BlockOk, &[], Some(MemberStatus::Blocked), |_, _| Ok(()))
            .await
    }
}

fn check_ranks(kind: DowncallKind, ranks: &[Rank], state: &MemberState) -> ClientResult<()> {
    if ranks.len() > DESTS_MAX_SIZE {
        return Err(ClientError::Precondition(format!("{}: {} ranks, the maximum is {}", kind, ranks.len(), DESTS_MAX_SIZE)));
    }

    let nmembers: Rank = state.nmembers.prechecked_cast();
    if let Some(rank) = ranks.iter().find(|&&r| r < 0 || r >= nmembers) {
        return Err(ClientError::Precondition(format!("{}: rank {} is outside of the current view with {} members", kind, rank, nmembers)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::client::member::{MemberStatus, Rank};
    use crate::test_util::daemon::{connect_pair, joined_member};
    use crate::wire::message_kind::DowncallKind;
    use crate::ClientError;

    #[tokio::test]
    async fn test_cast_wire_format() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 2, 0).await;

        member.cast(b"hello").await.unwrap();

        let raw = daemon.read_raw(8 + 8 + 5).await;
        assert_eq!(raw, b"\0\0\0\x08\0\0\0\x05\0\0\0\x01\0\0\0\x02hello".as_slice());
    }

    #[tokio::test]
    async fn test_empty_cast() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 2, 0).await;

        member.cast(b"").await.unwrap();

        let d = daemon.expect_downcall().await;
        assert_eq!(d.id_and_kind(), (member.id(), DowncallKind::Cast));
        assert!(d.fields.is_empty());
        assert!(d.bulk.is_empty());
    }

    #[tokio::test]
    async fn test_send_wire_format() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 3, 0).await;

        member.send(&[0, 2], b"xy").await.unwrap();
        let d = daemon.expect_downcall().await;
        assert_eq!(d.id_and_kind(), (member.id(), DowncallKind::Send));
        assert_eq!(d.fields, b"\0\0\0\x02\0\0\0\0\0\0\0\x02".as_slice());
        assert_eq!(d.bulk, b"xy".as_slice());

        member.send1(1, b"z").await.unwrap();
        let d = daemon.expect_downcall().await;
        assert_eq!(d.id_and_kind(), (member.id(), DowncallKind::Send1));
        assert_eq!(d.fields, b"\0\0\0\x01".as_slice());
        assert_eq!(d.bulk, b"z".as_slice());

        member.suspect(&[2]).await.unwrap();
        let d = daemon.expect_downcall().await;
        assert_eq!(d.id_and_kind(), (member.id(), DowncallKind::Suspect));
        assert_eq!(d.fields, b"\0\0\0\x01\0\0\0\x02".as_slice());
        assert!(d.bulk.is_empty());
    }

    #[rstest]
    #[case::negative(vec![-1])]
    #[case::at_view_size(vec![3])]
    #[case::one_of_several(vec![0, 1, 7])]
    #[case::too_many(vec![0; 11])]
    #[tokio::test]
    async fn test_invalid_ranks(#[case] ranks: Vec<Rank>) {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 3, 0).await;

        assert!(matches!(member.send(&ranks, b"x").await, Err(ClientError::Precondition(_))));
        assert!(matches!(member.suspect(&ranks).await, Err(ClientError::Precondition(_))));
        if ranks.len() == 1 {
            assert!(matches!(member.send1(ranks[0], b"x").await, Err(ClientError::Precondition(_))));
        }

        // nothing was sent, the connection is still usable
        assert_eq!(member.status().await, MemberStatus::Normal);
        member.cast(b"ok").await.unwrap();
        let d = daemon.expect_downcall().await;
        assert_eq!(d.id_and_kind(), (member.id(), DowncallKind::Cast));
    }

    #[tokio::test]
    async fn test_max_dests() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 3, 0).await;

        member.send(&[0; 10], b"x").await.unwrap();
        assert_eq!(daemon.expect_downcall().await.id_and_kind(), (member.id(), DowncallKind::Send));
    }

    #[tokio::test]
    async fn test_message_too_big() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 2, 0).await;

        let max = conn.config().max_message_size;
        assert!(matches!(member.cast(&vec![0u8; max + 1]).await, Err(ClientError::Precondition(_))));

        member.cast(&vec![1u8; max]).await.unwrap();
        let d = daemon.expect_downcall().await;
        assert_eq!(d.bulk.len(), max);
    }

    #[tokio::test]
    async fn test_downcalls_before_first_view() {
        let (conn, _daemon) = connect_pair().await;
        let member = conn.join(crate::JoinOptions::new("G"), None).await.unwrap();

        assert!(matches!(member.cast(b"x").await, Err(ClientError::Precondition(_))));
        assert!(matches!(member.leave().await, Err(ClientError::Precondition(_))));
        assert!(matches!(member.block_ok().await, Err(ClientError::Precondition(_))));
        assert_eq!(member.status().await, MemberStatus::Joining);
    }

    #[tokio::test]
    async fn test_block_view_cycle() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 2, 0).await;

        daemon.send_block(member.id()).await;
        conn.recv().await.unwrap();
        assert_eq!(member.status().await, MemberStatus::Normal);

        member.block_ok().await.unwrap();
        assert_eq!(member.status().await, MemberStatus::Blocked);
        assert_eq!(daemon.expect_downcall().await.id_and_kind(), (member.id(), DowncallKind::BlockOk));

        assert!(matches!(member.cast(b"x").await, Err(ClientError::Precondition(_))));
        assert!(matches!(member.leave().await, Err(ClientError::Precondition(_))));
        assert_eq!(member.status().await, MemberStatus::Blocked);

        daemon.send_view(member.id(), &crate::client::view::tests::view(3, 1)).await;
        conn.recv().await.unwrap();
        assert_eq!(member.status().await, MemberStatus::Normal);
        assert_eq!(member.nmembers().await, 3);

        member.cast(b"x").await.unwrap();
        assert_eq!(daemon.expect_downcall().await.id_and_kind(), (member.id(), DowncallKind::Cast));
    }

    #[tokio::test]
    async fn test_leave() {
        let (conn, mut daemon) = connect_pair().await;
        let member = joined_member(&conn, &mut daemon, 2, 0).await;

        member.leave().await.unwrap();
        assert_eq!(member.status().await, MemberStatus::Leaving);
        assert_eq!(conn.num_members().await, 1);

        let d = daemon.expect_downcall().await;
        assert_eq!(d.id_and_kind(), (member.id(), DowncallKind::Leave));
        assert!(d.fields.is_empty());

        assert!(matches!(member.leave().await, Err(ClientError::Precondition(_))));
        assert!(matches!(member.cast(b"x").await, Err(ClientError::Precondition(_))));
    }
}
