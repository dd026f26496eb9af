//! A scripted stand-in for the group communication daemon. Tests drive it explicitly: it sends
//!  upcalls when told to and hands out whatever downcalls arrived, without any group logic.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::client::member::{Member, MemberId, Rank};
use crate::client::view::tests::view;
use crate::client::view::View;
use crate::wire::codec;
use crate::wire::message_kind::{DowncallKind, UpcallKind};
use crate::{ClientConfig, Connection, JoinOptions, UpcallEvent};

pub struct FakeDaemon {
    listener: TcpListener,
}

impl FakeDaemon {
    pub async fn start() -> FakeDaemon {
        FakeDaemon {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(None, self.listener.local_addr().unwrap().port())
    }

    pub async fn accept(&self) -> DaemonSide {
        let (stream, _) = self.listener.accept().await.unwrap();
        DaemonSide { stream }
    }
}

/// A downcall as received by the daemon
#[derive(Debug)]
pub struct Downcall {
    pub id: MemberId,
    pub kind: DowncallKind,
    /// header fields following member id and tag
    pub fields: Vec<u8>,
    pub bulk: Vec<u8>,
}

impl Downcall {
    pub fn id_and_kind(&self) -> (MemberId, DowncallKind) {
        (self.id, self.kind)
    }
}

/// The daemon's end of a single client connection
pub struct DaemonSide {
    stream: TcpStream,
}

impl DaemonSide {
    pub async fn read_raw(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    pub async fn read_frame(&mut self) -> (Vec<u8>, Vec<u8>) {
        let header_len = self.stream.read_u32().await.unwrap() as usize;
        let bulk_len = self.stream.read_u32().await.unwrap() as usize;
        let header = self.read_raw(header_len).await;
        let bulk = self.read_raw(bulk_len).await;
        (header, bulk)
    }

    pub async fn expect_downcall(&mut self) -> Downcall {
        let (header, bulk) = self.read_frame().await;
        let mut buf: &[u8] = &header;
        let id = MemberId(codec::read_int(&mut buf).unwrap());
        let kind = DowncallKind::try_from(codec::read_int(&mut buf).unwrap()).unwrap();
        Downcall {
            id,
            kind,
            fields: buf.to_vec(),
            bulk,
        }
    }

    /// asserts that the client closed its sending direction
    pub async fn expect_eof(&mut self) {
        let mut buf = [0u8; 1];
        assert_eq!(self.stream.read(&mut buf).await.unwrap(), 0);
    }

    pub async fn send_frame(&mut self, header: &[u8], bulk: &[u8]) {
        self.stream.write_u32(header.len() as u32).await.unwrap();
        self.stream.write_u32(bulk.len() as u32).await.unwrap();
        self.stream.write_all(header).await.unwrap();
        self.stream.write_all(bulk).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    fn upcall_header(id: MemberId, kind: UpcallKind) -> BytesMut {
        let mut header = BytesMut::new();
        codec::write_int(&mut header, id.0);
        codec::write_int(&mut header, kind.into());
        header
    }

    pub async fn send_view(&mut self, id: MemberId, view: &View) {
        self.send_view_with_count(id, view.nmembers as i32, view).await;
    }

    /// sends a VIEW whose header member count may differ from the view body
    pub async fn send_view_with_count(&mut self, id: MemberId, nmembers: i32, view: &View) {
        let mut header = Self::upcall_header(id, UpcallKind::View);
        codec::write_int(&mut header, nmembers);
        view.ser(&mut header);
        self.send_frame(&header, b"").await;
    }

    pub async fn send_cast(&mut self, id: MemberId, origin: Rank, msg: &[u8]) {
        let mut header = Self::upcall_header(id, UpcallKind::Cast);
        codec::write_int(&mut header, origin);
        self.send_frame(&header, msg).await;
    }

    pub async fn send_send(&mut self, id: MemberId, origin: Rank, msg: &[u8]) {
        let mut header = Self::upcall_header(id, UpcallKind::Send);
        codec::write_int(&mut header, origin);
        self.send_frame(&header, msg).await;
    }

    pub async fn send_block(&mut self, id: MemberId) {
        let header = Self::upcall_header(id, UpcallKind::Block);
        self.send_frame(&header, b"").await;
    }

    pub async fn send_exit(&mut self, id: MemberId) {
        let header = Self::upcall_header(id, UpcallKind::Exit);
        self.send_frame(&header, b"").await;
    }
}

pub async fn connect_pair() -> (Connection, DaemonSide) {
    let daemon = FakeDaemon::start().await;
    let stream = TcpStream::connect(daemon.listener.local_addr().unwrap()).await.unwrap();
    let daemon_side = daemon.accept().await;
    (Connection::from_test_stream(stream, daemon.config()), daemon_side)
}

/// Joins group "G" and installs a first view, leaving the member in status Normal
pub async fn joined_member(conn: &Connection, daemon: &mut DaemonSide, nmembers: usize, rank: Rank) -> Member {
    let member = conn.join(JoinOptions::new("G"), None).await.unwrap();
    assert_eq!(daemon.expect_downcall().await.id_and_kind(), (member.id(), DowncallKind::Join));

    daemon.send_view(member.id(), &view(nmembers, rank)).await;
    match conn.recv().await.unwrap() {
        UpcallEvent::View { member: m, .. } => assert_eq!(m, member),
        other => panic!("expected a view, got {:?}", other),
    }
    member
}
