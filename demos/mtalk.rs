//! Multi-person talk: every line typed on stdin is sent to all members of the group "Mtalk", and
//!  everything they send is printed. End of input leaves the group.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use clap_derive::Parser;
use outboard_client::{ClientConfig, ClientError, Connection, JoinOptions, Member, Rank, UpcallHandler, View};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn, Level};

#[derive(Parser)]
struct Args {
    /// defaults to the local machine
    #[clap(long)]
    host: Option<String>,

    #[clap(long, default_value_t = 5002)]
    port: u16,

    #[clap(long, default_value = "Mtalk")]
    group: String,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

struct TalkHandler {
    /// signalled on every view, so the talker knows the member is operational
    view_installed: Arc<Notify>,
}

#[async_trait]
impl UpcallHandler for TalkHandler {
    async fn on_view(&self, _member: &Member, view: Arc<View>) -> anyhow::Result<()> {
        println!("*** view {} - {} members, I am #{} ({})", view.view_id, view.nmembers, view.rank, view.endpt);
        for (rank, endpt) in view.endpts.iter().enumerate() {
            println!("***   {}: {}", rank, endpt);
        }
        self.view_installed.notify_one();
        Ok(())
    }

    async fn on_cast(&self, _member: &Member, origin: Rank, payload: Bytes) -> anyhow::Result<()> {
        println!("[{}] {}", origin, String::from_utf8_lossy(&payload));
        Ok(())
    }

    async fn on_send(&self, _member: &Member, origin: Rank, payload: Bytes) -> anyhow::Result<()> {
        println!("[{} to me] {}", origin, String::from_utf8_lossy(&payload));
        Ok(())
    }

    async fn on_block(&self, member: &Member) -> anyhow::Result<()> {
        member.block_ok().await?;
        Ok(())
    }

    async fn on_exit(&self, _member: &Member) -> anyhow::Result<()> {
        println!("*** left the group");
        Ok(())
    }
}

async fn talk(member: Member, view_installed: Arc<Notify>) -> anyhow::Result<()> {
    view_installed.notified().await;
    info!("joined group - reading stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match member.cast(line.as_bytes()).await {
            Ok(()) => {}
            Err(ClientError::Precondition(msg)) => warn!("message not sent: {}", msg),
            Err(e) => return Err(e.into()),
        }
    }

    info!("end of input - leaving");
    match member.leave().await {
        Ok(()) => Ok(()),
        Err(ClientError::Precondition(msg)) => {
            warn!("nothing to leave: {}", msg);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let config = ClientConfig::new(args.host.as_deref(), args.port);
    let conn = Connection::connect(config).await
        .context("connecting to the daemon")?;

    let member = conn.join(JoinOptions::new(&args.group), None).await?;
    info!("joining group {} as member {}", args.group, member.id());

    let view_installed = Arc::new(Notify::new());
    let talker = tokio::spawn(talk(member, view_installed.clone()));

    conn.run_upcall_loop(&TalkHandler { view_installed }).await?;
    talker.await??;
    Ok(())
}
