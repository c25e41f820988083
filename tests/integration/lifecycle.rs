use std::time::Duration;

use cairn_core::transport::{recv_response, send_command, write_frame};
use cairn_core::{envelope, ErrorKind, FrameKind, Response};
use tokio::net::TcpStream;

use crate::*;

#[tokio::test]
async fn exit_removes_the_peer_from_the_registry() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut leaver = tracker.connect().await?;
    let mut stayer = tracker.connect().await?;
    let gone = identity(&leaver);

    leaver.request("/addfile song.mp3").await?;
    stayer.request("/addfile song.mp3").await?;
    leaver.exit().await?;

    assert!(eventually(|| !tracker.registry.contains_peer(&gone)).await);
    assert_eq!(
        stayer.request("/findfile song.mp3").await?,
        Response::Peers(vec![identity(&stayer)])
    );
    tracker.stop().await
}

#[tokio::test]
async fn abrupt_disconnect_releases_only_that_peer() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut dropped = tracker.connect().await?;
    let mut kept = tracker.connect().await?;
    let dropped_id = identity(&dropped);

    dropped.request("/addfile a.bin").await?;
    kept.request("/addfile b.bin").await?;
    drop(dropped);

    assert!(eventually(|| !tracker.registry.contains_peer(&dropped_id)).await);
    assert!(eventually(|| tracker.sessions.len() == 1).await);
    assert_eq!(
        kept.request("/findfile b.bin").await?,
        Response::Peers(vec![identity(&kept)])
    );
    tracker.stop().await
}

#[tokio::test]
async fn tampered_command_is_discarded_and_session_survives() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut stream = TcpStream::connect(tracker.addr).await?;
    let me = PeerIdentity::from(stream.local_addr()?);

    let mut framed = envelope::wrap(b"/addfile secret.txt");
    framed[0] = if framed[0] == b'0' { b'1' } else { b'0' };
    write_frame(&mut stream, FrameKind::Command, &framed).await?;

    match recv_response(&mut stream).await? {
        Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::Protocol),
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert!(tracker.registry.find_peers_with_file("secret.txt").is_empty());

    // Same connection, intact envelope.
    send_command(&mut stream, "/addfile secret.txt").await?;
    assert!(!recv_response(&mut stream).await?.is_error());
    assert_eq!(tracker.registry.find_peers_with_file("secret.txt"), vec![me]);
    tracker.stop().await
}

#[tokio::test]
async fn shutdown_closes_sessions_and_releases_entries() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut peers = Vec::new();
    for i in 0..4 {
        let mut peer = tracker.connect().await?;
        peer.request(&format!("/addfile part-{i}")).await?;
        peers.push(peer);
    }
    assert_eq!(tracker.registry.peer_count(), 4);

    let registry = tracker.registry.clone();
    let sessions = tracker.sessions.clone();
    tracker.stop().await?;

    assert_eq!(registry.peer_count(), 0);
    assert!(sessions.is_empty());
    // The tracker closed its side: the next request fails at the transport.
    assert!(peers[0].request("/ping").await.is_err());
    Ok(())
}

#[tokio::test]
async fn idle_sessions_are_closed() -> Result<()> {
    let tracker = Tracker::start_with(
        SessionLimits {
            idle_timeout: Some(Duration::from_millis(200)),
            block_size: 1024,
        },
        4,
    )
    .await?;
    let mut peer = tracker.connect().await?;
    let id = identity(&peer);
    peer.request("/addfile a.txt").await?;

    assert!(eventually(|| !tracker.registry.contains_peer(&id)).await);
    tracker.stop().await
}
