use cairn_core::{ErrorKind, Response};

use crate::*;

#[tokio::test]
async fn findfile_lists_the_peer_that_added_it() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut owner = tracker.connect().await?;
    let mut seeker = tracker.connect().await?;

    let added = owner.request("/addfile song.mp3").await?;
    assert_eq!(
        added,
        Response::text("You have added the file 'song.mp3' to the server tracker.")
    );

    let found = seeker.request("/findfile song.mp3").await?;
    assert_eq!(found, Response::Peers(vec![identity(&owner)]));

    owner.exit().await?;
    seeker.exit().await?;
    tracker.stop().await
}

#[tokio::test]
async fn holders_are_listed_in_connection_order() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut first = tracker.connect().await?;
    let mut second = tracker.connect().await?;
    assert!(eventually(|| tracker.registry.peer_count() == 2).await);

    // Registration order is the reverse of connection order.
    second.request("/addfile shared.iso").await?;
    first.request("/addfile shared.iso").await?;

    let found = second.request("/findfile shared.iso").await?;
    assert_eq!(
        found,
        Response::Peers(vec![identity(&first), identity(&second)])
    );
    tracker.stop().await
}

#[tokio::test]
async fn duplicate_addfile_is_rejected_once_recorded() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut peer = tracker.connect().await?;

    peer.request("/addfile a.txt").await?;
    match peer.request("/addfile a.txt").await? {
        Response::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::Duplicate);
            assert!(message.contains("already added"), "{message}");
        }
        other => panic!("expected duplicate error, got {other:?}"),
    }
    assert_eq!(
        tracker.registry.files_of(&identity(&peer)),
        Some(vec!["a.txt".to_string()])
    );
    tracker.stop().await
}

#[tokio::test]
async fn usage_and_unknown_commands() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut peer = tracker.connect().await?;

    assert_eq!(
        peer.request("/addfile").await?,
        Response::error(ErrorKind::Usage, "SYNTAX: /addfile [File Name]")
    );
    assert_eq!(
        peer.request("/launch rockets").await?,
        Response::error(ErrorKind::Usage, "Invalid command specified.")
    );
    assert_eq!(
        peer.request("addfile a.txt").await?,
        Response::error(ErrorKind::Usage, "Invalid command specified.")
    );
    assert!(matches!(peer.request("/ping").await?, Response::Pong { .. }));
    assert_eq!(
        peer.request("/help").await?,
        Response::text("Available Commands: /ping, /addfile, /findfile, /fetchfile, /help")
    );
    tracker.stop().await
}

#[tokio::test]
async fn concurrent_peers_do_not_lose_registrations() -> Result<()> {
    const PEERS: usize = 24;
    let tracker = Tracker::start_with(SessionLimits::default(), PEERS + 1).await?;

    let mut tasks = Vec::new();
    for i in 0..PEERS {
        let addr = tracker.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = TrackerClient::connect(addr, None).await?;
            let reply = client.request(&format!("/addfile file-{i}.bin")).await?;
            anyhow::ensure!(!reply.is_error(), "addfile failed: {reply:?}");
            Ok::<_, anyhow::Error>(client)
        }));
    }
    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await??);
    }

    let mut probe = tracker.connect().await?;
    for (i, client) in clients.iter().enumerate() {
        let found = probe.request(&format!("/findfile file-{i}.bin")).await?;
        assert_eq!(found, Response::Peers(vec![identity(client)]));
    }
    tracker.stop().await
}
