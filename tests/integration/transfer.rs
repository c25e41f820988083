use cairn_core::{ErrorKind, Response};

use crate::*;

#[tokio::test]
async fn fetchfile_of_missing_file_is_not_found() -> Result<()> {
    let tracker = Tracker::start().await?;
    let mut peer = tracker.connect().await?;

    match peer.request("/fetchfile missing.bin").await? {
        Response::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::NotFound);
            assert!(message.contains("missing.bin"), "{message}");
        }
        other => panic!("expected not found, got {other:?}"),
    }
    // The session is still usable.
    assert!(matches!(peer.request("/ping").await?, Response::Pong { .. }));
    tracker.stop().await
}

#[tokio::test]
async fn large_file_streams_intact() -> Result<()> {
    let tracker = Tracker::start_with(
        SessionLimits {
            idle_timeout: None,
            block_size: 4096,
        },
        4,
    )
    .await?;
    // Several blocks and well past a single read buffer.
    let data: Vec<u8> = (0..3_000_017u32).map(|i| (i * 31 % 251) as u8).collect();
    tracker.store.put("video.bin", &data)?;

    let mut peer = tracker.connect().await?;
    match peer.request("/fetchfile video.bin").await? {
        Response::File { name, data: got } => {
            assert_eq!(name, "video.bin");
            assert_eq!(got.len(), data.len());
            assert!(got[..] == data[..], "file contents differ");
        }
        other => panic!("expected file, got {other:?}"),
    }
    tracker.stop().await
}

#[tokio::test]
async fn empty_file_is_served() -> Result<()> {
    let tracker = Tracker::start().await?;
    tracker.store.put("empty.txt", b"")?;

    let mut peer = tracker.connect().await?;
    match peer.request("/fetchfile empty.txt").await? {
        Response::File { name, data } => {
            assert_eq!(name, "empty.txt");
            assert!(data.is_empty());
        }
        other => panic!("expected file, got {other:?}"),
    }
    tracker.stop().await
}

#[tokio::test]
async fn fetched_file_round_trips_through_peer_workspace() -> Result<()> {
    use cairn_ctl::PeerWorkspace;

    let tracker = Tracker::start().await?;
    let data: Vec<u8> = (0..123_456u32).map(|i| (i % 256) as u8).collect();
    tracker.store.put("album.zip", &data)?;

    let mut peer = tracker.connect().await?;
    let scratch = tempfile::tempdir()?;
    let workspace = PeerWorkspace::open(scratch.path(), peer.local_addr().port(), 10_000)?;

    let Response::File { name, data: got } = peer.request("/fetchfile album.zip").await? else {
        panic!("expected a file response");
    };
    let saved = workspace.save(&name, &got)?;

    // Split, lose the assembled copy, rebuild from chunks.
    let set = workspace.split("album.zip")?;
    assert_eq!(set.chunks.len(), 13);
    std::fs::remove_file(&saved)?;
    workspace.build("album.zip")?;
    assert_eq!(std::fs::read(&saved)?, data);

    tracker.stop().await
}
