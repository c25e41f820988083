//! Framed transport over any async byte stream.
//!
//! One frame per logical message. File responses stream as
//! `FileBegin` → `FileBlock`* → `FileEnd`, so file size is bounded by the
//! announced `u64` length rather than a single read buffer.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::{AsBytes, FromBytes};

use crate::envelope;
use crate::response::{decode_file_begin, encode_file_begin, Response};
use crate::wire::{Frame, FrameHeader, FrameKind, WireError, FRAME_HEADER_LEN, MAX_FRAME_PAYLOAD};

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary. An end
/// of stream inside a frame is [`WireError::ConnectionClosed`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = reader.read(&mut raw[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(WireError::ConnectionClosed);
        }
        filled += n;
    }

    let header = FrameHeader::read_from(&raw[..]).ok_or(WireError::ConnectionClosed)?;
    let length = header.validate()?;
    let kind = FrameKind::try_from(header.kind)?;

    let mut payload = BytesMut::zeroed(length);
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;

    Ok(Some(Frame {
        kind,
        payload: payload.freeze(),
    }))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, kind: FrameKind, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }
    let header = FrameHeader::new(kind, payload.len() as u32);
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Wrap `raw_command` in an integrity envelope and send it.
pub async fn send_command<W>(writer: &mut W, raw_command: &str) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let framed = envelope::wrap(raw_command.as_bytes());
    write_frame(writer, FrameKind::Command, &framed).await
}

/// Send a response. File contents are split into blocks of at most
/// `block_size` bytes (clamped to the frame payload limit).
pub async fn send_response<W>(
    writer: &mut W,
    response: &Response,
    block_size: usize,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    match response {
        Response::File { name, data } => {
            let block_size = block_size.clamp(1, MAX_FRAME_PAYLOAD);
            write_frame(
                writer,
                FrameKind::FileBegin,
                &encode_file_begin(name, data.len() as u64),
            )
            .await?;
            for block in data.chunks(block_size) {
                write_frame(writer, FrameKind::FileBlock, block).await?;
            }
            write_frame(writer, FrameKind::FileEnd, &[]).await
        }
        other => {
            // Every non-file variant has a single-frame encoding.
            let frame = other
                .to_frame()
                .ok_or(WireError::UnexpectedFrame(FrameKind::FileBegin))?;
            write_frame(writer, frame.kind, &frame.payload).await
        }
    }
}

/// Receive one complete response, accumulating a streamed file if needed.
///
/// A file whose received length differs from the announced length is
/// rejected; no partial data is returned.
pub async fn recv_response<R>(reader: &mut R) -> Result<Response, WireError>
where
    R: AsyncRead + Unpin,
{
    let frame = read_frame(reader).await?.ok_or(WireError::ConnectionClosed)?;
    if frame.kind != FrameKind::FileBegin {
        return Response::from_frame(&frame);
    }

    let (name, expected) = decode_file_begin(&frame.payload)?;
    let mut data = BytesMut::with_capacity(expected.min(MAX_FRAME_PAYLOAD as u64) as usize);
    loop {
        let frame = read_frame(reader).await?.ok_or(WireError::ConnectionClosed)?;
        match frame.kind {
            FrameKind::FileBlock => {
                if data.len() as u64 + frame.payload.len() as u64 > expected {
                    return Err(WireError::TransferLength {
                        expected,
                        received: data.len() as u64 + frame.payload.len() as u64,
                    });
                }
                data.extend_from_slice(&frame.payload);
            }
            FrameKind::FileEnd => break,
            other => return Err(WireError::UnexpectedFrame(other)),
        }
    }

    if data.len() as u64 != expected {
        return Err(WireError::TransferLength {
            expected,
            received: data.len() as u64,
        });
    }

    Ok(Response::File {
        name,
        data: Bytes::from(data),
    })
}

fn eof_as_closed(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::ConnectionClosed
    } else {
        WireError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ErrorKind;

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_header_is_connection_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[FrameKind::Text as u8, 0x01, 0]).await.unwrap();
        drop(client);
        assert!(matches!(
            read_frame(&mut server).await,
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn eof_inside_payload_is_connection_closed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let header = FrameHeader::new(FrameKind::Text, 10);
        client.write_all(header.as_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        assert!(matches!(
            read_frame(&mut server).await,
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn command_frame_carries_verifiable_envelope() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        send_command(&mut client, "/findfile song.mp3").await.unwrap();
        let frame = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(frame.kind, FrameKind::Command);
        assert_eq!(envelope::unwrap(&frame.payload).unwrap(), b"/findfile song.mp3");
    }

    #[tokio::test]
    async fn streamed_file_spans_many_blocks() {
        let (mut client, mut server) = tokio::io::duplex(1 << 16);
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let response = Response::File {
            name: "blob.bin".into(),
            data: Bytes::from(data.clone()),
        };

        let writer = tokio::spawn(async move {
            send_response(&mut server, &response, 512).await.unwrap();
        });
        let received = recv_response(&mut client).await.unwrap();
        writer.await.unwrap();

        match received {
            Response::File { name, data: got } => {
                assert_eq!(name, "blob.bin");
                assert_eq!(&got[..], &data[..]);
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_file_streams_as_begin_and_end() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let response = Response::File {
            name: "empty".into(),
            data: Bytes::new(),
        };
        send_response(&mut server, &response, 16).await.unwrap();
        assert_eq!(recv_response(&mut client).await.unwrap(), response);
    }

    #[tokio::test]
    async fn short_transfer_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut server, FrameKind::FileBegin, &encode_file_begin("x", 10))
            .await
            .unwrap();
        write_frame(&mut server, FrameKind::FileBlock, b"12345").await.unwrap();
        write_frame(&mut server, FrameKind::FileEnd, &[]).await.unwrap();
        assert!(matches!(
            recv_response(&mut client).await,
            Err(WireError::TransferLength {
                expected: 10,
                received: 5
            })
        ));
    }

    #[tokio::test]
    async fn error_response_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let response = Response::error(ErrorKind::NotFound, "nope");
        send_response(&mut server, &response, 16).await.unwrap();
        assert_eq!(recv_response(&mut client).await.unwrap(), response);
    }
}
