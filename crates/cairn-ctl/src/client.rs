//! Connection to the tracker.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::Range;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};

use cairn_core::transport::{recv_response, send_command};
use cairn_core::wire::EXIT_SENTINEL;
use cairn_core::Response;

/// Local ports a client picks from when none is given.
pub const RANDOM_PORTS: Range<u16> = 1024..25565;

const BIND_ATTEMPTS: usize = 8;

/// One peer's connection to the tracker. Requests are strictly
/// one-at-a-time: every command gets exactly one response.
pub struct TrackerClient {
    stream: TcpStream,
    local: SocketAddr,
}

impl TrackerClient {
    /// Connect to `server` from `local_port`, or from a random port if
    /// `None`. The local socket is bound with address reuse so a restarted
    /// peer can take its old port (and workspace) back.
    pub async fn connect(server: SocketAddr, local_port: Option<u16>) -> Result<Self> {
        let stream = match local_port {
            Some(port) => connect_from(server, port)
                .await
                .with_context(|| format!("failed to connect to {server} from port {port}"))?,
            None => connect_from_random_port(server).await?,
        };
        let local = stream.local_addr().context("connected socket has no local address")?;
        tracing::debug!(%server, %local, "connected to tracker");
        Ok(Self { stream, local })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Send one command line and wait for its response.
    pub async fn request(&mut self, raw: &str) -> Result<Response> {
        send_command(&mut self.stream, raw)
            .await
            .context("failed to send command")?;
        recv_response(&mut self.stream)
            .await
            .context("failed to read response")
    }

    /// Tell the tracker we are leaving and close the connection.
    pub async fn exit(mut self) -> Result<()> {
        send_command(&mut self.stream, EXIT_SENTINEL)
            .await
            .context("failed to send exit")?;
        self.stream.shutdown().await.ok();
        Ok(())
    }
}

async fn connect_from(server: SocketAddr, port: u16) -> io::Result<TcpStream> {
    let (socket, any) = match server.ip() {
        IpAddr::V4(_) => (TcpSocket::new_v4()?, IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        IpAddr::V6(_) => (TcpSocket::new_v6()?, IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
    };
    socket.set_reuseaddr(true)?;
    socket.bind(SocketAddr::new(any, port))?;
    socket.connect(server).await
}

async fn connect_from_random_port(server: SocketAddr) -> Result<TcpStream> {
    let mut last_err = None;
    for _ in 0..BIND_ATTEMPTS {
        let port = rand::thread_rng().gen_range(RANDOM_PORTS);
        match connect_from(server, port).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "local port taken, picking another");
                last_err = Some(e);
            }
            Err(e) => return Err(e).with_context(|| format!("failed to connect to {server}")),
        }
    }
    let err = last_err
        .map(anyhow::Error::from)
        .unwrap_or_else(|| anyhow::anyhow!("no local port attempted"));
    Err(err.context(format!("no free local port after {BIND_ATTEMPTS} attempts")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::transport::{read_frame, send_response};
    use cairn_core::{envelope, FrameKind};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn request_round_trips_one_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = listener.local_addr().unwrap();

        let tracker = tokio::spawn(async move {
            let (mut stream, remote) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream).await.unwrap().unwrap();
            assert_eq!(frame.kind, FrameKind::Command);
            let line = envelope::unwrap(&frame.payload).unwrap().to_vec();
            send_response(&mut stream, &Response::text(String::from_utf8(line).unwrap()), 1024)
                .await
                .unwrap();

            let exit = read_frame(&mut stream).await.unwrap().unwrap();
            assert_eq!(envelope::unwrap(&exit.payload).unwrap(), b"exit");
            remote
        });

        let mut client = TrackerClient::connect(server, None).await.unwrap();
        assert!(RANDOM_PORTS.contains(&client.local_addr().port()));

        let reply = client.request("/echo hi").await.unwrap();
        assert_eq!(reply, Response::text("/echo hi"));

        let local = client.local_addr();
        client.exit().await.unwrap();
        assert_eq!(tracker.await.unwrap().port(), local.port());
    }
}
