//! Minecraft Java "Server List Ping" status query.
//!
//! Frames are `[length: VarInt][packet id: VarInt][payload]`. VarInts are
//! LEB128, so the `unsigned-varint` codec covers every value we send or
//! expect to receive.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

use super::{lookup_srv, QueryError, ServerStatus, StatusClient};

/// Port used when the endpoint names none and has no SRV record.
pub const DEFAULT_PORT: u16 = 25565;

/// Protocol version announced in the handshake (1.8). Servers answer
/// status requests regardless of the version they run.
const PROTOCOL_VERSION: u32 = 47;

/// Handshake "next state" asking for the status exchange.
const NEXT_STATE_STATUS: u32 = 1;

const PACKET_ID_STATUS: u32 = 0x00;

/// Upper bound on a status frame; real responses with a 64x64 favicon stay far below this.
const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

/// Status client speaking Server List Ping over TCP.
#[derive(Debug, Clone)]
pub struct SlpClient {
    timeout: Duration,
    resolver: Option<SocketAddr>,
}

impl SlpClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            resolver: None,
        }
    }

    /// Resolve `_minecraft._tcp` SRV records through `resolver` for endpoints without a port.
    pub fn with_resolver(mut self, resolver: Option<SocketAddr>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Host and port to connect to for `endpoint`.
    ///
    /// An explicit port is used as is. Otherwise the SRV record wins when
    /// present, and any lookup failure falls back to the default port.
    async fn resolve(&self, endpoint: &str) -> Result<(String, u16), QueryError> {
        let (host, port) = parse_endpoint(endpoint)?;
        if let Some(port) = port {
            return Ok((host.to_string(), port));
        }

        let Some(resolver) = self.resolver else {
            return Ok((host.to_string(), DEFAULT_PORT));
        };

        match lookup_srv(resolver, host, self.timeout / 2).await {
            Ok(Some(target)) => {
                tracing::debug!("SRV: {} -> {}:{}", host, target.host, target.port);
                Ok((target.host, target.port))
            }
            Ok(None) => Ok((host.to_string(), DEFAULT_PORT)),
            Err(e) => {
                tracing::debug!("SRV lookup for {} failed, using default port: {}", host, e);
                Ok((host.to_string(), DEFAULT_PORT))
            }
        }
    }

    async fn exchange(&self, host: &str, port: u16) -> Result<ServerStatus, QueryError> {
        let mut stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        let mut out = build_handshake(host, port);
        out.extend_from_slice(&build_status_request());
        stream.write_all(&out).await?;
        stream.flush().await?;

        let body = read_frame(&mut stream).await?;
        let json = parse_status_frame(&body)?;
        parse_status_json(json)
    }
}

#[async_trait]
impl StatusClient for SlpClient {
    async fn status(&self, endpoint: &str) -> Result<ServerStatus, QueryError> {
        let (host, port) = self.resolve(endpoint).await?;

        match tokio::time::timeout(self.timeout, self.exchange(&host, port)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(self.timeout)),
        }
    }
}

/// Split `host[:port]` into its parts; the port is `None` when not given.
pub fn parse_endpoint(endpoint: &str) -> Result<(&str, Option<u16>), QueryError> {
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| QueryError::InvalidAddress(endpoint.to_string()))?;
            (host, Some(port))
        }
        None => (endpoint, None),
    };

    if host.is_empty() || port == Some(0) {
        return Err(QueryError::InvalidAddress(endpoint.to_string()));
    }

    Ok((host, port))
}

fn put_varint(buf: &mut Vec<u8>, value: u32) {
    let mut tmp = varint_encode::u32_buffer();
    buf.extend_from_slice(varint_encode::u32(value, &mut tmp));
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_varint(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

/// Prefix a packet body with its length.
fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    put_varint(&mut out, body.len() as u32);
    out.extend_from_slice(body);
    out
}

/// Build the handshake packet switching the connection to the status state.
fn build_handshake(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 16);
    put_varint(&mut body, PACKET_ID_STATUS);
    put_varint(&mut body, PROTOCOL_VERSION);
    put_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    put_varint(&mut body, NEXT_STATE_STATUS);
    frame(&body)
}

/// Build the empty status request packet.
fn build_status_request() -> Vec<u8> {
    frame(&[PACKET_ID_STATUS as u8])
}

/// Read one VarInt byte by byte from the stream.
async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, QueryError> {
    let mut buf = [0u8; 5];
    for i in 0..buf.len() {
        let b = reader.read_u8().await?;
        buf[i] = b;
        if varint_decode::is_last(b) {
            let (value, _) = varint_decode::u32(&buf[..=i])
                .map_err(|e| QueryError::Protocol(format!("bad VarInt: {}", e)))?;
            return Ok(value);
        }
    }
    Err(QueryError::Protocol("VarInt longer than 5 bytes".to_string()))
}

/// Read a length-prefixed frame and return its body (packet id included).
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, QueryError> {
    let len = read_varint(reader).await?;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(QueryError::Protocol(format!("unexpected frame length {}", len)));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Extract the JSON string from a status response body.
fn parse_status_frame(body: &[u8]) -> Result<&str, QueryError> {
    let (packet_id, rest) = varint_decode::u32(body)
        .map_err(|e| QueryError::Protocol(format!("bad packet id: {}", e)))?;
    if packet_id != PACKET_ID_STATUS {
        return Err(QueryError::Protocol(format!(
            "unexpected packet id {:#04x}",
            packet_id
        )));
    }

    let (len, rest) = varint_decode::u32(rest)
        .map_err(|e| QueryError::Protocol(format!("bad string length: {}", e)))?;
    let json = rest
        .get(..len as usize)
        .ok_or_else(|| QueryError::Protocol("status string truncated".to_string()))?;

    std::str::from_utf8(json).map_err(|e| QueryError::Protocol(format!("status is not UTF-8: {}", e)))
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    players: PlayersInfo,
    #[serde(default)]
    version: Option<VersionInfo>,
    #[serde(default)]
    favicon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayersInfo {
    online: u32,
    #[serde(default)]
    max: u32,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    name: String,
}

fn parse_status_json(json: &str) -> Result<ServerStatus, QueryError> {
    let response: StatusResponse = serde_json::from_str(json)?;
    Ok(ServerStatus {
        online_players: response.players.online,
        max_players: response.players.max,
        version: response.version.map(|v| v.name),
        favicon: response.favicon.filter(|f| !f.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::srv::fake_resolver;
    use tokio::net::{TcpListener, UdpSocket};
    use tokio::task::JoinHandle;

    fn status_frame(packet_id: u32, json: &str) -> Vec<u8> {
        let mut body = Vec::new();
        put_varint(&mut body, packet_id);
        put_string(&mut body, json);
        frame(&body)
    }

    /// Accept one connection, consume handshake and request, answer with `reply`.
    /// The task yields the handshake body it received.
    async fn fake_server(reply: Vec<u8>) -> (u16, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let handshake = read_frame(&mut socket).await.unwrap();
            assert_eq!(handshake[0], 0x00);
            let request = read_frame(&mut socket).await.unwrap();
            assert_eq!(request, vec![0x00]);
            socket.write_all(&reply).await.unwrap();
            handshake
        });

        (port, handle)
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("mc.example.net").unwrap(), ("mc.example.net", None));
        assert_eq!(parse_endpoint("mc.example.net:25570").unwrap(), ("mc.example.net", Some(25570)));
        assert!(parse_endpoint("mc.example.net:notaport").is_err());
        assert!(parse_endpoint("mc.example.net:0").is_err());
        assert!(parse_endpoint(":25565").is_err());
    }

    #[test]
    fn test_build_handshake() {
        let packet = build_handshake("localhost", 25565);
        // length, id, version 47, string len 9, "localhost", port, next state
        assert_eq!(packet[0] as usize, packet.len() - 1);
        assert_eq!(&packet[1..4], &[0x00, 47, 9]);
        assert_eq!(&packet[4..13], b"localhost");
        assert_eq!(&packet[13..15], &25565u16.to_be_bytes());
        assert_eq!(packet[15], 1);
        assert_eq!(build_status_request(), vec![0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_read_varint_multi_byte() {
        let mut data: &[u8] = &[0xdd, 0xc7, 0x01];
        assert_eq!(read_varint(&mut data).await.unwrap(), 25565);

        let mut too_long: &[u8] = &[0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(matches!(read_varint(&mut too_long).await, Err(QueryError::Protocol(_))));
    }

    #[test]
    fn test_parse_status_json() {
        let status = parse_status_json(
            r#"{"version":{"name":"Paper 1.20.4","protocol":765},
                "players":{"max":500,"online":42,"sample":[]},
                "description":{"text":"hello"},
                "favicon":"data:image/png;base64,aGk="}"#,
        )
        .unwrap();
        assert_eq!(status.online_players, 42);
        assert_eq!(status.max_players, 500);
        assert_eq!(status.version.as_deref(), Some("Paper 1.20.4"));
        assert_eq!(status.favicon.as_deref(), Some("data:image/png;base64,aGk="));

        assert!(matches!(parse_status_json(r#"{"description":"x"}"#), Err(QueryError::Json(_))));
    }

    #[tokio::test]
    async fn test_status_against_fake_server() {
        let json = r#"{"players":{"max":100,"online":12},"favicon":"data:image/png;base64,aGk="}"#;
        let (port, _) = fake_server(status_frame(0x00, json)).await;

        let client = SlpClient::new(Duration::from_secs(2));
        let status = client.status(&format!("127.0.0.1:{}", port)).await.unwrap();
        assert_eq!(status.online_players, 12);
        assert_eq!(status.max_players, 100);
        assert!(status.favicon.is_some());
    }

    #[tokio::test]
    async fn test_wrong_packet_id_is_protocol_error() {
        let (port, _) = fake_server(status_frame(0x01, "{}")).await;

        let client = SlpClient::new(Duration::from_secs(2));
        let result = client.status(&format!("127.0.0.1:{}", port)).await;
        assert!(matches!(result, Err(QueryError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = SlpClient::new(Duration::from_millis(200));
        let result = client.status(&format!("127.0.0.1:{}", port)).await;
        assert!(matches!(result, Err(QueryError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = SlpClient::new(Duration::from_secs(2));
        let result = client.status(&format!("127.0.0.1:{}", port)).await;
        assert!(matches!(result, Err(QueryError::Io(_))));
    }

    #[tokio::test]
    async fn test_srv_record_redirects_connection() {
        let json = r#"{"players":{"max":100,"online":33}}"#;
        let (port, server) = fake_server(status_frame(0x00, json)).await;
        let resolver = fake_resolver(0, vec![(0, 5, port, "127.0.0.1")]).await;

        let client = SlpClient::new(Duration::from_secs(2)).with_resolver(Some(resolver));
        let status = client.status("mc.example").await.unwrap();
        assert_eq!(status.online_players, 33);

        // The handshake names the SRV target, not the configured host
        let handshake = server.await.unwrap();
        assert_eq!(handshake[2] as usize, "127.0.0.1".len());
        assert_eq!(&handshake[3..12], b"127.0.0.1");
        assert_eq!(&handshake[12..14], &port.to_be_bytes());
    }

    #[tokio::test]
    async fn test_missing_srv_falls_back_to_default_port() {
        let resolver = fake_resolver(3, vec![]).await;
        let client = SlpClient::new(Duration::from_secs(2)).with_resolver(Some(resolver));

        let target = client.resolve("mc.example").await.unwrap();
        assert_eq!(target, ("mc.example".to_string(), DEFAULT_PORT));
    }

    #[tokio::test]
    async fn test_silent_resolver_falls_back_to_default_port() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = SlpClient::new(Duration::from_millis(200))
            .with_resolver(Some(silent.local_addr().unwrap()));

        let target = client.resolve("mc.example").await.unwrap();
        assert_eq!(target, ("mc.example".to_string(), DEFAULT_PORT));
    }

    #[tokio::test]
    async fn test_explicit_port_skips_srv() {
        let resolver = fake_resolver(0, vec![(0, 5, 40000, "elsewhere.example")]).await;
        let client = SlpClient::new(Duration::from_secs(2)).with_resolver(Some(resolver));

        let target = client.resolve("mc.example:25570").await.unwrap();
        assert_eq!(target, ("mc.example".to_string(), 25570));

        let no_resolver = SlpClient::new(Duration::from_secs(2));
        assert_eq!(
            no_resolver.resolve("mc.example").await.unwrap(),
            ("mc.example".to_string(), DEFAULT_PORT)
        );
    }
}
