//! Shared utilities for integration testing: an AJP web-server stand-in.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

use ajp13_server::config::AjpConfig;
use ajp13_server::cycle::{CycleContext, Handler, RequestCycle};
use ajp13_server::lifecycle::Shutdown;
use ajp13_server::net::{AjpServer, ConnectionError, ConnectionId, Listener};
use ajp13_server::protocol::{
    attr, kind, prefix, PacketBuilder, HEADER_LEN, INBOUND_MAGIC, OUTBOUND_MAGIC, REQUEST_HEADERS,
    RESPONSE_HEADERS, TERMINATOR, WELL_KNOWN_HEADER,
};

/// Builds a Forward Request the way mod_jk would.
pub struct ForwardRequest {
    method: u8,
    uri: String,
    remote_addr: String,
    secure: bool,
    headers: Vec<(String, String)>,
    attributes: Vec<(u8, String)>,
    req_attributes: Vec<(String, String)>,
}

impl ForwardRequest {
    pub fn new(method: u8, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            remote_addr: "127.0.0.1".to_string(),
            secure: false,
            headers: Vec::new(),
            attributes: Vec::new(),
            req_attributes: Vec::new(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(2, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(4, uri)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn attribute(mut self, code: u8, value: &str) -> Self {
        self.attributes.push((code, value.to_string()));
        self
    }

    pub fn req_attribute(mut self, name: &str, value: &str) -> Self {
        self.req_attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn remote_addr(mut self, addr: &str) -> Self {
        self.remote_addr = addr.to_string();
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut b = PacketBuilder::with_magic(INBOUND_MAGIC);
        b.put_byte(prefix::FORWARD_REQUEST)
            .put_byte(self.method)
            .put_string("HTTP/1.1")
            .put_string(&self.uri)
            .put_string(&self.remote_addr)
            .put_absent_string()
            .put_string("localhost")
            .put_int16(80)
            .put_bool(self.secure)
            .put_int16(self.headers.len() as u16);
        for (name, value) in &self.headers {
            match REQUEST_HEADERS.iter().position(|h| h.eq_ignore_ascii_case(name)) {
                Some(i) => {
                    b.put_byte(WELL_KNOWN_HEADER).put_byte(i as u8 + 1);
                }
                None => {
                    b.put_string(name);
                }
            }
            b.put_string(value);
        }
        for (code, value) in &self.attributes {
            b.put_byte(*code).put_string(value);
        }
        for (name, value) in &self.req_attributes {
            b.put_byte(attr::REQ_ATTRIBUTE).put_string(name).put_string(value);
        }
        b.put_byte(TERMINATOR);
        b.finish()
    }
}

/// A body chunk packet as the web server sends it; empty data is the terminator.
pub fn body_chunk(data: &[u8]) -> Bytes {
    let mut b = PacketBuilder::with_magic(INBOUND_MAGIC);
    if !data.is_empty() {
        b.put_int16(data.len() as u16).put_bytes(data);
    }
    b.finish()
}

pub fn control(code: u8) -> Bytes {
    let mut b = PacketBuilder::with_magic(INBOUND_MAGIC);
    b.put_byte(code);
    b.finish()
}

/// One container → web server packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Headers {
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
    },
    Body(Vec<u8>),
    End { reuse: bool },
    GetBody(u16),
    CPong,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            Reply::Headers { headers, .. } => headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn header_values(&self, name: &str) -> Vec<String> {
        match self {
            Reply::Headers { headers, .. } => headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn take_u16(payload: &[u8], pos: &mut usize) -> u16 {
    let v = u16::from_be_bytes([payload[*pos], payload[*pos + 1]]);
    *pos += 2;
    v
}

fn take_string(payload: &[u8], pos: &mut usize) -> String {
    let len = take_u16(payload, pos) as usize;
    let s = String::from_utf8(payload[*pos..*pos + len].to_vec()).unwrap();
    assert_eq!(payload[*pos + len], 0, "string terminator");
    *pos += len + 1;
    s
}

/// Read and decode the next outbound packet, failing after two seconds.
pub async fn read_reply<R: AsyncRead + Unpin>(reader: &mut R) -> Reply {
    tokio::time::timeout(Duration::from_secs(2), read_reply_inner(reader))
        .await
        .expect("no reply within 2s")
}

async fn read_reply_inner<R: AsyncRead + Unpin>(reader: &mut R) -> Reply {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.unwrap();
    assert_eq!(header[..2], OUTBOUND_MAGIC);
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.unwrap();

    let mut pos = 1;
    match payload[0] {
        kind::SEND_HEADERS => {
            let status = take_u16(&payload, &mut pos);
            let reason = take_string(&payload, &mut pos);
            let count = take_u16(&payload, &mut pos);
            let mut headers = Vec::new();
            for _ in 0..count {
                let name = if payload[pos] == WELL_KNOWN_HEADER {
                    let code = payload[pos + 1];
                    pos += 2;
                    RESPONSE_HEADERS[code as usize - 1].to_string()
                } else {
                    take_string(&payload, &mut pos)
                };
                let value = take_string(&payload, &mut pos);
                headers.push((name, value));
            }
            Reply::Headers {
                status,
                reason,
                headers,
            }
        }
        kind::SEND_BODY_CHUNK => {
            let n = take_u16(&payload, &mut pos) as usize;
            assert_eq!(payload.len(), 1 + 2 + n + 1);
            Reply::Body(payload[pos..pos + n].to_vec())
        }
        kind::END_RESPONSE => Reply::End { reuse: payload[1] != 0 },
        kind::GET_BODY_CHUNK => Reply::GetBody(take_u16(&payload, &mut pos)),
        kind::CPONG => Reply::CPong,
        other => panic!("unexpected packet kind {}", other),
    }
}

/// Read packets up to and including `END_RESPONSE`.
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<Reply> {
    let mut replies = Vec::new();
    loop {
        let reply = read_reply(reader).await;
        let done = matches!(reply, Reply::End { .. });
        replies.push(reply);
        if done {
            return replies;
        }
    }
}

/// Concatenated body of a response.
pub fn body_of(replies: &[Reply]) -> Vec<u8> {
    replies
        .iter()
        .filter_map(|r| match r {
            Reply::Body(data) => Some(data.as_slice()),
            _ => None,
        })
        .flatten()
        .copied()
        .collect()
}

/// A request cycle running over an in-memory pipe.
pub struct DuplexPeer {
    pub stream: DuplexStream,
    pub shutdown: Shutdown,
    pub task: tokio::task::JoinHandle<Result<(), ConnectionError>>,
}

pub fn spawn_cycle(ctx: CycleContext) -> DuplexPeer {
    let (peer, local) = tokio::io::duplex(64 * 1024);
    let shutdown = Shutdown::new();
    let cycle = RequestCycle::from_stream(ConnectionId::new(), Arc::new(ctx), local);
    let task = tokio::spawn(cycle.run(shutdown.subscribe()));
    DuplexPeer {
        stream: peer,
        shutdown,
        task,
    }
}

pub fn context(config: &AjpConfig, handler: impl Handler) -> CycleContext {
    CycleContext::new(config, Arc::new(handler))
}

pub async fn send<W: AsyncWrite + Unpin>(writer: &mut W, packet: &[u8]) {
    writer.write_all(packet).await.unwrap();
}

/// Test config listening on an ephemeral loopback port.
pub fn loopback_config() -> AjpConfig {
    let mut config = AjpConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.acceptors = 2;
    config.listener.max_connections = 8;
    config.timeouts.shutdown_grace_secs = 2;
    config
}

/// Start a full server; returns its address and the server task.
pub async fn start_server(
    config: AjpConfig,
    server: AjpServer,
    shutdown: &Shutdown,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));
    (addr, task)
}
