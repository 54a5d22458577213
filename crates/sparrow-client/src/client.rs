use std::sync::Arc;
use std::time::Instant;

use mio::{Events, Interest, Poll, Token};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sparrow_net::Connection;
use sparrow_protocol::{BinaryDecode, BinaryEncode, BinaryProtocol, Message, ProtocolRegistry, SchemaProtocol};
use sparrow_wire::{codec, FrameHeader, ProtocolKind};

use crate::async_poller;
use crate::config::ClientConfig;
use crate::connect;
use crate::error::ClientError;

const RSP_TOKEN: Token = Token(0);

/// A single outbound connection driven synchronously: `call_schema`/
/// `call_binary` write a request and block for its matching response, or
/// until the caller's deadline. For the background read-loop variant, see
/// [`Client::into_async`].
pub struct Client {
    conn: Connection,
    wait_poll: Poll,
    wait_events: Events,
}

impl Client {
    pub fn connect(cfg: &ClientConfig) -> Result<Self, ClientError> {
        let mut stream = connect::connect(cfg)?;
        let remote_addr = stream.peer_addr()?;
        let wait_poll = Poll::new()?;
        wait_poll.registry().register(&mut stream, RSP_TOKEN, Interest::READABLE)?;
        let conn = Connection::connected(stream, remote_addr);
        Ok(Self { conn, wait_poll, wait_events: Events::with_capacity(1) })
    }

    /// Issues one schema-family request and blocks for its response, or
    /// until `deadline`.
    pub fn call_schema<REQ, RSP>(&mut self, req: &REQ, deadline: Instant) -> Result<RSP, ClientError>
    where
        REQ: Message + Serialize,
        RSP: Message + DeserializeOwned,
    {
        let payload = SchemaProtocol::serialize(req)?;
        self.send_request(ProtocolKind::Schema, REQ::URI, &payload)?;
        let bytes = self.wait_response(ProtocolKind::Schema, RSP::URI, deadline)?;
        Ok(SchemaProtocol::deserialize(&bytes)?)
    }

    /// Issues one binary-family request and blocks for its response, or
    /// until `deadline`.
    pub fn call_binary<REQ, RSP>(&mut self, req: &REQ, deadline: Instant) -> Result<RSP, ClientError>
    where
        REQ: Message + BinaryEncode,
        RSP: Message + BinaryDecode,
    {
        let payload = BinaryProtocol::serialize(req);
        self.send_request(ProtocolKind::Binary, REQ::URI, &payload)?;
        let bytes = self.wait_response(ProtocolKind::Binary, RSP::URI, deadline)?;
        Ok(BinaryProtocol::deserialize(&bytes)?)
    }

    /// Hands this connection's read side off to the process-wide background
    /// poller and returns a handle that can still send requests, with
    /// responses delivered through `registry`'s async callbacks instead of
    /// a blocking wait. Consumes `self`: the synchronous `call_*` path and
    /// the background read-loop must not race over the same socket.
    pub fn into_async(self, registry: Arc<ProtocolRegistry>) -> Result<AsyncHandle, ClientError> {
        async_poller::spawn(self.conn, registry)
    }

    fn send_request(&mut self, kind: ProtocolKind, uri: u32, payload: &[u8]) -> Result<(), ClientError> {
        let header = FrameHeader::new(payload.len(), kind, uri);
        codec::write_frame(&mut self.conn.send_buf, &header, payload)?;
        self.conn.tcp_send()?;
        Ok(())
    }

    fn wait_response(&mut self, kind: ProtocolKind, expected_uri: u32, deadline: Instant) -> Result<Vec<u8>, ClientError> {
        loop {
            if self.conn.has_pending_rsp() {
                self.conn.tcp_send()?;
            }

            if let Some(frame) = codec::try_extract_frame(&mut self.conn.recv_buf)? {
                if frame.header.protocol_type != kind.as_u8() {
                    return Err(ClientError::UnexpectedProtocolType(frame.header.protocol_type));
                }
                if frame.header.protocol_uri != expected_uri {
                    return Err(ClientError::UnexpectedUri {
                        expected: expected_uri,
                        got: frame.header.protocol_uri,
                    });
                }
                return Ok(frame.payload);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::CallTimeout);
            }

            match self.wait_poll.poll(&mut self.wait_events, Some(remaining)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            if self.wait_events.is_empty() {
                return Err(ClientError::CallTimeout);
            }
            self.conn.tcp_recv()?;
        }
    }
}

/// A connection whose read side is owned by the background async poller.
/// Sending is still synchronous (a direct write under the shared lock);
/// only the wait for a response has moved off this handle.
pub struct AsyncHandle {
    pub(crate) conn: Arc<std::sync::Mutex<Connection>>,
}

impl AsyncHandle {
    pub fn send_schema<REQ: Message + Serialize>(&self, req: &REQ) -> Result<(), ClientError> {
        let payload = SchemaProtocol::serialize(req)?;
        self.send(ProtocolKind::Schema, REQ::URI, &payload)
    }

    pub fn send_binary<REQ: Message + BinaryEncode>(&self, req: &REQ) -> Result<(), ClientError> {
        let payload = BinaryProtocol::serialize(req);
        self.send(ProtocolKind::Binary, REQ::URI, &payload)
    }

    fn send(&self, kind: ProtocolKind, uri: u32, payload: &[u8]) -> Result<(), ClientError> {
        let header = FrameHeader::new(payload.len(), kind, uri);
        let mut conn = self.conn.lock().expect("connection poisoned");
        codec::write_frame(&mut conn.send_buf, &header, payload)?;
        conn.tcp_send()?;
        Ok(())
    }
}
