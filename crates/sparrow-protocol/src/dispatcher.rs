use std::collections::HashMap;

use crate::error::DispatchError;

/// What dispatching a frame produced: a response frame to enqueue back
/// onto the originating connection, or nothing (an async callback ran and
/// there is no reply to send).
pub enum DispatchOutcome {
    Response { uri: u32, bytes: Vec<u8> },
    Delivered,
}

type ServerFn = Box<dyn Fn(&[u8]) -> Result<(u32, Vec<u8>), DispatchError> + Send + Sync>;
type AsyncFn = Box<dyn Fn(&[u8]) -> Result<(), DispatchError> + Send + Sync>;

enum Entry {
    /// A server-side request handler: `uri != req_to_rsp[uri]`.
    Server(ServerFn),
    /// A client-side async response callback: `req_to_rsp[uri] == uri`.
    Async(AsyncFn),
}

/// Per-protocol URI routing table: `handlers` maps a URI to either a
/// server handler or an async callback, `req_to_rsp` pairs a request URI
/// with its response URI. A separate type-erased descriptor/factory table
/// is unnecessary here: each boxed closure already knows how to
/// materialize the empty response/async message it needs via `Default`.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u32, Entry>,
    req_to_rsp: HashMap<u32, u32>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rsp_uri(&self, uri: u32) -> Option<u32> {
        self.req_to_rsp.get(&uri).copied()
    }

    /// Registers a server-side handler under `req_uri`, pairing it with
    /// `rsp_uri`. Rejects `req_uri == rsp_uri`: a request URI must always
    /// differ from its paired response URI.
    pub fn register_server<F>(&mut self, req_uri: u32, rsp_uri: u32, handler: F) -> Result<(), DispatchError>
    where
        F: Fn(&[u8]) -> Result<(u32, Vec<u8>), DispatchError> + Send + Sync + 'static,
    {
        if req_uri == rsp_uri {
            return Err(DispatchError::UriCollision(req_uri));
        }
        self.req_to_rsp.insert(req_uri, rsp_uri);
        self.handlers.insert(req_uri, Entry::Server(Box::new(handler)));
        Ok(())
    }

    /// Registers a client-side async callback under `rsp_uri`, mapping
    /// `rsp_uri -> rsp_uri` so `dispatch` can discriminate it from a
    /// server-request entry by `uri == rsp_uri`.
    pub fn register_async<F>(&mut self, rsp_uri: u32, callback: F)
    where
        F: Fn(&[u8]) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.req_to_rsp.insert(rsp_uri, rsp_uri);
        self.handlers.insert(rsp_uri, Entry::Async(Box::new(callback)));
    }

    /// Routes one already-deframed payload. `uri == 0` or any URI with no
    /// registration is a [`DispatchError::UnregisteredUri`].
    pub fn dispatch(&self, uri: u32, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        let rsp_uri = self.rsp_uri(uri).ok_or(DispatchError::UnregisteredUri(uri))?;
        match self.handlers.get(&uri) {
            Some(Entry::Server(handler)) => {
                let (out_uri, bytes) = handler(payload)?;
                debug_assert_eq!(out_uri, rsp_uri);
                Ok(DispatchOutcome::Response { uri: rsp_uri, bytes })
            }
            Some(Entry::Async(callback)) => {
                callback(payload)?;
                Ok(DispatchOutcome::Delivered)
            }
            None => Err(DispatchError::UnregisteredUri(uri)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn rejects_matching_request_and_response_uris() {
        let mut d = Dispatcher::new();
        let err = d.register_server(0x11, 0x11, |_| Ok((0x11, vec![]))).unwrap_err();
        assert!(matches!(err, DispatchError::UriCollision(0x11)));
    }

    #[test]
    fn server_dispatch_routes_request_to_handler() {
        let mut d = Dispatcher::new();
        d.register_server(0x11, 0x12, |bytes| Ok((0x12, bytes.to_vec()))).unwrap();
        match d.dispatch(0x11, b"hello").unwrap() {
            DispatchOutcome::Response { uri, bytes } => {
                assert_eq!(uri, 0x12);
                assert_eq!(bytes, b"hello");
            }
            DispatchOutcome::Delivered => panic!("expected a response"),
        }
    }

    #[test]
    fn async_dispatch_invokes_callback_exactly_once() {
        let mut d = Dispatcher::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        d.register_async(0x12, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        d.dispatch(0x12, b"payload").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_uri_is_an_error() {
        let d = Dispatcher::new();
        assert!(d.dispatch(0xDEAD, b"").is_err());
    }
}
