//! Server round-trip for cell initialization.
//!
//! Each cell issues one `cell_init` request and is answered through an
//! [`InitReply`]. The reply is consumed when sent, so a second answer for the
//! same request cannot be expressed. Retries and reconnection belong to the
//! transport behind [`CellServer`].

use std::fmt;

use cellsync_protocol::{InitPayload, InitRequest};

/// Single-use reply slot for an initialization request.
pub struct InitReply {
    callback: Box<dyn FnOnce(InitPayload) + Send>,
}

impl InitReply {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(InitPayload) + Send + 'static,
    {
        Self { callback: Box::new(callback) }
    }

    /// Deliver the payload to the requesting cell.
    pub fn send(self, payload: InitPayload) {
        (self.callback)(payload)
    }
}

impl fmt::Debug for InitReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InitReply")
    }
}

/// Connection to the authoritative session server.
pub trait CellServer: Send + Sync {
    /// Send `cell_init`. The reply may arrive at any later time, or never.
    fn request_init(&self, request: InitRequest, reply: InitReply);
}
