//! Client sessions, the subscriber set, and the clipboard store.
//!
//! Sessions are keyed by the opaque transport endpoint id. A session owns
//! a set of wids; ownership checks on mutating window operations compare
//! the sender's endpoint against the window's recorded owner, and the
//! session sets exist so a disconnect can sweep every owned window into
//! the closing path.
//!
//! Subscribers receive an empty `Notify` whenever the window population
//! or advertised metadata changes. The subscriber list is pruned lazily:
//! an entry whose endpoint no longer has a session record is dropped at
//! the next notify.

use ahash::AHashMap;
use tracing::{debug, trace};

use core_protocol::{Wid, CLIPBOARD_INLINE_MAX, CLIPBOARD_SENTINEL};
use core_shm::{clipboard_name, RegionAllocator};

pub type EndpointId = u64;

#[derive(Debug, Default)]
pub struct SessionRecord {
    windows: Vec<Wid>,
}

impl SessionRecord {
    pub fn windows(&self) -> &[Wid] {
        &self.windows
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: AHashMap<EndpointId, SessionRecord>,
    subscribers: Vec<EndpointId>,
    clipboard: Vec<u8>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session on `Hello`. Returns true for a new client.
    pub fn hello(&mut self, endpoint: EndpointId) -> bool {
        let new = self
            .sessions
            .insert(endpoint, SessionRecord::default())
            .is_none();
        if new {
            debug!(target: "session", endpoint, "client session created");
        }
        new
    }

    pub fn is_known(&self, endpoint: EndpointId) -> bool {
        self.sessions.contains_key(&endpoint)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove a session, returning the wids it owned (already-removed
    /// endpoints return an empty list).
    pub fn remove(&mut self, endpoint: EndpointId) -> Vec<Wid> {
        let windows = self
            .sessions
            .remove(&endpoint)
            .map(|s| s.windows)
            .unwrap_or_default();
        debug!(target: "session", endpoint, orphaned = windows.len(), "client session removed");
        windows
    }

    pub fn add_window(&mut self, endpoint: EndpointId, wid: Wid) {
        if let Some(session) = self.sessions.get_mut(&endpoint) {
            session.windows.push(wid);
        }
    }

    pub fn remove_window(&mut self, endpoint: EndpointId, wid: Wid) {
        if let Some(session) = self.sessions.get_mut(&endpoint) {
            session.windows.retain(|w| *w != wid);
        }
    }

    // ---------------------------------------------------------------------
    // Subscribers
    // ---------------------------------------------------------------------

    pub fn subscribe(&mut self, endpoint: EndpointId) {
        if !self.subscribers.contains(&endpoint) {
            self.subscribers.push(endpoint);
        }
    }

    pub fn unsubscribe(&mut self, endpoint: EndpointId) {
        self.subscribers.retain(|e| *e != endpoint);
    }

    /// Current subscribers, pruning entries whose sessions are gone.
    pub fn subscribers_for_notify(&mut self) -> Vec<EndpointId> {
        let sessions = &self.sessions;
        self.subscribers.retain(|e| sessions.contains_key(e));
        self.subscribers.clone()
    }

    // ---------------------------------------------------------------------
    // Clipboard
    // ---------------------------------------------------------------------

    /// Store clipboard content. Small payloads are kept inline; anything
    /// larger is staged in the shared clipboard region and replaced
    /// inline by the sentinel byte followed by the ASCII decimal length.
    pub fn store_clipboard(
        &mut self,
        content: &[u8],
        ident: &str,
        shm: &mut dyn RegionAllocator,
    ) {
        if content.len() <= CLIPBOARD_INLINE_MAX {
            self.clipboard = content.to_vec();
        } else {
            let name = clipboard_name(ident);
            match shm.obtain(&name, content.len()) {
                Ok(mut region) => {
                    region.as_mut_slice()[..content.len()].copy_from_slice(content);
                    let mut marker = vec![CLIPBOARD_SENTINEL];
                    marker.extend_from_slice(content.len().to_string().as_bytes());
                    self.clipboard = marker;
                }
                Err(e) => {
                    tracing::warn!(target: "session", %e, "clipboard staging failed, truncating");
                    self.clipboard = content[..CLIPBOARD_INLINE_MAX].to_vec();
                }
            }
        }
        trace!(target: "session", size = self.clipboard.len(), "clipboard stored");
    }

    pub fn clipboard(&self) -> &[u8] {
        &self.clipboard
    }
}
