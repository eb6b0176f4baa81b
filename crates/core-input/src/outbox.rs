//! Accumulator for handler side effects that require IO.

use core_geometry::Rect;
use core_protocol::Message;
use core_windows::{FocusChange, OwnerId, WindowRegistry};

/// Messages and damage produced while handling one event. The server
/// drains the outbox after each handler: sends the messages (best-effort
/// per recipient), queues the damage, and emits one subscriber notify if
/// anything requested it.
#[derive(Default)]
pub struct Outbox {
    pub messages: Vec<(OwnerId, Message)>,
    pub damage: Vec<Rect>,
    pub notify_subscribers: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, owner: OwnerId, msg: Message) {
        self.messages.push((owner, msg));
    }

    pub fn damage(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.damage.push(rect);
        }
    }

    /// Queue the focus-change messages a [`FocusChange`] transition owes,
    /// damage the newly focused window, and request a subscriber notify.
    pub fn apply_focus_change(&mut self, change: FocusChange, reg: &WindowRegistry) {
        if !change.changed {
            return;
        }
        if let Some(lost) = change.lost {
            if let Some(win) = reg.get(lost) {
                self.send(
                    win.owner,
                    Message::WindowFocusChange {
                        wid: lost,
                        focused: false,
                    },
                );
            }
        }
        if let Some(gained) = change.gained {
            if let Some(win) = reg.get(gained) {
                self.send(
                    win.owner,
                    Message::WindowFocusChange {
                        wid: gained,
                        focused: true,
                    },
                );
                self.damage(win.damage_bounds());
            }
        }
        self.notify_subscribers = true;
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.damage.is_empty() && !self.notify_subscribers
    }
}
