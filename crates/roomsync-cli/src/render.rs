//! Turns view updates into printable lines.

use std::collections::HashSet;

use roomsync_client::RoomView;
use roomsync_core::Message;

/// Tracks what has been printed so each update only prints what changed.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: HashSet<String>,
    status: String,
}

impl Renderer {
    /// Empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines for whatever changed since the last update.
    ///
    /// Messages are printed once, in page order. A status change prints one
    /// line.
    pub fn update(&mut self, view: &RoomView) -> Vec<String> {
        let mut lines = Vec::new();

        if view.status != self.status {
            self.status.clone_from(&view.status);
            if !view.status.is_empty() {
                lines.push(format!("-- {}", view.status));
            }
        }

        for message in &view.messages {
            if self.printed.insert(message.id.clone()) {
                lines.push(format_message(message));
            }
        }

        lines
    }

    /// Lines for the full page, marking everything as printed.
    pub fn page(&mut self, view: &RoomView) -> Vec<String> {
        let mut lines = Vec::with_capacity(view.messages.len() + 2);
        lines.push(format!("== {} ({:?})", view.room_id, view.state));
        if view.has_more {
            lines.push("   (older messages hidden, /more to show)".to_string());
        }
        for message in &view.messages {
            self.printed.insert(message.id.clone());
            lines.push(format_message(message));
        }
        lines
    }
}

fn format_message(message: &Message) -> String {
    format!("[{}] {}: {}", message.sent_at, message.display_name, message.body)
}
