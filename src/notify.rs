//! User-visible notifications.
//!
//! SYSTEM CONTEXT
//! ==============
//! Graphical front ends render these as toasts; the CLI prints them. The
//! controller never returns errors from its operations, so this seam is the
//! only place a user learns that a login or profile update failed.

use tokio::sync::mpsc;

use crate::types::{Notification, NotificationKind};

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Emits notifications as `tracing` events only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Success => tracing::info!(text = %notification.message, "notify"),
            NotificationKind::Error => tracing::warn!(text = %notification.message, "notify"),
        }
    }
}

/// Forwards notifications to a UI task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::debug!(text = %e.0.message, "notification dropped: receiver closed");
        }
    }
}
