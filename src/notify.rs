//! Notification hand-off. The engine decides who hears what; delivery
//! (rendering, PDF, mail transport) belongs to the dispatcher.
use super::error::NotificationError;
use super::slip::{Slip, SlipKind};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub slip: Slip,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

pub trait NotificationDispatcher {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

impl<D: NotificationDispatcher + ?Sized> NotificationDispatcher for Arc<D> {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        (**self).notify(notification)
    }
}

/// Builds the detail link appended to every message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    base_url: String,
}

impl Links {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn detail(&self, kind: SlipKind, id: u64) -> String {
        format!("{}/{}/{}/", self.base_url, kind.as_str(), id)
    }

    pub fn with_link(&self, message: &str, slip: &Slip) -> String {
        format!(
            "{message}\n\nView the slip and act on it here: {}",
            self.detail(slip.kind(), slip.id())
        )
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        if notification.recipients.is_empty() {
            return Err(NotificationError::NoRecipients);
        }
        tracing::info!(
            slip = %notification.slip.reference(),
            kind = %notification.slip.kind(),
            recipients = ?notification.recipients,
            subject = %notification.subject,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every notification it is handed, for inspection.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<Notification> {
        self.sent().pop()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;
        sent.push(notification.clone());
        Ok(())
    }
}

/// Queues notifications for a background worker so a slow transport never
/// delays the caller. A full queue refuses the notification instead of
/// waiting. Delivery failures are logged by the worker.
pub struct Outbox {
    sender: Option<SyncSender<Notification>>,
    worker: Option<JoinHandle<usize>>,
}

impl Outbox {
    pub fn spawn<D>(dispatcher: D, capacity: usize) -> Self
    where
        D: NotificationDispatcher + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let worker = thread::spawn(move || Self::drain(dispatcher, receiver));

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    fn drain<D: NotificationDispatcher>(dispatcher: D, receiver: Receiver<Notification>) -> usize {
        let mut delivered = 0;
        for notification in receiver {
            match dispatcher.notify(&notification) {
                Ok(()) => delivered += 1,
                Err(error) => tracing::warn!(
                    slip = %notification.slip.reference(),
                    %error,
                    "queued notification was not delivered"
                ),
            }
        }
        delivered
    }

    /// Stops accepting work, waits for the queue to drain and returns how
    /// many notifications were delivered.
    pub fn shutdown(mut self) -> usize {
        self.close()
    }

    fn close(&mut self) -> usize {
        drop(self.sender.take());
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(delivered)) => delivered,
            Some(Err(_)) => {
                tracing::error!("notification worker panicked");
                0
            }
            None => 0,
        }
    }
}

impl NotificationDispatcher for Outbox {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let sender = self.sender.as_ref().ok_or(NotificationError::QueueClosed)?;
        sender.try_send(notification.clone()).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::DeliveryFailed("outbox full".into()),
            TrySendError::Disconnected(_) => NotificationError::QueueClosed,
        })
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.close();
    }
}
