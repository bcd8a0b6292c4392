use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::clock::Clock;
use crate::workflows::messaging::domain::{Message, MessageDraft, MessageStatus, UserId};
use crate::workflows::messaging::repository::MessageRepository;
use crate::workflows::messaging::service::MessagingService;
use crate::workflows::RepositoryError;

pub(super) type Service = MessagingService<MemoryMessages>;

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn text(from: &str, to: &str, content: &str) -> MessageDraft {
    MessageDraft {
        sender_id: Some(user(from)),
        receiver_id: Some(user(to)),
        content: Some(content.to_string()),
        attachment: None,
    }
}

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock that moves forward one minute every time it is read.
pub(super) struct TickingClock {
    now: Mutex<DateTime<Utc>>,
}

impl TickingClock {
    pub(super) fn new() -> Self {
        Self {
            now: Mutex::new(start()),
        }
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        let current = *guard;
        *guard = current + Duration::minutes(1);
        current
    }

    fn today(&self) -> chrono::NaiveDate {
        self.now.lock().expect("clock mutex poisoned").date_naive()
    }
}

pub(super) fn build_service() -> (Service, Arc<MemoryMessages>) {
    let messages = Arc::new(MemoryMessages::default());
    let service = MessagingService::new(messages.clone()).with_clock(Arc::new(TickingClock::new()));
    (service, messages)
}

#[derive(Default)]
pub(super) struct MemoryMessages {
    records: Mutex<Vec<Message>>,
}

impl MemoryMessages {
    pub(super) fn all(&self) -> Vec<Message> {
        self.records.lock().expect("message mutex poisoned").clone()
    }
}

impl MessageRepository for MemoryMessages {
    fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        self.records
            .lock()
            .expect("message mutex poisoned")
            .push(message.clone());
        Ok(message)
    }

    fn between(
        &self,
        left: &UserId,
        right: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let guard = self.records.lock().expect("message mutex poisoned");
        Ok(guard
            .iter()
            .filter(|message| message.is_between(left, right))
            .filter(|message| since.map_or(true, |since| message.created_at > since))
            .cloned()
            .collect())
    }

    fn unread_for(&self, receiver: &UserId) -> Result<Vec<Message>, RepositoryError> {
        let guard = self.records.lock().expect("message mutex poisoned");
        Ok(guard
            .iter()
            .filter(|message| &message.receiver_id == receiver && !message.read)
            .cloned()
            .collect())
    }

    fn mark_read(&self, sender: &UserId, receiver: &UserId) -> Result<u32, RepositoryError> {
        let mut guard = self.records.lock().expect("message mutex poisoned");
        let mut updated = 0;
        for message in guard.iter_mut() {
            if &message.sender_id == sender && &message.receiver_id == receiver && !message.read {
                message.read = true;
                message.status = MessageStatus::Read;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn mark_delivered(&self, sender: &UserId, receiver: &UserId) -> Result<u32, RepositoryError> {
        let mut guard = self.records.lock().expect("message mutex poisoned");
        let mut updated = 0;
        for message in guard.iter_mut() {
            if &message.sender_id == sender
                && &message.receiver_id == receiver
                && message.status == MessageStatus::Sent
            {
                message.status = MessageStatus::Delivered;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
