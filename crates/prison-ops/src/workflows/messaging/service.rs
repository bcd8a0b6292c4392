use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::domain::{
    Attachment, Message, MessageDraft, MessageId, MessageStatus, UnreadCounts, UserId,
};
use super::repository::MessageRepository;
use crate::clock::{Clock, SystemClock};
use crate::workflows::{ValidationErrors, WorkflowError};

/// Largest attachment accepted, in bytes.
pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 11] = [
    "jpeg", "jpg", "png", "gif", "pdf", "doc", "docx", "xls", "xlsx", "txt", "csv",
];

const ATTACHMENT_ONLY_CONTENT: &str = "(attachment)";

pub struct MessagingService<M> {
    messages: Arc<M>,
    clock: Arc<dyn Clock>,
}

static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> MessageId {
    let id = MESSAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MessageId(format!("msg-{id:06}"))
}

impl<M> MessagingService<M>
where
    M: MessageRepository + 'static,
{
    pub fn new(messages: Arc<M>) -> Self {
        Self {
            messages,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store a message. It needs text, a usable attachment, or both.
    pub fn send(&self, draft: MessageDraft) -> Result<Message, WorkflowError> {
        let mut errors = ValidationErrors::new();
        let sender_id = draft.sender_id.filter(|id| !id.0.trim().is_empty());
        let receiver_id = draft.receiver_id.filter(|id| !id.0.trim().is_empty());
        if sender_id.is_none() {
            errors.add("sender_id", "Sender ID is required");
        }
        if receiver_id.is_none() {
            errors.add("receiver_id", "Receiver ID is required");
        }

        let content = draft
            .content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let attachment = match draft.attachment {
            Some(attachment) => match check_attachment(&attachment) {
                Ok(()) => Some(attachment),
                Err(reason) => {
                    errors.add("attachment", reason);
                    None
                }
            },
            None => None,
        };
        if content.is_none() && attachment.is_none() {
            errors.add("content", "Message must contain text or a valid file attachment");
        }

        let (Some(sender_id), Some(receiver_id)) = (sender_id, receiver_id) else {
            return Err(WorkflowError::Validation(errors));
        };
        errors.into_result()?;

        let message = Message {
            id: next_message_id(),
            sender_id,
            receiver_id,
            content: content.unwrap_or_else(|| ATTACHMENT_ONLY_CONTENT.to_string()),
            attachment,
            status: MessageStatus::Sent,
            read: false,
            created_at: self.clock.now(),
        };
        let stored = self.messages.insert(message)?;

        info!(
            message = %stored.id,
            sender = %stored.sender_id,
            receiver = %stored.receiver_id,
            attachment = stored.attachment.is_some(),
            "message sent"
        );
        Ok(stored)
    }

    /// Conversation between `current` and `other`, oldest first.
    ///
    /// Opening it marks what `other` sent as read and what `current` sent as delivered.
    pub fn conversation(
        &self,
        current: &UserId,
        other: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, WorkflowError> {
        let read = self.messages.mark_read(other, current)?;
        let delivered = self.messages.mark_delivered(current, other)?;
        debug!(user = %current, peer = %other, read, delivered, "conversation opened");

        let mut messages = self.messages.between(current, other, since)?;
        messages.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(messages)
    }

    pub fn unread_counts(&self, user: &UserId) -> Result<UnreadCounts, WorkflowError> {
        let mut counts = UnreadCounts::default();
        for message in self.messages.unread_for(user)? {
            counts.count += 1;
            *counts.by_sender.entry(message.sender_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Mark everything `sender` sent to `receiver` as read; returns how many changed.
    pub fn mark_read(&self, receiver: &UserId, sender: &UserId) -> Result<u32, WorkflowError> {
        let updated = self.messages.mark_read(sender, receiver)?;
        if updated > 0 {
            info!(receiver = %receiver, sender = %sender, updated, "messages marked read");
        }
        Ok(updated)
    }
}

fn check_attachment(attachment: &Attachment) -> Result<(), String> {
    if attachment.url.trim().is_empty() {
        return Err("Attachment is missing its storage reference".to_string());
    }
    if attachment.size_bytes == 0 {
        return Err("Attachment is empty".to_string());
    }
    if attachment.size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(format!(
            "Attachment exceeds the {} MB limit",
            MAX_ATTACHMENT_BYTES / (1024 * 1024)
        ));
    }

    let extension = attachment
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!("Unsupported attachment type: {}", attachment.file_name));
    }

    attachment
        .content_type
        .parse::<mime::Mime>()
        .map(|_| ())
        .map_err(|_| format!("Invalid content type: {}", attachment.content_type))
}
