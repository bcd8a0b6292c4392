use chrono::{DateTime, Utc};

use super::domain::{Message, UserId};
use crate::workflows::RepositoryError;

/// Message store contract. Bulk status updates return how many messages changed.
pub trait MessageRepository: Send + Sync {
    fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    /// Messages exchanged between the two users, optionally only those after `since`.
    fn between(
        &self,
        left: &UserId,
        right: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, RepositoryError>;

    fn unread_for(&self, receiver: &UserId) -> Result<Vec<Message>, RepositoryError>;

    /// Flag every unread message from `sender` to `receiver` as read.
    fn mark_read(&self, sender: &UserId, receiver: &UserId) -> Result<u32, RepositoryError>;

    /// Move `sent` messages from `sender` to `receiver` to `delivered`.
    fn mark_delivered(&self, sender: &UserId, receiver: &UserId) -> Result<u32, RepositoryError>;
}
