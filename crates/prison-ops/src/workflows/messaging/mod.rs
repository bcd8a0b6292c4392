//! Direct messages between visitors and staff.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{Attachment, Message, MessageDraft, MessageId, MessageStatus, UnreadCounts, UserId};
pub use repository::MessageRepository;
pub use router::messaging_router;
pub use service::{MessagingService, MAX_ATTACHMENT_BYTES};
