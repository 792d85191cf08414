pub mod senders;
pub mod service;

pub use senders::{NotificationHandler, SenderError};
pub use service::{NotificationRegistry, NotificationSettings};
