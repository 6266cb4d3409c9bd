//! Server-sent notification stream.
//!
//! [`NotificationFeed`] turns `/notifications/stream` into a typed stream of
//! [`NotificationFrame`]s, and [`NotificationInbox`] keeps the most recent of
//! them along with per-status counts.

mod feed;
mod frame;
mod inbox;

pub use feed::{FrameStream, NotificationFeed, STREAM_PATH};
pub use frame::{Notification, NotificationFrame, NotificationStatus};
pub use inbox::NotificationInbox;
