//! # Consumer side
//!
//! What a UI layer needs to turn pushed events into local state:
//!
//! - **NotificationInbox**: bounded feeds plus one global unread counter,
//!   merged by id so replays never duplicate or double count
//! - **NotificationFilter**: live predicate evaluated per feed
//! - **NotificationApi**: the CRUD collaborator (paginated list, unread
//!   count, idempotent mark-read)
//! - **InboxConsumer**: wires an inbox to a `RealtimeClient` and re-syncs
//!   the unread count after every (re)connect

pub mod api;
pub mod filter;
pub mod inbox;
pub mod sync;

pub use api::{HttpNotificationApi, ListKind, NotificationApi, NotificationPage, PageQuery};
pub use filter::NotificationFilter;
pub use inbox::{NotificationFeed, NotificationInbox, Reconciled, DEFAULT_SEEN_CAPACITY};
pub use sync::InboxConsumer;
