use crate::record::NotificationRecord;
use std::fmt;
use std::sync::Arc;

/// Live predicate a feed applies to incoming notifications
#[derive(Clone, Default)]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
    /// Exact `notificationType` match
    Type(String),
    /// Case-insensitive substring of the content
    Search(String),
    Custom(Arc<dyn Fn(&NotificationRecord) -> bool + Send + Sync>),
}

impl NotificationFilter {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&NotificationRecord) -> bool + Send + Sync + 'static,
    {
        NotificationFilter::Custom(Arc::new(predicate))
    }

    pub fn accepts(&self, record: &NotificationRecord) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Unread => record.is_unread(),
            NotificationFilter::Type(kind) => record.notification_type == *kind,
            NotificationFilter::Search(term) => {
                let term = term.trim();
                term.is_empty() || record.content.to_lowercase().contains(&term.to_lowercase())
            }
            NotificationFilter::Custom(predicate) => predicate(record),
        }
    }
}

impl fmt::Debug for NotificationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationFilter::All => f.write_str("All"),
            NotificationFilter::Unread => f.write_str("Unread"),
            NotificationFilter::Type(kind) => f.debug_tuple("Type").field(kind).finish(),
            NotificationFilter::Search(term) => f.debug_tuple("Search").field(term).finish(),
            NotificationFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
