//! Consumer-side reconciliation
//!
//! Every UI consumer merges pushed records the same way:
//!
//! 1. an id that is already known changes nothing (replays are harmless)
//! 2. a new record is prepended to each live feed whose filter accepts it,
//!    and the feed is truncated to its capacity
//! 3. the unread counter goes up once per new unread record, whether or
//!    not any feed showed it
//! 4. marking read flips records in place everywhere and lowers the counter
//!    by the number of distinct records that were unread, never below zero
//!
//! Ids of recently pushed records are remembered in a bounded window so a
//! record no feed accepted is still deduplicated and can still be marked read.

use crate::consumer::filter::NotificationFilter;
use crate::event::ClassifiedEvent;
use crate::record::{NotificationId, NotificationRecord, ReadStatus};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// Pushed ids remembered for dedup beyond what the feeds hold
pub const DEFAULT_SEEN_CAPACITY: usize = 256;

/// Outcome of merging one pushed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The id was already known; nothing changed
    Duplicate,
    /// The record was new
    Accepted {
        /// How many feeds now show it
        feeds: usize,
        /// Whether it raised the unread counter
        counted: bool,
    },
}

/// One bounded, most-recent-first list with its own filter
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    name: String,
    capacity: usize,
    filter: NotificationFilter,
    page: u32,
    items: VecDeque<NotificationRecord>,
}

impl NotificationFeed {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            filter: NotificationFilter::All,
            page: 0,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn with_filter(mut self, filter: NotificationFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn filter(&self) -> &NotificationFilter {
        &self.filter
    }

    /// Zero-based page currently shown
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn items(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<NotificationId> {
        self.items.iter().map(|record| record.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &NotificationId) -> Option<&NotificationRecord> {
        self.items.iter().find(|record| record.id == *id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.get(id).is_some()
    }

    /// Only the first page receives pushed records; later pages are a
    /// snapshot of older history
    #[inline]
    fn is_live(&self) -> bool {
        self.page == 0
    }

    fn offer(&mut self, record: &NotificationRecord) -> bool {
        if !self.is_live() || !self.filter.accepts(record) {
            return false;
        }
        self.items.push_front(record.clone());
        self.items.truncate(self.capacity);
        true
    }

    fn replace(&mut self, page: u32, records: Vec<NotificationRecord>) {
        let mut ids = HashSet::new();
        self.page = page;
        self.items = records
            .into_iter()
            .filter(|record| ids.insert(record.id.clone()))
            .take(self.capacity)
            .collect();
    }
}

/// Bounded memory of pushed ids and their last known read status
#[derive(Debug, Clone)]
struct SeenWindow {
    capacity: usize,
    order: VecDeque<NotificationId>,
    status: HashMap<NotificationId, ReadStatus>,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            status: HashMap::with_capacity(capacity),
        }
    }

    fn contains(&self, id: &NotificationId) -> bool {
        self.status.contains_key(id)
    }

    fn insert(&mut self, id: NotificationId, status: ReadStatus) {
        if self.capacity == 0 {
            return;
        }
        if let Some(current) = self.status.get_mut(&id) {
            *current = status;
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.status.remove(&oldest);
            }
        }
        self.order.push_back(id.clone());
        self.status.insert(id, status);
    }

    /// Returns true if the id was known and unread
    fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.status.get_mut(id) {
            Some(status) if *status == ReadStatus::Unread => {
                *status = ReadStatus::Read;
                true
            }
            _ => false,
        }
    }

    fn mark_all_read(&mut self) {
        for status in self.status.values_mut() {
            *status = ReadStatus::Read;
        }
    }
}

/// Local notification state of one UI consumer
///
/// Holds any number of named feeds (a dropdown preview and a full list
/// page, say) that share one unread counter.
#[derive(Debug, Clone)]
pub struct NotificationInbox {
    feeds: Vec<NotificationFeed>,
    unread: u64,
    seen: SeenWindow,
    realtime_available: bool,
}

impl Default for NotificationInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self {
            feeds: Vec::new(),
            unread: 0,
            seen: SeenWindow::new(DEFAULT_SEEN_CAPACITY),
            realtime_available: false,
        }
    }

    /// Inbox with a single unfiltered feed named "all"
    pub fn single(capacity: usize) -> Self {
        Self::new().with_feed(NotificationFeed::new("all", capacity))
    }

    pub fn with_feed(mut self, feed: NotificationFeed) -> Self {
        self.add_feed(feed);
        self
    }

    pub fn with_seen_capacity(mut self, capacity: usize) -> Self {
        self.seen = SeenWindow::new(capacity);
        self
    }

    /// Add a feed, replacing any feed with the same name
    pub fn add_feed(&mut self, feed: NotificationFeed) {
        match self.feeds.iter_mut().find(|f| f.name == feed.name) {
            Some(existing) => *existing = feed,
            None => self.feeds.push(feed),
        }
    }

    pub fn feed(&self, name: &str) -> Option<&NotificationFeed> {
        self.feeds.iter().find(|f| f.name == name)
    }

    pub fn feeds(&self) -> &[NotificationFeed] {
        &self.feeds
    }

    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    /// False after an auth or fatal error, until the next established connection
    pub fn realtime_available(&self) -> bool {
        self.realtime_available
    }

    /// Known locally, either in a feed or in the pushed-id window
    pub fn contains(&self, id: &NotificationId) -> bool {
        self.seen.contains(id) || self.feeds.iter().any(|feed| feed.contains(id))
    }

    /// Merge one pushed record
    pub fn receive(&mut self, record: NotificationRecord) -> Reconciled {
        if self.contains(&record.id) {
            debug!("[Inbox] Duplicate notification {} ignored", record.id);
            return Reconciled::Duplicate;
        }

        let feeds = self
            .feeds
            .iter_mut()
            .map(|feed| feed.offer(&record))
            .filter(|accepted| *accepted)
            .count();

        let counted = record.is_unread();
        if counted {
            self.unread = self.unread.saturating_add(1);
        }
        trace!(
            "[Inbox] Notification {} accepted by {} feed(s), unread={}",
            record.id,
            feeds,
            self.unread
        );

        self.seen.insert(record.id, record.read_status);
        Reconciled::Accepted { feeds, counted }
    }

    /// Apply one classified event
    ///
    /// Returns the reconciliation outcome for notifications, `None` for
    /// lifecycle events.
    pub fn apply(&mut self, event: &ClassifiedEvent) -> Option<Reconciled> {
        match event {
            ClassifiedEvent::NotificationReceived(record) => Some(self.receive(record.clone())),
            ClassifiedEvent::ConnectionEstablished { .. } => {
                self.realtime_available = true;
                None
            }
            ClassifiedEvent::ConnectionClosed { .. } => None,
            ClassifiedEvent::AuthError { .. } | ClassifiedEvent::FatalError { .. } => {
                self.realtime_available = false;
                None
            }
        }
    }

    /// Flip the given ids to read in every feed
    ///
    /// Returns how many distinct records were unread; the counter drops by
    /// that much, floored at zero.
    pub fn mark_read<'a, I>(&mut self, ids: I) -> u64
    where
        I: IntoIterator<Item = &'a NotificationId>,
    {
        let ids: HashSet<&NotificationId> = ids.into_iter().collect();
        let mut affected: HashSet<NotificationId> = HashSet::new();

        for feed in &mut self.feeds {
            for record in feed.items.iter_mut() {
                if record.is_unread() && ids.contains(&record.id) {
                    record.read_status = ReadStatus::Read;
                    affected.insert(record.id.clone());
                }
            }
        }
        for id in &ids {
            if self.seen.mark_read(id) {
                affected.insert((*id).clone());
            }
        }

        let count = affected.len() as u64;
        self.unread = self.unread.saturating_sub(count);
        debug!("[Inbox] Marked {} notification(s) read, unread={}", count, self.unread);
        count
    }

    /// Flip everything held locally to read and zero the counter
    ///
    /// Returns how many local records changed.
    pub fn mark_all_read(&mut self) -> u64 {
        let mut changed = 0;
        for feed in &mut self.feeds {
            for record in feed.items.iter_mut().filter(|r| r.is_unread()) {
                record.read_status = ReadStatus::Read;
                changed += 1;
            }
        }
        self.seen.mark_all_read();
        self.unread = 0;
        changed
    }

    /// Overwrite the counter with an authoritative value
    pub fn set_unread_count(&mut self, count: u64) {
        if count != self.unread {
            debug!("[Inbox] Unread count re-synced {} -> {}", self.unread, count);
        }
        self.unread = count;
    }

    /// Change a feed's filter. The feed is emptied and returned to its first
    /// page; load the matching page with [`replace_page`](Self::replace_page).
    pub fn set_filter(&mut self, feed: &str, filter: NotificationFilter) -> bool {
        match self.feeds.iter_mut().find(|f| f.name == feed) {
            Some(feed) => {
                feed.filter = filter;
                feed.replace(0, Vec::new());
                true
            }
            None => false,
        }
    }

    /// Load an authoritative page fetched through the CRUD collaborator
    ///
    /// The page's read statuses win over anything held locally: copies in
    /// other feeds and the pushed-id window are brought in line, and every
    /// loaded id is remembered so a later push of it is a duplicate.
    pub fn replace_page(&mut self, feed: &str, page: u32, records: Vec<NotificationRecord>) -> bool {
        let Some(index) = self.feeds.iter().position(|f| f.name == feed) else {
            return false;
        };
        self.feeds[index].replace(page, records);

        let loaded: HashMap<NotificationId, ReadStatus> = self.feeds[index]
            .items
            .iter()
            .map(|record| (record.id.clone(), record.read_status))
            .collect();

        for (position, other) in self.feeds.iter_mut().enumerate() {
            if position == index {
                continue;
            }
            for record in other.items.iter_mut() {
                if let Some(status) = loaded.get(&record.id) {
                    record.read_status = *status;
                }
            }
        }
        for record in &self.feeds[index].items {
            self.seen.insert(record.id.clone(), record.read_status);
        }
        true
    }
}
