//! Inbox wired to the event stream
//!
//! `InboxConsumer` subscribes a [`NotificationInbox`] to a registry so every
//! classified event is reconciled as it arrives. When a CRUD API is
//! attached, each `ConnectionEstablished` triggers a re-fetch of the
//! authoritative unread count, since pushes lost in a reconnect gap are
//! never replayed.

use crate::consumer::api::{NotificationApi, NotificationPage, PageQuery};
use crate::consumer::filter::NotificationFilter;
use crate::consumer::inbox::NotificationInbox;
use crate::core::client::RealtimeClient;
use crate::core::registry::{SubscriberRegistry, Subscription};
use crate::error::{NotifyError, Result};
use crate::event::ClassifiedEvent;
use crate::frame::Identity;
use crate::record::{NotificationId, NotificationRecord};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One UI consumer: its inbox plus the subscription feeding it
///
/// Dropping the consumer unsubscribes it; the connection is unaffected.
pub struct InboxConsumer {
    name: String,
    inbox: Arc<Mutex<NotificationInbox>>,
    api: Option<Arc<dyn NotificationApi>>,
    subscription: Subscription,
}

impl InboxConsumer {
    /// Subscribe `inbox` to a client's events
    pub fn attach_to(
        client: &RealtimeClient,
        name: impl Into<String>,
        inbox: NotificationInbox,
        api: Option<Arc<dyn NotificationApi>>,
    ) -> Self {
        Self::attach(client.registry(), name, inbox, api)
    }

    /// Subscribe `inbox` to a registry directly
    pub fn attach(
        registry: &SubscriberRegistry,
        name: impl Into<String>,
        inbox: NotificationInbox,
        api: Option<Arc<dyn NotificationApi>>,
    ) -> Self {
        let name = name.into();
        let inbox = Arc::new(Mutex::new(inbox));

        let state = Arc::clone(&inbox);
        let resync_api = api.clone();
        let consumer = name.clone();
        let subscription = registry.subscribe(move |event| {
            state.lock().apply(event);

            match event {
                ClassifiedEvent::ConnectionEstablished { identity } => {
                    if let Some(api) = &resync_api {
                        spawn_resync(&consumer, Arc::clone(&state), Arc::clone(api), identity.clone());
                    }
                }
                ClassifiedEvent::AuthError { .. } | ClassifiedEvent::FatalError { .. } => {
                    warn!("[Inbox:{}] Realtime updates unavailable", consumer);
                }
                ClassifiedEvent::ConnectionClosed { .. } | ClassifiedEvent::NotificationReceived(_) => {}
            }
            Ok(())
        });

        debug!("[Inbox:{}] Attached as subscriber {}", name, subscription.id());
        Self {
            name,
            inbox,
            api,
            subscription,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscription_id(&self) -> u64 {
        self.subscription.id()
    }

    /// Shared handle to the underlying inbox
    pub fn inbox(&self) -> Arc<Mutex<NotificationInbox>> {
        Arc::clone(&self.inbox)
    }

    pub fn unread_count(&self) -> u64 {
        self.inbox.lock().unread_count()
    }

    pub fn realtime_available(&self) -> bool {
        self.inbox.lock().realtime_available()
    }

    /// Copy of a feed's current items, most recent first
    pub fn items(&self, feed: &str) -> Vec<NotificationRecord> {
        self.inbox
            .lock()
            .feed(feed)
            .map(|f| f.items().cloned().collect())
            .unwrap_or_default()
    }

    fn api(&self) -> Result<&Arc<dyn NotificationApi>> {
        self.api.as_ref().ok_or_else(|| {
            NotifyError::Configuration(format!("consumer '{}' has no notification API", self.name))
        })
    }

    /// Replace the local unread count with the server's
    pub async fn resync(&self, identity: &Identity) -> Result<u64> {
        let count = self.api()?.unread_count(identity).await?;
        self.inbox.lock().set_unread_count(count);
        Ok(count)
    }

    /// Fetch one page for `feed` using its current filter and load it
    pub async fn load_page(&self, identity: &Identity, feed: &str, page: u32) -> Result<NotificationPage> {
        let (filter, capacity) = {
            let inbox = self.inbox.lock();
            let f = inbox
                .feed(feed)
                .ok_or_else(|| NotifyError::Configuration(format!("unknown feed '{}'", feed)))?;
            (f.filter().clone(), f.capacity())
        };

        let query = PageQuery::for_filter(&filter, page, capacity as u32);
        let fetched = self.api()?.list(identity, &query).await?;

        let records: Vec<NotificationRecord> = match &filter {
            NotificationFilter::Custom(_) => fetched
                .content
                .iter()
                .filter(|record| filter.accepts(record))
                .cloned()
                .collect(),
            _ => fetched.content.clone(),
        };
        self.inbox.lock().replace_page(feed, page, records);
        Ok(fetched)
    }

    /// Mark notifications read on the server, then locally
    ///
    /// Returns how many local records were unread. On a failed request the
    /// ids the server accepted before it are still applied locally.
    pub async fn mark_read(&self, identity: &Identity, ids: &[NotificationId]) -> Result<u64> {
        let api = self.api()?;
        for (done, id) in ids.iter().enumerate() {
            if let Err(e) = api.mark_read(identity, id).await {
                // The server already applied the earlier ids
                self.inbox.lock().mark_read(&ids[..done]);
                return Err(e);
            }
        }
        Ok(self.inbox.lock().mark_read(ids))
    }

    /// Mark everything read on the server, then locally
    pub async fn mark_all_read(&self, identity: &Identity) -> Result<u64> {
        let changed = self.api()?.mark_all_read(identity).await?;
        self.inbox.lock().mark_all_read();
        info!("[Inbox:{}] Marked all read ({} on server)", self.name, changed);
        Ok(changed)
    }
}

impl std::fmt::Debug for InboxConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxConsumer")
            .field("name", &self.name)
            .field("subscription", &self.subscription)
            .field("unread", &self.unread_count())
            .finish()
    }
}

fn spawn_resync(
    consumer: &str,
    inbox: Arc<Mutex<NotificationInbox>>,
    api: Arc<dyn NotificationApi>,
    identity: Identity,
) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("[Inbox:{}] No runtime, skipping unread re-sync", consumer);
        return;
    };

    let consumer = consumer.to_string();
    runtime.spawn(async move {
        match api.unread_count(&identity).await {
            Ok(count) => inbox.lock().set_unread_count(count),
            Err(e) => warn!("[Inbox:{}] Unread re-sync failed: {}", consumer, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::api::ListKind;
    use crate::consumer::inbox::NotificationFeed;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        unread: u64,
        unread_calls: AtomicUsize,
        marked: Mutex<Vec<NotificationId>>,
        queries: Mutex<Vec<PageQuery>>,
        reject: Option<NotificationId>,
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn list(&self, _identity: &Identity, query: &PageQuery) -> Result<NotificationPage> {
            self.queries.lock().push(query.clone());
            Ok(NotificationPage {
                content: vec![
                    NotificationRecord::new("10", "first").with_type("ORDER"),
                    NotificationRecord::new("9", "second").with_type("PAYMENT"),
                ],
                total_elements: 2,
                total_pages: 1,
                number: query.page,
                size: query.size,
            })
        }

        async fn unread_count(&self, _identity: &Identity) -> Result<u64> {
            self.unread_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.unread)
        }

        async fn mark_read(&self, _identity: &Identity, id: &NotificationId) -> Result<()> {
            if self.reject.as_ref() == Some(id) {
                return Err(NotifyError::Http(format!("PUT /{}/read returned 500", id)));
            }
            self.marked.lock().push(id.clone());
            Ok(())
        }

        async fn mark_all_read(&self, _identity: &Identity) -> Result<u64> {
            Ok(3)
        }
    }

    fn established() -> ClassifiedEvent {
        ClassifiedEvent::ConnectionEstablished {
            identity: Identity::from("u1"),
        }
    }

    #[tokio::test]
    async fn test_established_triggers_resync() {
        let registry = SubscriberRegistry::new();
        let api = Arc::new(FakeApi {
            unread: 7,
            ..FakeApi::default()
        });
        let consumer = InboxConsumer::attach(
            &registry,
            "bell",
            NotificationInbox::single(10),
            Some(api.clone() as Arc<dyn NotificationApi>),
        );

        registry.publish(&ClassifiedEvent::NotificationReceived(NotificationRecord::new("n1", "x")));
        assert_eq!(consumer.unread_count(), 1);

        registry.publish(&established());
        for _ in 0..100 {
            if consumer.unread_count() == 7 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(consumer.unread_count(), 7);
        assert_eq!(api.unread_calls.load(Ordering::SeqCst), 1);
        assert!(consumer.realtime_available());
    }

    #[tokio::test]
    async fn test_consumers_are_independent() {
        let registry = SubscriberRegistry::new();
        let bell = InboxConsumer::attach(&registry, "bell", NotificationInbox::single(2), None);
        let page = InboxConsumer::attach(
            &registry,
            "page",
            NotificationInbox::new().with_feed(
                NotificationFeed::new("orders", 10).with_filter(NotificationFilter::Type("ORDER".into())),
            ),
            None,
        );

        for (id, kind) in [("1", "ORDER"), ("2", "PAYMENT"), ("3", "ORDER"), ("1", "ORDER")] {
            registry.publish(&ClassifiedEvent::NotificationReceived(
                NotificationRecord::new(id, "x").with_type(kind),
            ));
        }

        assert_eq!(bell.items("all").len(), 2);
        assert_eq!(page.items("orders").len(), 2);
        assert_eq!(bell.unread_count(), 3);
        assert_eq!(page.unread_count(), 3);

        drop(page);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_goes_through_api() {
        let registry = SubscriberRegistry::new();
        let api = Arc::new(FakeApi::default());
        let consumer = InboxConsumer::attach(
            &registry,
            "bell",
            NotificationInbox::single(10),
            Some(api.clone() as Arc<dyn NotificationApi>),
        );
        registry.publish(&ClassifiedEvent::NotificationReceived(NotificationRecord::new("n1", "x")));

        let identity = Identity::from("u1");
        let changed = consumer.mark_read(&identity, &[NotificationId::from("n1")]).await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(consumer.unread_count(), 0);
        assert_eq!(*api.marked.lock(), vec![NotificationId::from("n1")]);

        assert_eq!(consumer.mark_all_read(&identity).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_mark_read_keeps_server_side_progress() {
        let registry = SubscriberRegistry::new();
        let api = Arc::new(FakeApi {
            reject: Some(NotificationId::from("n2")),
            ..FakeApi::default()
        });
        let consumer = InboxConsumer::attach(
            &registry,
            "bell",
            NotificationInbox::single(10),
            Some(api.clone() as Arc<dyn NotificationApi>),
        );
        for id in ["n1", "n2", "n3"] {
            registry.publish(&ClassifiedEvent::NotificationReceived(NotificationRecord::new(id, "x")));
        }

        let ids = [NotificationId::from("n1"), NotificationId::from("n2"), NotificationId::from("n3")];
        let result = consumer.mark_read(&Identity::from("u1"), &ids).await;
        assert!(matches!(result, Err(NotifyError::Http(_))));

        assert_eq!(*api.marked.lock(), vec![NotificationId::from("n1")]);
        assert_eq!(consumer.unread_count(), 2);
        let unread: Vec<String> = consumer
            .items("all")
            .iter()
            .filter(|r| r.is_unread())
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(unread, vec!["n3", "n2"]);
    }

    #[tokio::test]
    async fn test_load_page_uses_feed_filter() {
        let registry = SubscriberRegistry::new();
        let api = Arc::new(FakeApi::default());
        let consumer = InboxConsumer::attach(
            &registry,
            "page",
            NotificationInbox::new()
                .with_feed(NotificationFeed::new("unread", 5).with_filter(NotificationFilter::Unread))
                .with_feed(
                    NotificationFeed::new("custom", 5)
                        .with_filter(NotificationFilter::custom(|r| r.notification_type == "ORDER")),
                ),
            Some(api.clone() as Arc<dyn NotificationApi>),
        );

        let identity = Identity::from("u1");
        consumer.load_page(&identity, "unread", 1).await.unwrap();
        consumer.load_page(&identity, "custom", 0).await.unwrap();

        let queries = api.queries.lock().clone();
        assert_eq!(queries[0], PageQuery::new(ListKind::Unread, 1, 5));
        assert_eq!(queries[1].kind, ListKind::All);

        assert_eq!(consumer.items("unread").len(), 2);
        assert_eq!(consumer.items("custom").len(), 1);
        assert!(consumer.load_page(&identity, "missing", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_without_api() {
        let registry = SubscriberRegistry::new();
        let consumer = InboxConsumer::attach(&registry, "bell", NotificationInbox::single(5), None);
        let err = consumer.resync(&Identity::from("u1")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Configuration(_)));
    }
}
