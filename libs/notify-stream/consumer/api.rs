//! CRUD collaborator
//!
//! The realtime path never calls the backend on its own. Consumers use this
//! API to load authoritative pages and re-sync the unread counter, e.g.
//! after a reconnect, since nothing is guaranteed across a reconnect gap.

use crate::auth::CredentialProvider;
use crate::consumer::filter::NotificationFilter;
use crate::error::{NotifyError, Result};
use crate::frame::Identity;
use crate::record::{NotificationId, NotificationRecord};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which server-side list to page through
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListKind {
    #[default]
    All,
    Unread,
    Type(String),
    Search(String),
}

/// One page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub kind: ListKind,
    pub page: u32,
    pub size: u32,
}

impl PageQuery {
    pub fn new(kind: ListKind, page: u32, size: u32) -> Self {
        Self { kind, page, size }
    }

    /// Server-side query matching a feed filter
    ///
    /// Custom predicates cannot be sent to the server; they page through
    /// everything and are applied locally.
    pub fn for_filter(filter: &NotificationFilter, page: u32, size: u32) -> Self {
        let kind = match filter {
            NotificationFilter::All | NotificationFilter::Custom(_) => ListKind::All,
            NotificationFilter::Unread => ListKind::Unread,
            NotificationFilter::Type(kind) => ListKind::Type(kind.clone()),
            NotificationFilter::Search(term) if term.trim().is_empty() => ListKind::All,
            NotificationFilter::Search(term) => ListKind::Search(term.clone()),
        };
        Self::new(kind, page, size)
    }
}

/// A page of notifications as returned by the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPage {
    pub content: Vec<NotificationRecord>,
    pub total_elements: u64,
    pub total_pages: u32,
    /// Zero-based page index
    pub number: u32,
    pub size: u32,
}

/// Trait for the paginated CRUD API the consumers fall back on
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list(&self, identity: &Identity, query: &PageQuery) -> Result<NotificationPage>;

    async fn unread_count(&self, identity: &Identity) -> Result<u64>;

    /// Idempotent: marking an already read notification succeeds
    async fn mark_read(&self, identity: &Identity, id: &NotificationId) -> Result<()>;

    /// Returns how many notifications the server changed
    async fn mark_all_read(&self, identity: &Identity) -> Result<u64>;
}

/// `NotificationApi` over HTTP against `{base_url}/api/notifications`
pub struct HttpNotificationApi {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpNotificationApi {
    pub fn new<P>(base_url: impl Into<String>, credentials: P, timeout: Duration) -> Result<Self>
    where
        P: CredentialProvider + 'static,
    {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: Arc::new(credentials),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/notifications{}", self.base_url, path)
    }

    async fn authorized(&self, identity: &Identity, request: RequestBuilder) -> Result<RequestBuilder> {
        let credential = self.credentials.credential(identity).await?.ok_or_else(|| {
            NotifyError::AuthenticationFailure(format!("no credential available for {}", identity))
        })?;
        Ok(request.header(AUTHORIZATION, credential.bearer()))
    }

    async fn send(&self, identity: &Identity, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorized(identity, request).await?.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(NotifyError::AuthenticationFailure(format!(
                "notification API returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("[API] Request failed with {}: {}", status, body);
            return Err(NotifyError::Http(format!("notification API returned {}", status)));
        }
        Ok(response)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, identity: &Identity, query: &PageQuery) -> Result<NotificationPage> {
        let user = identity.as_str();
        let (url, search) = match &query.kind {
            ListKind::All => (self.url(&format!("/user/{}", user)), None),
            ListKind::Unread => (self.url(&format!("/user/{}/unread", user)), None),
            ListKind::Type(kind) => (self.url(&format!("/user/{}/type/{}", user, kind)), None),
            ListKind::Search(term) => (self.url(&format!("/user/{}/search", user)), Some(term)),
        };

        debug!("[API] Fetching page {} of {}", query.page, url);

        let mut request = self
            .client
            .get(&url)
            .query(&[("page", query.page), ("size", query.size)]);
        if let Some(term) = search {
            request = request.query(&[("searchTerm", term)]);
        }

        let page: NotificationPage = self
            .send(identity, request)
            .await?
            .json()
            .await
            .map_err(|e| NotifyError::Http(format!("failed to decode page: {}", e)))?;

        debug!(
            "[API] Fetched {} notification(s), {} total",
            page.content.len(),
            page.total_elements
        );
        Ok(page)
    }

    async fn unread_count(&self, identity: &Identity) -> Result<u64> {
        let url = self.url(&format!("/user/{}/unread/count", identity.as_str()));
        let request = self.client.get(&url);
        self.send(identity, request)
            .await?
            .json()
            .await
            .map_err(|e| NotifyError::Http(format!("failed to decode unread count: {}", e)))
    }

    async fn mark_read(&self, identity: &Identity, id: &NotificationId) -> Result<()> {
        let url = self.url(&format!("/{}/read", id));
        let request = self.client.put(&url).query(&[("userId", identity.as_str())]);
        self.send(identity, request).await?;
        debug!("[API] Marked {} read", id);
        Ok(())
    }

    async fn mark_all_read(&self, identity: &Identity) -> Result<u64> {
        let url = self.url(&format!("/user/{}/read-all", identity.as_str()));
        let request = self.client.put(&url);
        self.send(identity, request)
            .await?
            .json()
            .await
            .map_err(|e| NotifyError::Http(format!("failed to decode mark-all count: {}", e)))
    }
}
