//! Correlation store.
//!
//! Pending requests are keyed by message ID, authentications by IdP session
//! index, with a secondary index from subject name identifier to session
//! index for logout lookups. Entries are ephemeral and expire by TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sp_cache::AtomicCacheProvider;

use crate::error::{SamlError, SamlResult};
use crate::query::{Authentication, RequestWaitingForResponse};

/// Key-value contract for SAML correlation state.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Stores a request waiting for its response.
    ///
    /// Fails if the request ID is empty.
    async fn store_request(&self, request: &RequestWaitingForResponse) -> SamlResult<()>;

    /// Looks up a pending request.
    async fn find_request(&self, id: &str) -> SamlResult<Option<RequestWaitingForResponse>>;

    /// Removes a pending request.
    async fn remove_request(&self, id: &str) -> SamlResult<()>;

    /// Looks up and removes a pending request.
    ///
    /// Implementations backed by an atomic cache make this a single
    /// operation so that one request is matched by at most one response.
    async fn take_request(&self, id: &str) -> SamlResult<Option<RequestWaitingForResponse>> {
        let request = self.find_request(id).await?;
        if request.is_some() {
            self.remove_request(id).await?;
        }
        Ok(request)
    }

    /// Stores an authentication under its session index.
    ///
    /// Fails with [`SamlError::DuplicateAuthentication`] when the session
    /// index is already present.
    async fn store_authentication(&self, authentication: &Authentication) -> SamlResult<()>;

    /// Looks up an authentication.
    async fn find_authentication(&self, session_index: &str) -> SamlResult<Option<Authentication>>;

    /// Removes an authentication and its name identifier index.
    async fn remove_authentication(&self, session_index: &str) -> SamlResult<()>;

    /// Returns the session index last stored for a subject.
    async fn find_session_index_by_name_id(&self, name_id: &str) -> SamlResult<Option<String>>;

    /// Records an inbound message `(issuer, id)` for `ttl`.
    ///
    /// Returns `false` when the message was already seen within its window.
    async fn mark_message_seen(&self, issuer: &str, id: &str, ttl: Duration) -> SamlResult<bool>;

    /// Wipes all entries.
    async fn clear(&self) -> SamlResult<()>;
}

/// Correlation store on top of an atomic cache provider.
#[derive(Debug)]
pub struct CacheCorrelationStore<C> {
    cache: Arc<C>,
    prefix: String,
    request_ttl: Duration,
    authentication_ttl: Duration,
}

impl<C> Clone for CacheCorrelationStore<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            prefix: self.prefix.clone(),
            request_ttl: self.request_ttl,
            authentication_ttl: self.authentication_ttl,
        }
    }
}

impl<C: AtomicCacheProvider> CacheCorrelationStore<C> {
    /// Creates a store with the given entry lifetimes.
    #[must_use]
    pub fn new(cache: Arc<C>, request_ttl: Duration, authentication_ttl: Duration) -> Self {
        Self {
            cache,
            prefix: "saml".to_string(),
            request_ttl,
            authentication_ttl,
        }
    }

    /// Sets the prefix of every cache key.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn request_key(&self, id: &str) -> String {
        format!("{}:request:{id}", self.prefix)
    }

    fn authentication_key(&self, session_index: &str) -> String {
        format!("{}:authn:{session_index}", self.prefix)
    }

    fn name_id_key(&self, name_id: &str) -> String {
        format!("{}:nameid:{name_id}", self.prefix)
    }

    fn replay_key(&self, issuer: &str, id: &str) -> String {
        format!("{}:replay:{issuer}:{id}", self.prefix)
    }
}

#[async_trait]
impl<C: AtomicCacheProvider + 'static> CorrelationStore for CacheCorrelationStore<C> {
    async fn store_request(&self, request: &RequestWaitingForResponse) -> SamlResult<()> {
        if request.id().is_empty() {
            return Err(SamlError::Storage(
                "cannot store a request without an ID".to_string(),
            ));
        }
        self.cache
            .set(&self.request_key(request.id()), request, Some(self.request_ttl))
            .await?;
        tracing::debug!(id = request.id(), kind = request.kind(), "Stored pending request");
        Ok(())
    }

    async fn find_request(&self, id: &str) -> SamlResult<Option<RequestWaitingForResponse>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.cache.get(&self.request_key(id)).await?)
    }

    async fn remove_request(&self, id: &str) -> SamlResult<()> {
        if id.is_empty() {
            return Ok(());
        }
        Ok(self.cache.delete(&self.request_key(id)).await?)
    }

    async fn take_request(&self, id: &str) -> SamlResult<Option<RequestWaitingForResponse>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.cache.get_del(&self.request_key(id)).await?)
    }

    async fn store_authentication(&self, authentication: &Authentication) -> SamlResult<()> {
        let session_index = authentication.session_index();
        if session_index.is_empty() {
            return Err(SamlError::Storage(
                "cannot store an authentication without a session index".to_string(),
            ));
        }

        let stored = self
            .cache
            .set_nx(
                &self.authentication_key(session_index),
                authentication,
                Some(self.authentication_ttl),
            )
            .await?;
        if !stored {
            return Err(SamlError::DuplicateAuthentication(session_index.to_string()));
        }

        if !authentication.subject_id().is_empty() {
            self.cache
                .set(
                    &self.name_id_key(authentication.subject_id()),
                    &session_index.to_string(),
                    Some(self.authentication_ttl),
                )
                .await?;
        }
        tracing::debug!(session_index, "Stored authentication");
        Ok(())
    }

    async fn find_authentication(&self, session_index: &str) -> SamlResult<Option<Authentication>> {
        if session_index.is_empty() {
            return Ok(None);
        }
        Ok(self.cache.get(&self.authentication_key(session_index)).await?)
    }

    async fn remove_authentication(&self, session_index: &str) -> SamlResult<()> {
        let Some(authentication) = self
            .cache
            .get_del::<Authentication>(&self.authentication_key(session_index))
            .await?
        else {
            return Ok(());
        };

        // Only drop the index if it still points at this session.
        let name_id_key = self.name_id_key(authentication.subject_id());
        let indexed: Option<String> = self.cache.get(&name_id_key).await?;
        if indexed.as_deref() == Some(session_index) {
            self.cache.delete(&name_id_key).await?;
        }
        Ok(())
    }

    async fn find_session_index_by_name_id(&self, name_id: &str) -> SamlResult<Option<String>> {
        if name_id.is_empty() {
            return Ok(None);
        }
        Ok(self.cache.get(&self.name_id_key(name_id)).await?)
    }

    async fn mark_message_seen(&self, issuer: &str, id: &str, ttl: Duration) -> SamlResult<bool> {
        if id.is_empty() {
            return Err(SamlError::Processing(
                "inbound message has no ID".to_string(),
            ));
        }
        Ok(self
            .cache
            .set_nx(&self.replay_key(issuer, id), &true, Some(ttl))
            .await?)
    }

    async fn clear(&self) -> SamlResult<()> {
        let removed = self
            .cache
            .delete_prefix(&format!("{}:", self.prefix))
            .await?;
        tracing::debug!(removed, "Cleared correlation store");
        Ok(())
    }
}
