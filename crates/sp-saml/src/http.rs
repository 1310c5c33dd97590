//! Inbound HTTP request abstraction.
//!
//! Hosts translate their framework request into an [`InboundRequest`]:
//! method, full URL and the decoded query or form parameters.

use std::collections::HashMap;

use crate::error::{SamlError, SamlResult};

/// An HTTP request received on a SAML endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    method: String,
    url: url::Url,
    params: HashMap<String, String>,
}

impl InboundRequest {
    /// Creates a request; query parameters of `url` are collected.
    pub fn new(method: impl Into<String>, url: &str) -> SamlResult<Self> {
        let url = url::Url::parse(url)
            .map_err(|e| SamlError::Processing(format!("Invalid request URL {url}: {e}")))?;
        let params = url.query_pairs().into_owned().collect();
        Ok(Self {
            method: method.into(),
            url,
            params,
        })
    }

    /// Creates a GET request carrying HTTP-Redirect parameters in its URL.
    pub fn get(url: &str) -> SamlResult<Self> {
        Self::new("GET", url)
    }

    /// Creates a POST request with decoded form fields.
    pub fn post<I, K, V>(url: &str, form: I) -> SamlResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::new("POST", url)?;
        request
            .params
            .extend(form.into_iter().map(|(k, v)| (k.into(), v.into())));
        Ok(request)
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Request path, with any `;jsessionid=` suffix removed.
    #[must_use]
    pub fn path(&self) -> &str {
        strip_session_suffix(self.url.path())
    }

    /// Last non-empty path segment, with any `;jsessionid=` suffix removed.
    #[must_use]
    pub fn last_path_segment(&self) -> Option<&str> {
        self.url
            .path_segments()?
            .rev()
            .find(|s| !s.is_empty())
            .map(strip_session_suffix)
    }

    /// Parameter value, from the query string or the form body.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Endpoint URL without query string and `;jsessionid=` suffix.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let mut endpoint = self.url.clone();
        endpoint.set_query(None);
        endpoint.set_fragment(None);
        strip_session_suffix(endpoint.as_str()).to_string()
    }
}

/// Removes a `;jsessionid=...` suffix.
#[must_use]
pub fn strip_session_suffix(url: &str) -> &str {
    url.find(";jsessionid=").map_or(url, |at| &url[..at])
}
