//! SAML 2.0 Service Provider protocol engine.
//!
//! This crate implements the service provider side of SAML 2.0 Web SSO and
//! Single Logout:
//!
//! - **AuthnRequest and LogoutRequest building** - signed, correlated and
//!   encoded for the HTTP-Redirect or HTTP-POST binding
//! - **Inbound processing** - a staged pipeline turning an HTTP request
//!   into a validated [`Query`]
//! - **Signature trust** - enveloped XML signatures checked against the
//!   issuing IdP, with signature wrapping defenses
//! - **Replay protection** - single-use correlation of responses and a
//!   replay cache for inbound messages and authentications
//! - **Decryption** - encrypted assertions, identifiers and attributes
//!
//! # Architecture
//!
//! - [`types`] - SAML object model
//! - [`xml`] - namespace-aware element tree and exclusive canonicalization
//! - [`bindings`] - POST and Redirect binding codecs
//! - [`signature`] - enveloped signing and trust evaluation
//! - [`security`] - time checks, decryption and the security-audit channel
//! - [`store`] - correlation store for requests and authentications
//! - [`connector`] - outbound messages per IdP
//! - [`processor`] - inbound processing stages
//! - [`sp`] / [`facade`] - wiring and host entry points
//!
//! # Example
//!
//! ```rust,ignore
//! use sp_saml::{SamlConfig, SpFacade, SpProcessor, InboundRequest};
//!
//! let config = SamlConfig::load("saml.toml")?;
//! let processor = SpProcessor::from_config(&config, store)?.build()?;
//! let facade = SpFacade::new(Arc::new(processor));
//!
//! let request = InboundRequest::post(url, form)?;
//! let incoming = facade.process_incoming(request).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod config;
pub mod connector;
pub mod error;
pub mod facade;
pub mod http;
pub mod message;
pub mod processor;
pub mod query;
pub mod relay_state;
pub mod security;
pub mod signature;
pub mod sp;
pub mod store;
pub mod types;
pub mod xml;

pub use config::{IdpConfig, ProcessorConfig, SamlConfig, SpConfig};
pub use connector::{ConnectorRegistry, IdpConnector};
pub use error::{SamlError, SamlResult};
pub use facade::{SessionIndexProvider, SpFacade};
pub use http::InboundRequest;
pub use message::{IncomingMessage, OutgoingMessage};
pub use processor::{ProcessingStage, ProcessorKind, QueryProcessor};
pub use query::{Authentication, Query};
pub use relay_state::RelayState;
pub use sp::{HttpSloResponseSender, SingleLogoutHandler, SloResponseSender, SpProcessor};
pub use store::{CacheCorrelationStore, CorrelationStore};
pub use types::SamlBinding;
