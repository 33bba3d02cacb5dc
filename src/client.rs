//! Authenticated IPS client.
//!
//! Every operation follows the same pipeline: resolve the resource URI through
//! the cached link map, build the body, canonicalize, sign, attach the
//! `IPSAuth` header and dispatch through the [`Transport`]. Any non-2xx answer
//! becomes a [`RemoteRejection`]. Nothing is retried.

use std::sync::Arc;

use reqwest::header::HeaderValue;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use x509_cert::Certificate;

use crate::auth::RequestSigner;
use crate::canonical::METHOD_OVERRIDE_HEADER;
use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::engine::CmsEngine;
use crate::error::{Error, ProtocolError, RemoteRejection, Result, TransportError};
use crate::links::{self, LinkMap, LinkResolver, DISCOVERY_QUERY};
use crate::message::{Message, MessageCollection, OutgoingPayment, StateChange};
use crate::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

pub struct ApiClient<T = ReqwestTransport> {
    config: ClientConfig,
    credentials: Arc<Credentials>,
    signer: RequestSigner,
    engine: CmsEngine,
    links: LinkResolver,
    transport: T,
}

impl ApiClient<ReqwestTransport> {
    /// Client over HTTPS with the timeouts from `config`.
    pub fn connect(config: ClientConfig, credentials: impl Into<Arc<Credentials>>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout, config.connect_timeout)?;
        Ok(Self::new(config, credentials, transport))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(config: ClientConfig, credentials: impl Into<Arc<Credentials>>, transport: T) -> Self {
        let credentials = credentials.into();
        let engine = CmsEngine::new();
        let signer = RequestSigner::new(
            config.participant_id.clone(),
            Arc::clone(&credentials),
            engine.clone(),
            config.query_canonicalization,
        );
        Self {
            config,
            credentials,
            signer,
            engine,
            links: LinkResolver::new(),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn participant_id(&self) -> &str {
        &self.config.participant_id
    }

    pub fn engine(&self) -> &CmsEngine {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn link_resolver(&self) -> &LinkResolver {
        &self.links
    }

    // -----------------------------------------------------------------------
    // Message lifecycle
    // -----------------------------------------------------------------------

    /// Encrypt `payment.content` for the receiver and PUT it to `{outbox}/{ref}`.
    pub fn send(&self, receiver_certificate: &Certificate, payment: &OutgoingPayment) -> Result<()> {
        let envelope = self
            .engine
            .encrypt(payment.content.as_bytes(), receiver_certificate)?;
        let message = Message::outgoing(payment, &envelope);
        let body = serde_json::to_vec(&message)
            .map_err(|source| ProtocolError::Json { what: "message", source })?;

        let url = self.outbox_message_url(&payment.reference)?;
        let request = ApiRequest::new(Method::PUT, url).with_json(body);
        self.execute(request)?;

        tracing::info!(
            reference = %payment.reference,
            receiver = %payment.receiver,
            "message sent"
        );
        Ok(())
    }

    /// Withdraw a sent message that is still `New`.
    pub fn cancel(&self, reference: &str, reason: Option<&str>) -> Result<()> {
        let url = self.outbox_message_url(reference)?;
        let change = StateChange::Cancel {
            reason: reason.map(str::to_owned),
        };
        self.change_state_at(url, &change)?;
        tracing::info!(reference, "message cancelled");
        Ok(())
    }

    /// Accept a received message.
    pub fn complete(&self, message_id: i64) -> Result<()> {
        let url = self.inbox_message_url(message_id)?;
        self.change_state_at(url, &StateChange::Complete)?;
        tracing::info!(message_id, "message completed");
        Ok(())
    }

    /// Refuse a received message.
    pub fn reject(&self, message_id: i64, reason: &str) -> Result<()> {
        let url = self.inbox_message_url(message_id)?;
        let change = StateChange::Reject {
            reason: reason.to_owned(),
        };
        self.change_state_at(url, &change)?;
        tracing::info!(message_id, reason, "message rejected");
        Ok(())
    }

    /// PATCH (tunnelled over POST) the state of the message at `message_uri`.
    pub fn change_state(&self, message_uri: &str, change: &StateChange) -> Result<()> {
        self.change_state_at(self.url(message_uri)?, change)
    }

    fn change_state_at(&self, url: Url, change: &StateChange) -> Result<()> {
        let body = serde_json::to_vec(&change.body())
            .map_err(|source| ProtocolError::Json { what: "state change", source })?;
        let mut request = ApiRequest::new(Method::POST, url).with_json(body);
        request
            .headers
            .insert(METHOD_OVERRIDE_HEADER, HeaderValue::from_static("PATCH"));
        self.execute(request)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Browsing
    // -----------------------------------------------------------------------

    /// Sent messages with their state. `cursor` is a `next` value from an
    /// earlier page; without it the whole outbox is listed.
    pub fn browse_outbox(&self, cursor: Option<&str>) -> Result<MessageCollection> {
        let uri = match cursor {
            Some(uri) => uri.to_owned(),
            None => self.link(links::OUTBOX_STATE)?,
        };
        self.browse(&uri)
    }

    /// Received messages: all of them, or only those still `New`.
    pub fn browse_inbox(&self, all: bool) -> Result<MessageCollection> {
        let relation = if all { links::INBOX } else { links::INBOX_NEW };
        let uri = self.link(relation)?;
        self.browse(&uri)
    }

    /// GET any collection URI, such as a `next` cursor.
    pub fn browse(&self, uri: &str) -> Result<MessageCollection> {
        let response = self.execute(ApiRequest::new(Method::GET, self.url(uri)?))?;
        parse(&response, "message collection")
    }

    /// Decrypt a received message with this participant's key.
    pub fn decrypt(&self, message: &Message) -> Result<String> {
        message.decrypt_content(&self.engine, self.credentials.private_key())
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// URI for `relation`, discovering the link map on first use.
    pub fn link(&self, relation: &str) -> Result<String> {
        self.links.resolve(relation, || self.discover())
    }

    /// Fetch the link map from the account root, bypassing the cache.
    pub fn discover(&self) -> Result<LinkMap> {
        let url = format!(
            "{}/api/{}?{}",
            self.config.api_root, self.config.participant_id, DISCOVERY_QUERY
        );
        tracing::debug!(url = %url, "discovering links");
        let response = self.execute(ApiRequest::new(Method::GET, parse_url(&url)?))?;
        Ok(LinkMap::from_discovery(&response.body)?)
    }

    fn outbox_message_url(&self, reference: &str) -> Result<Url> {
        let outbox = self.link(links::OUTBOX)?;
        member_url(self.url(&outbox)?, reference)
    }

    fn inbox_message_url(&self, message_id: i64) -> Result<Url> {
        let inbox = self.link(links::INBOX)?;
        member_url(self.url(&inbox)?, &message_id.to_string())
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Server-relative URIs are appended to the API root; absolute ones pass through.
    fn url(&self, uri: &str) -> Result<Url> {
        if uri.starts_with("https://") || uri.starts_with("http://") {
            parse_url(uri)
        } else {
            parse_url(&format!("{}{}", self.config.api_root, uri))
        }
    }

    fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        self.signer.sign(&mut request)?;

        let method = request.method.clone();
        let path = request.url.path().to_owned();
        tracing::debug!(%method, path = %path, "dispatching request");

        let response = self.transport.execute(request)?;
        if response.is_success() {
            return Ok(response);
        }

        let rejection = RemoteRejection::from_response(response.status, &response.body);
        tracing::warn!(
            %method,
            path = %path,
            status = rejection.status,
            reason = rejection.reason.as_deref().unwrap_or(""),
            "request rejected"
        );
        Err(rejection.into())
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| {
        TransportError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// `collection` with `key` appended as exactly one percent-encoded path segment.
fn member_url(mut collection: Url, key: &str) -> Result<Url> {
    // `.` and `..` would be dropped rather than encoded.
    if key.is_empty() || key == "." || key == ".." {
        return Err(invalid_member(&collection, key, "not a resource key"));
    }
    let base = collection.clone();
    collection
        .path_segments_mut()
        .map_err(|()| invalid_member(&base, key, "collection uri has no path"))?
        .pop_if_empty()
        .push(key);
    Ok(collection)
}

fn invalid_member(collection: &Url, key: &str, reason: &str) -> Error {
    TransportError::InvalidUrl {
        url: format!("{}/{}", collection, key),
        reason: reason.to_owned(),
    }
    .into()
}

fn parse<D: DeserializeOwned>(response: &ApiResponse, what: &'static str) -> Result<D> {
    serde_json::from_slice(&response.body).map_err(|source| ProtocolError::Json { what, source }.into())
}
