//! Shared fixtures: generated credentials and an in-memory IPS server stub.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, OnceLock};

use ips_client::{
    ApiClient, ApiRequest, ApiResponse, ClientConfig, CmsEngine, Credentials, Transport,
    TransportError,
};

pub const API_ROOT: &str = "https://ips.example";
pub const PARTICIPANT: &str = "BANKLV22";
pub const RECEIVER: &str = "BANKEE2X";

pub const LINKS: &str = r#"{"links":{
    "inbox":"/api/BANKLV22/inbox",
    "inboxNew":"/api/BANKLV22/inbox/new",
    "outbox":"/api/BANKLV22/outbox",
    "outboxState":"/api/BANKLV22/outbox/state"}}"#;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Credentials of the participant under test.
pub fn participant() -> Arc<Credentials> {
    static CREDS: OnceLock<Arc<Credentials>> = OnceLock::new();
    Arc::clone(CREDS.get_or_init(|| {
        Arc::new(Credentials::generate_self_signed(PARTICIPANT, 1024).unwrap())
    }))
}

/// Credentials of a counterpart bank.
pub fn receiver() -> Arc<Credentials> {
    static CREDS: OnceLock<Arc<Credentials>> = OnceLock::new();
    Arc::clone(CREDS.get_or_init(|| {
        Arc::new(Credentials::generate_self_signed(RECEIVER, 1024).unwrap())
    }))
}

// ---------------------------------------------------------------------------
// Stub transport
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync;

/// Answers through a handler and records every request it sees.
pub struct StubTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests other than link discovery.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !is_discovery(r))
            .collect()
    }

    pub fn discovery_count(&self) -> usize {
        self.requests().iter().filter(|r| is_discovery(r)).count()
    }
}

impl Transport for StubTransport {
    fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }
}

pub fn is_discovery(request: &ApiRequest) -> bool {
    request.url.path() == format!("/api/{}", PARTICIPANT) && request.url.query() == Some("fields=links")
}

/// Discovery answered with [`LINKS`]; everything else delegated to `rest`.
pub fn with_links<F>(rest: F) -> Arc<StubTransport>
where
    F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
{
    StubTransport::new(move |req| {
        if is_discovery(req) {
            Ok(ApiResponse::new(200, LINKS))
        } else {
            rest(req)
        }
    })
}

pub fn client(transport: &Arc<StubTransport>) -> ApiClient<Arc<StubTransport>> {
    ApiClient::new(
        ClientConfig::new(API_ROOT, PARTICIPANT),
        participant(),
        Arc::clone(transport),
    )
}

/// Base64 CMS envelope of `text` for `to`.
pub fn envelope_for(text: &str, to: &Credentials) -> String {
    use base64::Engine as _;
    let enveloped = CmsEngine::new()
        .encrypt(text.as_bytes(), to.certificate())
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(enveloped)
}
