//! In-process transport double for dialects whose hosts cannot be redirected
//! to a mock server.

use crate::dialect::{Dialect, DialectCore, DialectSettings};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use ras_identity_core::IdentityFields;
use std::sync::{Arc, Mutex};

struct Route {
    method: HttpMethod,
    endpoint: String,
    status: u16,
    body: String,
}

/// Answers requests by method and endpoint (URL without query string) and
/// records everything it was sent. Unrouted requests get a 404.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Vec<Route>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(
        mut self,
        method: HttpMethod,
        endpoint: &str,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.routes.push(Route {
            method,
            endpoint: endpoint.to_string(),
            status,
            body: body.into(),
        });
        self
    }

    pub(crate) fn get(self, endpoint: &str, body: impl Into<String>) -> Self {
        self.on(HttpMethod::Get, endpoint, 200, body)
    }

    pub(crate) fn post(self, endpoint: &str, body: impl Into<String>) -> Self {
        self.on(HttpMethod::Post, endpoint, 200, body)
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The single request sent to `endpoint`; panics unless exactly one was.
    pub(crate) fn request_to(&self, endpoint: &str) -> HttpRequest {
        let matching: Vec<_> = self
            .requests()
            .into_iter()
            .filter(|r| r.endpoint() == endpoint)
            .collect();
        assert_eq!(matching.len(), 1, "requests to {}: {:?}", endpoint, matching);
        matching.into_iter().next().unwrap()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .routes
            .iter()
            .find(|route| route.method == request.method && route.endpoint == request.endpoint())
            .map(|route| HttpResponse {
                status: route.status,
                body: route.body.clone(),
            })
            .unwrap_or(HttpResponse {
                status: 404,
                body: String::new(),
            });

        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

pub(crate) fn settings() -> DialectSettings {
    DialectSettings {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_url: "https://app.example.com/callback".to_string(),
        ..Default::default()
    }
}

/// A core wired to `transport`, returning the transport for inspection.
pub(crate) fn core_with(transport: ScriptedTransport) -> (DialectCore, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    (DialectCore::new(settings(), transport.clone()), transport)
}

/// Exchanges `code` and maps the fetched profile, as a flow would.
pub(crate) async fn complete(dialect: &dyn Dialect, code: &str) -> IdentityFields {
    let tokens = dialect.exchange_code(code).await.unwrap();
    let raw = dialect.fetch_raw_profile(&tokens).await.unwrap();
    dialect.normalize_profile(raw, &tokens).unwrap()
}

/// Decoded query parameters of a URL.
pub(crate) fn query_of(url: &str) -> std::collections::HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}
