//! Mock public key endpoint.
//!
//! Serves a PEM public key over HTTP the way a server exposes its key to
//! runners. The served response can be swapped mid-test to simulate key
//! rotation or an outage.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the public key on.
pub const PUBLIC_KEY_PATH: &str = "/v1/auth/public-key";

pub struct MockKeyServer {
    server: MockServer,
}

impl MockKeyServer {
    /// Start a server answering `GET PUBLIC_KEY_PATH` with `public_pem`.
    pub async fn start(public_pem: &str) -> Self {
        let server = MockServer::start().await;
        let mock = Self { server };
        mock.serve_key(public_pem).await;
        mock
    }

    /// Full URL of the public key endpoint.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), PUBLIC_KEY_PATH)
    }

    /// Replace the served key.
    pub async fn serve_key(&self, public_pem: &str) {
        self.respond_with(ResponseTemplate::new(200).set_body_string(public_pem))
            .await;
    }

    /// Answer every request with `status` and an empty body.
    pub async fn fail_with(&self, status: u16) {
        self.respond_with(ResponseTemplate::new(status)).await;
    }

    /// Answer with a success status but a body that is not a key.
    pub async fn serve_garbage(&self) {
        self.respond_with(ResponseTemplate::new(200).set_body_string("<html>not a key</html>"))
            .await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Authorization header of the most recent request, if any.
    pub async fn last_authorization(&self) -> Option<String> {
        let requests = self.server.received_requests().await?;
        let last = requests.last()?;
        last.headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    }

    async fn respond_with(&self, template: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(PUBLIC_KEY_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }
}
