//! HTTP client for the external notes service.
//!
//! Every request identifies the learner by an anonymized id and carries the
//! service ID token in the `x-annotator-auth-token` header. Response bodies
//! are returned verbatim; parsing and enrichment live in `coursenotes-core`.

use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use coursenotes_core::AnnotationSource;
use coursenotes_shared::{Actor, CourseKey, CourseNotesError, NotesConfig, Result};

/// User-Agent string for notes requests.
const USER_AGENT: &str = concat!("coursenotes/", env!("CARGO_PKG_VERSION"));

/// Header carrying the service ID token.
pub const TOKEN_HEADER: &str = "x-annotator-auth-token";

const ANNOTATIONS_PATH: &str = "annotations";
const SEARCH_PATH: &str = "search";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable anonymized id for a user: hex SHA-256 of the secret followed by the
/// decimal user id.
pub fn anonymous_id_for_user(secret: &str, user_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(user_id.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Supplies the ID token sent with each request.
pub trait TokenSource {
    fn id_token(&self) -> Result<String>;
}

/// Reads the token from an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn from_config(config: &NotesConfig) -> Self {
        Self::new(config.token_env.clone())
    }
}

impl TokenSource for EnvToken {
    fn id_token(&self) -> Result<String> {
        std::env::var(&self.var)
            .map_err(|_| CourseNotesError::config(format!("notes ID token not set in ${}", self.var)))
    }
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn id_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Notes service client.
pub struct NotesClient<T> {
    http: Client,
    config: NotesConfig,
    secret: String,
    token: T,
}

impl<T: TokenSource> NotesClient<T> {
    /// Build a client. `secret` anonymizes user ids.
    pub fn new(config: &NotesConfig, secret: impl Into<String>, token: T) -> Result<Self> {
        Ok(Self {
            http: build_client(config)?,
            config: config.clone(),
            secret: secret.into(),
            token,
        })
    }

    /// Resolve a service path against the configured base URL.
    pub fn get_endpoint(&self, path: &str) -> Result<Url> {
        self.config.endpoint(path)
    }

    #[instrument(skip_all, fields(user = actor.user_id, course = %course_key, path = %path))]
    async fn send_request(
        &self,
        actor: &Actor,
        course_key: &CourseKey,
        path: &str,
        text: Option<&str>,
    ) -> Result<String> {
        let url = self.get_endpoint(path)?;
        let token = self.token.id_token()?;

        let mut query = vec![
            ("user", anonymous_id_for_user(&self.secret, actor.user_id)),
            ("course_id", course_key.to_string()),
        ];
        if let Some(text) = text {
            query.push(("text", text.to_string()));
        }

        debug!(%url, "notes request");
        let response = self
            .http
            .get(url.clone())
            .query(&query)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| CourseNotesError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourseNotesError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| CourseNotesError::Network(format!("{url}: failed to read body: {e}")))
    }
}

impl<T: TokenSource> AnnotationSource for NotesClient<T> {
    async fn annotations(&self, actor: &Actor, course_key: &CourseKey) -> Result<String> {
        self.send_request(actor, course_key, ANNOTATIONS_PATH, None)
            .await
    }

    async fn search(&self, actor: &Actor, course_key: &CourseKey, text: &str) -> Result<String> {
        self.send_request(actor, course_key, SEARCH_PATH, Some(text))
            .await
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(config: &NotesConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CourseNotesError::Network(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "secret";

    fn config(url: Option<String>) -> NotesConfig {
        NotesConfig {
            url,
            ..NotesConfig::default()
        }
    }

    fn client(server: &MockServer) -> NotesClient<StaticToken> {
        NotesClient::new(
            &config(Some(format!("{}/api/v1", server.uri()))),
            SECRET,
            StaticToken("id-token".into()),
        )
        .unwrap()
    }

    fn course() -> CourseKey {
        CourseKey::new("edX", "DemoX", "2014")
    }

    #[test]
    fn anonymous_id_is_stable_hex() {
        let a = anonymous_id_for_user(SECRET, 42);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, anonymous_id_for_user(SECRET, 42));
        assert_ne!(a, anonymous_id_for_user(SECRET, 43));
        assert_ne!(a, anonymous_id_for_user("other", 42));
    }

    #[test]
    fn endpoint_normalization() {
        let c = NotesClient::new(
            &config(Some("http://notes.local/api/v1".into())),
            SECRET,
            StaticToken("t".into()),
        )
        .unwrap();
        assert_eq!(c.get_endpoint("/annotations").unwrap().as_str(), "http://notes.local/api/v1/annotations/");
        assert_eq!(c.get_endpoint("search/").unwrap().as_str(), "http://notes.local/api/v1/search/");
        assert_eq!(c.get_endpoint("").unwrap().as_str(), "http://notes.local/api/v1/");
    }

    #[tokio::test]
    async fn missing_url_is_misconfigured() {
        let c = NotesClient::new(&config(None), SECRET, StaticToken("t".into())).unwrap();
        let err = c
            .annotations(&Actor::learner(1, "alice"), &course())
            .await
            .unwrap_err();
        assert!(matches!(err, CourseNotesError::MisconfiguredEndpoint { .. }));
    }

    #[tokio::test]
    async fn annotations_request_shape() {
        let server = MockServer::start().await;
        let anon = anonymous_id_for_user(SECRET, 7);

        Mock::given(method("GET"))
            .and(path("/api/v1/annotations/"))
            .and(query_param("user", anon.as_str()))
            .and(query_param("course_id", "course-v1:edX+DemoX+2014"))
            .and(header(TOKEN_HEADER, "id-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server)
            .annotations(&Actor::learner(7, "alice"), &course())
            .await
            .unwrap();
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn search_sends_text() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({ "total": 0, "rows": [] }).to_string();

        Mock::given(method("GET"))
            .and(path("/api/v1/search/"))
            .and(query_param("text", "photosynthesis"))
            .respond_with(ResponseTemplate::new(200).set_body_string(payload.clone()))
            .mount(&server)
            .await;

        let body = client(&server)
            .search(&Actor::learner(7, "alice"), &course(), "photosynthesis")
            .await
            .unwrap();
        assert_eq!(body, payload);
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server)
            .annotations(&Actor::learner(7, "alice"), &course())
            .await
            .unwrap_err();
        assert!(matches!(err, CourseNotesError::Network(ref m) if m.contains("500")));
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn env_token_reports_missing_var() {
        let token = EnvToken::new("COURSENOTES_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(matches!(token.id_token(), Err(CourseNotesError::Config { .. })));
    }
}
