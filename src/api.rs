use std::time::Duration;

use anyhow::{bail, Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::storage::AuthTokens;

pub const DEFAULT_BASE_URL: &str = "https://api.devguide.help/api/";

// Mirrors encodeURIComponent: unreserved marks stay literal.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Track,
    Language,
}

impl CatalogKind {
    fn collection(self) -> &'static str {
        match self {
            CatalogKind::Track => "tracks",
            CatalogKind::Language => "languages",
        }
    }

    pub fn plural_label(self) -> &'static str {
        match self {
            CatalogKind::Track => "tracks",
            CatalogKind::Language => "languages",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteAction {
    Add,
    Remove,
}

impl FavoriteAction {
    /// Chooses the action from the card's current visual state.
    pub fn toggling(currently_favorited: bool) -> Self {
        if currently_favorited {
            FavoriteAction::Remove
        } else {
            FavoriteAction::Add
        }
    }

    fn method(self) -> Method {
        match self {
            FavoriteAction::Add => Method::POST,
            FavoriteAction::Remove => Method::DELETE,
        }
    }

    fn segment(self) -> &'static str {
        match self {
            FavoriteAction::Add => "add",
            FavoriteAction::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Track {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration: Option<String>,
    #[serde(default)]
    pub lessons: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Language {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackDetail {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub languages: Vec<Language>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Term {
    pub term: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SearchGroup<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub count: i64,
}

impl<T> Default for SearchGroup<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub tracks: SearchGroup<Track>,
    #[serde(default)]
    pub languages: SearchGroup<Language>,
    #[serde(default)]
    pub terms: SearchGroup<Term>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.tracks.results.is_empty()
            && self.languages.results.is_empty()
            && self.terms.results.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub remember_me: bool,
}

/// One field of the profile, each updated through its own endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileField {
    Name(String),
    Email(String),
    Phone(String),
    Password(String),
}

impl ProfileField {
    pub fn label(&self) -> &'static str {
        match self {
            ProfileField::Name(_) => "name",
            ProfileField::Email(_) => "email",
            ProfileField::Phone(_) => "phone",
            ProfileField::Password(_) => "password",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            ProfileField::Name(_) => "auth/update-name/",
            ProfileField::Email(_) => "auth/update-email/",
            ProfileField::Phone(_) => "auth/update-phone/",
            ProfileField::Password(_) => "auth/update-password/",
        }
    }

    fn body(&self) -> Value {
        match self {
            ProfileField::Name(value) => json!({ "full_name": value }),
            ProfileField::Email(value) => json!({ "email": value }),
            ProfileField::Phone(value) => json!({ "phone_number": value }),
            ProfileField::Password(value) => json!({ "new_password": value }),
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    tokens: AuthTokens,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Bare(Vec<T>),
    Paged {
        #[serde(default = "Vec::new")]
        results: Vec<T>,
    },
}

impl<T> ListEnvelope<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) => items,
            ListEnvelope::Paged { results } => results,
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("devguide client user agent required");
        }
        let mut base = config
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("parse api base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()
                .context("build http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn register(&self, request: &RegisterRequest) -> ApiResult<()> {
        let req = self.request(Method::POST, "auth/register/", None)?.json(request);
        self.send(req)?;
        Ok(())
    }

    pub fn login(&self, request: &LoginRequest) -> ApiResult<AuthTokens> {
        let req = self.request(Method::POST, "auth/login/", None)?.json(request);
        let payload: LoginResponse = decode(self.send(req)?)?;
        Ok(payload.tokens)
    }

    pub fn logout(&self, token: &str) -> ApiResult<()> {
        let req = self.request(Method::POST, "auth/logout/", Some(token))?;
        self.send(req)?;
        Ok(())
    }

    pub fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        let req = self
            .request(Method::POST, "auth/reset-password/", None)?
            .json(&json!({ "email": email }));
        self.send(req)?;
        Ok(())
    }

    pub fn confirm_password_reset(&self, otp: &str, new_password: &str) -> ApiResult<()> {
        let req = self
            .request(Method::POST, "auth/verify-otp/", None)?
            .json(&json!({ "otp": otp, "new_password": new_password }));
        self.send(req)?;
        Ok(())
    }

    pub fn profile(&self, token: &str) -> ApiResult<Profile> {
        let req = self.request(Method::GET, "auth/profile/", Some(token))?;
        decode(self.send(req)?)
    }

    pub fn update_profile_field(&self, token: &str, field: &ProfileField) -> ApiResult<()> {
        let req = self
            .request(Method::PATCH, field.path(), Some(token))?
            .json(&field.body());
        self.send(req)?;
        Ok(())
    }

    pub fn update_profile_picture(
        &self,
        token: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<()> {
        let mime = tree_magic_mini::from_u8(&bytes);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = Form::new().part("profile_picture", part);
        let req = self
            .request(Method::PATCH, "auth/update-profile-picture/", Some(token))?
            .multipart(form);
        self.send(req)?;
        Ok(())
    }

    pub fn tracks(&self, token: Option<&str>) -> ApiResult<Vec<Track>> {
        self.list("tracks/", token)
    }

    pub fn languages(&self, token: Option<&str>) -> ApiResult<Vec<Language>> {
        self.list("languages/", token)
    }

    pub fn track(&self, token: Option<&str>, id: i64) -> ApiResult<TrackDetail> {
        let req = self.request(Method::GET, &format!("tracks/{id}/"), token)?;
        decode(self.send(req)?)
    }

    pub fn terms(&self, token: Option<&str>, language: &str) -> ApiResult<Vec<Term>> {
        let encoded = utf8_percent_encode(language, PATH_SEGMENT).to_string();
        let req = self.request(Method::GET, &format!("languages/{encoded}/terms/"), token)?;
        let terms: Option<Vec<Term>> = decode(self.send(req)?)?;
        Ok(terms.unwrap_or_default())
    }

    pub fn favorite_tracks(&self, token: &str) -> ApiResult<Vec<Track>> {
        self.list("tracks/favorites/", Some(token))
    }

    pub fn favorite_languages(&self, token: &str) -> ApiResult<Vec<Language>> {
        self.list("languages/favorites/", Some(token))
    }

    pub fn set_favorite(
        &self,
        token: &str,
        kind: CatalogKind,
        id: i64,
        action: FavoriteAction,
    ) -> ApiResult<()> {
        let path = format!(
            "{}/favorite/{}/{id}/",
            kind.collection(),
            action.segment()
        );
        let req = self.request(action.method(), &path, Some(token))?;
        self.send(req)?;
        Ok(())
    }

    pub fn search(&self, token: Option<&str>, query: &str) -> ApiResult<SearchResults> {
        let req = self
            .request(Method::POST, "search/", token)?
            .form(&[("query", query)]);
        decode(self.send(req)?)
    }

    pub fn chat(&self, token: &str, message: &str) -> ApiResult<String> {
        let req = self
            .request(Method::POST, "chatbot/", Some(token))?
            .json(&json!({ "message": message }));
        let reply: ChatReply = decode(self.send(req)?)?;
        Ok(reply.response.unwrap_or_default())
    }

    fn list<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> ApiResult<Vec<T>> {
        let req = self.request(Method::GET, path, token)?;
        let envelope: ListEnvelope<T> = decode(self.send(req)?)?;
        Ok(envelope.into_vec())
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> ApiResult<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| ApiError::InvalidPath(path.to_string()))?;
        let mut req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(req)
    }

    fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        let resp = req.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "api request failed");
        Err(ApiError::from_response_body(status.as_u16(), &body))
    }
}

fn decode<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
    let text = resp.text()?;
    serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;
    use tiny_http::{Header, Response as HttpResponse, Server};

    struct Captured {
        method: String,
        url: String,
        authorization: Option<String>,
        body: String,
    }

    fn serve_once(status: u16, body: &'static str) -> (Client, thread::JoinHandle<Captured>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut body_in = String::new();
            request.as_reader().read_to_string(&mut body_in).unwrap();
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string());
            let captured = Captured {
                method: request.method().as_str().to_string(),
                url: request.url().to_string(),
                authorization,
                body: body_in,
            };
            let response = HttpResponse::from_string(body)
                .with_status_code(status)
                .with_header(
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
                );
            request.respond(response).unwrap();
            captured
        });
        let client = Client::new(ClientConfig {
            base_url: Some(format!("http://{addr}/api")),
            user_agent: "devguide-tui-test".into(),
            timeout: Some(Duration::from_secs(5)),
            http_client: None,
        })
        .unwrap();
        (client, handle)
    }

    #[test]
    fn paged_and_bare_lists_decode() {
        let bare: ListEnvelope<Language> =
            serde_json::from_str(r#"[{"id":1,"name":"Rust"}]"#).unwrap();
        assert_eq!(bare.into_vec().len(), 1);
        let paged: ListEnvelope<Language> =
            serde_json::from_str(r#"{"count":1,"results":[{"id":2,"name":"Go"}]}"#).unwrap();
        assert_eq!(paged.into_vec()[0].name, "Go");
    }

    #[test]
    fn track_duration_accepts_numbers() {
        let track: Track =
            serde_json::from_str(r#"{"id":1,"name":"Web","duration":12,"lessons":4}"#).unwrap();
        assert_eq!(track.duration.as_deref(), Some("12"));
        assert_eq!(track.lessons, Some(4));
    }

    #[test]
    fn tracks_send_bearer_token() {
        let (client, handle) = serve_once(200, r#"{"results":[{"id":3,"name":"Backend"}]}"#);
        let tracks = client.tracks(Some("abc")).unwrap();
        let captured = handle.join().unwrap();
        assert_eq!(tracks[0].name, "Backend");
        assert_eq!(captured.url, "/api/tracks/");
        assert_eq!(captured.authorization.as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn anonymous_requests_omit_authorization() {
        let (client, handle) = serve_once(200, "[]");
        client.languages(None).unwrap();
        assert!(handle.join().unwrap().authorization.is_none());
    }

    #[test]
    fn language_names_are_percent_encoded() {
        let (client, handle) = serve_once(200, r#"[{"term":"Borrow","description":"d"}]"#);
        let terms = client.terms(None, "C++ & C#").unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(
            handle.join().unwrap().url,
            "/api/languages/C%2B%2B%20%26%20C%23/terms/"
        );
    }

    #[test]
    fn favorite_removal_uses_delete() {
        let (client, handle) = serve_once(204, "");
        client
            .set_favorite("t", CatalogKind::Language, 9, FavoriteAction::Remove)
            .unwrap();
        let captured = handle.join().unwrap();
        assert_eq!(captured.method, "DELETE");
        assert_eq!(captured.url, "/api/languages/favorite/remove/9/");
    }

    #[test]
    fn search_is_form_encoded() {
        let (client, handle) = serve_once(200, r#"{"tracks":{"results":[],"count":0}}"#);
        let results = client.search(None, "rust lang").unwrap();
        assert!(results.is_empty());
        assert_eq!(handle.join().unwrap().body, "query=rust+lang");
    }

    #[test]
    fn structured_errors_are_flattened() {
        let (client, handle) = serve_once(400, r#"{"email":["Enter a valid email."]}"#);
        let err = client
            .login(&LoginRequest {
                email: "x".into(),
                password: "y".into(),
                remember_me: false,
            })
            .unwrap_err();
        let captured = handle.join().unwrap();
        assert_eq!(err.to_string(), "Enter a valid email.");
        assert!(!captured.body.contains("remember_me"));
    }

    #[test]
    fn login_returns_token_pair() {
        let (client, handle) =
            serve_once(200, r#"{"tokens":{"access":"a1","refresh":"r1"},"user":{}}"#);
        let tokens = client
            .login(&LoginRequest {
                email: "ada@example.com".into(),
                password: "pw".into(),
                remember_me: true,
            })
            .unwrap();
        assert_eq!(tokens.access, "a1");
        assert!(handle.join().unwrap().body.contains("\"remember_me\":true"));
    }

    #[test]
    fn empty_user_agent_is_rejected() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }
}
