use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::{
    self, CatalogKind, FavoriteAction, Language, LoginRequest, Profile, ProfileField,
    RegisterRequest, SearchResults, Term, Track,
};
use crate::error::{ApiError, ApiResult};
use crate::storage::AuthTokens;

pub trait CatalogService: Send + Sync {
    fn tracks(&self, token: Option<&str>) -> ApiResult<Vec<Track>>;
    fn languages(&self, token: Option<&str>) -> ApiResult<Vec<Language>>;
    fn track_languages(&self, token: Option<&str>, track_id: i64) -> ApiResult<Vec<Language>>;
    fn terms(&self, token: Option<&str>, language: &str) -> ApiResult<Vec<Term>>;
    fn favorite_tracks(&self, token: &str) -> ApiResult<Vec<Track>>;
    fn favorite_languages(&self, token: &str) -> ApiResult<Vec<Language>>;
    fn set_favorite(
        &self,
        token: &str,
        kind: CatalogKind,
        id: i64,
        action: FavoriteAction,
    ) -> ApiResult<()>;
}

pub trait AccountService: Send + Sync {
    fn register(&self, request: &RegisterRequest) -> ApiResult<()>;
    fn login(&self, request: &LoginRequest) -> ApiResult<AuthTokens>;
    fn logout(&self, token: &str) -> ApiResult<()>;
    fn request_password_reset(&self, email: &str) -> ApiResult<()>;
    fn confirm_password_reset(&self, otp: &str, new_password: &str) -> ApiResult<()>;
    fn profile(&self, token: &str) -> ApiResult<Profile>;
    fn update_profile_field(&self, token: &str, field: &ProfileField) -> ApiResult<()>;
    fn update_profile_picture(&self, token: &str, path: &Path) -> ApiResult<()>;
}

pub trait SearchService: Send + Sync {
    fn search(&self, token: Option<&str>, query: &str) -> ApiResult<SearchResults>;
}

pub trait ChatService: Send + Sync {
    fn ask(&self, token: &str, message: &str) -> ApiResult<String>;
}

/// The service handles the UI and its worker threads share.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogService>,
    pub account: Arc<dyn AccountService>,
    pub search: Arc<dyn SearchService>,
    pub chat: Arc<dyn ChatService>,
}

impl Services {
    pub fn from_client(client: Arc<api::Client>) -> Self {
        Self {
            catalog: Arc::new(ApiCatalogService::new(client.clone())),
            account: Arc::new(ApiAccountService::new(client.clone())),
            search: Arc::new(ApiSearchService::new(client.clone())),
            chat: Arc::new(ApiChatService::new(client)),
        }
    }
}

pub struct ApiCatalogService {
    client: Arc<api::Client>,
}

impl ApiCatalogService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CatalogService for ApiCatalogService {
    fn tracks(&self, token: Option<&str>) -> ApiResult<Vec<Track>> {
        self.client.tracks(token)
    }

    fn languages(&self, token: Option<&str>) -> ApiResult<Vec<Language>> {
        self.client.languages(token)
    }

    fn track_languages(&self, token: Option<&str>, track_id: i64) -> ApiResult<Vec<Language>> {
        Ok(self.client.track(token, track_id)?.languages)
    }

    fn terms(&self, token: Option<&str>, language: &str) -> ApiResult<Vec<Term>> {
        self.client.terms(token, language)
    }

    fn favorite_tracks(&self, token: &str) -> ApiResult<Vec<Track>> {
        self.client.favorite_tracks(token)
    }

    fn favorite_languages(&self, token: &str) -> ApiResult<Vec<Language>> {
        self.client.favorite_languages(token)
    }

    fn set_favorite(
        &self,
        token: &str,
        kind: CatalogKind,
        id: i64,
        action: FavoriteAction,
    ) -> ApiResult<()> {
        self.client.set_favorite(token, kind, id, action)
    }
}

pub struct ApiAccountService {
    client: Arc<api::Client>,
}

impl ApiAccountService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl AccountService for ApiAccountService {
    fn register(&self, request: &RegisterRequest) -> ApiResult<()> {
        self.client.register(request)
    }

    fn login(&self, request: &LoginRequest) -> ApiResult<AuthTokens> {
        self.client.login(request)
    }

    fn logout(&self, token: &str) -> ApiResult<()> {
        self.client.logout(token)
    }

    fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        self.client.request_password_reset(email)
    }

    fn confirm_password_reset(&self, otp: &str, new_password: &str) -> ApiResult<()> {
        self.client.confirm_password_reset(otp, new_password)
    }

    fn profile(&self, token: &str) -> ApiResult<Profile> {
        self.client.profile(token)
    }

    fn update_profile_field(&self, token: &str, field: &ProfileField) -> ApiResult<()> {
        self.client.update_profile_field(token, field)
    }

    fn update_profile_picture(&self, token: &str, path: &Path) -> ApiResult<()> {
        let bytes = std::fs::read(path).map_err(|source| ApiError::LocalFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "profile_picture".to_string());
        self.client.update_profile_picture(token, &file_name, bytes)
    }
}

pub struct ApiSearchService {
    client: Arc<api::Client>,
}

impl ApiSearchService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl SearchService for ApiSearchService {
    fn search(&self, token: Option<&str>, query: &str) -> ApiResult<SearchResults> {
        self.client.search(token, query)
    }
}

pub struct ApiChatService {
    client: Arc<api::Client>,
}

impl ApiChatService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ChatService for ApiChatService {
    fn ask(&self, token: &str, message: &str) -> ApiResult<String> {
        self.client.chat(token, message)
    }
}

/// In-memory catalog for tests and offline rendering.
#[derive(Default)]
pub struct MockCatalogService {
    pub tracks: Vec<Track>,
    pub languages: Vec<Language>,
    pub terms: Vec<Term>,
    pub favorite_tracks: Mutex<Vec<i64>>,
    pub favorite_languages: Mutex<Vec<i64>>,
    pub fail_favorites: bool,
    pub fail_toggles: bool,
    pub toggles: Mutex<Vec<(CatalogKind, i64, FavoriteAction)>>,
}

impl MockCatalogService {
    pub fn sample() -> Self {
        Self {
            tracks: vec![
                mock_track(1, "Backend", "Servers, storage and APIs"),
                mock_track(2, "Frontend", "Browsers and user interfaces"),
            ],
            languages: vec![
                mock_language(10, "Rust", "Systems programming"),
                mock_language(11, "Go", "Networked services"),
            ],
            terms: vec![Term {
                term: "Ownership".into(),
                description: "Each value has a single owner.".into(),
                link: "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html".into(),
            }],
            ..Default::default()
        }
    }

    fn favorites(&self, kind: CatalogKind) -> &Mutex<Vec<i64>> {
        match kind {
            CatalogKind::Track => &self.favorite_tracks,
            CatalogKind::Language => &self.favorite_languages,
        }
    }
}

impl CatalogService for MockCatalogService {
    fn tracks(&self, _token: Option<&str>) -> ApiResult<Vec<Track>> {
        Ok(self.tracks.clone())
    }

    fn languages(&self, _token: Option<&str>) -> ApiResult<Vec<Language>> {
        Ok(self.languages.clone())
    }

    fn track_languages(&self, _token: Option<&str>, track_id: i64) -> ApiResult<Vec<Language>> {
        if !self.tracks.iter().any(|track| track.id == track_id) {
            return Err(not_found());
        }
        Ok(self.languages.iter().take(1).cloned().collect())
    }

    fn terms(&self, _token: Option<&str>, language: &str) -> ApiResult<Vec<Term>> {
        if self.languages.iter().any(|lang| lang.name == language) {
            Ok(self.terms.clone())
        } else {
            Ok(Vec::new())
        }
    }

    fn favorite_tracks(&self, _token: &str) -> ApiResult<Vec<Track>> {
        if self.fail_favorites {
            return Err(server_error());
        }
        let ids = self.favorite_tracks.lock();
        Ok(self
            .tracks
            .iter()
            .filter(|track| ids.contains(&track.id))
            .cloned()
            .collect())
    }

    fn favorite_languages(&self, _token: &str) -> ApiResult<Vec<Language>> {
        if self.fail_favorites {
            return Err(server_error());
        }
        let ids = self.favorite_languages.lock();
        Ok(self
            .languages
            .iter()
            .filter(|lang| ids.contains(&lang.id))
            .cloned()
            .collect())
    }

    fn set_favorite(
        &self,
        _token: &str,
        kind: CatalogKind,
        id: i64,
        action: FavoriteAction,
    ) -> ApiResult<()> {
        self.toggles.lock().push((kind, id, action));
        if self.fail_toggles {
            return Err(server_error());
        }
        let mut ids = self.favorites(kind).lock();
        match action {
            FavoriteAction::Add => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            FavoriteAction::Remove => ids.retain(|existing| *existing != id),
        }
        Ok(())
    }
}

/// Accepts a single email/password pair and records calls for assertions.
pub struct MockAccountService {
    pub email: String,
    pub password: String,
    pub profile: Profile,
    pub reject_profile: Option<u16>,
    pub failing_fields: Vec<&'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for MockAccountService {
    fn default() -> Self {
        Self {
            email: "ada@example.com".into(),
            password: "hunter22".into(),
            profile: Profile {
                full_name: Some("Ada Lovelace".into()),
                email: Some("ada@example.com".into()),
                phone_number: Some("555-0100".into()),
                profile_picture: None,
            },
            reject_profile: None,
            failing_fields: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockAccountService {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl AccountService for MockAccountService {
    fn register(&self, request: &RegisterRequest) -> ApiResult<()> {
        self.record(format!("register {}", request.email));
        if request.email == self.email {
            return Err(ApiError::from_response_body(
                400,
                r#"{"email":["user with this email already exists."]}"#,
            ));
        }
        Ok(())
    }

    fn login(&self, request: &LoginRequest) -> ApiResult<AuthTokens> {
        self.record(format!("login {}", request.email));
        if request.email == self.email && request.password == self.password {
            Ok(AuthTokens {
                access: "mock-access".into(),
                refresh: "mock-refresh".into(),
            })
        } else {
            Err(ApiError::from_response_body(
                401,
                r#"{"detail":"Invalid credentials"}"#,
            ))
        }
    }

    fn logout(&self, _token: &str) -> ApiResult<()> {
        self.record("logout");
        Ok(())
    }

    fn request_password_reset(&self, email: &str) -> ApiResult<()> {
        self.record(format!("reset {email}"));
        Ok(())
    }

    fn confirm_password_reset(&self, otp: &str, _new_password: &str) -> ApiResult<()> {
        self.record(format!("verify {otp}"));
        if otp == "000000" {
            return Err(ApiError::from_response_body(400, r#"{"detail":"Invalid OTP"}"#));
        }
        Ok(())
    }

    fn profile(&self, _token: &str) -> ApiResult<Profile> {
        self.record("profile");
        match self.reject_profile {
            Some(status) => Err(ApiError::from_response_body(status, "")),
            None => Ok(self.profile.clone()),
        }
    }

    fn update_profile_field(&self, _token: &str, field: &ProfileField) -> ApiResult<()> {
        self.record(format!("update {}", field.label()));
        if self.failing_fields.contains(&field.label()) {
            return Err(ApiError::from_response_body(
                400,
                &format!(r#"{{"detail":"{} rejected"}}"#, field.label()),
            ));
        }
        Ok(())
    }

    fn update_profile_picture(&self, _token: &str, path: &Path) -> ApiResult<()> {
        self.record(format!("update picture {}", path.display()));
        if !path.exists() {
            return Err(ApiError::LocalFile {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSearchService {
    pub results: SearchResults,
    pub queries: Mutex<Vec<String>>,
}

impl SearchService for MockSearchService {
    fn search(&self, _token: Option<&str>, query: &str) -> ApiResult<SearchResults> {
        self.queries.lock().push(query.to_string());
        Ok(self.results.clone())
    }
}

#[derive(Default)]
pub struct MockChatService;

impl ChatService for MockChatService {
    fn ask(&self, _token: &str, message: &str) -> ApiResult<String> {
        Ok(format!("You asked: **{message}**"))
    }
}

impl Services {
    /// Offline bundle backed by the mock services.
    pub fn mock() -> Self {
        Self {
            catalog: Arc::new(MockCatalogService::sample()),
            account: Arc::new(MockAccountService::default()),
            search: Arc::new(MockSearchService::default()),
            chat: Arc::new(MockChatService),
        }
    }
}

fn mock_track(id: i64, name: &str, description: &str) -> Track {
    Track {
        id,
        name: name.into(),
        description: description.into(),
        icon: None,
        difficulty: Some("Beginner".into()),
        duration: Some("6 weeks".into()),
        lessons: Some(12),
    }
}

fn mock_language(id: i64, name: &str, description: &str) -> Language {
    Language {
        id,
        name: name.into(),
        description: description.into(),
        icon: None,
    }
}

fn not_found() -> ApiError {
    ApiError::from_response_body(404, r#"{"detail":"Not found."}"#)
}

fn server_error() -> ApiError {
    ApiError::from_response_body(500, "")
}
