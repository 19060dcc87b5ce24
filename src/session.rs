use std::sync::Arc;

use anyhow::Result;

use crate::api;
use crate::storage::{self, AuthTokens};

/// Avatar shown for guests and users without a profile picture.
pub const APP_LOGO: &str = "Layer_1.svg";
pub const GUEST_NAME: &str = "Guest";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Carries the message shown to the guest.
    #[error("{0}")]
    LoginRequired(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentProfile {
    pub full_name: String,
    pub profile_picture: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl CurrentProfile {
    pub fn guest() -> Self {
        Self {
            full_name: GUEST_NAME.to_string(),
            profile_picture: APP_LOGO.to_string(),
            email: None,
            phone_number: None,
        }
    }

    fn from_api(profile: &api::Profile) -> Self {
        Self {
            full_name: non_empty(profile.full_name.as_deref()).unwrap_or(GUEST_NAME).to_string(),
            profile_picture: non_empty(profile.profile_picture.as_deref())
                .unwrap_or(APP_LOGO)
                .to_string(),
            email: non_empty(profile.email.as_deref()).map(str::to_string),
            phone_number: profile.phone_number.clone(),
        }
    }

    pub fn is_guest(&self) -> bool {
        self.email.is_none()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Process-wide session context: auth tokens, the current profile, and the
/// single-slot selections handed from one panel to the next.
pub struct Session {
    store: Arc<storage::Store>,
    tokens: Option<AuthTokens>,
    profile: CurrentProfile,
    pending_track: Option<i64>,
    pending_language: Option<String>,
}

impl Session {
    pub fn load(store: Arc<storage::Store>) -> Result<Self> {
        let tokens = store.load_tokens()?;
        Ok(Self {
            store,
            tokens,
            profile: CurrentProfile::guest(),
            pending_track: None,
            pending_language: None,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access.as_str())
    }

    pub fn require_token(&self, message: &'static str) -> Result<&str, SessionError> {
        self.token().ok_or(SessionError::LoginRequired(message))
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn profile(&self) -> &CurrentProfile {
        &self.profile
    }

    /// Community identity: the email of the fetched profile.
    pub fn user_id(&self) -> Option<&str> {
        self.profile.email.as_deref()
    }

    /// Posting, upvoting and commenting need both a token and an identity.
    pub fn can_participate(&self) -> bool {
        self.is_logged_in() && self.user_id().is_some()
    }

    pub fn begin(&mut self, tokens: AuthTokens) -> Result<()> {
        self.store.save_tokens(&tokens)?;
        self.tokens = Some(tokens);
        Ok(())
    }

    pub fn apply_profile(&mut self, profile: &api::Profile) -> &CurrentProfile {
        self.profile = CurrentProfile::from_api(profile);
        tracing::debug!(guest = self.profile.is_guest(), "profile applied");
        &self.profile
    }

    pub fn demote_to_guest(&mut self) {
        self.profile = CurrentProfile::guest();
    }

    /// Drops a token the server no longer accepts.
    pub fn forget_token(&mut self) -> Result<()> {
        self.tokens = None;
        self.demote_to_guest();
        self.store.clear_tokens()
    }

    pub fn end(&mut self) -> Result<()> {
        self.pending_track = None;
        self.pending_language = None;
        self.forget_token()
    }

    pub fn select_track(&mut self, track_id: i64) {
        self.pending_track = Some(track_id);
    }

    pub fn select_language(&mut self, name: impl Into<String>) {
        self.pending_language = Some(name.into());
    }

    pub fn take_pending_track(&mut self) -> Option<i64> {
        self.pending_track.take()
    }

    pub fn take_pending_language(&mut self) -> Option<String> {
        self.pending_language.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::load(Arc::new(storage::Store::open_in_memory().unwrap())).unwrap()
    }

    fn tokens() -> AuthTokens {
        AuthTokens {
            access: "a".into(),
            refresh: "r".into(),
        }
    }

    #[test]
    fn starts_as_guest_without_tokens() {
        let session = session();
        assert!(!session.is_logged_in());
        assert_eq!(session.profile().full_name, GUEST_NAME);
        assert_eq!(session.user_id(), None);
    }

    #[test]
    fn guests_are_told_to_login() {
        let session = session();
        let err = session.require_token("Please login to use the chatbot").unwrap_err();
        assert_eq!(err.to_string(), "Please login to use the chatbot");
    }

    #[test]
    fn tokens_persist_across_loads() {
        let store = Arc::new(storage::Store::open_in_memory().unwrap());
        let mut first = Session::load(store.clone()).unwrap();
        first.begin(tokens()).unwrap();
        let second = Session::load(store).unwrap();
        assert_eq!(second.token(), Some("a"));
    }

    #[test]
    fn profile_without_email_cannot_participate() {
        let mut session = session();
        session.begin(tokens()).unwrap();
        session.apply_profile(&api::Profile {
            full_name: Some("Ada".into()),
            ..Default::default()
        });
        assert!(!session.can_participate());
        session.apply_profile(&api::Profile {
            full_name: None,
            email: Some("ada@example.com".into()),
            ..Default::default()
        });
        assert!(session.can_participate());
        assert_eq!(session.profile().full_name, GUEST_NAME);
        assert_eq!(session.profile().profile_picture, APP_LOGO);
    }

    #[test]
    fn pending_slots_are_consumed_once() {
        let mut session = session();
        session.select_track(4);
        session.select_track(7);
        assert_eq!(session.take_pending_track(), Some(7));
        assert_eq!(session.take_pending_track(), None);
        session.select_language("Rust");
        assert_eq!(session.take_pending_language().as_deref(), Some("Rust"));
        assert_eq!(session.take_pending_language(), None);
    }

    #[test]
    fn end_clears_everything() {
        let mut session = session();
        session.begin(tokens()).unwrap();
        session.apply_profile(&api::Profile {
            email: Some("ada@example.com".into()),
            ..Default::default()
        });
        session.select_language("Go");
        session.end().unwrap();
        assert!(!session.is_logged_in());
        assert!(session.profile().is_guest());
        assert_eq!(session.take_pending_language(), None);
    }
}
