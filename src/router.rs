use crate::session::Session;

pub const MSG_CHATBOT_LOGIN: &str = "Please login to use the chatbot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Tracks,
    Languages,
    Terms,
    MyTracks,
    MyLanguages,
    Profile,
    Community,
    AllQuestions,
    AllLeaderboard,
    Search,
    Chatbot,
    Login,
    Register,
    ResetPassword,
    ResetPasswordConfirm,
}

impl Route {
    pub const ALL: [Route; 15] = [
        Route::Tracks,
        Route::Languages,
        Route::Terms,
        Route::MyTracks,
        Route::MyLanguages,
        Route::Profile,
        Route::Community,
        Route::AllQuestions,
        Route::AllLeaderboard,
        Route::Search,
        Route::Chatbot,
        Route::Login,
        Route::Register,
        Route::ResetPassword,
        Route::ResetPasswordConfirm,
    ];

    pub fn fragment(self) -> &'static str {
        match self {
            Route::Tracks => "tracks",
            Route::Languages => "languages",
            Route::Terms => "terms",
            Route::MyTracks => "my-tracks",
            Route::MyLanguages => "my-languages",
            Route::Profile => "profile",
            Route::Community => "community",
            Route::AllQuestions => "all-questions",
            Route::AllLeaderboard => "all-leaderboard",
            Route::Search => "search",
            Route::Chatbot => "chatbot",
            Route::Login => "login",
            Route::Register => "register",
            Route::ResetPassword => "reset-password",
            Route::ResetPasswordConfirm => "reset-password-confirm",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Route::Tracks => "Tracks",
            Route::Languages => "Languages",
            Route::Terms => "Terms",
            Route::MyTracks => "My Tracks",
            Route::MyLanguages => "My Languages",
            Route::Profile => "Profile",
            Route::Community => "Community",
            Route::AllQuestions => "All Questions",
            Route::AllLeaderboard => "Leaderboard",
            Route::Search => "Search",
            Route::Chatbot => "Chatbot",
            Route::Login => "Login",
            Route::Register => "Register",
            Route::ResetPassword => "Reset Password",
            Route::ResetPasswordConfirm => "Confirm Reset",
        }
    }
}

/// Maps a fragment (with or without its leading `#`) to a route. Empty and
/// unknown fragments land on tracks.
pub fn resolve(fragment: &str) -> Route {
    let cleaned = normalize(fragment);
    Route::ALL
        .into_iter()
        .find(|route| route.fragment() == cleaned)
        .unwrap_or(Route::Tracks)
}

fn normalize(fragment: &str) -> &str {
    fragment.trim().trim_start_matches('#')
}

/// Work a panel needs on entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Load {
    Tracks,
    Languages,
    TrackLanguages(i64),
    Terms(String),
    MyTracks,
    MyLanguages,
    Profile,
    Community,
    AllQuestions,
    AllLeaderboard,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Enter { route: Route, load: Option<Load> },
    Blocked { message: &'static str, redirect: Route },
}

#[derive(Debug)]
pub struct Router {
    fragment: String,
    visible: Route,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            fragment: String::new(),
            visible: Route::Tracks,
        }
    }

    pub fn visible(&self) -> Route {
        self.visible
    }

    pub fn is_visible(&self, route: Route) -> bool {
        self.visible == route
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Applies a fragment change. Setting the fragment it already holds
    /// does nothing and yields `None`.
    pub fn navigate(&mut self, fragment: &str, session: &mut Session) -> Option<Transition> {
        let cleaned = normalize(fragment);
        if cleaned == self.fragment {
            return None;
        }
        self.fragment = cleaned.to_string();
        Some(self.enter(session))
    }

    /// Re-runs the current fragment's entry work.
    pub fn refresh(&mut self, session: &mut Session) -> Transition {
        self.enter(session)
    }

    fn enter(&mut self, session: &mut Session) -> Transition {
        let route = resolve(&self.fragment);
        if route == Route::Chatbot && !session.is_logged_in() {
            tracing::debug!("chatbot blocked for guest");
            return Transition::Blocked {
                message: MSG_CHATBOT_LOGIN,
                redirect: Route::Login,
            };
        }
        self.visible = route;
        let load = entry_load(route, session);
        tracing::debug!(route = route.fragment(), ?load, "route entered");
        Transition::Enter { route, load }
    }
}

fn entry_load(route: Route, session: &mut Session) -> Option<Load> {
    match route {
        Route::Tracks => Some(Load::Tracks),
        Route::Languages => Some(match session.take_pending_track() {
            Some(track_id) => Load::TrackLanguages(track_id),
            None => Load::Languages,
        }),
        Route::Terms => session.take_pending_language().map(Load::Terms),
        Route::MyTracks => Some(Load::MyTracks),
        Route::MyLanguages => Some(Load::MyLanguages),
        Route::Profile => Some(Load::Profile),
        Route::Community => Some(Load::Community),
        Route::AllQuestions => Some(Load::AllQuestions),
        Route::AllLeaderboard => Some(Load::AllLeaderboard),
        Route::Search => Some(Load::Search),
        Route::Chatbot
        | Route::Login
        | Route::Register
        | Route::ResetPassword
        | Route::ResetPasswordConfirm => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AuthTokens, Store};
    use std::sync::Arc;

    fn session() -> Session {
        Session::load(Arc::new(Store::open_in_memory().unwrap())).unwrap()
    }

    fn enter(transition: Option<Transition>) -> (Route, Option<Load>) {
        match transition {
            Some(Transition::Enter { route, load }) => (route, load),
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[test]
    fn fragments_resolve_with_tracks_fallback() {
        assert_eq!(resolve(""), Route::Tracks);
        assert_eq!(resolve("#my-languages"), Route::MyLanguages);
        assert_eq!(resolve("reset-password-confirm"), Route::ResetPasswordConfirm);
        assert_eq!(resolve("nowhere"), Route::Tracks);
        for route in Route::ALL {
            assert_eq!(resolve(route.fragment()), route);
        }
    }

    #[test]
    fn same_fragment_does_not_retrigger() {
        let mut router = Router::new();
        let mut session = session();
        assert!(router.navigate("tracks", &mut session).is_some());
        assert!(router.navigate("#tracks", &mut session).is_none());
        assert_eq!(
            router.refresh(&mut session),
            Transition::Enter {
                route: Route::Tracks,
                load: Some(Load::Tracks)
            }
        );
    }

    #[test]
    fn languages_consume_pending_track_once() {
        let mut router = Router::new();
        let mut session = session();
        session.select_track(7);
        let (_, load) = enter(router.navigate("languages", &mut session));
        assert_eq!(load, Some(Load::TrackLanguages(7)));
        router.navigate("tracks", &mut session);
        let (_, load) = enter(router.navigate("languages", &mut session));
        assert_eq!(load, Some(Load::Languages));
    }

    #[test]
    fn terms_without_pending_language_load_nothing() {
        let mut router = Router::new();
        let mut session = session();
        let (route, load) = enter(router.navigate("terms", &mut session));
        assert_eq!(route, Route::Terms);
        assert_eq!(load, None);
        session.select_language("Rust");
        let (_, load) = enter(Some(router.refresh(&mut session)));
        assert_eq!(load, Some(Load::Terms("Rust".into())));
    }

    #[test]
    fn chatbot_is_blocked_for_guests() {
        let mut router = Router::new();
        let mut session = session();
        router.navigate("community", &mut session);
        let transition = router.navigate("chatbot", &mut session);
        assert_eq!(
            transition,
            Some(Transition::Blocked {
                message: MSG_CHATBOT_LOGIN,
                redirect: Route::Login
            })
        );
        assert_eq!(router.visible(), Route::Community);
        assert!(!router.is_visible(Route::Chatbot));
        let (route, _) = enter(router.navigate("login", &mut session));
        assert_eq!(route, Route::Login);
    }

    #[test]
    fn chatbot_opens_with_a_token() {
        let mut router = Router::new();
        let mut session = session();
        session
            .begin(AuthTokens {
                access: "a".into(),
                refresh: "r".into(),
            })
            .unwrap();
        let (route, load) = enter(router.navigate("chatbot", &mut session));
        assert_eq!(route, Route::Chatbot);
        assert_eq!(load, None);
    }
}
