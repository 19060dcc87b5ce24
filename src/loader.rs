use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::api::{CatalogKind, FavoriteAction, Profile, SearchResults, Term};
use crate::data::Services;
use crate::error::{ApiError, ApiResult};
use crate::forms::ProfileChanges;
use crate::router::{Load, Route};
use crate::storage::AuthTokens;
use crate::views::Card;

/// Independent request lanes. A newer request in a lane supersedes the
/// older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Panel(Route),
    Profile,
    Search,
    Favorite(CatalogKind, i64),
    Chat,
    Account,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    next_id: u64,
    pending: HashMap<Slot, u64>,
}

impl RequestTracker {
    pub fn begin(&mut self, slot: Slot) -> u64 {
        self.next_id += 1;
        self.pending.insert(slot, self.next_id);
        self.next_id
    }

    /// Accepts a response only if it answers the latest request of its
    /// slot.
    pub fn complete(&mut self, slot: Slot, request_id: u64) -> bool {
        match self.pending.get(&slot) {
            Some(current) if *current == request_id => {
                self.pending.remove(&slot);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, slot: Slot) -> bool {
        self.pending.contains_key(&slot)
    }

    pub fn forget(&mut self, slot: Slot) {
        self.pending.remove(&slot);
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

struct Envelope<M> {
    slot: Slot,
    request_id: u64,
    message: M,
}

/// Runs jobs on short-lived worker threads and hands back only current
/// results.
pub struct Dispatcher<M> {
    tx: Sender<Envelope<M>>,
    rx: Receiver<Envelope<M>>,
    tracker: RequestTracker,
}

impl<M: Send + 'static> Default for Dispatcher<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Send + 'static> Dispatcher<M> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            tracker: RequestTracker::default(),
        }
    }

    pub fn spawn<F>(&mut self, slot: Slot, job: F) -> u64
    where
        F: FnOnce() -> M + Send + 'static,
    {
        let request_id = self.tracker.begin(slot);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let message = job();
            let _ = tx.send(Envelope {
                slot,
                request_id,
                message,
            });
        });
        request_id
    }

    pub fn try_next(&mut self) -> Option<M> {
        while let Ok(envelope) = self.rx.try_recv() {
            if let Some(message) = self.accept(envelope) {
                return Some(message);
            }
        }
        None
    }

    pub fn next_timeout(&mut self, timeout: Duration) -> Option<M> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(message) = self.accept(envelope) {
                        return Some(message);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    pub fn is_busy(&self, slot: Slot) -> bool {
        self.tracker.is_pending(slot)
    }

    pub fn is_idle(&self) -> bool {
        self.tracker.is_idle()
    }

    /// Stops waiting on a slot; whatever it sends later is dropped.
    pub fn abandon(&mut self, slot: Slot) {
        self.tracker.forget(slot);
    }

    fn accept(&mut self, envelope: Envelope<M>) -> Option<M> {
        if self.tracker.complete(envelope.slot, envelope.request_id) {
            Some(envelope.message)
        } else {
            tracing::debug!(
                slot = ?envelope.slot,
                request_id = envelope.request_id,
                "discarding stale response"
            );
            None
        }
    }
}

/// Results posted back to the UI thread.
#[derive(Debug)]
pub enum Outcome {
    Cards {
        route: Route,
        result: ApiResult<Vec<Card>>,
    },
    Terms {
        language: String,
        result: ApiResult<Vec<Term>>,
    },
    Profile {
        result: ApiResult<Profile>,
        fill_form: bool,
    },
    Favorite {
        kind: CatalogKind,
        id: i64,
        was_favorited: bool,
        result: ApiResult<()>,
    },
    Search {
        query: String,
        result: ApiResult<SearchResults>,
    },
    Chat {
        result: ApiResult<String>,
    },
    Login {
        result: ApiResult<AuthTokens>,
    },
    Register {
        result: ApiResult<()>,
    },
    ResetRequested {
        result: ApiResult<()>,
    },
    ResetConfirmed {
        result: ApiResult<()>,
    },
    ProfileSaved {
        failures: Vec<(&'static str, String)>,
    },
    LoggedOut {
        result: ApiResult<()>,
    },
    Skipped,
}

/// Fetches the data behind a network-backed panel load.
pub fn run_load(services: &Services, token: Option<&str>, load: &Load) -> Outcome {
    match load {
        Load::Tracks => Outcome::Cards {
            route: Route::Tracks,
            result: load_tracks(services, token),
        },
        Load::Languages => Outcome::Cards {
            route: Route::Languages,
            result: load_languages(services, token),
        },
        Load::TrackLanguages(track_id) => Outcome::Cards {
            route: Route::Languages,
            result: services
                .catalog
                .track_languages(token, *track_id)
                .map(|langs| langs.into_iter().map(Card::from_track_language).collect()),
        },
        Load::Terms(language) => Outcome::Terms {
            language: language.clone(),
            result: services.catalog.terms(token, language),
        },
        Load::MyTracks => match token {
            Some(token) => Outcome::Cards {
                route: Route::MyTracks,
                result: services.catalog.favorite_tracks(token).map(|tracks| {
                    let ids: HashSet<i64> = tracks.iter().map(|t| t.id).collect();
                    tracks
                        .into_iter()
                        .map(|t| Card::from_track(t, &ids))
                        .collect()
                }),
            },
            None => Outcome::Skipped,
        },
        Load::MyLanguages => match token {
            Some(token) => Outcome::Cards {
                route: Route::MyLanguages,
                result: services.catalog.favorite_languages(token).map(|langs| {
                    let ids: HashSet<i64> = langs.iter().map(|l| l.id).collect();
                    langs
                        .into_iter()
                        .map(|l| Card::from_language(l, &ids))
                        .collect()
                }),
            },
            None => Outcome::Skipped,
        },
        // Profile, search and the community panels are driven by the UI thread.
        Load::Profile
        | Load::Community
        | Load::AllQuestions
        | Load::AllLeaderboard
        | Load::Search => Outcome::Skipped,
    }
}

fn load_tracks(services: &Services, token: Option<&str>) -> ApiResult<Vec<Card>> {
    let tracks = services.catalog.tracks(token)?;
    let favorites = favorite_ids(token, |t| {
        services
            .catalog
            .favorite_tracks(t)
            .map(|list| list.into_iter().map(|track| track.id).collect())
    });
    Ok(tracks
        .into_iter()
        .map(|track| Card::from_track(track, &favorites))
        .collect())
}

fn load_languages(services: &Services, token: Option<&str>) -> ApiResult<Vec<Card>> {
    let languages = services.catalog.languages(token)?;
    let favorites = favorite_ids(token, |t| {
        services
            .catalog
            .favorite_languages(t)
            .map(|list| list.into_iter().map(|lang| lang.id).collect())
    });
    Ok(languages
        .into_iter()
        .map(|lang| Card::from_language(lang, &favorites))
        .collect())
}

fn favorite_ids<F>(token: Option<&str>, fetch: F) -> HashSet<i64>
where
    F: FnOnce(&str) -> ApiResult<HashSet<i64>>,
{
    let Some(token) = token else {
        return HashSet::new();
    };
    fetch(token).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "favorites unavailable, showing list unmarked");
        HashSet::new()
    })
}

pub fn toggle_favorite(
    services: &Services,
    token: &str,
    kind: CatalogKind,
    id: i64,
    was_favorited: bool,
) -> Outcome {
    let action = FavoriteAction::toggling(was_favorited);
    Outcome::Favorite {
        kind,
        id,
        was_favorited,
        result: services.catalog.set_favorite(token, kind, id, action),
    }
}

/// Sends each profile change in order; one failure does not stop the rest.
pub fn save_profile(services: &Services, token: &str, changes: &ProfileChanges) -> Outcome {
    let mut failures = Vec::new();
    for field in &changes.fields {
        if let Err(err) = services.account.update_profile_field(token, field) {
            tracing::warn!(field = field.label(), error = %err, "profile update failed");
            failures.push((field.label(), err.to_string()));
        }
    }
    if let Some(path) = changes.picture.as_ref() {
        if let Err(err) = upload_picture(services, token, path) {
            tracing::warn!(error = %err, "profile picture upload failed");
            failures.push(("picture", err.to_string()));
        }
    }
    Outcome::ProfileSaved { failures }
}

fn upload_picture(services: &Services, token: &str, path: &Path) -> Result<(), ApiError> {
    services.account.update_profile_picture(token, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProfileField;
    use crate::data::{MockAccountService, MockCatalogService};
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::sync::Arc;

    fn services_with(catalog: MockCatalogService, account: MockAccountService) -> Services {
        Services {
            catalog: Arc::new(catalog),
            account: Arc::new(account),
            ..Services::mock()
        }
    }

    #[test]
    fn tracker_rejects_superseded_ids() {
        let mut tracker = RequestTracker::default();
        let slot = Slot::Panel(Route::Tracks);
        let first = tracker.begin(slot);
        let second = tracker.begin(slot);
        assert!(!tracker.complete(slot, first));
        assert!(tracker.complete(slot, second));
        assert!(!tracker.complete(slot, second));
    }

    #[test]
    fn slots_are_independent() {
        let mut tracker = RequestTracker::default();
        let a = tracker.begin(Slot::Search);
        let b = tracker.begin(Slot::Chat);
        assert!(tracker.complete(Slot::Search, a));
        assert!(tracker.is_pending(Slot::Chat));
        assert!(tracker.complete(Slot::Chat, b));
    }

    #[test]
    fn dispatcher_drops_stale_results() {
        let mut dispatcher: Dispatcher<&'static str> = Dispatcher::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let slot = Slot::Panel(Route::Languages);
        dispatcher.spawn(slot, move || {
            let _ = release_rx.recv();
            "stale"
        });
        dispatcher.spawn(slot, || "fresh");
        assert_eq!(
            dispatcher.next_timeout(Duration::from_secs(5)),
            Some("fresh")
        );
        release_tx.send(()).unwrap();
        assert_eq!(dispatcher.next_timeout(Duration::from_millis(300)), None);
        assert!(!dispatcher.is_busy(slot));
    }

    #[test]
    fn ui_thread_loads_are_skipped() {
        let services = Services::mock();
        for load in [Load::Profile, Load::Community, Load::AllLeaderboard, Load::Search] {
            assert!(matches!(
                run_load(&services, Some("t"), &load),
                Outcome::Skipped
            ));
        }
    }

    #[test]
    fn favorites_pre_mark_cards_when_logged_in() {
        let catalog = MockCatalogService::sample();
        catalog.favorite_tracks.lock().push(2);
        let services = services_with(catalog, MockAccountService::default());
        let Outcome::Cards { result, .. } = run_load(&services, Some("t"), &Load::Tracks) else {
            panic!("expected cards");
        };
        let cards = result.unwrap();
        assert!(!cards[0].favorited);
        assert!(cards[1].favorited);

        let Outcome::Cards { result, .. } = run_load(&services, None, &Load::Tracks) else {
            panic!("expected cards");
        };
        assert!(result.unwrap().iter().all(|card| !card.favorited));
    }

    #[test]
    fn favorites_failure_is_ignored() {
        let catalog = MockCatalogService {
            fail_favorites: true,
            ..MockCatalogService::sample()
        };
        let services = services_with(catalog, MockAccountService::default());
        let Outcome::Cards { result, .. } = run_load(&services, Some("t"), &Load::Languages)
        else {
            panic!("expected cards");
        };
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn my_tracks_are_all_favorited() {
        let catalog = MockCatalogService::sample();
        catalog.favorite_tracks.lock().push(1);
        let services = services_with(catalog, MockAccountService::default());
        let Outcome::Cards { route, result } = run_load(&services, Some("t"), &Load::MyTracks)
        else {
            panic!("expected cards");
        };
        assert_eq!(route, Route::MyTracks);
        let cards = result.unwrap();
        assert_eq!(cards.len(), 1);
        assert!(cards[0].favorited);
    }

    #[test]
    fn track_languages_lack_favorite_controls() {
        let services = services_with(MockCatalogService::sample(), MockAccountService::default());
        let Outcome::Cards { result, .. } =
            run_load(&services, None, &Load::TrackLanguages(1))
        else {
            panic!("expected cards");
        };
        assert!(result.unwrap().iter().all(|card| !card.can_favorite));
    }

    #[test]
    fn profile_save_reports_each_failure() {
        let account = MockAccountService {
            failing_fields: vec!["email"],
            ..Default::default()
        };
        let services = services_with(MockCatalogService::sample(), account);
        let changes = ProfileChanges {
            fields: vec![
                ProfileField::Name("Ada".into()),
                ProfileField::Email("bad".into()),
                ProfileField::Phone("1".into()),
            ],
            picture: Some(PathBuf::from("/definitely/missing.png")),
        };
        let Outcome::ProfileSaved { failures } = save_profile(&services, "t", &changes) else {
            panic!("expected profile save");
        };
        let labels: Vec<&str> = failures.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["email", "picture"]);
        assert_eq!(failures[0].1, "email rejected");
    }

    #[test]
    fn failed_toggle_keeps_prior_state_in_outcome() {
        let catalog = MockCatalogService {
            fail_toggles: true,
            ..MockCatalogService::sample()
        };
        let services = services_with(catalog, MockAccountService::default());
        let outcome = toggle_favorite(&services, "t", CatalogKind::Track, 1, false);
        assert!(matches!(
            outcome,
            Outcome::Favorite {
                was_favorited: false,
                result: Err(_),
                ..
            }
        ));
    }
}
