use std::collections::HashSet;

use crate::api::{CatalogKind, Language, SearchResults, Term, Track};

/// A track or language as rendered in a list panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: i64,
    pub kind: CatalogKind,
    pub title: String,
    pub description: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub stats: Vec<String>,
    pub favorited: bool,
    pub can_favorite: bool,
}

impl Card {
    pub fn from_track(track: Track, favorites: &HashSet<i64>) -> Self {
        let mut stats = Vec::new();
        if let Some(duration) = track.duration.filter(|d| !d.is_empty()) {
            stats.push(duration);
        }
        if let Some(lessons) = track.lessons.filter(|n| *n != 0) {
            stats.push(format!("{lessons} lessons"));
        }
        Self {
            id: track.id,
            kind: CatalogKind::Track,
            favorited: favorites.contains(&track.id),
            title: track.name,
            description: track.description,
            icon: track.icon.filter(|i| !i.is_empty()),
            badge: track.difficulty.filter(|d| !d.is_empty()),
            stats,
            can_favorite: true,
        }
    }

    pub fn from_language(language: Language, favorites: &HashSet<i64>) -> Self {
        Self {
            id: language.id,
            kind: CatalogKind::Language,
            favorited: favorites.contains(&language.id),
            title: language.name,
            description: language.description,
            icon: language.icon.filter(|i| !i.is_empty()),
            badge: None,
            stats: Vec::new(),
            can_favorite: true,
        }
    }

    /// Languages listed under a track carry no favorite control.
    pub fn from_track_language(language: Language) -> Self {
        Self {
            can_favorite: false,
            ..Self::from_language(language, &HashSet::new())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardList {
    cards: Vec<Card>,
    selected: usize,
    empty_message: Option<String>,
    loading: bool,
}

impl CardList {
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self) {
        self.loading = true;
    }

    /// Replaces the whole list; the previous cards are dropped.
    pub fn replace(&mut self, cards: Vec<Card>, empty_message: Option<String>) {
        self.cards = cards;
        self.selected = 0;
        self.loading = false;
        self.empty_message = if self.cards.is_empty() {
            empty_message
        } else {
            None
        };
    }

    pub fn show_message(&mut self, message: impl Into<String>) {
        self.replace(Vec::new(), Some(message.into()));
    }

    pub fn finish_loading(&mut self) {
        self.loading = false;
    }

    pub fn empty_message(&self) -> Option<&str> {
        self.empty_message.as_deref()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&Card> {
        self.cards.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.cards.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Flips a card's visual favorite state; returns false when no card
    /// matches.
    pub fn set_favorited(&mut self, kind: CatalogKind, id: i64, favorited: bool) -> bool {
        let mut found = false;
        for card in self
            .cards
            .iter_mut()
            .filter(|card| card.kind == kind && card.id == id)
        {
            card.favorited = favorited;
            found = true;
        }
        found
    }
}

#[derive(Debug, Clone, Default)]
pub struct TermList {
    pub heading: String,
    terms: Vec<Term>,
    selected: usize,
    pub loading: bool,
}

impl TermList {
    pub fn replace(&mut self, heading: impl Into<String>, terms: Vec<Term>) {
        self.heading = heading.into();
        self.terms = terms;
        self.selected = 0;
        self.loading = false;
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&Term> {
        self.terms.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.terms.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

/// One selectable row of the search results panel.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchHit {
    Track { id: i64, name: String },
    Language { name: String },
    Term(Term),
}

#[derive(Debug, Clone, Default)]
pub struct SearchView {
    pub query: String,
    pub results: Option<SearchResults>,
    selected: usize,
    pub loading: bool,
}

impl SearchView {
    pub fn apply(&mut self, results: SearchResults) {
        self.results = Some(results);
        self.selected = 0;
        self.loading = false;
    }

    pub fn hits(&self) -> Vec<SearchHit> {
        let Some(results) = self.results.as_ref() else {
            return Vec::new();
        };
        let tracks = results.tracks.results.iter().map(|t| SearchHit::Track {
            id: t.id,
            name: t.name.clone(),
        });
        let languages = results.languages.results.iter().map(|l| SearchHit::Language {
            name: l.name.clone(),
        });
        let terms = results.terms.results.iter().cloned().map(SearchHit::Term);
        tracks.chain(languages).chain(terms).collect()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<SearchHit> {
        self.hits().into_iter().nth(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.hits().len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    pub waiting: bool,
}

impl ChatLog {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            text: text.into(),
        });
        self.waiting = true;
    }

    pub fn push_bot(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::Bot,
            text: text.into(),
        });
        self.waiting = false;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// Cursor state for the community panels. Questions are addressed by
/// their storage index so re-ranking never moves the target.
#[derive(Debug, Clone, Default)]
pub struct CommunityView {
    pub search: String,
    pub selected: usize,
    pub expanded: HashSet<usize>,
    pub comment_cursor: usize,
}

impl CommunityView {
    pub fn clamp(&mut self, visible: usize) {
        if visible == 0 {
            self.selected = 0;
        } else if self.selected >= visible {
            self.selected = visible - 1;
        }
    }

    pub fn toggle_expanded(&mut self, index: usize) {
        if !self.expanded.remove(&index) {
            self.expanded.insert(index);
        }
        self.comment_cursor = 0;
    }

    pub fn is_expanded(&self, index: usize) -> bool {
        self.expanded.contains(&index)
    }
}

pub fn empty_favorites_message(kind: CatalogKind) -> String {
    format!("No favorite {} found.", kind.plural_label())
}

pub fn guest_favorites_message(kind: CatalogKind) -> String {
    format!("Please login to view your favorite {}.", kind.plural_label())
}

pub fn guest_toggle_message(kind: CatalogKind) -> String {
    format!("Please login to favorite {}.", kind.plural_label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SearchGroup;

    fn track(id: i64) -> Track {
        Track {
            id,
            name: format!("Track {id}"),
            description: String::new(),
            icon: None,
            difficulty: Some("Beginner".into()),
            duration: Some("4 weeks".into()),
            lessons: Some(0),
        }
    }

    #[test]
    fn track_cards_mark_favorites_and_stats() {
        let favorites: HashSet<i64> = [2].into_iter().collect();
        let plain = Card::from_track(track(1), &favorites);
        let fav = Card::from_track(track(2), &favorites);
        assert!(!plain.favorited);
        assert!(fav.favorited);
        assert_eq!(fav.stats, vec!["4 weeks".to_string()]);
        assert_eq!(fav.badge.as_deref(), Some("Beginner"));
    }

    #[test]
    fn track_languages_have_no_favorite_control() {
        let card = Card::from_track_language(Language {
            id: 3,
            name: "Rust".into(),
            description: String::new(),
            icon: None,
        });
        assert!(!card.can_favorite);
    }

    #[test]
    fn replace_discards_previous_cards() {
        let mut list = CardList::default();
        list.replace(vec![Card::from_track(track(1), &HashSet::new())], None);
        list.select_next();
        list.replace(
            Vec::new(),
            Some(empty_favorites_message(CatalogKind::Track)),
        );
        assert!(list.cards().is_empty());
        assert_eq!(list.empty_message(), Some("No favorite tracks found."));
        assert_eq!(list.selected_index(), 0);
    }

    #[test]
    fn favorite_flip_targets_kind_and_id() {
        let mut list = CardList::default();
        list.replace(vec![Card::from_track(track(5), &HashSet::new())], None);
        assert!(!list.set_favorited(CatalogKind::Language, 5, true));
        assert!(list.set_favorited(CatalogKind::Track, 5, true));
        assert!(list.cards()[0].favorited);
    }

    #[test]
    fn search_hits_are_grouped_in_order() {
        let mut view = SearchView::default();
        view.apply(SearchResults {
            tracks: SearchGroup {
                results: vec![track(1)],
                count: 1,
            },
            terms: SearchGroup {
                results: vec![Term {
                    term: "Trait".into(),
                    description: String::new(),
                    link: String::new(),
                }],
                count: 1,
            },
            ..Default::default()
        });
        let hits = view.hits();
        assert_eq!(hits.len(), 2);
        assert!(matches!(hits[0], SearchHit::Track { id: 1, .. }));
        view.select_next();
        view.select_next();
        assert_eq!(view.selected_index(), 1);
    }

    #[test]
    fn messages_name_the_kind() {
        assert_eq!(
            guest_toggle_message(CatalogKind::Language),
            "Please login to favorite languages."
        );
        assert_eq!(
            guest_favorites_message(CatalogKind::Track),
            "Please login to view your favorite tracks."
        );
    }
}
