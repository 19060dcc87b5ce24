use std::collections::HashMap;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::UnicodeWidthStr;

use crate::api::CatalogKind;
use crate::community::{self, Community, CommunityState, MSG_GUEST_NOTICE};
use crate::data::Services;
use crate::forms::{self, Form, Prompt};
use crate::loader::{self, Dispatcher, Outcome, Slot};
use crate::markdown;
use crate::router::{Load, Route, Router, Transition, MSG_CHATBOT_LOGIN};
use crate::session::Session;
use crate::views::{
    self, CardList, ChatLog, ChatRole, CommunityView, SearchHit, SearchView, TermList,
};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);
const COLOR_FAVORITE: Color = Color::Rgb(249, 226, 175);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const NAV_WIDTH: u16 = 24;

const MSG_PROFILE_UPDATED: &str = "Profile updated";
const MSG_REGISTERED: &str = "Registered! Please login.";
const MSG_OTP_SENT: &str = "OTP sent to email.";
const MSG_PASSWORD_RESET: &str = "Password reset! Please login.";

pub struct Options {
    pub services: Services,
    pub session: Session,
    pub community: Community,
    pub start_route: String,
    pub tick_rate: Duration,
    pub questions_page_size: usize,
    pub leaderboard_page_size: usize,
    pub config_path: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Focus {
    Navigation,
    Panel,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PromptTarget {
    Search,
    Chat,
    Question,
    Comment(usize),
    CommunitySearch,
}

impl PromptTarget {
    fn label(self) -> &'static str {
        match self {
            PromptTarget::Search => "Search",
            PromptTarget::Chat => "Message",
            PromptTarget::Question => "Ask a question",
            PromptTarget::Comment(_) => "Write a comment",
            PromptTarget::CommunitySearch => "Filter questions",
        }
    }
}

/// A blocking message. Dismissing it follows `then`; `offer` is an
/// optional second destination reachable with `c`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Modal {
    message: String,
    then: Option<Route>,
    offer: Option<Route>,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Model {
    services: Services,
    session: Session,
    community: Community,
    router: Router,
    dispatcher: Dispatcher<Outcome>,

    focus: Focus,
    nav_index: usize,
    status_message: String,
    modal: Option<Modal>,
    prompt_target: Option<PromptTarget>,
    prompt: Prompt,

    lists: HashMap<Route, CardList>,
    terms: TermList,
    search: SearchView,
    chat: ChatLog,
    community_state: CommunityState,
    community_view: CommunityView,
    all_questions_view: CommunityView,
    leaderboard_offset: usize,

    login_form: Form,
    register_form: Form,
    reset_form: Form,
    reset_confirm_form: Form,
    profile_form: Form,

    questions_page_size: usize,
    leaderboard_page_size: usize,
    tick_rate: Duration,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let mut lists = HashMap::new();
        for route in [
            Route::Tracks,
            Route::Languages,
            Route::MyTracks,
            Route::MyLanguages,
        ] {
            lists.insert(route, CardList::default());
        }

        let mut model = Self {
            services: options.services,
            session: options.session,
            community: options.community,
            router: Router::new(),
            dispatcher: Dispatcher::new(),
            focus: Focus::Navigation,
            nav_index: 0,
            status_message: format!(
                "Welcome to DevGuide. Config: {}. Tab switches focus, q quits.",
                options.config_path
            ),
            modal: None,
            prompt_target: None,
            prompt: Prompt::default(),
            lists,
            terms: TermList::default(),
            search: SearchView::default(),
            chat: ChatLog::default(),
            community_state: CommunityState::default(),
            community_view: CommunityView::default(),
            all_questions_view: CommunityView::default(),
            leaderboard_offset: 0,
            login_form: forms::login_form(),
            register_form: forms::register_form(),
            reset_form: forms::reset_form(),
            reset_confirm_form: forms::reset_confirm_form(),
            profile_form: forms::profile_form(),
            questions_page_size: options.questions_page_size.max(1),
            leaderboard_page_size: options.leaderboard_page_size.max(1),
            tick_rate: options.tick_rate,
            spinner: Spinner::new(),
            needs_redraw: true,
        };

        model.reload_community();
        if model.session.is_logged_in() {
            model.fetch_profile(false);
        }
        let start = options.start_route;
        match model.router.navigate(&start, &mut model.session) {
            Some(transition) => model.apply_transition(transition),
            None => {
                let transition = model.router.refresh(&mut model.session);
                model.apply_transition(transition);
            }
        }
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        if key.modifiers.contains(KeyModifiers::CONTROL)
                            && key.code == KeyCode::Char('c')
                        {
                            break;
                        }
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                tracing::error!(error = %err, "key handling failed");
                                self.status_message = format!("Error: {err}");
                                self.mark_dirty();
                            }
                        }
                    }
                } else {
                    self.mark_dirty();
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                last_tick = Instant::now();
                if !self.dispatcher.is_idle() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Some(outcome) = self.dispatcher.try_next() {
            self.handle_outcome(outcome);
            changed = true;
        }
        changed
    }

    fn navigate(&mut self, route: Route) {
        if let Some(transition) = self.router.navigate(route.fragment(), &mut self.session) {
            self.apply_transition(transition);
        }
        self.mark_dirty();
    }

    fn refresh(&mut self) {
        let transition = self.router.refresh(&mut self.session);
        self.apply_transition(transition);
        self.mark_dirty();
    }

    fn apply_transition(&mut self, transition: Transition) {
        match transition {
            Transition::Blocked { message, redirect } => {
                self.show_modal(message, Some(redirect));
            }
            Transition::Enter { route, load } => {
                if let Some(pos) = Route::ALL.iter().position(|r| *r == route) {
                    self.nav_index = pos;
                }
                self.prompt_target = None;
                if is_form_route(route) {
                    self.focus = Focus::Panel;
                }
                if let Some(load) = load {
                    self.start_load(load);
                }
            }
        }
    }

    fn start_load(&mut self, load: Load) {
        match load {
            Load::Community | Load::AllQuestions | Load::AllLeaderboard => {
                self.reload_community();
                return;
            }
            Load::Search => {
                self.submit_search();
                return;
            }
            Load::MyTracks | Load::MyLanguages if !self.session.is_logged_in() => {
                let (route, kind) = if load == Load::MyTracks {
                    (Route::MyTracks, CatalogKind::Track)
                } else {
                    (Route::MyLanguages, CatalogKind::Language)
                };
                let message = views::guest_favorites_message(kind);
                self.list_mut(route).show_message(message.clone());
                self.show_modal(message, None);
                return;
            }
            Load::Profile if !self.session.is_logged_in() => {
                self.status_message = "Login to view your profile.".to_string();
                return;
            }
            Load::Profile => {
                self.fetch_profile(true);
                return;
            }
            _ => {}
        }

        let route = match &load {
            Load::Tracks => Route::Tracks,
            Load::Languages | Load::TrackLanguages(_) => Route::Languages,
            Load::MyTracks => Route::MyTracks,
            Load::MyLanguages => Route::MyLanguages,
            Load::Terms(_) => Route::Terms,
            _ => self.router.visible(),
        };
        if let Load::Terms(language) = &load {
            self.terms.heading = language.clone();
            self.terms.loading = true;
        } else {
            self.list_mut(route).set_loading();
        }

        let services = self.services.clone();
        let token = self.session.token().map(str::to_string);
        tracing::debug!(?load, "loading panel");
        self.dispatcher.spawn(Slot::Panel(route), move || {
            loader::run_load(&services, token.as_deref(), &load)
        });
    }

    fn fetch_profile(&mut self, fill_form: bool) {
        let Some(token) = self.session.token().map(str::to_string) else {
            return;
        };
        let services = self.services.clone();
        self.dispatcher.spawn(Slot::Profile, move || Outcome::Profile {
            result: services.account.profile(&token),
            fill_form,
        });
    }

    fn submit_search(&mut self) {
        let query = self.search.query.trim().to_string();
        if query.is_empty() {
            self.status_message = "Enter a search term with /".to_string();
            return;
        }
        self.search.loading = true;
        let services = self.services.clone();
        let token = self.session.token().map(str::to_string);
        self.dispatcher.spawn(Slot::Search, move || Outcome::Search {
            result: services.search.search(token.as_deref(), &query),
            query,
        });
    }

    fn reload_community(&mut self) {
        match self.community.snapshot() {
            Ok(state) => self.community_state = state,
            Err(err) => {
                tracing::error!(error = %err, "reading community state failed");
                self.status_message = format!("Community unavailable: {err}");
            }
        }
    }

    fn list_mut(&mut self, route: Route) -> &mut CardList {
        self.lists.entry(route).or_default()
    }

    fn show_modal(&mut self, message: impl Into<String>, then: Option<Route>) {
        self.modal = Some(Modal {
            message: message.into(),
            then,
            offer: None,
        });
        self.mark_dirty();
    }

    fn participant(&self) -> Option<String> {
        if self.session.can_participate() {
            self.session.user_id().map(str::to_string)
        } else {
            None
        }
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Cards { route, result } => match result {
                Ok(cards) => {
                    let empty = match route {
                        Route::MyTracks => Some(views::empty_favorites_message(CatalogKind::Track)),
                        Route::MyLanguages => {
                            Some(views::empty_favorites_message(CatalogKind::Language))
                        }
                        _ => None,
                    };
                    self.status_message = format!("{} loaded.", route.title());
                    self.list_mut(route).replace(cards, empty);
                }
                Err(err) => {
                    tracing::error!(route = route.fragment(), error = %err, "list load failed");
                    self.list_mut(route).finish_loading();
                    match route {
                        Route::MyTracks => self.show_modal("Failed to load favorite tracks.", None),
                        Route::MyLanguages => {
                            self.show_modal("Failed to load favorite languages.", None)
                        }
                        _ => self.status_message = format!("Failed to load {}: {err}", route.title()),
                    }
                }
            },
            Outcome::Terms { language, result } => match result {
                Ok(terms) => self.terms.replace(language, terms),
                Err(err) => {
                    tracing::error!(%language, error = %err, "terms load failed");
                    self.terms.loading = false;
                    self.status_message = format!("Failed to load terms: {err}");
                }
            },
            Outcome::Profile { .. } if !self.session.is_logged_in() => {
                tracing::debug!("ignoring profile for a closed session");
            }
            Outcome::Profile { result, fill_form } => match result {
                Ok(profile) => {
                    let current = self.session.apply_profile(&profile).clone();
                    if let Some(user_id) = current.email.as_deref() {
                        if let Err(err) = self.community.remember_profile(user_id, &current) {
                            tracing::warn!(error = %err, "saving profile snapshot failed");
                        }
                    }
                    if fill_form {
                        forms::fill_profile(&mut self.profile_form, &current);
                    }
                    self.reload_community();
                }
                Err(err) => {
                    tracing::warn!(error = %err, "profile fetch failed");
                    if err.is_unauthorized() {
                        if let Err(err) = self.session.forget_token() {
                            tracing::error!(error = %err, "clearing token failed");
                        }
                    } else {
                        self.session.demote_to_guest();
                    }
                    self.reload_community();
                }
            },
            Outcome::Favorite {
                kind,
                id,
                was_favorited,
                result,
            } => match result {
                Ok(()) => {
                    for list in self.lists.values_mut() {
                        list.set_favorited(kind, id, !was_favorited);
                    }
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Outcome::Search { query, result } => match result {
                Ok(results) => {
                    let empty = results.is_empty();
                    self.search.apply(results);
                    if empty {
                        self.modal = Some(Modal {
                            message: format!(
                                "No results for \"{query}\". Press c to ask the chatbot instead."
                            ),
                            then: None,
                            offer: Some(Route::Chatbot),
                        });
                    }
                }
                Err(err) => {
                    self.search.loading = false;
                    self.show_modal(err.to_string(), None);
                }
            },
            Outcome::Chat { result } => match result {
                Ok(reply) => self.chat.push_bot(reply),
                Err(err) => {
                    self.chat.waiting = false;
                    self.show_modal(err.to_string(), None);
                }
            },
            Outcome::Login { result } => match result {
                Ok(tokens) => {
                    if let Err(err) = self.session.begin(tokens) {
                        tracing::error!(error = %err, "saving tokens failed");
                        self.show_modal(format!("Could not save login: {err}"), None);
                        return;
                    }
                    tracing::info!("logged in");
                    self.login_form.clear();
                    self.fetch_profile(false);
                    self.navigate(Route::Languages);
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Outcome::Register { result } => match result {
                Ok(()) => {
                    self.register_form.clear();
                    self.show_modal(MSG_REGISTERED, Some(Route::Login));
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Outcome::ResetRequested { result } => match result {
                Ok(()) => self.show_modal(MSG_OTP_SENT, Some(Route::ResetPasswordConfirm)),
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Outcome::ResetConfirmed { result } => match result {
                Ok(()) => {
                    self.reset_confirm_form.clear();
                    self.show_modal(MSG_PASSWORD_RESET, Some(Route::Login));
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Outcome::ProfileSaved { failures } => {
                self.fetch_profile(true);
                if failures.is_empty() {
                    self.show_modal(MSG_PROFILE_UPDATED, None);
                } else {
                    let details: Vec<String> = failures
                        .iter()
                        .map(|(field, message)| format!("{field}: {message}"))
                        .collect();
                    self.show_modal(
                        format!("{MSG_PROFILE_UPDATED}, except {}", details.join("; ")),
                        None,
                    );
                }
            }
            Outcome::LoggedOut { result } => {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "logout request failed");
                }
            }
            Outcome::Skipped => {}
        }
        self.mark_dirty();
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        self.mark_dirty();

        if self.modal.is_some() {
            self.handle_modal_key(code);
            return Ok(false);
        }
        if self.prompt_target.is_some() {
            self.handle_prompt_key(code);
            return Ok(false);
        }
        if self.focus == Focus::Panel && self.form_active() {
            self.handle_form_key(code);
            return Ok(false);
        }

        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Navigation => Focus::Panel,
                    Focus::Panel => Focus::Navigation,
                };
            }
            KeyCode::Esc => self.focus = Focus::Navigation,
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('/') => self.open_prompt(PromptTarget::Search),
            KeyCode::Char('X') => self.logout(),
            _ => match self.focus {
                Focus::Navigation => self.handle_nav_key(code),
                Focus::Panel => self.handle_panel_key(code),
            },
        }
        Ok(false)
    }

    fn handle_modal_key(&mut self, code: KeyCode) {
        let Some(modal) = self.modal.clone() else {
            return;
        };
        match code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => {
                self.modal = None;
                if let Some(route) = modal.then {
                    self.navigate(route);
                }
            }
            KeyCode::Char('c') if modal.offer.is_some() => {
                self.modal = None;
                if let Some(route) = modal.offer {
                    self.navigate(route);
                }
            }
            _ => {}
        }
    }

    fn handle_nav_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('j') | KeyCode::Down => {
                if self.nav_index + 1 < Route::ALL.len() {
                    self.nav_index += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.nav_index = self.nav_index.saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
                let route = Route::ALL[self.nav_index.min(Route::ALL.len() - 1)];
                self.navigate(route);
                if self.router.is_visible(route) {
                    self.focus = Focus::Panel;
                }
            }
            _ => {}
        }
    }

    fn handle_panel_key(&mut self, code: KeyCode) {
        let route = self.router.visible();
        match route {
            Route::Tracks | Route::Languages | Route::MyTracks | Route::MyLanguages => {
                self.handle_cards_key(route, code)
            }
            Route::Terms => match code {
                KeyCode::Char('j') | KeyCode::Down => self.terms.select_next(),
                KeyCode::Char('k') | KeyCode::Up => self.terms.select_previous(),
                KeyCode::Char('o') | KeyCode::Enter => {
                    if let Some(link) = self.terms.selected().map(|t| t.link.clone()) {
                        self.open_link(&link);
                    }
                }
                _ => {}
            },
            Route::Search => self.handle_search_key(code),
            Route::Chatbot => {
                if matches!(code, KeyCode::Enter | KeyCode::Char('i')) {
                    self.open_prompt(PromptTarget::Chat);
                }
            }
            Route::Community | Route::AllQuestions => self.handle_community_key(route, code),
            Route::AllLeaderboard => match code {
                KeyCode::Char('j') | KeyCode::Down => {
                    let total = self.community_state.users.len();
                    if self.leaderboard_offset + 1 < total {
                        self.leaderboard_offset += 1;
                    }
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    self.leaderboard_offset = self.leaderboard_offset.saturating_sub(1);
                }
                _ => {}
            },
            Route::Login
            | Route::Register
            | Route::ResetPassword
            | Route::ResetPasswordConfirm
            | Route::Profile => {}
        }
    }

    fn handle_cards_key(&mut self, route: Route, code: KeyCode) {
        match code {
            KeyCode::Char('j') | KeyCode::Down => self.list_mut(route).select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.list_mut(route).select_previous(),
            KeyCode::Char('f') => self.toggle_favorite(route),
            KeyCode::Enter => {
                let Some(card) = self.list_mut(route).selected().cloned() else {
                    return;
                };
                match card.kind {
                    CatalogKind::Track => {
                        self.session.select_track(card.id);
                        self.navigate(Route::Languages);
                    }
                    CatalogKind::Language => {
                        self.session.select_language(card.title.clone());
                        self.navigate(Route::Terms);
                    }
                }
            }
            _ => {}
        }
    }

    fn toggle_favorite(&mut self, route: Route) {
        let Some(card) = self.list_mut(route).selected().cloned() else {
            return;
        };
        if !card.can_favorite {
            return;
        }
        let Some(token) = self.session.token().map(str::to_string) else {
            self.show_modal(views::guest_toggle_message(card.kind), None);
            return;
        };
        let slot = Slot::Favorite(card.kind, card.id);
        if self.dispatcher.is_busy(slot) {
            return;
        }
        let services = self.services.clone();
        self.dispatcher.spawn(slot, move || {
            loader::toggle_favorite(&services, &token, card.kind, card.id, card.favorited)
        });
    }

    fn handle_search_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('j') | KeyCode::Down => self.search.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.search.select_previous(),
            KeyCode::Char('i') => self.open_prompt(PromptTarget::Search),
            KeyCode::Enter => match self.search.selected() {
                Some(SearchHit::Track { id, .. }) => {
                    self.session.select_track(id);
                    self.navigate(Route::Languages);
                }
                Some(SearchHit::Language { name }) => {
                    self.session.select_language(name);
                    self.navigate(Route::Terms);
                }
                Some(SearchHit::Term(term)) => self.open_link(&term.link),
                None => self.open_prompt(PromptTarget::Search),
            },
            _ => {}
        }
    }

    fn handle_community_key(&mut self, route: Route, code: KeyCode) {
        let ranked: Vec<usize> = {
            let view = self.community_view_for(route);
            let limit = self.question_limit(route);
            self.community_state
                .ranked(&view.search)
                .into_iter()
                .take(limit)
                .map(|entry| entry.index)
                .collect()
        };
        let selected = self.community_view_for(route).selected.min(ranked.len().saturating_sub(1));
        let target = ranked.get(selected).copied();

        match code {
            KeyCode::Char('j') | KeyCode::Down => {
                let view = self.community_view_mut(route);
                view.selected += 1;
                view.comment_cursor = 0;
                view.clamp(ranked.len());
            }
            KeyCode::Char('k') | KeyCode::Up => {
                let view = self.community_view_mut(route);
                view.selected = view.selected.saturating_sub(1);
                view.comment_cursor = 0;
            }
            KeyCode::Enter => {
                if let Some(index) = target {
                    self.community_view_mut(route).toggle_expanded(index);
                }
            }
            KeyCode::Char('J') => {
                if let Some(index) = target {
                    let count = self
                        .community_state
                        .questions
                        .get(index)
                        .map(|q| q.comments.len())
                        .unwrap_or(0);
                    let view = self.community_view_mut(route);
                    if view.comment_cursor + 1 < count {
                        view.comment_cursor += 1;
                    }
                }
            }
            KeyCode::Char('K') => {
                let view = self.community_view_mut(route);
                view.comment_cursor = view.comment_cursor.saturating_sub(1);
            }
            KeyCode::Char('n') => {
                if self.participant().is_some() {
                    self.open_prompt(PromptTarget::Question);
                } else {
                    self.show_modal(community::MSG_LOGIN_TO_POST, None);
                }
            }
            KeyCode::Char('u') => {
                if let Some(index) = target {
                    let user = self.participant();
                    match self.community.toggle_upvote(user.as_deref(), index) {
                        Ok(_) => self.reload_community(),
                        Err(err) => self.show_modal(err.to_string(), None),
                    }
                }
            }
            KeyCode::Char('c') => {
                if let Some(index) = target {
                    if self.participant().is_some() {
                        self.open_prompt(PromptTarget::Comment(index));
                    } else {
                        self.show_modal(community::MSG_LOGIN_TO_COMMENT, None);
                    }
                }
            }
            KeyCode::Char('+') => {
                let Some(index) = target else {
                    return;
                };
                if !self.community_view_for(route).is_expanded(index) {
                    return;
                }
                let cursor = self.community_view_for(route).comment_cursor;
                let comment_id = self
                    .community_state
                    .questions
                    .get(index)
                    .and_then(|q| q.comments.get(cursor))
                    .map(|c| c.id);
                if let Some(id) = comment_id {
                    match self.community.like_comment(id) {
                        Ok(_) => self.reload_community(),
                        Err(err) => self.show_modal(err.to_string(), None),
                    }
                }
            }
            KeyCode::Char('s') => self.open_prompt(PromptTarget::CommunitySearch),
            KeyCode::Char('a') => self.navigate(Route::AllQuestions),
            KeyCode::Char('b') => self.navigate(Route::AllLeaderboard),
            _ => {}
        }
    }

    fn community_view_for(&self, route: Route) -> &CommunityView {
        if route == Route::AllQuestions {
            &self.all_questions_view
        } else {
            &self.community_view
        }
    }

    fn community_view_mut(&mut self, route: Route) -> &mut CommunityView {
        if route == Route::AllQuestions {
            &mut self.all_questions_view
        } else {
            &mut self.community_view
        }
    }

    fn question_limit(&self, route: Route) -> usize {
        if route == Route::AllQuestions {
            usize::MAX
        } else {
            self.questions_page_size
        }
    }

    fn open_prompt(&mut self, target: PromptTarget) {
        self.prompt = Prompt::default();
        match target {
            PromptTarget::Search => self.prompt.value = self.search.query.clone(),
            PromptTarget::CommunitySearch => {
                self.prompt.value = self.community_view_for(self.router.visible()).search.clone()
            }
            _ => {}
        }
        self.prompt_target = Some(target);
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Some(target) = self.prompt_target else {
            return;
        };
        match code {
            KeyCode::Esc => {
                self.prompt_target = None;
                self.prompt = Prompt::default();
            }
            KeyCode::Backspace => self.prompt.backspace(),
            KeyCode::Char(ch) => self.prompt.insert_char(ch),
            KeyCode::Enter => {
                self.prompt_target = None;
                let text = self.prompt.take();
                self.submit_prompt(target, text);
            }
            _ => {}
        }
    }

    fn submit_prompt(&mut self, target: PromptTarget, text: String) {
        match target {
            PromptTarget::Search => {
                self.search.query = text;
                if self.router.is_visible(Route::Search) {
                    self.submit_search();
                } else {
                    self.navigate(Route::Search);
                }
                self.focus = Focus::Panel;
            }
            PromptTarget::Chat => {
                let message = text.trim().to_string();
                if message.is_empty() {
                    return;
                }
                let token = match self.session.require_token(MSG_CHATBOT_LOGIN) {
                    Ok(token) => token.to_string(),
                    Err(err) => {
                        self.show_modal(err.to_string(), Some(Route::Login));
                        return;
                    }
                };
                self.chat.push_user(message.clone());
                let services = self.services.clone();
                self.dispatcher.spawn(Slot::Chat, move || Outcome::Chat {
                    result: services.chat.ask(&token, &message),
                });
            }
            PromptTarget::Question => {
                let user = self.participant();
                match self
                    .community
                    .post_question(user.as_deref(), &text, Utc::now())
                {
                    Ok(question) => {
                        self.status_message =
                            format!("Question posted. You now have {} points.", question.points);
                        self.reload_community();
                    }
                    Err(err) => self.show_modal(err.to_string(), None),
                }
            }
            PromptTarget::Comment(index) => {
                let user = self.participant();
                match self
                    .community
                    .add_comment(user.as_deref(), index, &text, Utc::now())
                {
                    Ok(Some(_)) => {
                        let route = self.router.visible();
                        let view = self.community_view_mut(route);
                        view.expanded.insert(index);
                        self.reload_community();
                    }
                    Ok(None) => {}
                    Err(err) => self.show_modal(err.to_string(), None),
                }
            }
            PromptTarget::CommunitySearch => {
                let route = self.router.visible();
                let view = self.community_view_mut(route);
                view.search = text;
                view.selected = 0;
                view.comment_cursor = 0;
            }
        }
    }

    fn form_active(&self) -> bool {
        let route = self.router.visible();
        is_form_route(route) && (route != Route::Profile || self.session.is_logged_in())
    }

    fn active_form_mut(&mut self) -> Option<&mut Form> {
        match self.router.visible() {
            Route::Login => Some(&mut self.login_form),
            Route::Register => Some(&mut self.register_form),
            Route::ResetPassword => Some(&mut self.reset_form),
            Route::ResetPasswordConfirm => Some(&mut self.reset_confirm_form),
            Route::Profile => Some(&mut self.profile_form),
            _ => None,
        }
    }

    fn handle_form_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.focus = Focus::Navigation,
            KeyCode::Enter => self.submit_form(),
            _ => {
                let Some(form) = self.active_form_mut() else {
                    return;
                };
                match code {
                    KeyCode::Tab | KeyCode::Down => form.focus_next(),
                    KeyCode::BackTab | KeyCode::Up => form.focus_previous(),
                    KeyCode::Backspace => form.backspace(),
                    KeyCode::Char(ch) => form.insert_char(ch),
                    _ => {}
                }
            }
        }
    }

    fn submit_form(&mut self) {
        let services = self.services.clone();
        match self.router.visible() {
            Route::Login => match forms::login_request(&self.login_form) {
                Ok(request) => {
                    self.status_message = "Logging in…".to_string();
                    self.dispatcher.spawn(Slot::Account, move || Outcome::Login {
                        result: services.account.login(&request),
                    });
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Route::Register => match forms::register_request(&self.register_form) {
                Ok(request) => {
                    self.dispatcher.spawn(Slot::Account, move || Outcome::Register {
                        result: services.account.register(&request),
                    });
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Route::ResetPassword => match forms::reset_email(&self.reset_form) {
                Ok(email) => {
                    self.dispatcher
                        .spawn(Slot::Account, move || Outcome::ResetRequested {
                            result: services.account.request_password_reset(&email),
                        });
                }
                Err(err) => self.show_modal(err.to_string(), None),
            },
            Route::ResetPasswordConfirm => {
                match forms::reset_confirmation(&self.reset_confirm_form) {
                    Ok((otp, password)) => {
                        self.dispatcher
                            .spawn(Slot::Account, move || Outcome::ResetConfirmed {
                                result: services.account.confirm_password_reset(&otp, &password),
                            });
                    }
                    Err(err) => self.show_modal(err.to_string(), None),
                }
            }
            Route::Profile => {
                let Some(token) = self.session.token().map(str::to_string) else {
                    self.show_modal("Please login to update your profile.", Some(Route::Login));
                    return;
                };
                let changes = forms::profile_changes(&self.profile_form);
                self.status_message = "Saving profile…".to_string();
                self.dispatcher.spawn(Slot::Account, move || {
                    loader::save_profile(&services, &token, &changes)
                });
            }
            _ => {}
        }
    }

    fn logout(&mut self) {
        let Some(token) = self.session.token().map(str::to_string) else {
            self.status_message = "You are not logged in.".to_string();
            return;
        };
        if let Err(err) = self.session.end() {
            tracing::error!(error = %err, "clearing session failed");
        }
        for slot in [
            Slot::Profile,
            Slot::Panel(Route::MyTracks),
            Slot::Panel(Route::MyLanguages),
        ] {
            self.dispatcher.abandon(slot);
        }
        tracing::info!("logged out");
        let services = self.services.clone();
        self.dispatcher.spawn(Slot::Account, move || Outcome::LoggedOut {
            result: services.account.logout(&token),
        });
        self.profile_form.clear();
        self.reload_community();
        self.navigate(Route::Login);
        self.focus = Focus::Panel;
    }

    fn open_link(&mut self, link: &str) {
        if link.trim().is_empty() {
            self.status_message = "This entry has no link.".to_string();
            return;
        }
        match webbrowser::open(link) {
            Ok(()) => self.status_message = format!("Opened {link}"),
            Err(err) => {
                tracing::warn!(%link, error = %err, "opening browser failed");
                self.status_message = format!("Could not open {link}: {err}");
            }
        }
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_status(frame, layout[0]);

        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(NAV_WIDTH), Constraint::Min(0)])
            .split(layout[1]);
        self.draw_nav(frame, main[0]);
        self.draw_panel(frame, main[1]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);

        if let Some(target) = self.prompt_target {
            self.draw_prompt(frame, layout[1], target);
        }
        if let Some(modal) = self.modal.as_ref() {
            draw_modal(frame, layout[1], modal);
        }
    }

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let status = if self.dispatcher.is_idle() {
            self.status_message.clone()
        } else {
            format!("{} {}", self.spinner.frame(), self.status_message)
        };
        let profile = self.session.profile();
        let who = format!(" {} ", profile.full_name);
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(who.width() as u16),
            ])
            .split(area);
        let style = Style::default()
            .fg(COLOR_TEXT_PRIMARY)
            .bg(COLOR_PANEL_FOCUSED_BG)
            .add_modifier(Modifier::BOLD);
        frame.render_widget(Paragraph::new(status).style(style), chunks[0]);
        let who_style = if self.session.is_logged_in() {
            style.fg(COLOR_SUCCESS)
        } else {
            style.fg(COLOR_TEXT_SECONDARY)
        };
        frame.render_widget(Paragraph::new(who).style(who_style), chunks[1]);
    }

    fn pane_block(&self, title: String, focused: bool) -> Block<'static> {
        let border_style = if focused {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };
        let title_style = if focused {
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        Block::default()
            .title(Span::styled(title, title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_nav(&self, frame: &mut Frame<'_>, area: Rect) {
        let focused = self.focus == Focus::Navigation;
        let block = self.pane_block("DevGuide".to_string(), focused);
        let visible = self.router.visible();
        let items: Vec<ListItem> = Route::ALL
            .iter()
            .map(|route| {
                let marker = if *route == visible { "● " } else { "  " };
                let mut style = Style::default().fg(COLOR_TEXT_PRIMARY);
                if *route == Route::Chatbot && !self.session.is_logged_in() {
                    style = style.fg(COLOR_TEXT_SECONDARY);
                }
                ListItem::new(Line::from(vec![
                    Span::styled(marker, Style::default().fg(COLOR_ACCENT)),
                    Span::styled(route.title(), style),
                ]))
            })
            .collect();
        let list = List::new(items).block(block).highlight_style(
            Style::default()
                .bg(COLOR_PANEL_SELECTED_BG)
                .add_modifier(Modifier::BOLD),
        );
        let mut state = ListState::default();
        state.select(Some(self.nav_index));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_panel(&self, frame: &mut Frame<'_>, area: Rect) {
        let route = self.router.visible();
        let focused = self.focus == Focus::Panel;
        let title = match route {
            Route::Terms if !self.terms.heading.is_empty() => {
                format!("Terms · {}", self.terms.heading)
            }
            _ => route.title().to_string(),
        };
        let block = self.pane_block(title, focused);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        match route {
            Route::Tracks | Route::Languages | Route::MyTracks | Route::MyLanguages => {
                self.draw_cards(frame, inner, route)
            }
            Route::Terms => self.draw_terms(frame, inner),
            Route::Search => self.draw_search(frame, inner),
            Route::Chatbot => self.draw_chat(frame, inner),
            Route::Community => self.draw_community(frame, inner),
            Route::AllQuestions => {
                self.draw_questions(frame, inner, Route::AllQuestions, &self.all_questions_view)
            }
            Route::AllLeaderboard => self.draw_leaderboard(frame, inner, usize::MAX),
            Route::Profile if !self.session.is_logged_in() => {
                frame.render_widget(
                    Paragraph::new("Login to view your profile.")
                        .style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                    inner,
                );
            }
            Route::Login => self.draw_form(frame, inner, &self.login_form, None),
            Route::Register => self.draw_form(frame, inner, &self.register_form, None),
            Route::ResetPassword => self.draw_form(frame, inner, &self.reset_form, None),
            Route::ResetPasswordConfirm => {
                self.draw_form(frame, inner, &self.reset_confirm_form, None)
            }
            Route::Profile => {
                let picture = format!("Avatar: {}", self.session.profile().profile_picture);
                self.draw_form(frame, inner, &self.profile_form, Some(picture))
            }
        }
    }

    fn draw_cards(&self, frame: &mut Frame<'_>, area: Rect, route: Route) {
        let Some(list) = self.lists.get(&route) else {
            return;
        };
        if list.cards().is_empty() {
            let message = if list.is_loading() {
                "Loading…".to_string()
            } else {
                list.empty_message().unwrap_or("Nothing to show yet.").to_string()
            };
            frame.render_widget(
                Paragraph::new(message).style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                area,
            );
            return;
        }

        let width = area.width.saturating_sub(2).max(10) as usize;
        let items: Vec<ListItem> = list
            .cards()
            .iter()
            .map(|card| {
                let mut title = Vec::new();
                if card.can_favorite {
                    let (star, color) = if card.favorited {
                        ("★ ", COLOR_FAVORITE)
                    } else {
                        ("☆ ", COLOR_TEXT_SECONDARY)
                    };
                    title.push(Span::styled(star, Style::default().fg(color)));
                }
                title.push(Span::styled(
                    card.title.clone(),
                    Style::default()
                        .fg(COLOR_TEXT_PRIMARY)
                        .add_modifier(Modifier::BOLD),
                ));
                if let Some(badge) = card.badge.as_ref() {
                    title.push(Span::styled(
                        format!("  [{badge}]"),
                        Style::default().fg(COLOR_ACCENT),
                    ));
                }
                let mut lines = vec![Line::from(title)];
                for chunk in wrap(&card.description, width) {
                    lines.push(Line::styled(
                        chunk.into_owned(),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    ));
                }
                if !card.stats.is_empty() {
                    lines.push(Line::styled(
                        card.stats.join(" · "),
                        Style::default().fg(COLOR_SUCCESS),
                    ));
                }
                lines.push(Line::default());
                ListItem::new(Text::from(lines))
            })
            .collect();
        let widget = List::new(items).highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG));
        let mut state = ListState::default();
        state.select(Some(list.selected_index()));
        frame.render_stateful_widget(widget, area, &mut state);
    }

    fn draw_terms(&self, frame: &mut Frame<'_>, area: Rect) {
        if self.terms.terms().is_empty() {
            let message = if self.terms.loading {
                "Loading…"
            } else if self.terms.heading.is_empty() {
                "Pick a language to explore its terms."
            } else {
                "No terms found."
            };
            frame.render_widget(
                Paragraph::new(message).style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                area,
            );
            return;
        }
        let width = area.width.saturating_sub(2).max(10) as usize;
        let items: Vec<ListItem> = self
            .terms
            .terms()
            .iter()
            .map(|term| {
                let mut lines = vec![Line::styled(
                    format!("📚 {}", term.term),
                    Style::default()
                        .fg(COLOR_TEXT_PRIMARY)
                        .add_modifier(Modifier::BOLD),
                )];
                for chunk in wrap(&term.description, width) {
                    lines.push(Line::styled(
                        chunk.into_owned(),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    ));
                }
                if !term.link.is_empty() {
                    lines.push(Line::styled(
                        format!("Read more: {}", term.link),
                        Style::default()
                            .fg(COLOR_ACCENT)
                            .add_modifier(Modifier::UNDERLINED),
                    ));
                }
                lines.push(Line::default());
                ListItem::new(Text::from(lines))
            })
            .collect();
        let widget = List::new(items).highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG));
        let mut state = ListState::default();
        state.select(Some(self.terms.selected_index()));
        frame.render_stateful_widget(widget, area, &mut state);
    }

    fn draw_search(&self, frame: &mut Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(0)])
            .split(area);
        let query = if self.search.query.is_empty() {
            "Press / to search tracks, languages and terms.".to_string()
        } else {
            format!("Query: {}", self.search.query)
        };
        frame.render_widget(
            Paragraph::new(query).style(Style::default().fg(COLOR_TEXT_PRIMARY)),
            chunks[0],
        );

        let Some(results) = self.search.results.as_ref() else {
            if self.search.loading {
                frame.render_widget(Paragraph::new("Searching…"), chunks[1]);
            }
            return;
        };

        let mut items: Vec<ListItem> = Vec::new();
        let mut selectable: Vec<usize> = Vec::new();
        let header = |label: &str, count: i64| {
            ListItem::new(Line::styled(
                format!("{label} ({count})"),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
        };
        if !results.tracks.results.is_empty() {
            items.push(header("Tracks", results.tracks.count));
            for track in &results.tracks.results {
                selectable.push(items.len());
                items.push(ListItem::new(format!("  {}", track.name)));
            }
        }
        if !results.languages.results.is_empty() {
            items.push(header("Languages", results.languages.count));
            for lang in &results.languages.results {
                selectable.push(items.len());
                items.push(ListItem::new(format!("  {}", lang.name)));
            }
        }
        if !results.terms.results.is_empty() {
            items.push(header("Terms", results.terms.count));
            for term in &results.terms.results {
                selectable.push(items.len());
                items.push(ListItem::new(format!("  {} · {}", term.term, term.description)));
            }
        }
        if items.is_empty() {
            frame.render_widget(
                Paragraph::new("No results.").style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                chunks[1],
            );
            return;
        }
        let widget = List::new(items).highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG));
        let mut state = ListState::default();
        state.select(selectable.get(self.search.selected_index()).copied());
        frame.render_stateful_widget(widget, chunks[1], &mut state);
    }

    fn draw_chat(&self, frame: &mut Frame<'_>, area: Rect) {
        let mut lines: Vec<Line<'static>> = Vec::new();
        if self.chat.messages().is_empty() {
            lines.push(Line::styled(
                "Ask anything about programming. Press Enter to type.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }
        for message in self.chat.messages() {
            match message.role {
                ChatRole::User => {
                    lines.push(Line::from(vec![
                        Span::styled(
                            "You: ",
                            Style::default()
                                .fg(COLOR_ACCENT)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(message.text.clone()),
                    ]));
                }
                ChatRole::Bot => {
                    lines.push(Line::styled(
                        "DevGuide:",
                        Style::default()
                            .fg(COLOR_SUCCESS)
                            .add_modifier(Modifier::BOLD),
                    ));
                    lines.extend(markdown::render_chat(&message.text).lines);
                }
            }
            lines.push(Line::default());
        }
        if self.chat.waiting {
            lines.push(Line::styled("DevGuide is typing…", Style::default().fg(COLOR_TEXT_SECONDARY)));
        }
        let height = area.height as usize;
        let scroll = lines.len().saturating_sub(height) as u16;
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: false })
                .scroll((scroll, 0)),
            area,
        );
    }

    fn draw_community(&self, frame: &mut Frame<'_>, area: Rect) {
        let leaderboard_rows = self.leaderboard_page_size.min(self.community_state.users.len());
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(leaderboard_rows as u16 + 2),
            ])
            .split(area);
        self.draw_questions(frame, chunks[0], Route::Community, &self.community_view);
        self.draw_leaderboard(frame, chunks[1], self.leaderboard_page_size);
    }

    fn draw_questions(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        route: Route,
        view: &CommunityView,
    ) {
        let mut lines: Vec<Line<'static>> = Vec::new();
        if !self.session.is_logged_in() {
            lines.push(Line::styled(
                MSG_GUEST_NOTICE,
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::ITALIC),
            ));
        }
        if !view.search.is_empty() {
            lines.push(Line::styled(
                format!("Filter: {}", view.search),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }

        let current = self.session.profile();
        let me = self.session.user_id();
        let now = Utc::now();
        let ranked = self.community_state.ranked(&view.search);
        let limit = self.question_limit(route);
        let shown: Vec<_> = ranked.into_iter().take(limit).collect();
        if shown.is_empty() {
            lines.push(Line::styled(
                "No questions yet.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }
        let selected = view.selected.min(shown.len().saturating_sub(1));

        for (pos, entry) in shown.iter().enumerate() {
            let question = entry.question;
            let identity = self.community_state.identity(&question.user_id, current);
            let is_selected = pos == selected;
            let upvoted = me.is_some_and(|id| question.is_upvoted_by(id));
            let base = if is_selected {
                Style::default().bg(COLOR_PANEL_SELECTED_BG)
            } else {
                Style::default()
            };
            lines.push(Line::from(vec![
                Span::styled(
                    format!("▲ {} ", question.upvotes),
                    base.fg(if upvoted { COLOR_ACCENT } else { COLOR_TEXT_SECONDARY }),
                ),
                Span::styled(
                    identity.name,
                    base.fg(COLOR_TEXT_PRIMARY).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" · {}", community::time_ago(question.timestamp, now)),
                    base.fg(COLOR_TEXT_SECONDARY),
                ),
            ]));
            lines.push(Line::styled(
                format!("  {}", question.text),
                base.fg(COLOR_TEXT_PRIMARY),
            ));
            lines.push(Line::styled(
                format!("  💬 {}", question.comments.len()),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
            if view.is_expanded(entry.index) {
                for (cpos, comment) in question.comments.iter().enumerate() {
                    let who = self.community_state.identity(&comment.user_id, current);
                    let marker = if is_selected && cpos == view.comment_cursor {
                        "› "
                    } else {
                        "  "
                    };
                    lines.push(Line::from(vec![
                        Span::styled(format!("    {marker}"), Style::default().fg(COLOR_ACCENT)),
                        Span::styled(
                            format!("{}: ", who.name),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(comment.text.clone()),
                        Span::styled(
                            format!(
                                "  ♥ {} · {}",
                                comment.likes,
                                community::time_ago(comment.timestamp, now)
                            ),
                            Style::default().fg(COLOR_TEXT_SECONDARY),
                        ),
                    ]));
                }
            }
            lines.push(Line::default());
        }

        frame.render_widget(
            Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn draw_leaderboard(&self, frame: &mut Frame<'_>, area: Rect, limit: usize) {
        let current = self.session.profile();
        let offset = if limit == usize::MAX {
            self.leaderboard_offset
        } else {
            0
        };
        let entries = self.community_state.leaderboard();
        let items: Vec<ListItem> = entries
            .iter()
            .skip(offset)
            .take(limit)
            .map(|entry| {
                let identity = self.community_state.identity(&entry.user_id, current);
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("#{:<3}", entry.rank),
                        Style::default().fg(COLOR_ACCENT),
                    ),
                    Span::styled(
                        identity.name,
                        Style::default()
                            .fg(COLOR_TEXT_PRIMARY)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!("  {}  ", entry.badge)),
                    Span::styled(
                        format!("{} pts", entry.points),
                        Style::default().fg(COLOR_SUCCESS),
                    ),
                ]))
            })
            .collect();
        let block = Block::default()
            .title(Span::styled("Leaderboard", Style::default().fg(COLOR_ACCENT)))
            .borders(Borders::TOP)
            .border_style(Style::default().fg(COLOR_BORDER_IDLE));
        if items.is_empty() {
            frame.render_widget(
                Paragraph::new("No points yet.")
                    .block(block)
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                area,
            );
            return;
        }
        frame.render_widget(List::new(items).block(block), area);
    }

    fn draw_form(&self, frame: &mut Frame<'_>, area: Rect, form: &Form, extra: Option<String>) {
        let focused = self.focus == Focus::Panel;
        let mut lines: Vec<Line<'static>> = Vec::new();
        if let Some(extra) = extra {
            lines.push(Line::styled(extra, Style::default().fg(COLOR_TEXT_SECONDARY)));
            lines.push(Line::default());
        }
        for (idx, field) in form.fields().iter().enumerate() {
            let active = focused && idx == form.active_index();
            let label_style = if active {
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY)
            };
            let value_style = if active {
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_PANEL_SELECTED_BG)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            let cursor = if active && !field.is_checkbox() { "▏" } else { "" };
            lines.push(Line::from(vec![
                Span::styled(format!("{:<18}", field.label), label_style),
                Span::styled(format!("{}{cursor}", field.display_value()), value_style),
            ]));
        }
        lines.push(Line::default());
        lines.push(Line::styled(
            format!("Enter: {}", submit_label(self.router.visible())),
            Style::default().fg(COLOR_SUCCESS),
        ));
        frame.render_widget(
            Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }),
            area,
        );
    }

    fn draw_prompt(&self, frame: &mut Frame<'_>, area: Rect, target: PromptTarget) {
        let popup = Rect {
            x: area.x + area.width / 8,
            y: area.y + area.height.saturating_sub(5),
            width: area.width - area.width / 4,
            height: 3.min(area.height),
        };
        frame.render_widget(Clear, popup);
        let input = Paragraph::new(format!("{}▏", self.prompt.value)).block(
            Block::default()
                .title(Span::styled(
                    format!("{} (Enter to send, Esc to cancel)", target.label()),
                    Style::default().fg(COLOR_ACCENT),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_ACCENT))
                .style(Style::default().bg(COLOR_PANEL_BG)),
        );
        frame.render_widget(input, popup);
    }

    fn footer_text(&self) -> String {
        if self.modal.is_some() {
            return "Enter/Esc dismiss".to_string();
        }
        if self.prompt_target.is_some() {
            return "Type, Enter submit, Esc cancel".to_string();
        }
        if self.focus == Focus::Navigation {
            return "j/k move · Enter open · Tab panel · / search · r refresh · X logout · q quit"
                .to_string();
        }
        match self.router.visible() {
            Route::Tracks | Route::Languages | Route::MyTracks | Route::MyLanguages => {
                "j/k move · Enter explore · f favorite · Tab nav · q quit".to_string()
            }
            Route::Terms => "j/k move · o open link · Tab nav".to_string(),
            Route::Search => "i edit query · j/k move · Enter open · Tab nav".to_string(),
            Route::Chatbot => "Enter type a message · Tab nav".to_string(),
            Route::Community => {
                "n ask · u upvote · c comment · Enter comments · J/K + like · s filter · a all · b leaderboard"
                    .to_string()
            }
            Route::AllQuestions => {
                "n ask · u upvote · c comment · Enter comments · J/K + like · s filter".to_string()
            }
            Route::AllLeaderboard => "j/k scroll · Tab nav".to_string(),
            _ => "Tab/↓ next field · ↑ previous · Space toggle · Enter submit · Esc nav".to_string(),
        }
    }
}

fn is_form_route(route: Route) -> bool {
    matches!(
        route,
        Route::Login
            | Route::Register
            | Route::ResetPassword
            | Route::ResetPasswordConfirm
            | Route::Profile
    )
}

fn submit_label(route: Route) -> &'static str {
    match route {
        Route::Login => "login",
        Route::Register => "create account",
        Route::ResetPassword => "send OTP",
        Route::ResetPasswordConfirm => "reset password",
        Route::Profile => "save profile",
        _ => "submit",
    }
}

fn draw_modal(frame: &mut Frame<'_>, area: Rect, modal: &Modal) {
    let popup = centered_rect(60, 30, area);
    frame.render_widget(Clear, popup);
    let mut lines = vec![Line::styled(
        modal.message.clone(),
        Style::default().fg(COLOR_TEXT_PRIMARY),
    )];
    lines.push(Line::default());
    let hint = if modal.offer.is_some() {
        "c ask the chatbot · Enter close"
    } else {
        "Enter to close"
    };
    lines.push(Line::styled(hint, Style::default().fg(COLOR_TEXT_SECONDARY)));
    let widget = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .title(Span::styled(
                    "Message",
                    Style::default().fg(COLOR_ERROR).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_ACCENT))
                .style(Style::default().bg(COLOR_PANEL_BG)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(widget, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}
