use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{CurrentProfile, APP_LOGO};
use crate::storage::{self, Store};

pub const POINTS_PER_QUESTION: u64 = 5;
const UNKNOWN_USER: &str = "User";

pub const MSG_LOGIN_TO_POST: &str = "Please login to post.";
pub const MSG_LOGIN_TO_UPVOTE: &str = "Please login to upvote.";
pub const MSG_LOGIN_TO_COMMENT: &str = "Please login to comment.";
pub const MSG_GUEST_NOTICE: &str = "Login to post, upvote, or comment.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub user_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(default)]
    pub upvoted_by: BTreeSet<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Poster's total right after posting.
    #[serde(default)]
    pub points: u64,
}

impl Question {
    pub fn is_upvoted_by(&self, user_id: &str) -> bool {
        self.upvoted_by.contains(user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub user_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub likes: u32,
}

pub type UserPoints = BTreeMap<String, u64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

pub type ProfileSnapshots = BTreeMap<String, ProfileSnapshot>;

#[derive(Debug, thiserror::Error)]
pub enum CommunityError {
    #[error("{0}")]
    LoginRequired(&'static str),
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error("That question no longer exists.")]
    UnknownQuestion(usize),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type CommunityResult<T> = Result<T, CommunityError>;

/// A question paired with its position in storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedQuestion<'a> {
    pub index: usize,
    pub question: &'a Question,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub points: u64,
    pub badge: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayIdentity {
    pub name: String,
    pub avatar: String,
}

/// Orders by upvotes then recency, and keeps only matches for a non-blank
/// search term.
pub fn rank_questions<'a>(questions: &'a [Question], search: &str) -> Vec<RankedQuestion<'a>> {
    let mut ranked: Vec<RankedQuestion<'a>> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| RankedQuestion { index, question })
        .collect();
    ranked.sort_by(|a, b| {
        b.question
            .upvotes
            .cmp(&a.question.upvotes)
            .then_with(|| b.question.timestamp.cmp(&a.question.timestamp))
    });

    let needle = search.trim().to_lowercase();
    if !needle.is_empty() {
        ranked.retain(|entry| entry.question.text.to_lowercase().contains(&needle));
    }
    ranked
}

pub fn leaderboard(users: &UserPoints) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<(&String, u64)> = users.iter().map(|(id, pts)| (id, *pts)).collect();
    // BTreeMap iteration is already ascending by user id, so a stable sort
    // on points keeps that as the tie-break.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
        .into_iter()
        .enumerate()
        .map(|(idx, (user_id, points))| LeaderboardEntry {
            rank: idx + 1,
            user_id: user_id.clone(),
            points,
            badge: badge(points),
        })
        .collect()
}

pub fn badge(points: u64) -> &'static str {
    match points {
        p if p >= 100 => "🏆 Master",
        p if p >= 50 => "🥇 Expert",
        p if p >= 20 => "🥈 Learner",
        p if p >= 10 => "🥉 Newbie",
        _ => "",
    }
}

pub fn time_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - timestamp).num_minutes();
    let hours = minutes / 60;
    let days = hours / 24;
    if days > 0 {
        format!("{days}d ago")
    } else if hours > 0 {
        format!("{hours}h ago")
    } else if minutes > 0 {
        format!("{minutes}m ago")
    } else {
        "Just now".to_string()
    }
}

pub fn display_identity(
    user_id: &str,
    snapshots: &ProfileSnapshots,
    current: &CurrentProfile,
) -> DisplayIdentity {
    if let Some(snapshot) = snapshots.get(user_id) {
        return DisplayIdentity {
            name: filled(snapshot.full_name.as_deref()).unwrap_or(UNKNOWN_USER).to_string(),
            avatar: filled(snapshot.profile_picture.as_deref())
                .unwrap_or(APP_LOGO)
                .to_string(),
        };
    }
    if current.email.as_deref() == Some(user_id) {
        return DisplayIdentity {
            name: current.full_name.clone(),
            avatar: current.profile_picture.clone(),
        };
    }
    DisplayIdentity {
        name: UNKNOWN_USER.to_string(),
        avatar: APP_LOGO.to_string(),
    }
}

fn filled(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Globally unique, time-derived id: never below the current millisecond
/// clock and always above every id already stored.
fn next_comment_id(questions: &[Question], now: DateTime<Utc>) -> i64 {
    let highest = questions
        .iter()
        .flat_map(|q| q.comments.iter().map(|c| c.id))
        .max()
        .unwrap_or(i64::MIN);
    now.timestamp_millis().max(highest.saturating_add(1))
}

/// Everything the community panels render from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityState {
    pub questions: Vec<Question>,
    pub users: UserPoints,
    pub profiles: ProfileSnapshots,
}

impl CommunityState {
    pub fn ranked(&self, search: &str) -> Vec<RankedQuestion<'_>> {
        rank_questions(&self.questions, search)
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        leaderboard(&self.users)
    }

    pub fn identity(&self, user_id: &str, current: &CurrentProfile) -> DisplayIdentity {
        display_identity(user_id, &self.profiles, current)
    }
}

/// Locally persisted Q&A board. Every operation re-reads the store so
/// nothing is cached between calls.
#[derive(Clone)]
pub struct Community {
    store: Arc<Store>,
}

impl Community {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> CommunityResult<CommunityState> {
        Ok(CommunityState {
            questions: self.questions()?,
            users: self.store.load_json(storage::KEY_COMMUNITY_USERS)?,
            profiles: self.store.load_json(storage::KEY_COMMUNITY_PROFILES)?,
        })
    }

    pub fn post_question(
        &self,
        user: Option<&str>,
        text: &str,
        now: DateTime<Utc>,
    ) -> CommunityResult<Question> {
        let user_id = user.ok_or(CommunityError::LoginRequired(MSG_LOGIN_TO_POST))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CommunityError::EmptyQuestion);
        }

        let mut questions = self.questions()?;
        let mut users: UserPoints = self.store.load_json(storage::KEY_COMMUNITY_USERS)?;
        let total = users.entry(user_id.to_string()).or_insert(0);
        *total += POINTS_PER_QUESTION;

        let question = Question {
            user_id: user_id.to_string(),
            text: text.to_string(),
            timestamp: now,
            upvotes: 0,
            upvoted_by: BTreeSet::new(),
            comments: Vec::new(),
            points: *total,
        };
        questions.push(question.clone());
        self.save_questions(&questions)?;
        self.store.save_json(storage::KEY_COMMUNITY_USERS, &users)?;
        tracing::info!(user = user_id, total = question.points, "question posted");
        Ok(question)
    }

    /// Returns whether the user's upvote is present afterwards.
    pub fn toggle_upvote(&self, user: Option<&str>, index: usize) -> CommunityResult<bool> {
        let user_id = user.ok_or(CommunityError::LoginRequired(MSG_LOGIN_TO_UPVOTE))?;
        let mut questions = self.questions()?;
        let question = questions
            .get_mut(index)
            .ok_or(CommunityError::UnknownQuestion(index))?;

        let upvoted = if question.upvoted_by.remove(user_id) {
            question.upvotes = question.upvotes.saturating_sub(1);
            false
        } else {
            question.upvoted_by.insert(user_id.to_string());
            question.upvotes += 1;
            true
        };
        self.save_questions(&questions)?;
        Ok(upvoted)
    }

    /// Blank text is ignored and yields `None`.
    pub fn add_comment(
        &self,
        user: Option<&str>,
        index: usize,
        text: &str,
        now: DateTime<Utc>,
    ) -> CommunityResult<Option<Comment>> {
        let user_id = user.ok_or(CommunityError::LoginRequired(MSG_LOGIN_TO_COMMENT))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let mut questions = self.questions()?;
        let id = next_comment_id(&questions, now);
        let question = questions
            .get_mut(index)
            .ok_or(CommunityError::UnknownQuestion(index))?;
        let comment = Comment {
            id,
            user_id: user_id.to_string(),
            text: text.to_string(),
            timestamp: now,
            likes: 0,
        };
        question.comments.push(comment.clone());
        self.save_questions(&questions)?;
        Ok(Some(comment))
    }

    /// Bumps every comment carrying `id`; returns how many matched.
    pub fn like_comment(&self, id: i64) -> CommunityResult<usize> {
        let mut questions = self.questions()?;
        let mut matched = 0;
        for comment in questions.iter_mut().flat_map(|q| q.comments.iter_mut()) {
            if comment.id == id {
                comment.likes += 1;
                matched += 1;
            }
        }
        if matched > 0 {
            self.save_questions(&questions)?;
        }
        Ok(matched)
    }

    pub fn remember_profile(&self, user_id: &str, profile: &CurrentProfile) -> CommunityResult<()> {
        let mut profiles: ProfileSnapshots =
            self.store.load_json(storage::KEY_COMMUNITY_PROFILES)?;
        profiles.insert(
            user_id.to_string(),
            ProfileSnapshot {
                full_name: Some(profile.full_name.clone()),
                profile_picture: Some(profile.profile_picture.clone()),
            },
        );
        self.store
            .save_json(storage::KEY_COMMUNITY_PROFILES, &profiles)?;
        Ok(())
    }

    fn questions(&self) -> anyhow::Result<Vec<Question>> {
        self.store.load_json(storage::KEY_COMMUNITY_QUESTIONS)
    }

    fn save_questions(&self, questions: &[Question]) -> anyhow::Result<()> {
        self.store
            .save_json(storage::KEY_COMMUNITY_QUESTIONS, questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const ADA: &str = "ada@example.com";
    const BOB: &str = "bob@example.com";

    fn community() -> Community {
        Community::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn question(upvotes: u32, timestamp: DateTime<Utc>, text: &str) -> Question {
        Question {
            user_id: ADA.into(),
            text: text.into(),
            timestamp,
            upvotes,
            upvoted_by: BTreeSet::new(),
            comments: Vec::new(),
            points: 0,
        }
    }

    #[test]
    fn ranking_orders_by_upvotes_then_recency() {
        let questions = vec![
            question(3, at(1), "first"),
            question(1, at(2), "second"),
            question(3, at(3), "third"),
        ];
        let order: Vec<usize> = rank_questions(&questions, "").iter().map(|r| r.index).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn search_filters_case_insensitively() {
        let questions = vec![
            question(0, at(1), "How do lifetimes work?"),
            question(5, at(2), "Best Go web framework"),
        ];
        let hits = rank_questions(&questions, "  LIFETIMES ");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
        assert!(rank_questions(&questions, "haskell").is_empty());
    }

    #[test]
    fn badges_follow_thresholds() {
        assert_eq!(badge(0), "");
        assert_eq!(badge(9), "");
        assert_eq!(badge(10), "🥉 Newbie");
        assert_eq!(badge(20), "🥈 Learner");
        assert_eq!(badge(50), "🥇 Expert");
        assert_eq!(badge(100), "🏆 Master");
    }

    #[test]
    fn leaderboard_breaks_ties_by_user_id() {
        let mut users = UserPoints::new();
        users.insert("zed@example.com".into(), 10);
        users.insert(BOB.into(), 25);
        users.insert(ADA.into(), 10);
        let board = leaderboard(&users);
        let ids: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec![BOB, ADA, "zed@example.com"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].badge, "🥈 Learner");
    }

    #[test]
    fn time_labels_pick_the_largest_unit() {
        let now = at(0);
        assert_eq!(time_ago(now - Duration::days(2), now), "2d ago");
        assert_eq!(time_ago(now - Duration::minutes(125), now), "2h ago");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(time_ago(now - Duration::seconds(30), now), "Just now");
        assert_eq!(time_ago(now + Duration::minutes(10), now), "Just now");
    }

    #[test]
    fn posting_credits_five_points_each_time() {
        let board = community();
        for n in 0..4 {
            let posted = board
                .post_question(Some(ADA), &format!("question {n}"), at(n))
                .unwrap();
            assert_eq!(posted.points, POINTS_PER_QUESTION * (n as u64 + 1));
        }
        let state = board.snapshot().unwrap();
        assert_eq!(state.users.get(ADA), Some(&20));
        assert_eq!(state.questions.len(), 4);
    }

    #[test]
    fn guests_and_blank_questions_are_rejected() {
        let board = community();
        let err = board.post_question(None, "hello", at(0)).unwrap_err();
        assert_eq!(err.to_string(), MSG_LOGIN_TO_POST);
        assert!(matches!(
            board.post_question(Some(ADA), "   ", at(0)),
            Err(CommunityError::EmptyQuestion)
        ));
        assert!(board.snapshot().unwrap().users.is_empty());
    }

    #[test]
    fn upvote_toggles_are_involutive() {
        let board = community();
        board.post_question(Some(ADA), "toggle me", at(0)).unwrap();
        assert!(board.toggle_upvote(Some(BOB), 0).unwrap());
        assert!(!board.toggle_upvote(Some(BOB), 0).unwrap());
        let q = &board.snapshot().unwrap().questions[0];
        assert_eq!(q.upvotes, 0);
        assert!(!q.is_upvoted_by(BOB));

        board.toggle_upvote(Some(BOB), 0).unwrap();
        let q = &board.snapshot().unwrap().questions[0];
        assert_eq!(q.upvotes, 1);
        assert!(q.is_upvoted_by(BOB));
    }

    #[test]
    fn upvote_targets_storage_index_not_rank() {
        let board = community();
        board.post_question(Some(ADA), "old", at(0)).unwrap();
        board.post_question(Some(ADA), "new", at(10)).unwrap();
        let state = board.snapshot().unwrap();
        let top = state.ranked("")[0].index;
        assert_eq!(state.questions[top].text, "new");
        board.toggle_upvote(Some(BOB), 0).unwrap();
        let state = board.snapshot().unwrap();
        assert_eq!(state.ranked("")[0].question.text, "old");
    }

    #[test]
    fn comments_get_unique_ids_even_within_a_millisecond() {
        let board = community();
        board.post_question(Some(ADA), "q1", at(0)).unwrap();
        board.post_question(Some(ADA), "q2", at(0)).unwrap();
        let now = at(60);
        let first = board.add_comment(Some(BOB), 0, "one", now).unwrap().unwrap();
        let second = board.add_comment(Some(BOB), 1, "two", now).unwrap().unwrap();
        assert_eq!(first.id, now.timestamp_millis());
        assert!(second.id > first.id);
        assert_eq!(board.add_comment(Some(BOB), 0, "  ", now).unwrap(), None);
        assert!(matches!(
            board.add_comment(Some(BOB), 9, "lost", now),
            Err(CommunityError::UnknownQuestion(9))
        ));
    }

    #[test]
    fn liking_bumps_every_match_and_ignores_unknown_ids() {
        let board = community();
        board.post_question(Some(ADA), "q", at(0)).unwrap();
        let comment = board.add_comment(Some(BOB), 0, "nice", at(1)).unwrap().unwrap();
        assert_eq!(board.like_comment(comment.id).unwrap(), 1);
        assert_eq!(board.like_comment(comment.id).unwrap(), 1);
        let before = board.snapshot().unwrap();
        assert_eq!(before.questions[0].comments[0].likes, 2);
        assert_eq!(board.like_comment(-42).unwrap(), 0);
        assert_eq!(board.snapshot().unwrap(), before);
    }

    #[test]
    fn identity_prefers_snapshot_then_current_profile() {
        let board = community();
        let current = CurrentProfile {
            full_name: "Ada Lovelace".into(),
            profile_picture: "ada.png".into(),
            email: Some(ADA.into()),
            phone_number: None,
        };
        let state = board.snapshot().unwrap();
        assert_eq!(state.identity(ADA, &current).name, "Ada Lovelace");
        assert_eq!(
            state.identity(BOB, &current),
            DisplayIdentity {
                name: "User".into(),
                avatar: APP_LOGO.into()
            }
        );

        let bob = CurrentProfile {
            full_name: "Bob".into(),
            profile_picture: String::new(),
            email: Some(BOB.into()),
            phone_number: None,
        };
        board.remember_profile(BOB, &bob).unwrap();
        let state = board.snapshot().unwrap();
        let identity = state.identity(BOB, &current);
        assert_eq!(identity.name, "Bob");
        assert_eq!(identity.avatar, APP_LOGO);
    }

    #[test]
    fn stored_documents_use_camel_case() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let board = Community::new(store.clone());
        board.post_question(Some(ADA), "shape", at(0)).unwrap();
        let raw = store.get(storage::KEY_COMMUNITY_QUESTIONS).unwrap().unwrap();
        assert!(raw.contains("\"userId\""));
        assert!(raw.contains("\"upvotedBy\""));
    }

    #[test]
    fn partial_documents_load_with_defaults() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .put(
                storage::KEY_COMMUNITY_QUESTIONS,
                r#"[{"userId":"ada@example.com","text":"legacy","timestamp":"2024-05-01T10:00:00.000Z"}]"#,
            )
            .unwrap();
        let state = Community::new(store).snapshot().unwrap();
        assert_eq!(state.questions[0].upvotes, 0);
        assert!(state.questions[0].comments.is_empty());
    }
}
