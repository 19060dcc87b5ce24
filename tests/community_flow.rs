use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use devguide_tui::community::{Community, CommunityError, POINTS_PER_QUESTION};
use devguide_tui::session::CurrentProfile;
use devguide_tui::storage::{Options, Store};
use tempfile::tempdir;

fn open(path: &std::path::Path) -> Arc<Store> {
    Arc::new(
        Store::open(Options {
            path: Some(path.to_path_buf()),
        })
        .unwrap(),
    )
}

#[test]
fn board_survives_reopen() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("state.db");
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    {
        let community = Community::new(open(&db));
        community
            .post_question(Some("ada@example.com"), "How do lifetimes work?", t0)
            .unwrap();
        community
            .post_question(Some("bob@example.com"), "What is a trait object?", t0)
            .unwrap();
        community
            .post_question(Some("bob@example.com"), "Why Pin?", t0)
            .unwrap();
        assert!(community.toggle_upvote(Some("bob@example.com"), 0).unwrap());
        let comment = community
            .add_comment(
                Some("bob@example.com"),
                0,
                "Read the nomicon.",
                t0 + Duration::seconds(30),
            )
            .unwrap()
            .unwrap();
        assert_eq!(community.like_comment(comment.id).unwrap(), 1);
        community
            .remember_profile(
                "bob@example.com",
                &CurrentProfile {
                    full_name: "Bob".into(),
                    profile_picture: "bob.png".into(),
                    email: Some("bob@example.com".into()),
                    phone_number: None,
                },
            )
            .unwrap();
    }

    let community = Community::new(open(&db));
    let state = community.snapshot().unwrap();
    assert_eq!(state.questions.len(), 3);
    assert_eq!(state.questions[0].upvotes, 1);
    assert_eq!(state.questions[0].comments[0].likes, 1);

    let ranked = state.ranked("");
    assert_eq!(ranked[0].index, 0);

    let board = state.leaderboard();
    assert_eq!(board[0].user_id, "bob@example.com");
    assert_eq!(board[0].points, 2 * POINTS_PER_QUESTION);
    assert_eq!(board[1].points, POINTS_PER_QUESTION);

    let guest = CurrentProfile::guest();
    assert_eq!(state.identity("bob@example.com", &guest).name, "Bob");
}

#[test]
fn guests_are_turned_away() {
    let dir = tempdir().unwrap();
    let community = Community::new(open(&dir.path().join("state.db")));
    let err = community
        .post_question(None, "Anyone here?", Utc::now())
        .unwrap_err();
    assert!(matches!(err, CommunityError::LoginRequired(_)));
    assert_eq!(err.to_string(), "Please login to post.");
    assert!(community.snapshot().unwrap().questions.is_empty());
}
