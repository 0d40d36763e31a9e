//! Integration tests for sequence reconciliation
//!
//! These tests verify:
//! - Plans turn any current order into any desired order
//! - Re-planning a reconciled order yields nothing
//! - Duplicate handling in both policies
//! - Reconciling a playlist through the store and edit log, and undoing it
//! - Saved collections only gain and lose entries, never reorder

use bridge_traits::remote::RemoteCollection;
use bridge_traits::time::Clock;
use chrono::{DateTime, TimeZone, Utc};
use core_library::models::{Playlist, SavedResource, Track};
use core_library::{Handle, ResourceStore};
use core_runtime::config::CoreConfig;
use core_sync::reconcile::{Addition, Move, Removal};
use core_sync::{EditLog, Reconciler, RemoteOp, SyncError};
use mockall::mock;
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

mock! {
    pub Clock {}
    impl Clock for Clock {
        fn now(&self) -> DateTime<Utc>;
    }
}

fn fixed_clock() -> MockClock {
    let mut clock = MockClock::new();
    clock
        .expect_now()
        .returning(|| Utc.with_ymd_and_hms(2023, 5, 4, 12, 0, 0).unwrap());
    clock
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

async fn playlist_with(store: &mut ResourceStore, keys: &[&str]) -> Handle<Playlist> {
    let playlist = store.playlist("37i9dQZF1DWXRqgorJj26U").await.unwrap();
    let added_at = Utc.with_ymd_and_hms(2021, 3, 1, 9, 30, 0).unwrap();
    for key in keys {
        let track = store.get_or_create::<Track>(key).await.unwrap();
        playlist.write().entries.push(SavedResource::new(added_at, track));
    }
    playlist
}

async fn tracks(store: &mut ResourceStore, keys: &[&str]) -> Vec<Handle<Track>> {
    let mut handles = Vec::new();
    for key in keys {
        handles.push(store.get_or_create::<Track>(key).await.unwrap());
    }
    handles
}

fn keys(playlist: &Handle<Playlist>) -> Vec<String> {
    playlist.read().entries.iter().map(|e| e.key().to_string()).collect()
}

// ============================================================================
// Planning
// ============================================================================

#[test]
fn test_scenario_remove_add_move() {
    let current = chars("ABCD");
    let desired = chars("CAED");
    let plan = Reconciler::new(true).plan("list", &current, &desired).unwrap();

    assert_eq!(
        plan.removal,
        Some(Removal {
            indices: vec![1],
            sequential: true,
        })
    );
    assert_eq!(
        plan.additions,
        vec![Addition {
            index: 2,
            keys: vec!['E'],
        }]
    );
    // After the removal and addition the list reads A C E D. Walking the
    // desired order front to back, C is due first, so C is pulled in front of
    // A rather than A pushed after C. Both give C A E D in one move.
    assert_eq!(
        plan.moves,
        vec![Move {
            insert_before: 0,
            range_start: 1,
            range_length: 1,
        }]
    );

    let mut items = current.clone();
    plan.apply_to(&mut items);
    assert_eq!(items, desired);
}

#[test]
fn test_duplicates_rejected() {
    let reconciler = Reconciler::new(true);

    let err = reconciler
        .plan("list", &chars("ABAC"), &chars("CAB"))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not edit list for the following reason: Element `A' was duplicated in the original list"
    );

    let err = reconciler
        .plan("list", &chars("ABC"), &chars("CBC"))
        .unwrap_err();
    assert!(matches!(err, SyncError::IllegalEdit { ref reason, .. } if reason.ends_with("filtered list")));
}

#[test]
fn test_duplicates_tolerated() {
    let reconciler = Reconciler::new(false);
    let mut items = chars("ABAC");
    let plan = reconciler.plan("list", &items, &chars("CACB")).unwrap();

    plan.apply_to(&mut items);
    assert_eq!(items, chars("CAB"));
}

fn order() -> impl Strategy<Value = Vec<char>> {
    let universe: Vec<char> = ('a'..='t').collect();
    proptest::sample::subsequence(universe, 0..=20).prop_shuffle()
}

fn orders() -> impl Strategy<Value = (Vec<char>, Vec<char>)> {
    (order(), order())
}

proptest! {
    #[test]
    fn plan_reaches_desired_order((current, desired) in orders()) {
        let reconciler = Reconciler::new(true);
        let plan = reconciler.plan("list", &current, &desired).unwrap();

        if current.is_empty() || desired.is_empty() {
            prop_assert!(plan.is_empty());
        } else {
            let mut items = current.clone();
            plan.apply_to(&mut items);
            prop_assert_eq!(&items, &desired);

            let again = reconciler.plan("list", &items, &desired).unwrap();
            prop_assert!(again.is_empty());
        }
    }

    #[test]
    fn moves_never_exceed_settled_length((current, desired) in orders()) {
        let plan = Reconciler::new(true).plan("list", &current, &desired).unwrap();
        for m in &plan.moves {
            prop_assert!(m.insert_before < m.range_start);
            prop_assert!(m.range_start + m.range_length <= desired.len());
        }
    }
}

// ============================================================================
// Reconciling a collection
// ============================================================================

#[tokio::test]
async fn test_reconcile_playlist_and_undo() {
    let mut store = ResourceStore::in_memory().await.unwrap();
    let mut log = EditLog::new();
    let playlist = playlist_with(&mut store, &["A", "B", "C", "D"]).await;
    let desired = tracks(&mut store, &["C", "A", "E", "D"]).await;
    let clock = fixed_clock();

    let committed = Reconciler::new(true)
        .reconcile(&playlist, &desired, &mut store, &mut log, &clock)
        .unwrap();

    assert_eq!(committed, 3);
    assert_eq!(keys(&playlist), vec!["C", "A", "E", "D"]);
    assert_eq!(
        playlist.read().entries[2].added_at,
        Utc.with_ymd_and_hms(2023, 5, 4, 12, 0, 0).unwrap()
    );
    let descriptions: Vec<String> = log.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        descriptions,
        vec![
            "Remove 1 track from playlist 37i9dQZF1DWXRqgorJj26U",
            "Add 1 track to playlist 37i9dQZF1DWXRqgorJj26U",
            "Move 1 track in playlist 37i9dQZF1DWXRqgorJj26U",
        ]
    );
    assert!(store.has_modified());

    while log.undo(&mut store).is_some() {}
    assert_eq!(keys(&playlist), vec!["A", "B", "C", "D"]);
    assert!(!store.has_modified());

    while log.redo(&mut store).is_some() {}
    assert_eq!(keys(&playlist), vec!["C", "A", "E", "D"]);
}

#[tokio::test]
async fn test_reconcile_in_order_commits_nothing() {
    let mut store = ResourceStore::in_memory().await.unwrap();
    let mut log = EditLog::new();
    let playlist = playlist_with(&mut store, &["A", "B"]).await;
    let desired = tracks(&mut store, &["A", "B"]).await;

    let committed = Reconciler::default()
        .reconcile(&playlist, &desired, &mut store, &mut log, &MockClock::new())
        .unwrap();

    assert_eq!(committed, 0);
    assert!(!log.has_changes());
    assert!(!store.has_modified());
}

#[tokio::test]
async fn test_reconcile_rejects_duplicate_desired_entry() {
    let mut store = ResourceStore::in_memory().await.unwrap();
    let mut log = EditLog::new();
    let playlist = playlist_with(&mut store, &["A", "B"]).await;
    let desired = tracks(&mut store, &["B", "A", "B"]).await;
    let config = CoreConfig::builder().in_memory().build().unwrap();

    let err = Reconciler::from_config(&config)
        .reconcile(&playlist, &desired, &mut store, &mut log, &fixed_clock())
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Could not edit playlist 37i9dQZF1DWXRqgorJj26U for the following reason: \
         Element `B' was duplicated in the filtered list"
    );
    assert_eq!(keys(&playlist), vec!["A", "B"]);
    assert!(!log.has_changes());
}

#[tokio::test]
async fn test_reconcile_saved_tracks() {
    let mut store = ResourceStore::in_memory().await.unwrap();
    let mut log = EditLog::new();
    let liked = store.liked_songs().await.unwrap();
    let desired = tracks(&mut store, &["4uLU6hMCjMI75M1A2tKUQC", "0VjIjW4GlUZAMYd2vXMi3b"]).await;

    let committed = Reconciler::default()
        .reconcile(&liked, &desired, &mut store, &mut log, &fixed_clock())
        .unwrap();

    assert_eq!(committed, 0, "an empty collection short-circuits");

    liked
        .write()
        .entries
        .push(SavedResource::new(Utc::now(), desired[1].clone()));
    let committed = Reconciler::default()
        .reconcile(&liked, &desired, &mut store, &mut log, &fixed_clock())
        .unwrap();
    assert_eq!(committed, 1);
    assert_eq!(liked.read().entries.len(), 2);
    assert_eq!(liked.read().entries[1].key(), "4uLU6hMCjMI75M1A2tKUQC");
}

#[test]
fn test_membership_plan_appends_without_moves() {
    let reconciler = Reconciler::new(true);

    assert!(reconciler
        .plan_membership("list", &chars("ABC"), &chars("CAB"))
        .unwrap()
        .is_empty());

    let plan = reconciler
        .plan_membership("list", &chars("ABCD"), &chars("YDXA"))
        .unwrap();
    assert_eq!(
        plan.removal,
        Some(Removal {
            indices: vec![1, 2],
            sequential: true,
        })
    );
    assert_eq!(
        plan.additions,
        vec![Addition {
            index: 2,
            keys: vec!['Y', 'X'],
        }]
    );
    assert!(plan.moves.is_empty());

    let mut items = chars("ABCD");
    plan.apply_to(&mut items);
    assert_eq!(items, chars("ADYX"));
}

#[tokio::test]
async fn test_reconcile_liked_songs_never_reorders() {
    let mut store = ResourceStore::in_memory().await.unwrap();
    let mut log = EditLog::new();
    let liked = store.liked_songs().await.unwrap();
    for track in tracks(&mut store, &["a", "b", "c"]).await {
        liked.write().entries.push(SavedResource::new(Utc::now(), track));
    }

    let reordered = tracks(&mut store, &["c", "a", "b"]).await;
    let committed = Reconciler::default()
        .reconcile(&liked, &reordered, &mut store, &mut log, &fixed_clock())
        .unwrap();
    assert_eq!(committed, 0);
    assert!(log.next_push().is_none());

    let desired = tracks(&mut store, &["c", "x", "a"]).await;
    let committed = Reconciler::default()
        .reconcile(&liked, &desired, &mut store, &mut log, &fixed_clock())
        .unwrap();
    assert_eq!(committed, 2);

    let saved: Vec<String> = liked.read().entries.iter().map(|e| e.key().to_string()).collect();
    assert_eq!(saved, vec!["a", "c", "x"]);

    let ops: Vec<RemoteOp> = log.iter().map(|edit| edit.remote_op()).collect();
    assert!(ops.iter().all(|op| !matches!(op, RemoteOp::Reorder { .. })));
    assert_eq!(
        ops[1],
        RemoteOp::Insert {
            collection: RemoteCollection::LikedSongs,
            ids: vec!["x".to_string()],
            position: None,
        }
    );
}
