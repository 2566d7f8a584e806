//! Empty-label cleanup: what may and may not be deleted

mod common;

use common::{headers, user_label, FakeStore, MockLabelStore};
use gmail_organizer::cleaner::LabelCleaner;
use gmail_organizer::error::OrganizerError;
use gmail_organizer::models::Label;
use gmail_organizer::taxonomy::Taxonomy;

fn cleanup_listing() -> Vec<Label> {
    vec![
        Label::system("INBOX", "INBOX").with_total(0),
        Label::system("TRASH", "TRASH").with_total(0),
        // User-typed but named like a system label
        user_label("cat", "CATEGORY_SOCIAL", 0),
        user_label("h1", "MUSIC", 0),
        user_label("h2", "MUSIC/Platforms/Spotify/2019", 0),
        // Stale listing total: the live lookup still shows messages
        user_label("old", "Old Receipts", 0),
        user_label("empty", "Empty Project", 9),
    ]
}

#[tokio::test]
async fn test_only_empty_legacy_labels_are_deleted() {
    let taxonomy = Taxonomy::builtin().unwrap();
    let mut store = MockLabelStore::new();

    store
        .expect_list_labels()
        .times(1)
        .returning(|| Ok(cleanup_listing()));
    store.expect_get_label().times(2).returning(|id| match id {
        "old" => Ok(user_label("old", "Old Receipts", 3)),
        "empty" => Ok(user_label("empty", "Empty Project", 0)),
        other => panic!("unexpected lookup of {}", other),
    });
    store
        .expect_delete_label()
        .withf(|id| id.to_string() == "empty")
        .times(1)
        .returning(|_| Ok(()));

    let removed = LabelCleaner::new(&store, &taxonomy)
        .cleanup_empty_labels(false)
        .await
        .unwrap();

    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_dry_run_deletes_nothing() {
    let taxonomy = Taxonomy::builtin().unwrap();
    let mut store = MockLabelStore::new();

    store
        .expect_list_labels()
        .returning(|| Ok(cleanup_listing()));
    store
        .expect_get_label()
        .returning(|id| Ok(user_label(id, "whatever", 0)));
    store.expect_delete_label().never();

    let removed = LabelCleaner::new(&store, &taxonomy)
        .cleanup_empty_labels(true)
        .await
        .unwrap();

    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_failed_delete_is_not_counted() {
    let taxonomy = Taxonomy::builtin().unwrap();
    let mut store = MockLabelStore::new();

    store
        .expect_list_labels()
        .returning(|| Ok(vec![user_label("a", "Gone", 0), user_label("b", "Stuck", 0)]));
    store
        .expect_get_label()
        .returning(|id| Ok(user_label(id, "x", 0)));
    store.expect_delete_label().returning(|id| match id {
        "b" => Err(OrganizerError::Forbidden("label is locked".to_string())),
        _ => Ok(()),
    });

    let removed = LabelCleaner::new(&store, &taxonomy)
        .cleanup_empty_labels(false)
        .await
        .unwrap();

    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let taxonomy = Taxonomy::builtin().unwrap();
    let mut store = MockLabelStore::new();
    store
        .expect_list_labels()
        .returning(|| Err(OrganizerError::AuthError("token revoked".to_string())));

    let result = LabelCleaner::new(&store, &taxonomy)
        .cleanup_empty_labels(false)
        .await;

    assert!(matches!(result, Err(OrganizerError::AuthError(_))));
}

#[tokio::test]
async fn test_lookup_failure_skips_only_that_label() {
    let taxonomy = Taxonomy::builtin().unwrap();
    let store = FakeStore::new();
    let flaky = store.with_label("Flaky");
    store.with_label("Empty");
    store.with_label("Busy");
    store.add_message("m1", headers("a@example.com", "me@example.com", "hi"), &["Busy"]);
    store.fail_lookup_for(&flaky);

    let removed = LabelCleaner::new(&store, &taxonomy)
        .cleanup_empty_labels(false)
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(store.deleted(), vec!["Empty"]);
    assert!(store.label_id("Flaky").is_some());
    assert!(store.label_id("Busy").is_some());
}
