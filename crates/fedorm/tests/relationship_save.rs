mod common;

use common::{blog, collect_text, row_with_id, text};
use fedorm::prelude::*;
use fedorm::{AdapterErrorKind, InvalidChangeKind};

fn tags_of(blog: &common::Blog, post_id: i64) -> Vec<String> {
    let post = blog
        .federator()
        .select_one(&blog.post, post_id, &SelectRequest::new().with("tags"))
        .unwrap()
        .unwrap();
    collect_text(&post, "tags", "label")
}

#[test]
fn many_to_many_add_and_attach_link_once() {
    let blog = blog();
    let tags = blog.association(&blog.post, "tags");
    let mut tracker = ChangeTracker::new(&tags);
    tracker
        .add(Row::from_pairs([("label", "perf")]))
        .unwrap();
    tracker.attach(11_i64).unwrap();

    let summary = blog
        .coordinator()
        .save(&tags, &Value::BigInt(2), &tracker)
        .unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.linked, 2);
    assert_eq!(summary.generated_keys, vec![Value::BigInt(13)]);

    let ops: Vec<_> = blog.sql.calls().unwrap().into_iter().map(|c| c.op).collect();
    assert_eq!(ops, vec!["link"]);
    assert_eq!(tags_of(&blog, 2), vec!["rust", "db", "perf"]);
}

#[test]
fn many_to_many_remove_and_detach_unlink_once() {
    let blog = blog();
    let tags = blog.association(&blog.post, "tags");
    let mut tracker = ChangeTracker::new(&tags);
    tracker.detach(10_i64).unwrap();
    tracker.remove(11_i64).unwrap();

    let summary = blog
        .coordinator()
        .save(&tags, &Value::BigInt(1), &tracker)
        .unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.unlinked, 2);

    assert_eq!(blog.docs.rows("tags").unwrap().len(), 2);
    assert_eq!(blog.sql.rows("post_tags").unwrap().len(), 1);
    assert!(tags_of(&blog, 1).is_empty());
    assert_eq!(tags_of(&blog, 2), vec!["rust"]);
}

#[test]
fn latest_tracker_call_wins() {
    let blog = blog();
    let tags = blog.association(&blog.post, "tags");
    let mut tracker = ChangeTracker::new(&tags);
    tracker.attach(12_i64).unwrap();
    tracker.attach(12_i64).unwrap();
    tracker.detach(12_i64).unwrap();

    let summary = blog
        .coordinator()
        .save(&tags, &Value::BigInt(3), &tracker)
        .unwrap();
    assert_eq!(summary.linked, 0);
    let ops: Vec<_> = blog.sql.calls().unwrap().into_iter().map(|c| c.op).collect();
    assert_eq!(ops, vec!["unlink"]);
}

#[test]
fn many_to_one_attach_add_and_remove() {
    let blog = blog();
    let author = blog.association(&blog.post, "author");
    let coordinator = blog.coordinator();
    let request = SelectRequest::new().with("author");
    let author_name = |post_id: i64| {
        blog.federator()
            .select_one(&blog.post, post_id, &request)
            .unwrap()
            .and_then(|p| p.relation("author").and_then(Relation::as_one).cloned())
            .map(|a| text(&a, "name").to_string())
    };

    let mut tracker = ChangeTracker::new(&author);
    tracker.attach(3_i64).unwrap();
    let summary = coordinator.save(&author, &Value::BigInt(4), &tracker).unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(author_name(4).as_deref(), Some("Linus"));

    let mut tracker = ChangeTracker::new(&author);
    tracker
        .add(Row::from_pairs([("name", "Barbara")]))
        .unwrap();
    let summary = coordinator.save(&author, &Value::BigInt(3), &tracker).unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.generated_keys, vec![Value::BigInt(4)]);
    assert_eq!(author_name(3).as_deref(), Some("Barbara"));

    let mut tracker = ChangeTracker::new(&author);
    tracker.remove(4_i64).unwrap();
    let summary = coordinator.save(&author, &Value::BigInt(3), &tracker).unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(author_name(3), None);
    assert_eq!(blog.docs.rows("authors").unwrap().len(), 3);
}

#[test]
fn one_to_many_changes_update_the_target_side() {
    let blog = blog();
    let posts = blog.association(&blog.author, "posts");
    let mut tracker = ChangeTracker::new(&posts);
    tracker.attach(4_i64).unwrap();
    tracker.detach(2_i64).unwrap();
    tracker
        .add(Row::from_pairs([("title", "Fresh")]))
        .unwrap();

    let summary = blog
        .coordinator()
        .save(&posts, &Value::BigInt(2), &tracker)
        .unwrap();
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.inserted, 1);

    let grace = blog
        .federator()
        .select_one(&blog.author, 2_i64, &SelectRequest::new().with("posts"))
        .unwrap()
        .unwrap();
    assert_eq!(collect_text(&grace, "posts", "title"), vec!["Draft", "Fresh"]);

    let orphaned = blog.sql.rows("posts").unwrap();
    assert_eq!(
        row_with_id(&orphaned, 2).get_by_name("author_id"),
        Some(&Value::Null)
    );
}

#[test]
fn failed_link_keeps_inserted_targets() {
    let blog = blog();
    blog.sql
        .fail_on("post_tags", AdapterErrorKind::Connection)
        .unwrap();
    let tags = blog.association(&blog.post, "tags");
    let mut tracker = ChangeTracker::new(&tags);
    tracker
        .add(Row::from_pairs([("label", "perf")]))
        .unwrap();

    let err = blog
        .coordinator()
        .save(&tags, &Value::BigInt(1), &tracker)
        .unwrap_err();
    assert!(err.is_retryable());
    // No rollback across adapters.
    assert_eq!(blog.docs.rows("tags").unwrap().len(), 4);
}

#[test]
fn invalid_saves_are_rejected() {
    let blog = blog();
    let tags = blog.association(&blog.post, "tags");
    let author = blog.association(&blog.post, "author");

    let mut tracker = ChangeTracker::new(&tags);
    tracker.attach(10_i64).unwrap();
    match blog.coordinator().save(&tags, &Value::Null, &tracker) {
        Err(Error::InvalidChange(e)) => assert_eq!(e.kind, InvalidChangeKind::MissingKey),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut slot = ChangeTracker::new(&author);
    slot.attach(1_i64).unwrap();
    match blog.coordinator().save(&tags, &Value::BigInt(1), &slot) {
        Err(Error::InvalidChange(e)) => {
            assert_eq!(e.kind, InvalidChangeKind::CardinalityMismatch);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(matches!(
        tracker.add(Row::from_pairs([("id", Value::BigInt(50)), ("label", Value::from("x"))])),
        Err(Error::InvalidChange(_))
    ));
    assert!(matches!(tracker.attach(Value::Null), Err(Error::InvalidChange(_))));
    assert_eq!(blog.sql.call_count().unwrap(), 0);
}
