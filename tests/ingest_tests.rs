// tests/ingest_tests.rs

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use postledger::config::Config;
use postledger::error::IngestError;
use postledger::ingest::batch::{IncomingDocument, ingest_batch, load_directory};
use postledger::ingest::ingest_document;
use postledger::ingest::resolver::UNKNOWN_ACTOR_NAME;
use postledger::ingest::upsert::UpsertStatus;
use postledger::models::actor::ActorId;
use postledger::models::engagement::{EdgeKind, Role};
use postledger::query;
use postledger::store::Store;
use serde_json::{Value, json};

const FIXTURE: &str = include_str!("fixtures/maxim_ai_208.json");

/// Fresh, migrated in-memory store.
async fn test_store() -> Store {
    let store = Store::in_memory()
        .await
        .expect("Failed to open in-memory store");
    store.migrate().await.expect("Failed to migrate store");
    store
}

fn fixture() -> Value {
    serde_json::from_str(FIXTURE).expect("fixture is valid JSON")
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

async fn count(store: &Store, sql: &str) -> i64 {
    sqlx::query_scalar(sql)
        .fetch_one(store.pool())
        .await
        .expect("count query failed")
}

fn liker(name: &str, url: &str) -> Value {
    json!({ "name": name, "url": url })
}

fn small_post(keyword: &str, post_number: i64, likers: Vec<Value>) -> Value {
    json!({
        "post_number": post_number,
        "keyword": keyword,
        "author": {
            "name": "Jane Doe",
            "profile_url": "https://www.linkedin.com/in/jane-doe"
        },
        "content": format!("Post {post_number} about {keyword}"),
        "metadata": { "timestamp": "3d" },
        "engagement": {
            "total_likers": likers.len(),
            "total_comments": 0,
            "likers": likers,
            "comments": []
        }
    })
}

#[tokio::test]
async fn reingesting_same_document_is_idempotent() {
    let store = test_store().await;
    let doc = fixture();

    let first = ingest_document(&store, &doc, t0()).await.unwrap();
    assert_eq!(first.status, UpsertStatus::Inserted);
    assert_eq!(first.new_comments, 3);
    assert!(!first.overflow);

    for _ in 0..3 {
        let again = ingest_document(&store, &doc, t0()).await.unwrap();
        assert_eq!(again.status, UpsertStatus::Unchanged);
        assert_eq!(again.new_comments, 0);
        assert!(!again.snapshot_recorded);
    }

    let post = query::get_post(&store, "Maxim AI", 208)
        .await
        .unwrap()
        .expect("post stored");
    assert_eq!(post.total_likers, 43);
    assert_eq!(post.total_comments, 3);

    assert_eq!(count(&store, "SELECT COUNT(*) FROM posts").await, 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM comments").await, 3);
    // Author, 43 likers (one also comments) and one commenter without a URL
    assert_eq!(count(&store, "SELECT COUNT(*) FROM actors").await, 45);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM engagement_snapshots").await, 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM snapshot_likers").await, 43);
}

#[tokio::test]
async fn later_identical_document_does_not_double_counts() {
    let store = test_store().await;
    let doc = fixture();

    ingest_document(&store, &doc, t0()).await.unwrap();
    let later = ingest_document(&store, &doc, t0() + TimeDelta::days(1))
        .await
        .unwrap();

    assert_eq!(later.status, UpsertStatus::Refreshed);
    assert!(later.snapshot_recorded);
    assert_eq!(later.new_comments, 0);

    let post = query::get_post(&store, "Maxim AI", 208)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.total_likers, 43);
    assert_eq!(post.observed_at, t0() + TimeDelta::days(1));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM comments").await, 3);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM engagement_snapshots").await, 2);
}

#[tokio::test]
async fn counters_only_move_forward_in_time() {
    let store = test_store().await;
    let mut doc = fixture();

    ingest_document(&store, &doc, t0()).await.unwrap();

    // Later and higher: applied
    doc["engagement"]["total_likers"] = json!(50);
    let outcome = ingest_document(&store, &doc, t0() + TimeDelta::hours(2))
        .await
        .unwrap();
    assert_eq!(outcome.status, UpsertStatus::Refreshed);

    // Same time, lower: ignored
    doc["engagement"]["total_likers"] = json!(40);
    let outcome = ingest_document(&store, &doc, t0() + TimeDelta::hours(2))
        .await
        .unwrap();
    assert_eq!(outcome.status, UpsertStatus::Unchanged);

    // Earlier, lower: ignored
    doc["engagement"]["total_likers"] = json!(10);
    ingest_document(&store, &doc, t0() - TimeDelta::hours(1))
        .await
        .unwrap();

    let post = query::get_post(&store, "Maxim AI", 208)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.total_likers, 50);
    assert_eq!(post.observed_at, t0() + TimeDelta::hours(2));
}

#[tokio::test]
async fn different_author_is_quarantined() {
    let store = test_store().await;
    let mut doc = fixture();
    ingest_document(&store, &doc, t0()).await.unwrap();

    doc["author"] = json!({
        "name": "Someone Else",
        "profile_url": "https://www.linkedin.com/in/someone-else"
    });

    let result = ingest_document(&store, &doc, t0() + TimeDelta::hours(1)).await;
    assert!(matches!(
        result,
        Err(IngestError::IdentityConflict { post_number: 208, .. })
    ));

    let quarantined = query::list_quarantine(&store).await.unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].keyword, "Maxim AI");
    assert_eq!(quarantined[0].raw_document["author"]["name"], "Someone Else");

    let post = query::get_post(&store, "Maxim AI", 208)
        .await
        .unwrap()
        .unwrap();
    let author = query::get_actor(&store, &post.author_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(author.display_name, "Stefan Eder");
    assert_eq!(post.observed_at, t0());
}

#[tokio::test]
async fn missing_author_yields_unknown_actor() {
    let store = test_store().await;
    let mut doc = fixture();
    doc.as_object_mut().unwrap().remove("author");

    ingest_document(&store, &doc, t0()).await.unwrap();

    let post = query::get_post(&store, "Maxim AI", 208)
        .await
        .unwrap()
        .unwrap();
    let author = query::get_actor(&store, &post.author_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(author.display_name, UNKNOWN_ACTOR_NAME);
}

#[tokio::test]
async fn missing_content_is_malformed_and_not_stored() {
    let store = test_store().await;
    let mut doc = fixture();
    doc.as_object_mut().unwrap().remove("content");

    let result = ingest_document(&store, &doc, t0()).await;
    assert!(matches!(result, Err(IngestError::MalformedRecord(_))));

    assert!(
        query::get_post(&store, "Maxim AI", 208)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(count(&store, "SELECT COUNT(*) FROM actors").await, 0);
}

#[tokio::test]
async fn same_company_url_across_posts_is_one_actor() {
    let store = test_store().await;

    let a = small_post(
        "iodis",
        1,
        vec![liker("iodis", "https://www.linkedin.com/company/iodis/")],
    );
    let b = small_post(
        "iodis",
        2,
        vec![liker(
            "IODIS GmbH",
            "https://www.linkedin.com/company/iodis/?trk=public_post_reactions",
        )],
    );

    ingest_document(&store, &a, t0()).await.unwrap();
    ingest_document(&store, &b, t0()).await.unwrap();

    assert_eq!(
        count(
            &store,
            "SELECT COUNT(*) FROM actors WHERE canonical_url = 'https://www.linkedin.com/company/iodis'"
        )
        .await,
        1
    );

    let top = query::top_actors(&store, Role::Liker, 1)
        .await
        .unwrap();
    assert_eq!(top[0].display_name, "iodis");
    assert_eq!(top[0].posts, 2);

    // The differing name is kept as an alias
    let actor = query::get_actor(&store, &ActorId(top[0].actor_id.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(actor.aliases, vec!["IODIS GmbH".to_string()]);
}

#[tokio::test]
async fn weak_identity_depends_on_name_and_title() {
    let store = test_store().await;

    let mut a = small_post("weak", 1, vec![]);
    a["engagement"]["likers"] = json!([
        { "name": "Max Muster", "title": "Engineer" },
        { "name": "Max  Muster", "title": "engineer" },
        { "name": "Max Muster", "title": "Designer" }
    ]);
    a["engagement"]["total_likers"] = json!(3);

    ingest_document(&store, &a, t0()).await.unwrap();

    assert_eq!(
        count(
            &store,
            "SELECT COUNT(*) FROM actors WHERE confidence = 'weak' AND display_name LIKE 'Max%'"
        )
        .await,
        2
    );
}

#[tokio::test]
async fn empty_replies_parse_to_leaf_comment() {
    let store = test_store().await;
    let outcome = ingest_document(&store, &fixture(), t0()).await.unwrap();

    let tree = query::get_comment_tree(&store, &outcome.post_id)
        .await
        .unwrap();
    let ben = tree
        .nodes
        .iter()
        .position(|n| n.item.content.starts_with("How does it compare"))
        .expect("second top-level comment present");

    assert_eq!(tree.children(ben).count(), 0);
}

#[tokio::test]
async fn cross_keyword_duplicate_is_flagged_not_merged() {
    let store = test_store().await;
    let doc = fixture();
    ingest_document(&store, &doc, t0()).await.unwrap();

    let mut retagged = doc.clone();
    retagged["keyword"] = json!("Agent Evals");
    let outcome = ingest_document(&store, &retagged, t0()).await.unwrap();

    assert_eq!(outcome.status, UpsertStatus::Inserted);
    assert_eq!(outcome.cross_keyword_duplicates.len(), 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM posts").await, 2);

    let flags = query::list_review_flags(&store).await.unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].post_id, outcome.post_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingestion_of_same_document() {
    let store = test_store().await;
    let doc = fixture();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let doc = doc.clone();
        handles.push(tokio::spawn(async move {
            ingest_document(&store, &doc, t0()).await
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.status == UpsertStatus::Inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM posts").await, 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM comments").await, 3);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM actors").await, 45);
}

#[tokio::test]
async fn batch_skips_malformed_and_reports() {
    let store = test_store().await;
    let dir = tempfile::tempdir().unwrap();

    std::fs::write(dir.path().join("01_maxim.json"), FIXTURE).unwrap();
    std::fs::write(dir.path().join("02_broken.json"), "{ not json").unwrap();
    std::fs::write(
        dir.path().join("03_no_content.json"),
        r#"{ "post_number": 7, "keyword": "Maxim AI" }"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let docs = load_directory(dir.path(), Some(t0())).await.unwrap();
    assert_eq!(docs.len(), 3);

    let report = ingest_batch(&store, docs, 2).await.unwrap();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped[0].source.ends_with("02_broken.json"));
    assert!(report.conflicts.is_empty());
    assert!(report.not_attempted.is_empty());

    assert_eq!(count(&store, "SELECT COUNT(*) FROM posts").await, 1);
}

#[tokio::test]
async fn batch_reports_conflicts_per_record() {
    let store = test_store().await;
    let mut other = fixture();
    other["author"] = json!({ "name": "Someone Else" });

    let docs = vec![
        IncomingDocument::new("first", t0(), FIXTURE),
        IncomingDocument::new("second", t0() + TimeDelta::hours(1), other.to_string()),
    ];

    // One at a time so the conflicting document comes second
    let report = ingest_batch(&store, docs, 1).await.unwrap();
    assert_eq!(report.committed.len(), 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].source, "second");
}

#[tokio::test]
async fn same_actor_under_another_name_in_one_document_becomes_alias() {
    let store = test_store().await;

    let mut doc = small_post(
        "aliases",
        1,
        vec![liker("Iodis", "https://www.linkedin.com/company/iodis/")],
    );
    doc["engagement"]["comments"] = json!([{
        "author": {
            "name": "IODIS GmbH Official",
            "profile_url": "https://www.linkedin.com/company/iodis"
        },
        "content": "Proud to be part of this!"
    }]);
    doc["engagement"]["total_comments"] = json!(1);

    ingest_document(&store, &doc, t0()).await.unwrap();

    let id: String =
        sqlx::query_scalar("SELECT id FROM actors WHERE canonical_url = 'https://www.linkedin.com/company/iodis'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    let actor = query::get_actor(&store, &ActorId(id)).await.unwrap().unwrap();

    assert_eq!(actor.display_name, "Iodis");
    assert_eq!(actor.aliases, vec!["IODIS GmbH Official".to_string()]);
}

#[tokio::test]
async fn anonymous_commenter_is_not_the_unknown_author() {
    let store = test_store().await;

    let mut doc = fixture();
    doc.as_object_mut().unwrap().remove("author");
    doc["engagement"] = json!({
        "total_likers": 0,
        "total_comments": 1,
        "comments": [{ "content": "Who wrote this?" }]
    });

    let outcome = ingest_document(&store, &doc, t0()).await.unwrap();

    let participants = query::list_participants(&store, &outcome.post_id)
        .await
        .unwrap();
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().all(|p| p.actor.display_name == UNKNOWN_ACTOR_NAME));
    assert_eq!(participants[0].roles, vec![Role::Author]);
    assert_eq!(participants[1].roles, vec![Role::Commenter]);

    let edges = query::interaction_edges(&store, "Maxim AI").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].kind, EdgeKind::Comment);
}

#[tokio::test]
async fn more_captured_comments_than_reported_is_flagged() {
    let store = test_store().await;
    let mut doc = fixture();
    doc["engagement"]["total_comments"] = json!(1);

    let outcome = ingest_document(&store, &doc, t0()).await.unwrap();
    assert!(outcome.overflow);
    assert_eq!(outcome.new_comments, 3);

    let snapshot = query::latest_snapshot(&store, &outcome.post_id)
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.overflow);
    assert_eq!(snapshot.total_comments, 1);
    assert_eq!(snapshot.observed_comments, 3);
}

#[tokio::test]
async fn store_failure_aborts_batch_with_partial_report() {
    let store = test_store().await;

    // Posts without comments still commit; any post with comments now fails
    sqlx::query("DROP TABLE comments")
        .execute(store.writer())
        .await
        .unwrap();

    let with_comments = |post_number: i64| {
        let mut doc = fixture();
        doc["post_number"] = json!(post_number);
        doc.to_string()
    };

    let docs = vec![
        IncomingDocument::new("plain", t0(), small_post("abort", 1, vec![]).to_string()),
        IncomingDocument::new("commented-1", t0(), with_comments(301)),
        IncomingDocument::new("commented-2", t0(), with_comments(302)),
        IncomingDocument::new("commented-3", t0(), with_comments(303)),
    ];

    let aborted = ingest_batch(&store, docs, 1).await.unwrap_err();

    assert!(!aborted.cause.is_empty());
    assert_eq!(aborted.report.committed.len(), 1);
    assert_eq!(aborted.report.committed[0].source, "plain");
    assert_eq!(aborted.report.failed[0].source, "commented-1");
    assert!(!aborted.report.not_attempted.is_empty());
    assert_eq!(
        aborted.report.not_attempted.last().map(String::as_str),
        Some("commented-3")
    );

    assert_eq!(count(&store, "SELECT COUNT(*) FROM posts").await, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn batch_reports_unreadable_and_non_utf8_files() {
    let store = test_store().await;
    let dir = tempfile::tempdir().unwrap();

    std::fs::write(dir.path().join("01_maxim.json"), FIXTURE).unwrap();
    std::fs::write(
        dir.path().join("02_latin1.json"),
        b"{\"post_number\": 9, \"keyword\": \"x\", \"content\": \"caf\xe9\"}",
    )
    .unwrap();
    std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("03_gone.json")).unwrap();

    let docs = load_directory(dir.path(), Some(t0())).await.unwrap();
    assert_eq!(docs.len(), 3);
    assert!(docs[2].body.is_err());

    let report = ingest_batch(&store, docs, 2).await.unwrap();
    assert_eq!(report.committed.len(), 1);

    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].source.ends_with("02_latin1.json"));
    assert!(report.skipped[0].reason.contains("UTF-8"));

    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].source.ends_with("03_gone.json"));

    assert!(
        query::get_post(&store, "x", 9)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_store_with_several_connections_ingests_disjoint_posts() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        database_url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
        store_max_connections: 4,
        ..Config::default()
    };

    let store = Store::connect(&config).await.unwrap();
    store.migrate().await.unwrap();

    let docs: Vec<IncomingDocument> = (0..120)
        .map(|n| {
            let mut doc = small_post("parallel", n, vec![liker(&format!("Fan {n}"), &format!("https://www.linkedin.com/in/fan-{n}"))]);
            doc["author"]["profile_url"] = json!(format!("https://www.linkedin.com/in/author-{n}"));
            IncomingDocument::new(format!("doc-{n}"), t0(), doc.to_string())
        })
        .collect();

    let report = ingest_batch(&store, docs, 8).await.unwrap();
    assert_eq!(report.committed.len(), 120);
    assert!(report.failed.is_empty());

    // Reads go through the shared pool while the writer is idle
    let posts = query::list_posts(&store, "parallel").collect_all().await.unwrap();
    assert_eq!(posts.len(), 120);

    store.close().await;
}
