//! End-to-end store behaviour against the in-memory index and mock embeddings.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use quire_core::Error;
use quire_store::{
    CollectionConfig, CollectionManager, CollectionStatus, Distance, DocumentStore,
    EmbeddingBinding, EnsureOutcome, FieldMatch, KeywordTokenizer, MemoryIndex,
    MockEmbeddingProvider, NomenclatureKind, PayloadSchema, PointId, QuestionKind, RawRecord,
    StoreOptions, SyncOutcome,
};
use serde_json::{Value, json};

fn raw(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("fixtures are objects"),
    }
}

fn question(q: &str, answer: &str, type_source: &str, source: &str) -> RawRecord {
    raw(json!({
        "question": q,
        "answer": answer,
        "type_source": type_source,
        "source": source
    }))
}

fn nomenclature(n_id: &str, content: &str, modified_at: &str) -> RawRecord {
    raw(json!({
        "content": content,
        "type_source": "excel таблица",
        "source": "stock.xlsx",
        "n_id": n_id,
        "modified_at": modified_at
    }))
}

fn timestamp(iso: &str) -> f64 {
    quire_store::schema::parse_timestamp(&json!(iso)).unwrap()
}

struct Fixture {
    index: Arc<MemoryIndex>,
    provider: Arc<MockEmbeddingProvider>,
    store: DocumentStore,
}

fn fixture_with(index: MemoryIndex) -> Fixture {
    let index = Arc::new(index);
    let provider = Arc::new(MockEmbeddingProvider::new(3));
    let manager = Arc::new(CollectionManager::new(index.clone()));
    let store = DocumentStore::new(manager).with_options(StoreOptions {
        batch_size: 100,
        scroll_limit: 1000,
        default_limit: 3,
    });
    Fixture {
        index,
        provider,
        store,
    }
}

fn fixture() -> Fixture {
    fixture_with(MemoryIndex::new())
}

impl Fixture {
    fn question_binding(&self, slot: &str, field: &str) -> EmbeddingBinding {
        EmbeddingBinding::new(
            slot,
            field,
            3,
            self.provider.clone(),
            Distance::Cosine,
            &QuestionKind,
        )
        .unwrap()
    }

    async fn create_docs(&self) {
        let config = CollectionConfig::new(
            "Docs",
            Arc::new(QuestionKind),
            vec![self.question_binding("q-embed", "question")],
        )
        .unwrap();
        assert_eq!(
            self.store.collections().create(config).await.unwrap(),
            EnsureOutcome::Created
        );
    }

    async fn create_stock(&self) {
        let binding = EmbeddingBinding::new(
            "content-embed",
            "content",
            3,
            self.provider.clone(),
            Distance::Cosine,
            &NomenclatureKind,
        )
        .unwrap();
        let config = CollectionConfig::new("Stock", Arc::new(NomenclatureKind), vec![binding])
            .unwrap()
            .with_payload_index("modified_at", PayloadSchema::Float)
            .unwrap();
        self.store.collections().create(config).await.unwrap();
    }
}

// ============================================================================
// Ingest and conditional update
// ============================================================================

#[tokio::test]
async fn test_docs_example_ingest_then_update() {
    let fx = fixture();
    fx.create_docs().await;

    let original = question("a", "b", "текстовый файл", "f1");
    let report = fx.store.ingest("Docs", &[original.clone()]).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert!(report.rejected.is_empty());

    let stored = fx.store.get_all("Docs").await.unwrap();
    assert_eq!(stored.len(), 1);
    let id = stored[0].id;
    assert_eq!(stored[0].payload["question"], json!("a"));
    assert_eq!(stored[0].payload["answer"], json!("b"));
    assert_eq!(stored[0].payload["type_source"], json!("текстовый файл"));
    let point = fx.index.get_point("Docs", id).await.unwrap();
    assert_eq!(point.vectors["q-embed"].len(), 3);

    let unchanged = fx
        .store
        .update("Docs", &[original], &["source"], &["answer"])
        .await
        .unwrap();
    assert_eq!((unchanged.updated, unchanged.added), (0, 0));
    assert_eq!(unchanged.unchanged, 1);

    let changed = question("a", "c", "текстовый файл", "f1");
    let report = fx
        .store
        .update("Docs", &[changed], &["source"], &["answer"])
        .await
        .unwrap();
    assert_eq!((report.updated, report.added), (1, 0));

    let stored = fx.store.get_all("Docs").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].payload["answer"], json!("c"));
}

#[tokio::test]
async fn test_update_adds_unmatched_records_under_natural_ids() {
    let fx = fixture();
    fx.create_docs().await;

    let record = question("q", "a", "сайт", "page-1");
    let first = fx
        .store
        .update("Docs", &[record.clone()], &["source"], &["answer"])
        .await
        .unwrap();
    assert_eq!(first.added, 1);

    // Same natural key from a second writer lands on the same point
    let mut changed = record;
    changed.insert("answer".into(), json!("a2"));
    let second = fx
        .store
        .update("Docs", &[changed], &["source"], &["answer"])
        .await
        .unwrap();
    assert_eq!(second.updated, 1);
    assert_eq!(fx.index.point_count("Docs").await, Some(1));
}

#[tokio::test]
async fn test_update_sees_records_written_earlier_in_the_call() {
    let fx = fixture();
    fx.create_docs().await;

    let raws = vec![
        question("q", "a1", "сайт", "s1"),
        question("q", "a2", "сайт", "s1"),
        question("q", "a2", "сайт", "s1"),
    ];
    let report = fx
        .store
        .update("Docs", &raws, &["source"], &["answer"])
        .await
        .unwrap();
    assert_eq!((report.added, report.updated, report.unchanged), (1, 1, 1));

    let stored = fx.store.get_all("Docs").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].payload["answer"], json!("a2"));
}

#[tokio::test]
async fn test_update_rejects_unknown_fields_before_remote_calls() {
    let fx = fixture();
    fx.create_docs().await;

    let err = fx
        .store
        .update("Docs", &[question("a", "b", "сайт", "s")], &["title"], &["answer"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownField { ref field, .. } if field == "title"));
    assert_eq!(fx.index.upsert_calls(), 0);
}

#[tokio::test]
async fn test_ingest_isolates_invalid_records() {
    let fx = fixture();
    fx.create_docs().await;

    let mut missing_answer = question("x", "y", "сайт", "s");
    missing_answer.remove("answer");
    let raws = vec![
        question("a", "b", "сайт", "s1"),
        missing_answer,
        question("c", "d", "fax", "s2"),
        question("e", "f", "pdf файл", "s3"),
    ];

    let report = fx.store.ingest("Docs", &raws).await.unwrap();
    assert_eq!(report.inserted, 2);
    let rejected: Vec<usize> = report.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![1, 2]);
    assert!(report.rejected[0].message.contains("answer"));
    assert!(report.rejected[1].message.contains("fax"));
}

#[tokio::test]
async fn test_ingest_embeds_each_text_once_per_call() {
    let fx = fixture();
    fx.create_docs().await;

    let raws: Vec<RawRecord> = ["x", "X ", "y", "x", "y"]
        .iter()
        .enumerate()
        .map(|(i, q)| question(q, "a", "сайт", &format!("s{i}")))
        .collect();
    fx.store.ingest("Docs", &raws).await.unwrap();
    assert_eq!(fx.provider.calls(), 2);

    // The cache does not outlive the call
    fx.store.ingest("Docs", &raws[..1]).await.unwrap();
    assert_eq!(fx.provider.calls(), 3);
}

#[tokio::test]
async fn test_ingest_flushes_in_batches() {
    let fx = fixture();
    fx.create_docs().await;

    let raws: Vec<RawRecord> = (0..250)
        .map(|i| question(&format!("q{i}"), "a", "сайт", &format!("s{i}")))
        .collect();
    let report = fx.store.ingest("Docs", &raws).await.unwrap();

    assert_eq!(report.inserted, 250);
    assert_eq!(fx.index.upsert_calls(), 3);
    assert_eq!(fx.index.point_count("Docs").await, Some(250));
}

#[tokio::test]
async fn test_failing_batch_keeps_earlier_batches() {
    let fx = fixture_with(MemoryIndex::new().fail_upsert_after(2));
    fx.create_docs().await;

    let raws: Vec<RawRecord> = (0..250)
        .map(|i| question(&format!("q{i}"), "a", "сайт", &format!("s{i}")))
        .collect();
    let err = fx.store.ingest("Docs", &raws).await.unwrap_err();

    assert!(err.is_remote());
    assert_eq!(fx.index.upsert_calls(), 3);
    assert_eq!(fx.index.point_count("Docs").await, Some(200));
}

// ============================================================================
// Incremental sync
// ============================================================================

#[tokio::test]
async fn test_sync_applies_only_newer_records() {
    let fx = fixture();
    fx.create_stock().await;
    fx.store
        .ingest(
            "Stock",
            &[
                nomenclature("1", "bolt m6", "2024-01-01T00:00:00"),
                nomenclature("2", "nut m6", "2024-02-01T00:00:00"),
            ],
        )
        .await
        .unwrap();

    let stale = fx
        .store
        .sync_newer(
            "Stock",
            &[nomenclature("1", "bolt m6 zinc", "2024-01-15T00:00:00")],
            "modified_at",
            Some("n_id"),
        )
        .await
        .unwrap();
    assert_eq!(
        stale,
        SyncOutcome::Stale {
            stored_max: timestamp("2024-02-01T00:00:00"),
            batch_max: Some(timestamp("2024-01-15T00:00:00")),
        }
    );
    assert_eq!(fx.index.upsert_calls(), 1);

    let batch = vec![
        nomenclature("1", "bolt m6 zinc", "2024-03-01T00:00:00"),
        nomenclature("3", "washer m6", "2024-03-02T00:00:00"),
        nomenclature("2", "nut m6 old", "2024-01-20T00:00:00"),
    ];
    let outcome = fx
        .store
        .sync_newer("Stock", &batch, "modified_at", Some("n_id"))
        .await
        .unwrap();
    let SyncOutcome::Applied(report) = outcome else {
        unreachable!("batch has newer records");
    };
    assert_eq!((report.updated, report.added, report.skipped), (1, 1, 1));
    assert_eq!(fx.index.point_count("Stock").await, Some(3));

    let bolt = fx
        .store
        .must_search("Stock", &BTreeMap::from([("n_id".to_string(), FieldMatch::from("1"))]))
        .await
        .unwrap();
    assert_eq!(bolt.len(), 1);
    assert_eq!(bolt[0].payload["content"], json!("bolt m6 zinc"));

    // Re-submitting the same batch is a no-op
    let again = fx
        .store
        .sync_newer("Stock", &batch, "modified_at", Some("n_id"))
        .await
        .unwrap();
    assert!(matches!(
        again,
        SyncOutcome::Stale { stored_max, .. } if stored_max == timestamp("2024-03-02T00:00:00")
    ));
}

#[tokio::test]
async fn test_sync_failure_leaves_batch_retryable() {
    let fx = fixture_with(MemoryIndex::new().fail_upsert_after(1));
    fx.create_stock().await;
    fx.store
        .ingest("Stock", &[nomenclature("1", "bolt", "2024-01-01T00:00:00")])
        .await
        .unwrap();

    let store = DocumentStore::new(fx.store.collections().clone()).with_options(StoreOptions {
        batch_size: 1,
        scroll_limit: 1000,
        default_limit: 3,
    });
    let batch = vec![
        nomenclature("9", "nut", "2024-05-01T00:00:00"),
        nomenclature("5", "washer", "2024-03-01T00:00:00"),
    ];
    let err = store
        .sync_newer("Stock", &batch, "modified_at", Some("n_id"))
        .await
        .unwrap_err();
    assert!(err.is_remote());

    // Nothing of the batch was written, even with a batch size of one
    assert_eq!(fx.index.upsert_calls(), 2);
    assert_eq!(fx.index.point_count("Stock").await, Some(1));

    // The stored maximum did not move, so a retry writes again
    let err = store
        .sync_newer("Stock", &batch, "modified_at", Some("n_id"))
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert_eq!(fx.index.upsert_calls(), 3);
}

#[tokio::test]
async fn test_sync_keeps_newest_record_per_identity() {
    let fx = fixture();
    fx.create_stock().await;
    fx.store
        .ingest("Stock", &[nomenclature("1", "bolt", "2024-01-01T00:00:00")])
        .await
        .unwrap();

    let batch = vec![
        nomenclature("7", "new version", "2024-06-01T00:00:00"),
        nomenclature("7", "old version", "2024-04-01T00:00:00"),
        nomenclature("8", "old version", "2024-04-01T00:00:00"),
        nomenclature("8", "new version", "2024-06-01T00:00:00"),
    ];
    let outcome = fx
        .store
        .sync_newer("Stock", &batch, "modified_at", Some("n_id"))
        .await
        .unwrap();
    let SyncOutcome::Applied(report) = outcome else {
        unreachable!("batch has newer records");
    };
    assert_eq!((report.updated, report.added, report.skipped), (0, 2, 2));
    assert_eq!(fx.index.point_count("Stock").await, Some(3));

    for n_id in ["7", "8"] {
        let found = fx
            .store
            .must_search("Stock", &BTreeMap::from([("n_id".to_string(), FieldMatch::from(n_id))]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].payload["content"], json!("new version"));
    }
}

#[tokio::test]
async fn test_sync_without_identity_always_adds() {
    let fx = fixture();
    fx.create_stock().await;
    fx.store
        .ingest("Stock", &[nomenclature("1", "bolt", "2024-01-01T00:00:00")])
        .await
        .unwrap();

    let batch = vec![
        nomenclature("1", "bolt zinc", "2024-03-01T00:00:00"),
        nomenclature("1", "bolt steel", "2024-02-01T00:00:00"),
        nomenclature("2", "nut", "2023-12-01T00:00:00"),
    ];
    let outcome = fx
        .store
        .sync_newer("Stock", &batch, "modified_at", None)
        .await
        .unwrap();
    let SyncOutcome::Applied(report) = outcome else {
        unreachable!("batch has newer records");
    };
    assert_eq!((report.updated, report.added, report.skipped), (0, 2, 1));
    assert_eq!(fx.index.point_count("Stock").await, Some(3));
}

#[tokio::test]
async fn test_sync_against_empty_collection_fails() {
    let fx = fixture();
    fx.create_stock().await;

    let err = fx
        .store
        .sync_newer(
            "Stock",
            &[nomenclature("1", "bolt", "2024-01-01T00:00:00")],
            "modified_at",
            Some("n_id"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyCollection(ref name) if name == "Stock"));
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_must_search_returns_exactly_the_matches() {
    let fx = fixture();
    fx.create_docs().await;
    let raws = vec![
        question("q1", "a", "pdf файл", "doc1.pdf"),
        question("q2", "a", "сайт", "site"),
        question("q3", "a", "pdf файл", "doc2.pdf"),
        question("q4", "a", "Word файл", "doc.docx"),
        question("q5", "a", "текстовый файл", "notes.txt"),
    ];
    fx.store.ingest("Docs", &raws).await.unwrap();

    let matches = BTreeMap::from([("type_source".to_string(), FieldMatch::from("pdf файл"))]);
    let found = fx.store.must_search("Docs", &matches).await.unwrap();
    let mut questions: Vec<&str> = found
        .iter()
        .map(|p| p.payload["question"].as_str().unwrap())
        .collect();
    questions.sort_unstable();
    assert_eq!(questions, vec!["q1", "q3"]);

    let matches: BTreeMap<String, FieldMatch> =
        serde_json::from_value(json!({"source": {"$in": ["site", "notes.txt", "missing"]}}))
            .unwrap();
    assert_eq!(fx.store.must_search("Docs", &matches).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_hybrid_without_tokens_equals_single_field_search() {
    let fx = fixture();
    fx.create_docs().await;
    let raws: Vec<RawRecord> = ["alpha", "beta", "gamma", "delta", "epsilon"]
        .iter()
        .map(|q| question(q, "a", "сайт", q))
        .collect();
    fx.store.ingest("Docs", &raws).await.unwrap();

    let single = fx
        .store
        .search("Docs", "gamma ray", "question", Some(3))
        .await
        .unwrap();
    let hybrid = fx
        .store
        .hybrid_search("Docs", "gamma ray", &["question"], Some(3))
        .await
        .unwrap();

    let ids = |hits: &[quire_store::ScoredPoint]| hits.iter().map(|h| h.id).collect::<Vec<PointId>>();
    assert_eq!(single.len(), 3);
    assert_eq!(ids(&single), ids(&hybrid));
}

#[tokio::test]
async fn test_hybrid_filters_on_query_keywords() {
    let fx = fixture();
    let config = CollectionConfig::new(
        "Docs",
        Arc::new(QuestionKind),
        vec![
            fx.question_binding("q-embed", "question"),
            fx.question_binding("a-embed", "answer"),
        ],
    )
    .unwrap()
    .with_payload_index("tokens", PayloadSchema::Keyword)
    .unwrap();
    fx.store.collections().create(config).await.unwrap();

    let mut rust = question("ownership", "borrowing", "сайт", "r");
    rust.insert("tokens".into(), json!(["rust", "ownership"]));
    let mut go = question("goroutines", "channels", "сайт", "g");
    go.insert("tokens".into(), json!(["go"]));
    let untagged = question("misc", "misc", "сайт", "m");
    fx.store.ingest("Docs", &[rust, go, untagged]).await.unwrap();

    let store = DocumentStore::new(fx.store.collections().clone())
        .with_tokenizer(Arc::new(KeywordTokenizer::with_stop_words(20, ["about"])));
    let before = fx.provider.calls();
    let hits = store
        .hybrid_search("Docs", "about Rust", &["question", "answer"], Some(5))
        .await
        .unwrap();

    // Both bindings share one provider: a single query embedding
    assert_eq!(fx.provider.calls(), before + 1);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload["source"], json!("r"));
}

#[tokio::test]
async fn test_hybrid_embeds_once_per_distinct_provider() {
    let fx = fixture();
    let questions = Arc::new(MockEmbeddingProvider::new(3));
    let answers = Arc::new(MockEmbeddingProvider::new(3));
    let binding = |slot: &str, field: &str, provider: Arc<MockEmbeddingProvider>| {
        EmbeddingBinding::new(slot, field, 3, provider, Distance::Cosine, &QuestionKind).unwrap()
    };
    let config = CollectionConfig::new(
        "Docs",
        Arc::new(QuestionKind),
        vec![
            binding("q-embed", "question", questions.clone()),
            binding("a-embed", "answer", answers.clone()),
        ],
    )
    .unwrap();
    fx.store.collections().create(config).await.unwrap();
    fx.store
        .ingest(
            "Docs",
            &[
                question("ownership", "borrowing", "сайт", "r"),
                question("goroutines", "channels", "сайт", "g"),
            ],
        )
        .await
        .unwrap();

    let (q_before, a_before) = (questions.calls(), answers.calls());
    let hits = fx
        .store
        .hybrid_search("Docs", "ownership", &["question", "answer"], Some(5))
        .await
        .unwrap();

    assert_eq!(questions.calls(), q_before + 1);
    assert_eq!(answers.calls(), a_before + 1);
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_search_errors_are_raised_before_remote_calls() {
    let fx = fixture();
    fx.create_docs().await;

    let err = fx.store.search("Nope", "x", "question", None).await.unwrap_err();
    assert!(matches!(err, Error::UnconfiguredCollection(_)));

    let err = fx.store.search("Docs", "x", "answer", None).await.unwrap_err();
    assert!(matches!(err, Error::UnknownBindingField { ref field, .. } if field == "answer"));

    let err = fx
        .store
        .hybrid_search("Docs", "x", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
    assert_eq!(fx.provider.calls(), 0);
}

// ============================================================================
// Deletion and lifecycle
// ============================================================================

#[tokio::test]
async fn test_delete_by_filter_and_ids() {
    let fx = fixture();
    fx.create_docs().await;
    fx.store
        .ingest(
            "Docs",
            &[
                question("q1", "a", "сайт", "old"),
                question("q2", "a", "сайт", "old"),
                question("q3", "a", "сайт", "new"),
            ],
        )
        .await
        .unwrap();

    let err = fx
        .store
        .delete_by_filter("Docs", &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));

    fx.store
        .delete_by_filter("Docs", &BTreeMap::from([("source".to_string(), FieldMatch::from("old"))]))
        .await
        .unwrap();
    let remaining = fx.store.get_all("Docs").await.unwrap();
    assert_eq!(remaining.len(), 1);

    fx.store
        .delete_by_ids("Docs", vec![remaining[0].id])
        .await
        .unwrap();
    assert_eq!(fx.index.point_count("Docs").await, Some(0));
}

#[tokio::test]
async fn test_drop_then_ensure_recreates_empty_collection() {
    let fx = fixture();
    fx.create_docs().await;
    fx.store
        .ingest("Docs", &[question("a", "b", "сайт", "s")])
        .await
        .unwrap();

    let collections = fx.store.collections();
    assert_eq!(collections.status("Docs").await.unwrap(), CollectionStatus::Populated);
    assert_eq!(
        collections.ensure_exists("Docs").await.unwrap(),
        EnsureOutcome::AlreadyExists
    );
    assert_eq!(fx.index.point_count("Docs").await, Some(1));

    (**collections).drop("Docs").await.unwrap();
    assert_eq!(collections.ensure_exists("Docs").await.unwrap(), EnsureOutcome::Created);
    assert_eq!(collections.status("Docs").await.unwrap(), CollectionStatus::Ensured);
}
