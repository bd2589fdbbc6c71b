//! End-to-end pipeline tests over a temporary store with mock providers.
//!
//! These cover the cross-component guarantees: partial-failure ingestion,
//! the empty-store fallback, citation page translation, rebuild idempotence,
//! and retrieval ordering.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use chaptersmith::artifacts::{QuizKind, QuizParse};
use chaptersmith::config::NO_KNOWLEDGE_ANSWER;
use chaptersmith::generation::MockGenerationProvider;
use chaptersmith::{
    ChapterConfig, ChapterPipeline, Chunk, EmbeddingProvider, MockEmbeddingProvider, RagError,
    SearchOutcome,
};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter("info")
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn test_config(dir: &TempDir) -> ChapterConfig {
    ChapterConfig {
        store_dir: dir.path().to_path_buf(),
        ..ChapterConfig::default()
    }
}

async fn mock_pipeline(dir: &TempDir, generator: MockGenerationProvider) -> ChapterPipeline {
    init_tracing();
    ChapterPipeline::open(
        test_config(dir),
        Arc::new(MockEmbeddingProvider::new()),
        Arc::new(generator),
    )
    .await
    .expect("pipeline should open")
}

fn sample_chapter() -> String {
    let mut paragraphs = vec![
        "[page 419]\nAnomaly detection identifies observations that deviate markedly from \
         the rest of the data."
            .to_string(),
    ];
    for i in 0..10 {
        paragraphs.push(format!(
            "Technique {i} builds a model of normal behaviour and scores each \
             observation by how poorly it fits, flagging the worst offenders \
             for review by an analyst."
        ));
        if i == 4 {
            paragraphs.push(
                "[page 424]\nProximity-based methods score a point by the distance to its \
                 nearest neighbours."
                    .to_string(),
            );
        }
    }
    paragraphs.join("\n\n")
}

#[tokio::test]
async fn rebuild_then_ask_produces_a_grounded_answer() {
    let dir = TempDir::new().unwrap();
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering("grounded")).await;

    let report = pipeline.rebuild(&sample_chapter()).await.unwrap();
    assert!(report.chunks_total > 1);
    assert_eq!(report.chunks_indexed, report.chunks_total);
    assert_eq!(report.chunks_skipped, 0);

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.document_count, report.chunks_indexed);
    assert_eq!(stats.collection_name, "chapter_10_anomaly_detection");

    let answer = pipeline.ask("what is anomaly detection?").await.unwrap();
    assert_eq!(answer.answer, "grounded");
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.len() <= pipeline.config().top_k);
}

#[tokio::test]
async fn empty_store_falls_back_to_the_no_knowledge_answer() {
    let dir = TempDir::new().unwrap();
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering("unused")).await;

    let answer = pipeline.ask("what is an outlier?").await.unwrap();
    assert_eq!(answer.answer, NO_KNOWLEDGE_ANSWER);
    assert!(answer.sources.is_empty());

    let outcome = pipeline.retriever().search("anything", None).await.unwrap();
    assert!(matches!(outcome, SearchOutcome::KnowledgeBaseEmpty));
}

#[tokio::test]
async fn empty_chapter_text_fails_without_touching_the_store() {
    let dir = TempDir::new().unwrap();
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering("unused")).await;

    pipeline.rebuild(&sample_chapter()).await.unwrap();
    let before = pipeline.stats().await.unwrap().document_count;
    assert!(before > 0);

    let result = pipeline.rebuild("   \n\n  ").await;
    assert!(matches!(result, Err(RagError::EmptyChapter)));
    assert_eq!(pipeline.stats().await.unwrap().document_count, before);
}

#[tokio::test]
async fn citations_translate_source_pages_to_printed_pages() {
    let dir = TempDir::new().unwrap();
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering("cited")).await;

    pipeline
        .rebuild("[page 420]\nOutliers are observations far from the rest of the data.")
        .await
        .unwrap();

    let answer = pipeline.ask("what is an outlier?").await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source_page, 420);
    assert_eq!(answer.sources[0].book_page, 404);
    assert!(
        answer.sources[0]
            .preview
            .starts_with("Outliers are observations")
    );
}

#[tokio::test]
async fn retrieval_orders_hits_by_ascending_distance() {
    let dir = TempDir::new().unwrap();
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering("ok")).await;
    pipeline.rebuild(&sample_chapter()).await.unwrap();

    let SearchOutcome::Ranked(hits) = pipeline
        .retriever()
        .search("distance to nearest neighbours", None)
        .await
        .unwrap()
    else {
        panic!("expected ranked hits");
    };
    assert!(hits.len() >= 2);
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn rebuild_is_idempotent_for_text_and_metadata() {
    let dir = TempDir::new().unwrap();
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering("ok")).await;

    let first = pipeline.rebuild(&sample_chapter()).await.unwrap();
    let SearchOutcome::Ranked(hits_one) = pipeline
        .retriever()
        .search("normal behaviour", None)
        .await
        .unwrap()
    else {
        panic!("expected hits");
    };

    let second = pipeline.rebuild(&sample_chapter()).await.unwrap();
    assert_eq!(first, second);
    let SearchOutcome::Ranked(hits_two) = pipeline
        .retriever()
        .search("normal behaviour", None)
        .await
        .unwrap()
    else {
        panic!("expected hits");
    };

    let summary_one: Vec<_> = hits_one
        .iter()
        .map(|h| (h.text.clone(), h.metadata.clone()))
        .collect();
    let summary_two: Vec<_> = hits_two
        .iter()
        .map(|h| (h.text.clone(), h.metadata.clone()))
        .collect();
    assert_eq!(summary_one, summary_two);
}

/// Embedder that fails at a fixed set of call indices, for the
/// partial-ingestion guarantee.
struct OutageEmbedder {
    fail_at: Vec<usize>,
    calls: Mutex<usize>,
}

#[async_trait]
impl EmbeddingProvider for OutageEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            index
        };
        if self.fail_at.contains(&index) {
            return Err(RagError::Embedding("simulated outage".to_string()));
        }
        MockEmbeddingProvider::new().embed(text).await
    }

    fn dimensions(&self) -> usize {
        MockEmbeddingProvider::new().dimensions()
    }

    fn model_id(&self) -> &str {
        "outage"
    }
}

#[tokio::test]
async fn partial_embedding_failure_persists_the_survivors() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    // One attempt per chunk so call indices line up with chunk indices.
    config.embed_max_attempts = 1;

    let pipeline = ChapterPipeline::open(
        config,
        Arc::new(OutageEmbedder {
            fail_at: vec![3, 7],
            calls: Mutex::new(0),
        }),
        Arc::new(MockGenerationProvider::answering("ok")),
    )
    .await
    .unwrap();

    let chunks: Vec<Chunk> = (0..10)
        .map(|i| Chunk {
            text: format!("chunk body number {i}"),
            page: 419 + i,
            chunk_id: i,
            chapter: 10,
            source_label: "test chapter".to_string(),
        })
        .collect();

    let report = pipeline.append_chunks(&chunks).await.unwrap();
    assert_eq!(report.chunks_total, 10);
    assert_eq!(report.chunks_indexed, 8);
    assert_eq!(report.chunks_skipped, 2);
    assert_eq!(pipeline.stats().await.unwrap().document_count, 8);
}

#[tokio::test]
async fn quiz_generation_parses_strict_json_and_tags_malformed_output() {
    let dir = TempDir::new().unwrap();
    let quiz_json = r#"{
        "type": "true_false",
        "question": "Every outlier is a data-entry error.",
        "answer": "false",
        "explanation": "Rare but legitimate events are anomalies too."
    }"#;
    let pipeline = mock_pipeline(&dir, MockGenerationProvider::answering(quiz_json)).await;
    pipeline.rebuild(&sample_chapter()).await.unwrap();

    let quiz = pipeline
        .quiz_generator()
        .generate("outliers", Some(QuizKind::TrueFalse))
        .await
        .unwrap();
    let QuizParse::Parsed(item) = quiz else {
        panic!("expected parsed quiz item");
    };
    assert_eq!(item.kind, QuizKind::TrueFalse);

    let rambling = mock_pipeline(
        &dir,
        MockGenerationProvider::answering("no json here, sorry"),
    )
    .await;
    let quiz = rambling
        .quiz_generator()
        .generate("outliers", None)
        .await
        .unwrap();
    assert!(matches!(quiz, QuizParse::Malformed { .. }));
}
