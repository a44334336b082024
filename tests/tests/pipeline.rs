use application::{EngineState, QueryEngine};
use domain::models::{ChatReply, ChatRequest};
use domain::RagError;
use infrastructure::document_loader::DocumentLoader;
use std::io::Write;
use std::sync::Arc;
use tests::{document, sentence_config, StubGenerator, VocabEmbedder, ANIMALS};

fn engine_with(reply: &str) -> (QueryEngine, Arc<VocabEmbedder>, Arc<StubGenerator>) {
    let embeddings = Arc::new(VocabEmbedder::new());
    let generator = Arc::new(StubGenerator::new(reply));
    let engine =
        QueryEngine::new(&sentence_config(), embeddings.clone(), generator.clone()).unwrap();
    (engine, embeddings, generator)
}

#[tokio::test]
async fn test_dogs_question_is_grounded_in_dogs_sentence() {
    let (engine, _, generator) = engine_with("Yes, dogs are mammals.");
    let stats = engine.build_from_document(document(ANIMALS)).await.unwrap();
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.dimension, Some(6));

    let hits = engine.retrieve("Are dogs mammals?").await.unwrap();
    assert_eq!(hits.hits[0].chunk.text.trim(), "Dogs are mammals.");

    let reply = engine
        .answer_query(ChatRequest::new("Are dogs mammals?"))
        .await;
    assert_eq!(reply, ChatReply::answer("Yes, dogs are mammals."));

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].text.contains("Dogs are mammals."));
    assert!(prompts[0].text.contains("Are dogs mammals?"));
}

#[tokio::test]
async fn test_results_are_ordered_and_bounded() {
    let (engine, _, _) = engine_with("ok");
    engine.build_from_document(document(ANIMALS)).await.unwrap();

    let hits = engine.retrieve("fish are not mammals").await.unwrap();
    assert!(hits.len() <= 3);
    assert!(hits.hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits.hits[0].chunk.text, "Fish are not mammals.");
}

#[tokio::test]
async fn test_chunk_text_retrieves_itself_first() {
    let (engine, _, _) = engine_with("ok");
    engine.build_from_document(document(ANIMALS)).await.unwrap();

    for sentence in ["Cats are mammals. ", "Dogs are mammals. ", "Fish are not mammals."] {
        let hits = engine.retrieve(sentence).await.unwrap();
        assert_eq!(hits.hits[0].chunk.text, sentence);
    }
}

#[tokio::test]
async fn test_empty_message_never_reaches_the_embedder() {
    let (engine, embeddings, _) = engine_with("ok");
    engine.build_from_document(document(ANIMALS)).await.unwrap();
    let calls = embeddings.calls();

    let blank = engine.answer_query(ChatRequest::new("  \n\t ")).await;
    assert_eq!(blank, ChatReply::no_message());
    assert!(blank.is_client_error());

    let missing = engine.answer_query(ChatRequest { message: None }).await;
    assert_eq!(missing, ChatReply::no_message());
    assert_eq!(embeddings.calls(), calls);
}

#[tokio::test]
async fn test_empty_document_answers_without_context() {
    let (engine, _, generator) = engine_with("The document does not say.");
    let stats = engine.build_from_document(document("")).await.unwrap();
    assert_eq!(stats.chunks, 0);

    let reply = engine.answer_query(ChatRequest::new("Are dogs mammals?")).await;
    assert!(reply.is_answer());
    assert!(!generator.prompts()[0].has_context);
}

#[tokio::test]
async fn test_index_is_built_only_once() {
    let (engine, _, _) = engine_with("ok");
    engine.build_from_document(document(ANIMALS)).await.unwrap();
    let err = engine
        .build_from_document(document("Something else entirely."))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidConfig(_)));
    assert_eq!(engine.state(), EngineState::Ready);

    let hits = engine.retrieve("dogs").await.unwrap();
    assert_eq!(hits.hits[0].chunk.text, "Dogs are mammals. ");
}

#[tokio::test]
async fn test_builds_from_a_text_file() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    write!(file, "{ANIMALS}\r\n").unwrap();

    let (engine, _, _) = engine_with("ok");
    let stats = engine.build(file.path()).await.unwrap();
    assert_eq!(stats.chunks, 3);
    assert!(engine.is_ready());
}

#[tokio::test]
async fn test_unreadable_document_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, embeddings, _) = engine_with("ok");

    let err = engine.build(dir.path()).await.unwrap_err();
    assert_eq!(err.kind(), "load_failure");
    assert!(err.is_startup_fatal());
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(embeddings.calls(), 0);

    let reply = engine.answer_query(ChatRequest::new("Are dogs mammals?")).await;
    assert_eq!(reply, ChatReply::not_ready());
}

#[tokio::test]
async fn test_oversized_document_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
    write!(file, "{ANIMALS}").unwrap();

    let (engine, _, _) = engine_with("ok");
    let engine = engine.with_loader(DocumentLoader::new().with_max_file_bytes(16));
    let err = engine.build(file.path()).await.unwrap_err();
    assert_eq!(err.kind(), "load_failure");
    assert_eq!(engine.state(), EngineState::Failed);
}

#[test]
fn test_reply_wire_shape() {
    let answer = serde_json::to_value(ChatReply::answer("Yes.")).unwrap();
    assert_eq!(answer, serde_json::json!({ "answer": "Yes." }));

    let error = serde_json::to_value(ChatReply::internal()).unwrap();
    assert_eq!(error, serde_json::json!({ "error": "Internal server error" }));

    let request: ChatRequest = serde_json::from_str("{}").unwrap();
    assert!(request.message.is_none());
}
