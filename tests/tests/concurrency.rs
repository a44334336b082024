use application::{EngineState, QueryEngine};
use domain::models::{ChatReply, ChatRequest};
use std::sync::Arc;
use std::time::Duration;
use tests::{document, sentence_config, StubGenerator, VocabEmbedder, ANIMALS};
use tokio::sync::watch;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_embedder_timeout_fails_only_its_own_query() {
    let mut config = sentence_config();
    config.model.timeout = Duration::from_millis(300);
    let engine = Arc::new(
        QueryEngine::new(
            &config,
            Arc::new(VocabEmbedder::hanging_on("stall")),
            Arc::new(StubGenerator::new("Yes, dogs are mammals.")),
        )
        .unwrap(),
    );
    engine.build_from_document(document(ANIMALS)).await.unwrap();

    let stalled = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .answer_query(ChatRequest::new("stall: are dogs mammals?"))
                .await
        })
    };
    let healthy: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .answer_query(ChatRequest::new("Are dogs mammals?"))
                    .await
            })
        })
        .collect();

    for handle in healthy {
        assert_eq!(
            handle.await.unwrap(),
            ChatReply::answer("Yes, dogs are mammals.")
        );
    }
    assert_eq!(stalled.await.unwrap(), ChatReply::internal());
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queries_during_build_are_not_ready() {
    let (open, gate) = watch::channel(false);
    let engine = Arc::new(
        QueryEngine::new(
            &sentence_config(),
            Arc::new(VocabEmbedder::gated(gate)),
            Arc::new(StubGenerator::new("Yes.")),
        )
        .unwrap(),
    );

    let build = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.build_from_document(document(ANIMALS)).await })
    };
    while engine.state() != EngineState::Building {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let early = engine.answer_query(ChatRequest::new("Are dogs mammals?")).await;
    assert_eq!(early, ChatReply::not_ready());

    open.send(true).unwrap();
    let stats = build.await.unwrap().unwrap();
    assert_eq!(stats.chunks, 3);

    let late = engine.answer_query(ChatRequest::new("Are dogs mammals?")).await;
    assert_eq!(late, ChatReply::answer("Yes."));
}

#[tokio::test]
async fn test_abandoned_build_never_serves() {
    let (_open, gate) = watch::channel(false);
    let engine = QueryEngine::new(
        &sentence_config(),
        Arc::new(VocabEmbedder::gated(gate)),
        Arc::new(StubGenerator::new("Yes.")),
    )
    .unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        engine.build_from_document(document(ANIMALS)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(
        engine.answer_query(ChatRequest::new("Are dogs mammals?")).await,
        ChatReply::not_ready()
    );
}

#[tokio::test]
async fn test_dropped_query_leaves_index_serving() {
    let embeddings = Arc::new(VocabEmbedder::hanging_on("stall"));
    let generator = Arc::new(StubGenerator::new("Yes, dogs are mammals."));
    let engine =
        QueryEngine::new(&sentence_config(), embeddings, generator.clone()).unwrap();
    engine.build_from_document(document(ANIMALS)).await.unwrap();

    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        engine.answer_query(ChatRequest::new("stall: are dogs mammals?")),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(engine.state(), EngineState::Ready);
    assert!(generator.prompts().is_empty());

    let reply = engine.answer_query(ChatRequest::new("Are dogs mammals?")).await;
    assert_eq!(reply, ChatReply::answer("Yes, dogs are mammals."));
    let hits = engine.retrieve("Are dogs mammals?").await.unwrap();
    assert_eq!(hits.hits[0].chunk.text, "Dogs are mammals. ");
}
