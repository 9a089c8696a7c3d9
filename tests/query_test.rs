mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use granary::config::Config;
use granary::error::ErrorKind;
use granary::models::{
    DocumentStatus, QueryOptions, QueryRequest, QueryStreamEvent, Tenant, TenantConfigPatch,
};
use granary::reranker::LlmReranker;
use granary::services::{DocumentService, RagService, TenantService};
use granary::vectorstore::VectorStore;

use common::{test_backend, FakeVectorStore, StubEmbedder, StubLlm};

struct Harness {
    db: Arc<dyn granary::db::MetadataBackend>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<StubEmbedder>,
    tenants: TenantService,
    documents: DocumentService,
    rag: RagService,
    llm: Arc<StubLlm>,
}

async fn harness_with_llm(llm: Arc<StubLlm>) -> Harness {
    let db = test_backend().await;
    let vectors: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::new());
    let embedder = Arc::new(StubEmbedder);

    let tenants = TenantService::new(db.clone(), vectors.clone(), Config::default());
    let documents =
        DocumentService::new(db.clone(), vectors.clone(), embedder.clone()).unwrap();
    let rag = RagService::new(db.clone(), embedder.clone(), vectors.clone(), llm.clone());

    Harness {
        db,
        vectors,
        embedder,
        tenants,
        documents,
        rag,
        llm,
    }
}

async fn harness() -> Harness {
    harness_with_llm(Arc::new(StubLlm::new("The answer is in the documents."))).await
}

async fn ingest_and_wait(h: &Harness, tenant: &Tenant, content: &str, source: &str) -> String {
    let outcome = h
        .documents
        .ingest(&tenant.id.to_string(), content, source, "", HashMap::new())
        .await
        .unwrap();

    let id = outcome.document_id.to_string();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let doc = h.documents.get(&id).await.unwrap();
        if doc.status == DocumentStatus::Ready {
            return id;
        }
        assert_ne!(
            doc.status,
            DocumentStatus::Failed,
            "ingestion failed: {:?}",
            doc.error_message
        );
        if tokio::time::Instant::now() > deadline {
            panic!("document {id} not READY in time");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn request(tenant: &Tenant, query: &str) -> QueryRequest {
    QueryRequest {
        tenant_id: tenant.id.to_string(),
        query: query.to_string(),
        options: None,
        session_id: None,
    }
}

#[tokio::test]
async fn test_query_returns_answer_with_sources() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();
    let doc_id = ingest_and_wait(&h, &tenant, "# Hello\n\nWorld.", "s1").await;

    let response = h.rag.query(&request(&tenant, "hello world?")).await.unwrap();

    assert!(!response.answer.is_empty());
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].document_id, doc_id);
    assert_eq!(response.metadata.chunks_retrieved, 1);
    assert_eq!(response.metadata.model, tenant.config.llm_model);
}

#[tokio::test]
async fn test_query_respects_top_k_and_min_score() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();

    for i in 0..5 {
        ingest_and_wait(
            &h,
            &tenant,
            &format!("rust document number {i} about distinct-topic-{i} internals"),
            &format!("s{i}"),
        )
        .await;
    }

    let min_score = 0.1;
    let mut req = request(&tenant, "rust internals");
    req.options = Some(QueryOptions {
        top_k: 2,
        min_score,
        ..Default::default()
    });

    let response = h.rag.query(&req).await.unwrap();
    assert!(response.sources.len() <= 2);
    assert!(!response.sources.is_empty());
    for source in &response.sources {
        assert!(source.score >= min_score);
    }
}

#[tokio::test]
async fn test_query_validation() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();

    let err = h.rag.query(&request(&tenant, "")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut req = request(&tenant, "q");
    req.tenant_id = "not-a-uuid".to_string();
    let err = h.rag.query(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut req = request(&tenant, "q");
    req.tenant_id = uuid::Uuid::new_v4().to_string();
    let err = h.rag.query(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_query_prompt_contains_documents_but_not_scores() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();
    ingest_and_wait(&h, &tenant, "# Hello\n\nWorld.", "s1").await;

    h.rag.query(&request(&tenant, "hello world?")).await.unwrap();

    let prompts = h.llm.recorded_prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("## Context Documents"));
    assert!(prompt.contains("[Doc 1]"));
    assert!(prompt.contains("## Question\nhello world?"));
    assert!(prompt.contains("## Answer (be brief and direct)"));
    assert!(!prompt.contains("score"));
}

#[tokio::test]
async fn test_streaming_event_grammar() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();

    ingest_and_wait(&h, &tenant, "rust ownership and borrowing rules", "s1").await;
    ingest_and_wait(&h, &tenant, "rust async runtimes and executors", "s2").await;
    ingest_and_wait(&h, &tenant, "rust trait objects and generics", "s3").await;

    let mut req = request(&tenant, "rust");
    req.options = Some(QueryOptions {
        top_k: 3,
        min_score: 0.05,
        ..Default::default()
    });

    let mut rx = h.rag.query_stream(&req).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    // source* token+ metadata, with sources score-descending.
    let source_count = events
        .iter()
        .take_while(|e| matches!(e, QueryStreamEvent::Source(_)))
        .count();
    assert_eq!(source_count, 3);

    let mut last_score = f32::MAX;
    for event in &events[..source_count] {
        if let QueryStreamEvent::Source(chunk) = event {
            assert!(chunk.score <= last_score);
            last_score = chunk.score;
        }
    }

    let token_count = events[source_count..]
        .iter()
        .take_while(|e| matches!(e, QueryStreamEvent::Token(_)))
        .count();
    assert!(token_count >= 1);

    assert_eq!(events.len(), source_count + token_count + 1);
    assert!(matches!(events.last(), Some(QueryStreamEvent::Metadata(_))));

    if let Some(QueryStreamEvent::Metadata(metadata)) = events.last() {
        assert_eq!(metadata.chunks_retrieved, 3);
    }
}

#[tokio::test]
async fn test_streaming_error_replaces_metadata() {
    let h = harness_with_llm(Arc::new(StubLlm::failing_stream(
        "several words to stream here",
    )))
    .await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();
    ingest_and_wait(&h, &tenant, "# Hello\n\nWorld.", "s1").await;

    let mut rx = h
        .rag
        .query_stream(&request(&tenant, "hello world?"))
        .await
        .unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events.last(), Some(QueryStreamEvent::Error(_))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, QueryStreamEvent::Metadata(_))));
}

#[tokio::test]
async fn test_conversation_memory_flows_into_prompt() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();
    ingest_and_wait(&h, &tenant, "# Hello\n\nWorld.", "s1").await;

    for query in ["Q1 hello", "Q2 hello", "Q3 hello"] {
        let mut req = request(&tenant, query);
        req.session_id = Some("sess-A".to_string());
        h.rag.query(&req).await.unwrap();
    }

    let prompts = h.llm.recorded_prompts();
    assert_eq!(prompts.len(), 3);

    // The first prompt has no history section.
    assert!(!prompts[0].contains("## Conversation History"));

    // The third prompt carries both prior exchanges, in order.
    let third = &prompts[2];
    assert!(third.contains("## Conversation History"));
    let q1 = third.find("User: Q1 hello").expect("Q1 in history");
    let a1 = third.find("Assistant: The answer is in the documents.").expect("A1");
    let q2 = third.find("User: Q2 hello").expect("Q2 in history");
    assert!(q1 < a1 && a1 < q2);
}

#[tokio::test]
async fn test_reranker_failure_is_non_fatal() {
    // The canned LLM answers the rerank prompt with prose, not JSON; the
    // pipeline must fall back to vector scores and still answer.
    let llm = Arc::new(StubLlm::new("not json, just an answer"));
    let h = harness_with_llm(llm.clone()).await;

    let patch = TenantConfigPatch {
        reranker_enabled: Some(true),
        ..Default::default()
    };
    let tenant = h.tenants.create("t", None, Some(&patch)).await.unwrap();
    assert!(tenant.config.reranker_enabled);

    let rag = RagService::new(
        h.db.clone(),
        h.embedder.clone(),
        h.vectors.clone(),
        llm.clone(),
    )
    .with_reranker(Arc::new(LlmReranker::new(llm.clone(), "llama3.2")));

    ingest_and_wait(&h, &tenant, "# Hello\n\nWorld.", "s1").await;

    let response = rag.query(&request(&tenant, "hello world?")).await.unwrap();
    assert_eq!(response.answer, "not json, just an answer");
    assert_eq!(response.sources.len(), 1);

    // Two prompts hit the LLM: the rerank attempt and the answer.
    assert_eq!(llm.recorded_prompts().len(), 2);
}

#[tokio::test]
async fn test_retrieve_filters_by_document_ids() {
    let h = harness().await;
    let tenant = h.tenants.create("t", None, None).await.unwrap();

    let keep = ingest_and_wait(&h, &tenant, "rust memory model details", "s1").await;
    ingest_and_wait(&h, &tenant, "rust borrow checker details", "s2").await;

    let mut req = request(&tenant, "rust details");
    req.options = Some(QueryOptions {
        top_k: 10,
        min_score: 0.05,
        document_ids: vec![keep.clone()],
        ..Default::default()
    });

    let response = h.rag.retrieve(&req).await.unwrap();
    assert!(!response.chunks.is_empty());
    for chunk in &response.chunks {
        assert_eq!(chunk.document_id, keep);
    }

    // LLM must not be invoked for retrieve.
    assert!(h.llm.recorded_prompts().is_empty());
}
