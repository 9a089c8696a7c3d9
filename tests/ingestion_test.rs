mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use granary::config::Config;
use granary::error::{ErrorKind, GranaryError};
use granary::models::{Document, DocumentStatus, Tenant};
use granary::services::{DocumentService, TenantService};
use granary::vectorstore::VectorStore;

use common::{test_backend, FailingEmbedder, FakeVectorStore, StubEmbedder};

struct Harness {
    vectors: Arc<FakeVectorStore>,
    tenants: TenantService,
    documents: DocumentService,
}

async fn harness() -> Harness {
    let db = test_backend().await;
    let vectors = Arc::new(FakeVectorStore::new());
    let vector_store: Arc<dyn VectorStore> = vectors.clone();

    let tenants = TenantService::new(db.clone(), vector_store.clone(), Config::default());
    let documents = DocumentService::new(db, vector_store, Arc::new(StubEmbedder)).unwrap();

    Harness {
        vectors,
        tenants,
        documents,
    }
}

async fn create_tenant(harness: &Harness) -> Tenant {
    harness.tenants.create("test-tenant", None, None).await.unwrap()
}

async fn wait_for_terminal(documents: &DocumentService, id: &str) -> Document {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let doc = documents.get(id).await.unwrap();
        if doc.status.is_terminal() {
            return doc;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("document {id} did not reach a terminal state in time");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_ingest_reaches_ready() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;

    let outcome = h
        .documents
        .ingest(
            &tenant.id.to_string(),
            "# Hello\n\nWorld.",
            "s1",
            "",
            HashMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, DocumentStatus::Processing);

    let doc = wait_for_terminal(&h.documents, &outcome.document_id.to_string()).await;
    assert_eq!(doc.status, DocumentStatus::Ready);
    assert_eq!(doc.chunk_count, 1);
    assert_eq!(doc.title, "Untitled Document");
    assert_eq!(doc.source, "s1");
}

#[tokio::test]
async fn test_ready_document_is_consistent_across_stores() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;

    let outcome = h
        .documents
        .ingest(
            &tenant.id.to_string(),
            "# Title\n\nFirst paragraph here.\n\nSecond paragraph here.",
            "consistency",
            "Doc",
            HashMap::new(),
        )
        .await
        .unwrap();

    let doc = wait_for_terminal(&h.documents, &outcome.document_id.to_string()).await;
    assert_eq!(doc.status, DocumentStatus::Ready);

    let (chunks, _) = h
        .documents
        .get_chunks(&doc.id.to_string(), 100, "")
        .await
        .unwrap();
    assert_eq!(doc.chunk_count, chunks.len() as i64);
    assert_eq!(
        doc.chunk_count as usize,
        h.vectors
            .point_count(&tenant.id.to_string(), &doc.id.to_string())
    );

    // Indices form a dense 0-based sequence.
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i64);
    }

    // Usage counters follow the ingest.
    let tenant = h.tenants.get(&tenant.id.to_string()).await.unwrap();
    assert_eq!(tenant.usage.document_count, 1);
    assert_eq!(tenant.usage.chunk_count, doc.chunk_count);
}

#[tokio::test]
async fn test_duplicate_ingest_is_idempotent() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;
    let tenant_id = tenant.id.to_string();

    let first = h
        .documents
        .ingest(&tenant_id, "# Hello\n\nWorld.", "s1", "", HashMap::new())
        .await
        .unwrap();
    wait_for_terminal(&h.documents, &first.document_id.to_string()).await;

    let second = h
        .documents
        .ingest(&tenant_id, "# Hello\n\nWorld.", "s1", "", HashMap::new())
        .await
        .unwrap();
    assert_eq!(second.document_id, first.document_id);
    assert_eq!(second.status, DocumentStatus::Ready);

    let (docs, _, total) = h.documents.list(&tenant_id, None, 20, "").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(total, 1);

    // No extra chunk or vector rows appeared.
    let (chunks, _) = h
        .documents
        .get_chunks(&first.document_id.to_string(), 100, "")
        .await
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(
        h.vectors
            .point_count(&tenant_id, &first.document_id.to_string()),
        1
    );
}

#[tokio::test]
async fn test_same_content_different_source_is_not_deduplicated() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;
    let tenant_id = tenant.id.to_string();

    let a = h
        .documents
        .ingest(&tenant_id, "same body", "http://a", "", HashMap::new())
        .await
        .unwrap();
    let b = h
        .documents
        .ingest(&tenant_id, "same body", "http://b", "", HashMap::new())
        .await
        .unwrap();
    assert_ne!(a.document_id, b.document_id);
}

#[tokio::test]
async fn test_semantic_chunker_preserves_code_through_ingestion() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;

    let outcome = h
        .documents
        .ingest(
            &tenant.id.to_string(),
            "# X\n\nintro text\n\n```go\nfunc main() {}\n```\n\nmore text",
            "code-doc",
            "",
            HashMap::new(),
        )
        .await
        .unwrap();

    let doc = wait_for_terminal(&h.documents, &outcome.document_id.to_string()).await;
    assert_eq!(doc.status, DocumentStatus::Ready);

    let (chunks, _) = h
        .documents
        .get_chunks(&doc.id.to_string(), 100, "")
        .await
        .unwrap();

    let code_chunks: Vec<_> = chunks
        .iter()
        .filter(|c| c.metadata.get("contains_code").map(String::as_str) == Some("true"))
        .collect();
    assert!(!code_chunks.is_empty());
    assert!(code_chunks
        .iter()
        .any(|c| c.content.contains("```go\nfunc main() {}\n```")));

    for chunk in &chunks {
        assert_eq!(chunk.content.matches("```").count() % 2, 0);
        assert_eq!(chunk.metadata.get("document_id").unwrap(), &doc.id.to_string());
        assert!(chunk.metadata.contains_key("content_hash"));
        assert_eq!(chunk.metadata.get("source").unwrap(), "code-doc");
    }
}

#[tokio::test]
async fn test_ingest_url_fetch_failure_marks_failed() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;

    // Port 1 refuses connections.
    let outcome = h
        .documents
        .ingest_url(
            &tenant.id.to_string(),
            "http://127.0.0.1:1/nope",
            HashMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, DocumentStatus::Pending);

    let doc = wait_for_terminal(&h.documents, &outcome.document_id.to_string()).await;
    assert_eq!(doc.status, DocumentStatus::Failed);

    let message = doc.error_message.unwrap().to_lowercase();
    assert!(
        message.contains("failed to fetch")
            || message.contains("refused")
            || message.contains("no route"),
        "unexpected error message: {message}"
    );
}

#[tokio::test]
async fn test_embedding_failure_marks_failed() {
    let db = test_backend().await;
    let vectors: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::new());
    let tenants = TenantService::new(db.clone(), vectors.clone(), Config::default());
    let documents = DocumentService::new(db, vectors, Arc::new(FailingEmbedder)).unwrap();

    let tenant = tenants.create("t", None, None).await.unwrap();
    let outcome = documents
        .ingest(
            &tenant.id.to_string(),
            "some content",
            "s",
            "",
            HashMap::new(),
        )
        .await
        .unwrap();

    let doc = wait_for_terminal(&documents, &outcome.document_id.to_string()).await;
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert!(doc.error_message.unwrap().contains("embedding failed"));
}

#[tokio::test]
async fn test_empty_content_rejected_before_any_mutation() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;
    let tenant_id = tenant.id.to_string();

    let err = h
        .documents
        .ingest(&tenant_id, "   ", "s", "", HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let (_, _, total) = h.documents.list(&tenant_id, None, 20, "").await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_unknown_tenant_rejected() {
    let h = harness().await;

    let err = h
        .documents
        .ingest(
            &uuid::Uuid::new_v4().to_string(),
            "content",
            "s",
            "",
            HashMap::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .documents
        .ingest("not-a-uuid", "content", "s", "", HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_delete_then_reingest_produces_fresh_document() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;
    let tenant_id = tenant.id.to_string();

    let first = h
        .documents
        .ingest(&tenant_id, "body text", "s", "", HashMap::new())
        .await
        .unwrap();
    wait_for_terminal(&h.documents, &first.document_id.to_string()).await;

    h.documents
        .delete(&first.document_id.to_string())
        .await
        .unwrap();

    let err = h
        .documents
        .get(&first.document_id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, GranaryError::NotFound(_)));
    assert_eq!(
        h.vectors
            .point_count(&tenant_id, &first.document_id.to_string()),
        0
    );

    let second = h
        .documents
        .ingest(&tenant_id, "body text", "s", "", HashMap::new())
        .await
        .unwrap();
    assert_ne!(second.document_id, first.document_id);
    let doc = wait_for_terminal(&h.documents, &second.document_id.to_string()).await;
    assert_eq!(doc.status, DocumentStatus::Ready);
}

#[tokio::test]
async fn test_list_with_status_filter() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;
    let tenant_id = tenant.id.to_string();

    let good = h
        .documents
        .ingest(&tenant_id, "good content", "s1", "", HashMap::new())
        .await
        .unwrap();
    let bad = h
        .documents
        .ingest_url(&tenant_id, "http://127.0.0.1:1/bad", HashMap::new())
        .await
        .unwrap();

    wait_for_terminal(&h.documents, &good.document_id.to_string()).await;
    wait_for_terminal(&h.documents, &bad.document_id.to_string()).await;

    let (ready, _, _) = h
        .documents
        .list(&tenant_id, Some(DocumentStatus::Ready), 20, "")
        .await
        .unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, good.document_id);

    let (failed, _, _) = h
        .documents
        .list(&tenant_id, Some(DocumentStatus::Failed), 20, "")
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, bad.document_id);
}

#[tokio::test]
async fn test_chunk_pagination_token() {
    let h = harness().await;
    let tenant = create_tenant(&h).await;

    // Small chunker limits force several chunks from one document.
    let patch = granary::models::TenantConfigPatch {
        chunker_target_size: Some(5),
        chunker_max_size: Some(10),
        chunker_overlap: Some(2),
        ..Default::default()
    };
    h.tenants
        .update(&tenant.id.to_string(), None, Some(&patch))
        .await
        .unwrap();

    let body: Vec<String> = (0..8)
        .map(|i| format!("Paragraph number {i} with several words inside."))
        .collect();
    let outcome = h
        .documents
        .ingest(
            &tenant.id.to_string(),
            &body.join("\n\n"),
            "paged",
            "",
            HashMap::new(),
        )
        .await
        .unwrap();

    let doc = wait_for_terminal(&h.documents, &outcome.document_id.to_string()).await;
    assert!(doc.chunk_count > 2);

    let (page1, token) = h
        .documents
        .get_chunks(&doc.id.to_string(), 2, "")
        .await
        .unwrap();
    assert_eq!(page1.len(), 2);
    let token = token.expect("expected a next page token");

    let (page2, _) = h
        .documents
        .get_chunks(&doc.id.to_string(), 2, &token)
        .await
        .unwrap();
    assert_eq!(page2[0].chunk_index, 2);
}
