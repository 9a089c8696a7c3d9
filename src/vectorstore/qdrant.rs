use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, Fusion,
    NamedVectors, PointId, PointStruct, PointsIdsList, PrefetchQueryBuilder, Query,
    QueryPointsBuilder, ScoredPoint, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Value, Vector, VectorInput, VectorParamsBuilder, Vectors,
    VectorsConfigBuilder,
};
use qdrant_client::Qdrant;

use crate::error::{GranaryError, Result};

use super::{collection_name, SearchResult, SparseVector, VectorChunk, VectorStore};

// Named vector slots in hybrid collections.
const DENSE_VECTOR_NAME: &str = "dense";
const SPARSE_VECTOR_NAME: &str = "sparse";

pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| GranaryError::VectorStore(format!("failed to create client: {e}")))?;

        Ok(Self { client })
    }

    fn point_to_result(point: ScoredPoint) -> SearchResult {
        let id = match point.id.and_then(|id| id.point_id_options) {
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid,
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
            None => String::new(),
        };

        let mut document_id = String::new();
        let mut content = String::new();
        let mut metadata = HashMap::new();

        for (key, value) in point.payload {
            let value = match value.kind {
                Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => s,
                _ => continue,
            };
            match key.as_str() {
                "document_id" => document_id = value,
                "content" => content = value,
                _ => {
                    metadata.insert(key, value);
                }
            }
        }

        SearchResult {
            id,
            document_id,
            content,
            score: point.score,
            metadata,
        }
    }

    fn chunk_to_point(chunk: VectorChunk) -> PointStruct {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("document_id".to_string(), chunk.document_id.into());
        payload.insert("content".to_string(), chunk.content.into());
        for (key, value) in chunk.metadata {
            payload.insert(key, value.into());
        }

        let vectors: Vectors = match chunk.sparse_vector {
            Some(sparse) => NamedVectors::default()
                .add_vector(DENSE_VECTOR_NAME, Vector::new_dense(chunk.vector))
                .add_vector(
                    SPARSE_VECTOR_NAME,
                    Vector::new_sparse(sparse.indices, sparse.values),
                )
                .into(),
            None => chunk.vector.into(),
        };

        PointStruct {
            id: Some(PointId::from(chunk.id)),
            vectors: Some(vectors),
            payload,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(&self, tenant_id: &str, dimension: usize) -> Result<()> {
        let name = collection_name(tenant_id);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| GranaryError::VectorStore(format!("failed to create collection: {e}")))?;

        Ok(())
    }

    async fn create_hybrid_collection(&self, tenant_id: &str, dimension: usize) -> Result<()> {
        let name = collection_name(tenant_id);

        let mut vectors_config = VectorsConfigBuilder::default();
        vectors_config.add_named_vector_params(
            DENSE_VECTOR_NAME,
            VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
        );

        let mut sparse_config = SparseVectorsConfigBuilder::default();
        sparse_config
            .add_named_vector_params(SPARSE_VECTOR_NAME, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors_config)
                    .sparse_vectors_config(sparse_config),
            )
            .await
            .map_err(|e| {
                GranaryError::VectorStore(format!("failed to create hybrid collection: {e}"))
            })?;

        Ok(())
    }

    async fn delete_collection(&self, tenant_id: &str) -> Result<()> {
        let name = collection_name(tenant_id);

        self.client
            .delete_collection(name)
            .await
            .map_err(|e| GranaryError::VectorStore(format!("failed to delete collection: {e}")))?;

        Ok(())
    }

    async fn collection_exists(&self, tenant_id: &str) -> Result<bool> {
        let name = collection_name(tenant_id);

        self.client.collection_exists(name).await.map_err(|e| {
            GranaryError::VectorStore(format!("failed to check collection existence: {e}"))
        })
    }

    async fn upsert(&self, tenant_id: &str, chunks: Vec<VectorChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let name = collection_name(tenant_id);
        let points: Vec<PointStruct> = chunks.into_iter().map(Self::chunk_to_point).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points))
            .await
            .map_err(|e| GranaryError::VectorStore(format!("failed to upsert points: {e}")))?;

        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        vector: Vec<f32>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let name = collection_name(tenant_id);

        let response = self
            .client
            .query(
                QueryPointsBuilder::new(name)
                    .query(Query::new_nearest(vector))
                    .limit(top_k as u64)
                    .score_threshold(min_score)
                    .with_payload(true),
            )
            .await
            .map_err(|e| GranaryError::VectorStore(format!("failed to search: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .map(Self::point_to_result)
            .collect())
    }

    async fn hybrid_search(
        &self,
        tenant_id: &str,
        dense_vector: Vec<f32>,
        sparse_vector: Option<&SparseVector>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let name = collection_name(tenant_id);

        // Oversized prefetch lists give the fusion something to rank.
        let prefetch_limit = (top_k * 2) as u64;

        let mut builder = QueryPointsBuilder::new(name).add_prefetch(
            PrefetchQueryBuilder::default()
                .query(Query::new_nearest(dense_vector))
                .using(DENSE_VECTOR_NAME)
                .limit(prefetch_limit),
        );

        if let Some(sparse) = sparse_vector.filter(|s| !s.indices.is_empty()) {
            builder = builder.add_prefetch(
                PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(VectorInput::new_sparse(
                        sparse.indices.clone(),
                        sparse.values.clone(),
                    )))
                    .using(SPARSE_VECTOR_NAME)
                    .limit(prefetch_limit),
            );
        }

        let response = self
            .client
            .query(
                builder
                    .query(Query::new_fusion(Fusion::Rrf))
                    .limit(top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| GranaryError::VectorStore(format!("failed to hybrid search: {e}")))?;

        // RRF scores are not cosine similarities; the engine-side threshold
        // does not apply to fused queries, so filter here.
        Ok(response
            .result
            .into_iter()
            .map(Self::point_to_result)
            .filter(|result| result.score >= min_score)
            .collect())
    }

    async fn delete_by_document(&self, tenant_id: &str, document_id: &str) -> Result<()> {
        let name = collection_name(tenant_id);

        self.client
            .delete_points(
                DeletePointsBuilder::new(name)
                    .points(Filter::must([Condition::matches(
                        "document_id",
                        document_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(|e| {
                GranaryError::VectorStore(format!("failed to delete by document ID: {e}"))
            })?;

        Ok(())
    }

    async fn delete_by_ids(&self, tenant_id: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let name = collection_name(tenant_id);
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(name)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(|e| GranaryError::VectorStore(format!("failed to delete by IDs: {e}")))?;

        Ok(())
    }
}
