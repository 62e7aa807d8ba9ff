use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use async_trait::async_trait;
use evalgate::{UserId, UserIdRef};
use parking_lot::RwLock;
use thiserror::Error;
use time::OffsetDateTime;

use super::{Evaluation, EvaluationFields};

/// A failure in the evaluation store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The evaluation to update no longer exists
    #[error("evaluation {0} not found")]
    NotFound(u64),
    /// The backing store could not be reached
    #[error("evaluation store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for evaluations
#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    /// Stores a new evaluation, assigning its ID and timestamps
    async fn insert(
        &self,
        owner_id: UserId,
        fields: EvaluationFields,
    ) -> Result<Evaluation, StoreError>;

    /// Looks up an evaluation
    async fn get(&self, id: u64) -> Result<Option<Evaluation>, StoreError>;

    /// Up to `limit` evaluations with IDs greater than `after`, in ascending
    /// ID order, optionally restricted to those owned by `owner_id`
    async fn list_after(
        &self,
        owner_id: Option<&UserIdRef>,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Evaluation>, StoreError>;

    /// Replaces the fields of an existing evaluation, bumping `updated_at`
    async fn update(&self, id: u64, fields: EvaluationFields) -> Result<Evaluation, StoreError>;

    /// Removes an evaluation, returning whether it existed
    async fn delete(&self, id: u64) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T> EvaluationRepository for Arc<T>
where
    T: EvaluationRepository + ?Sized,
{
    async fn insert(
        &self,
        owner_id: UserId,
        fields: EvaluationFields,
    ) -> Result<Evaluation, StoreError> {
        T::insert(self, owner_id, fields).await
    }

    async fn get(&self, id: u64) -> Result<Option<Evaluation>, StoreError> {
        T::get(self, id).await
    }

    async fn list_after(
        &self,
        owner_id: Option<&UserIdRef>,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Evaluation>, StoreError> {
        T::list_after(self, owner_id, after, limit).await
    }

    async fn update(&self, id: u64, fields: EvaluationFields) -> Result<Evaluation, StoreError> {
        T::update(self, id, fields).await
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        T::delete(self, id).await
    }
}

#[derive(Debug, Default)]
struct Rows {
    last_id: u64,
    by_id: BTreeMap<u64, Evaluation>,
}

/// An [`EvaluationRepository`] held in process memory
#[derive(Debug, Default)]
pub struct InMemoryEvaluationRepository {
    rows: RwLock<Rows>,
}

impl InMemoryEvaluationRepository {
    /// Constructs an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvaluationRepository for InMemoryEvaluationRepository {
    async fn insert(
        &self,
        owner_id: UserId,
        fields: EvaluationFields,
    ) -> Result<Evaluation, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut rows = self.rows.write();
        rows.last_id += 1;

        let evaluation = Evaluation {
            id: rows.last_id,
            fields,
            owner_id,
            created_at: now,
            updated_at: now,
        };
        rows.by_id.insert(evaluation.id, evaluation.clone());

        Ok(evaluation)
    }

    async fn get(&self, id: u64) -> Result<Option<Evaluation>, StoreError> {
        Ok(self.rows.read().by_id.get(&id).cloned())
    }

    async fn list_after(
        &self,
        owner_id: Option<&UserIdRef>,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Evaluation>, StoreError> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let rows = self.rows.read();

        Ok(rows
            .by_id
            .range((lower, Bound::Unbounded))
            .map(|(_, e)| e)
            .filter(|e| {
                owner_id.map_or(true, |owner| e.owner_id.as_str() == owner.as_str())
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, id: u64, fields: EvaluationFields) -> Result<Evaluation, StoreError> {
        let mut rows = self.rows.write();
        let evaluation = rows.by_id.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        evaluation.fields = fields;
        evaluation.updated_at = OffsetDateTime::now_utc();

        Ok(evaluation.clone())
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        Ok(self.rows.write().by_id.remove(&id).is_some())
    }
}
