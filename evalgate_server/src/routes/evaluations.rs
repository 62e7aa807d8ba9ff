use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use evalgate::{access, AuthenticatedIdentity};
use evalgate_axum::{AdminOnly, Authenticated};
use serde::Deserialize;

use crate::{
    evaluations::{
        Cursor, Evaluation, EvaluationRepository, EvaluationUpdate, NewEvaluation, Page,
        DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    },
    ApiError, AppState,
};

type Repository = Arc<dyn EvaluationRepository>;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/evaluations", get(list).post(create))
        .route("/evaluations/:id", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    cursor: Option<String>,
    limit: Option<i64>,
}

impl ListParams {
    fn limit(&self) -> Result<usize, ApiError> {
        match self.limit {
            None => Ok(DEFAULT_PAGE_SIZE),
            Some(limit) => usize::try_from(limit)
                .ok()
                .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
                .ok_or_else(|| {
                    ApiError::Validation(format!("limit: must be between 1 and {MAX_PAGE_SIZE}"))
                }),
        }
    }

    fn after(&self) -> Result<Option<u64>, ApiError> {
        match self.cursor.as_deref() {
            None | Some("") => Ok(None),
            Some(encoded) => Ok(Some(Cursor::decode(encoded)?.0)),
        }
    }
}

async fn create(
    Authenticated { identity, .. }: Authenticated,
    State(evaluations): State<Repository>,
    body: Result<Json<NewEvaluation>, JsonRejection>,
) -> Result<(StatusCode, Json<Evaluation>), ApiError> {
    let Json(body) = body?;
    let fields = body.validate()?;

    let evaluation = evaluations.insert(identity.user.id, fields).await?;
    tracing::info!(evaluation.id = evaluation.id, "evaluation created");

    Ok((StatusCode::CREATED, Json(evaluation)))
}

async fn list(
    Authenticated { identity, .. }: Authenticated,
    State(evaluations): State<Repository>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page>, ApiError> {
    let Query(params) = params?;
    let limit = params.limit()?;
    let after = params.after()?;

    let owner = (!access::is_admin(&identity)).then_some(&*identity.user.id);
    let items = evaluations.list_after(owner, after, limit + 1).await?;

    Ok(Json(Page::from_lookahead(items, limit)))
}

async fn find_accessible(
    evaluations: &Repository,
    identity: &AuthenticatedIdentity,
    id: u64,
) -> Result<Evaluation, ApiError> {
    let evaluation = evaluations.get(id).await?.ok_or(ApiError::NotFound)?;
    access::authorize_owner_or_admin(identity, &evaluation.owner_id)?;
    Ok(evaluation)
}

async fn fetch(
    Authenticated { identity, .. }: Authenticated,
    State(evaluations): State<Repository>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Evaluation>, ApiError> {
    let Path(id) = id?;
    Ok(Json(find_accessible(&evaluations, &identity, id).await?))
}

async fn update(
    Authenticated { identity, .. }: Authenticated,
    State(evaluations): State<Repository>,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<EvaluationUpdate>, JsonRejection>,
) -> Result<Json<Evaluation>, ApiError> {
    let Path(id) = id?;
    let Json(body) = body?;

    let mut fields = find_accessible(&evaluations, &identity, id).await?.fields;
    body.apply_to(&mut fields)?;

    let evaluation = evaluations.update(id, fields).await?;
    tracing::info!(evaluation.id = evaluation.id, "evaluation updated");

    Ok(Json(evaluation))
}

async fn remove(
    AdminOnly(_): AdminOnly,
    State(evaluations): State<Repository>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;

    if !evaluations.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(evaluation.id = id, "evaluation deleted");

    Ok(StatusCode::NO_CONTENT)
}
