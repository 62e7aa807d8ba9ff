use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use evalgate_axum::{Authenticated, BearerToken};
use evalgate_provider::{
    dto::{Credentials, NewUser, RefreshRequest},
    ProviderClient,
};
use serde_json::{json, Value};

use crate::{ApiError, AppState};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

async fn register(
    State(provider): State<ProviderClient>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(user) = body?;
    Ok(Json(provider.register_user(user).await?))
}

async fn login(
    State(provider): State<ProviderClient>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(credentials) = body?;
    Ok(Json(provider.login(&credentials).await?))
}

async fn refresh(
    State(provider): State<ProviderClient>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    Ok(Json(provider.refresh(&body).await?))
}

async fn me(
    Authenticated { identity, token }: Authenticated,
    State(provider): State<ProviderClient>,
) -> Json<Value> {
    match provider.me(&token).await {
        Ok(user) => Json(user),
        Err(err) => {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "identity provider lookup failed; answering from local user");

            let user = identity.user;
            Json(json!({
                "id": user.id,
                "username": user.username,
                "full_name": user.full_name,
                "roles": user.role_list(),
            }))
        }
    }
}

async fn logout(
    BearerToken(token): BearerToken,
    State(provider): State<ProviderClient>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    Ok(Json(provider.logout(&body, token.as_deref()).await?))
}
