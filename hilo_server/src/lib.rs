#![forbid(unsafe_code)]
//! HTTP endpoints over [`hilo::UserService`].
//!
//! All routes are `GET` with query-string parameters and answer in plain text.

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hilo::{CounterStore, Repository, ServiceError, User, UserService};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct IdParams {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct EmailParams {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    pub id: u64,
    pub email: String,
    pub name: String,
}

/// A failed request: what was being attempted, and why it failed.
#[derive(Debug)]
pub struct ApiError {
    action: &'static str,
    source: ServiceError,
}

impl ApiError {
    fn new(action: &'static str) -> impl FnOnce(ServiceError) -> Self {
        move |source| Self { action, source }
    }

    pub fn status(&self) -> StatusCode {
        match &self.source {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::UserNotFound { .. } | ServiceError::EmailNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Allocation(_) | ServiceError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(action = self.action, error = ?self.source, "request failed");
        } else {
            tracing::debug!(action = self.action, error = %self.source, "request rejected");
        }
        let body = match &self.source {
            ServiceError::EmailNotFound { .. } => "User not found".to_string(),
            other => format!("Error {}: {}", self.action, other),
        };
        (status, body).into_response()
    }
}

type Shared<R, C> = Arc<UserService<R, C>>;

/// Routes for the user endpoints plus a liveness probe.
pub fn router<R, C>(service: Shared<R, C>) -> Router
where
    R: Repository<User> + Send + Sync + 'static,
    C: CounterStore + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/create", get(create_user::<R, C>))
        .route("/delete", get(delete_user::<R, C>))
        .route("/get-by-email", get(get_by_email::<R, C>))
        .route("/update", get(update_user::<R, C>))
        .with_state(service)
}

// GET /create?email=..&name=..
async fn create_user<R, C>(
    State(svc): State<Shared<R, C>>,
    Query(p): Query<CreateParams>,
) -> Result<String, ApiError>
where
    R: Repository<User> + Send + Sync + 'static,
    C: CounterStore + Send + Sync + 'static,
{
    let id = svc
        .create(&p.email, &p.name)
        .await
        .map_err(ApiError::new("creating the user"))?;
    Ok(format!("User successfully created with id = {id}"))
}

// GET /delete?id=..
async fn delete_user<R, C>(
    State(svc): State<Shared<R, C>>,
    Query(p): Query<IdParams>,
) -> Result<String, ApiError>
where
    R: Repository<User> + Send + Sync + 'static,
    C: CounterStore + Send + Sync + 'static,
{
    svc.delete(p.id)
        .await
        .map_err(ApiError::new("deleting the user"))?;
    Ok("User successfully deleted!".to_string())
}

// GET /get-by-email?email=..
async fn get_by_email<R, C>(
    State(svc): State<Shared<R, C>>,
    Query(p): Query<EmailParams>,
) -> Result<String, ApiError>
where
    R: Repository<User> + Send + Sync + 'static,
    C: CounterStore + Send + Sync + 'static,
{
    let id = svc
        .get_by_email(&p.email)
        .await
        .map_err(ApiError::new("looking up the user"))?;
    Ok(format!("The user id is: {id}"))
}

// GET /update?id=..&email=..&name=..
async fn update_user<R, C>(
    State(svc): State<Shared<R, C>>,
    Query(p): Query<UpdateParams>,
) -> Result<String, ApiError>
where
    R: Repository<User> + Send + Sync + 'static,
    C: CounterStore + Send + Sync + 'static,
{
    svc.update(p.id, &p.email, &p.name)
        .await
        .map_err(ApiError::new("updating the user"))?;
    Ok("User successfully updated!".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilo::{AllocError, RepoError, ValidationError};

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (
                ServiceError::Validation(ValidationError { field: "name" }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::UserNotFound { id: 1 },
                StatusCode::NOT_FOUND,
            ),
            (ServiceError::Conflict { id: 1 }, StatusCode::CONFLICT),
            (
                ServiceError::Allocation(AllocError::Contended {
                    block: "users".into(),
                    attempts: 5,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::StoreUnavailable(RepoError::NotFound),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::new("testing")(err).status(), status);
        }
    }
}
