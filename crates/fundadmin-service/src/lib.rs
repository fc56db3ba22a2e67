#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use fundadmin_adapters::seed_demo_data;
use fundadmin_core::{
    Actor, ContractMetadataRequest, ContractService, ContractStatusRequest, ContractView,
    FinancialsRequest, FundError, InvestmentService, InvestmentView, NewContractRequest,
    NewInvestmentRequest, NewStructureRequest, RegisterUserRequest, Role, StoreConfig,
    StructureFilter, StructureService, StructureView, UpdateProfileRequest,
    UpdateStructureRequest, UserDeletionOutcome, UserService, UserStatusRequest, UserView,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    /// Seed the deterministic demo dataset after bootstrap (dev only).
    pub seed_demo: bool,
}

#[derive(Clone)]
pub struct ServiceState {
    pub users: Arc<UserService>,
    pub structures: Arc<StructureService>,
    pub investments: Arc<InvestmentService>,
    pub contracts: Arc<ContractService>,
    store_label: &'static str,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, FundError> {
        let store_label = config.store.label();
        let store = config.store.bootstrap().await?;
        if config.seed_demo {
            seed_demo_data(store.as_ref()).await?;
        }

        Ok(Self {
            users: Arc::new(UserService::new(store.clone())),
            structures: Arc::new(StructureService::new(store.clone())),
            investments: Arc::new(InvestmentService::new(store.clone())),
            contracts: Arc::new(ContractService::new(store)),
            store_label,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/users", post(register_user).get(list_users))
        .route(
            "/v1/users/:id",
            get(get_user).patch(update_profile).delete(delete_user),
        )
        .route("/v1/users/:id/status", post(set_user_status))
        .route("/v1/structures", post(create_structure).get(list_structures))
        .route("/v1/structures/roots", get(find_roots))
        .route(
            "/v1/structures/:id",
            get(get_structure)
                .patch(update_structure)
                .delete(delete_structure),
        )
        .route("/v1/structures/:id/financials", put(update_financials))
        .route("/v1/structures/:id/children", get(find_children))
        .route("/v1/structures/:id/investments", get(list_investments))
        .route("/v1/structures/:id/contracts", get(list_contracts))
        .route("/v1/investments", post(record_investment))
        .route("/v1/investments/:id", axum::routing::delete(delete_investment))
        .route("/v1/contracts", post(create_contract))
        .route(
            "/v1/contracts/:id",
            get(get_contract)
                .patch(update_contract_metadata)
                .delete(delete_contract),
        )
        .route("/v1/contracts/:id/status", post(transition_contract))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] FundError),
}

impl ApiError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

/// Maps every error kind to exactly one transport status. The route layer
/// never branches on message content.
fn status_for(error: &FundError) -> StatusCode {
    match error {
        FundError::NotFound(_) => StatusCode::NOT_FOUND,
        FundError::Validation(_) | FundError::InvalidHierarchy(_) => StatusCode::BAD_REQUEST,
        FundError::InvalidTransition(_) => StatusCode::CONFLICT,
        FundError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
        FundError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Http { status, message } => (status, message),
            ApiError::Core(err) => (status_for(&err), err.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Builds the validated Actor from the identity the auth/session layer
/// resolved upstream. Both header shapes are unified here; the domain core
/// never inspects raw request objects.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing x-actor-id header"))?;
    let role = headers
        .get("x-actor-role")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing x-actor-role header"))?;
    let role: Role = role.parse().map_err(ApiError::Core)?;
    Ok(Actor::new(id, role))
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "fundadmin-service",
        store_backend: state.store_label,
    })
}

async fn register_user(
    State(state): State<ServiceState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let user = state.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.users.list_users(&actor).await?))
}

async fn get_user(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.users.get_profile(&actor, &id).await?))
}

async fn update_profile(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.users.update_profile(&actor, &id, request).await?))
}

async fn set_user_status(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UserStatusRequest>,
) -> Result<Json<UserView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.users.set_status(&actor, &id, request).await?))
}

async fn delete_user(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserDeletionOutcome>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.users.delete_user(&actor, &id).await?))
}

async fn create_structure(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<NewStructureRequest>,
) -> Result<(StatusCode, Json<StructureView>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let structure = state.structures.create_structure(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(structure)))
}

async fn list_structures(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(filter): Query<StructureFilter>,
) -> Result<Json<Vec<StructureView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.structures.list_structures(&actor, filter).await?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootsQuery {
    created_by: String,
}

async fn find_roots(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<RootsQuery>,
) -> Result<Json<Vec<StructureView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(
        state.structures.find_roots(&actor, &query.created_by).await?,
    ))
}

async fn get_structure(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StructureView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.structures.read_structure(&actor, &id).await?))
}

async fn update_structure(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateStructureRequest>,
) -> Result<Json<StructureView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(
        state.structures.update_structure(&actor, &id, request).await?,
    ))
}

async fn update_financials(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<FinancialsRequest>,
) -> Result<Json<StructureView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(
        state.structures.update_financials(&actor, &id, request).await?,
    ))
}

async fn delete_structure(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.structures.delete_structure(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_children(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<StructureView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.structures.find_children(&actor, &id).await?))
}

async fn record_investment(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<NewInvestmentRequest>,
) -> Result<(StatusCode, Json<InvestmentView>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let investment = state.investments.record(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(investment)))
}

async fn list_investments(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<InvestmentView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.investments.list_for_structure(&actor, &id).await?))
}

async fn delete_investment(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.investments.remove(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_contract(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<NewContractRequest>,
) -> Result<(StatusCode, Json<ContractView>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let contract = state.contracts.create_contract(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

async fn get_contract(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ContractView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.contracts.get_contract(&actor, &id).await?))
}

async fn list_contracts(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<ContractView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.contracts.list_for_structure(&actor, &id).await?))
}

async fn update_contract_metadata(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ContractMetadataRequest>,
) -> Result<Json<ContractView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.contracts.update_metadata(&actor, &id, request).await?))
}

async fn transition_contract(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ContractStatusRequest>,
) -> Result<Json<ContractView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.contracts.transition(&actor, &id, request).await?))
}

async fn delete_contract(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.contracts.delete_contract(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn demo_app() -> Router {
        let state = ServiceState::bootstrap(ServiceConfig {
            store: StoreConfig::Memory,
            seed_demo: true,
        })
        .await
        .unwrap();
        build_router(state)
    }

    fn request(method: &str, uri: &str, actor: Option<(&str, &str)>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = actor {
            builder = builder.header("x-actor-id", id).header("x-actor-role", role);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn structure_read_decorates_camel_case_aggregates() {
        let app = demo_app().await;
        let response = app
            .oneshot(request(
                "GET",
                "/v1/structures/structure-fund-1",
                Some(("user-admin", "admin")),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.get("currentInvestors").unwrap(), 2);
        assert_eq!(body.get("currentInvestments").unwrap(), 3);
        assert_eq!(body.get("baseCurrency").unwrap(), "USD");
    }

    #[tokio::test]
    async fn missing_actor_header_is_unauthorized() {
        let app = demo_app().await;
        let response = app
            .oneshot(request("GET", "/v1/structures/structure-fund-1", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn error_kinds_map_to_deterministic_statuses() {
        let app = demo_app().await;

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                "/v1/structures/structure-missing",
                Some(("user-admin", "admin")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/structures",
                Some(("user-lp-1", "investor")),
                Some(serde_json::json!({
                    "name": "Side Fund",
                    "structureType": "fund",
                    "baseCurrency": "USD"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request(
                "POST",
                "/v1/structures",
                Some(("user-admin", "admin")),
                Some(serde_json::json!({
                    "name": "Side Fund",
                    "structureType": "fund",
                    "baseCurrency": "USD",
                    "parentId": "structure-missing"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn contract_lifecycle_over_http_ends_in_a_terminal_conflict() {
        let app = demo_app().await;
        let admin = Some(("user-admin", "admin"));

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/contracts/contract-1/status",
                admin,
                Some(serde_json::json!({ "status": "deploying" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/contracts/contract-1/status",
                admin,
                Some(serde_json::json!({
                    "status": "deployed",
                    "contractAddress": "0xABCD",
                    "transactionHash": "0xf00d",
                    "blockNumber": 18204511
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.get("status").unwrap(), "deployed");
        assert_eq!(body.get("contractAddress").unwrap(), "0xABCD");
        assert!(body.get("errorMessage").unwrap().is_null());

        let response = app
            .oneshot(request(
                "POST",
                "/v1/contracts/contract-1/status",
                admin,
                Some(serde_json::json!({ "status": "deploying" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn registration_and_root_only_listing() {
        let app = demo_app().await;

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/users",
                None,
                Some(serde_json::json!({
                    "email": "lp3@fund.example",
                    "displayName": "Limited Partner Three",
                    "role": "investor"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(request("GET", "/v1/users", Some(("user-admin", "admin")), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request("GET", "/v1/users", Some(("user-root", "root")), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 5);
    }
}
