use std::convert::Infallible;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::gateway::{ActivityGateway, GatewayError};
use crate::record::{lenient_string, ActivityFields, ActivityRecord};

const BODY_LIMIT: u64 = 1024 * 16;

pub const CREATED: &str = "Activity added successfully";
pub const UPDATED: &str = "Activity updated successfully";
pub const DELETED: &str = "Activity deleted successfully";

const CREATE_FAILED: &str = "Server error while adding the activity";
const UPDATE_FAILED: &str = "Server error while updating the activity";
const DELETE_FAILED: &str = "Server error while deleting the activity";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRequest {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRequest {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(flatten)]
    pub fields: ActivityFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsReply {
    pub message: String,
    pub records: Vec<ActivityRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReply {
    pub message: String,
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

fn with_gateway(
    gateway: ActivityGateway,
) -> impl Filter<Extract = (ActivityGateway,), Error = Infallible> + Clone {
    warp::any().map(move || gateway.clone())
}

/// Every route, with JSON rejections and CORS.
pub fn routes(
    gateway: ActivityGateway,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    login(gateway.clone())
        .or(create_activity(gateway.clone()))
        .or(update_activity(gateway.clone()))
        .or(delete_activity(gateway))
        .recover(handle_rejection)
        .with(cors())
}

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
}

// Filters
pub fn login(gateway: ActivityGateway) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_gateway(gateway))
        .and_then(login_handler)
}

pub fn create_activity(
    gateway: ActivityGateway,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "activities")
        .and(warp::post())
        .and(json_body())
        .and(with_gateway(gateway))
        .and_then(create_activity_handler)
}

pub fn update_activity(
    gateway: ActivityGateway,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "activities" / u32)
        .and(warp::put())
        .and(json_body())
        .and(with_gateway(gateway))
        .and_then(update_activity_handler)
}

pub fn delete_activity(
    gateway: ActivityGateway,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "activities" / u32)
        .and(warp::delete())
        .and(json_body())
        .and(with_gateway(gateway))
        .and_then(delete_activity_handler)
}

// Handlers
#[tracing::instrument(
    name = "login",
    skip(request, gateway),
    fields(request_id = %Uuid::new_v4(), employee_id = %request.id)
)]
async fn login_handler(
    request: EmployeeRequest,
    gateway: ActivityGateway,
) -> Result<Response, Infallible> {
    match gateway.authenticate(&request.id).await {
        Ok(login) => Ok(warp::reply::json(&login).into_response()),
        Err(e) => {
            error!(error = %e, "login failed");
            Ok(message(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

#[tracing::instrument(
    name = "create activity",
    skip(request, gateway),
    fields(request_id = %Uuid::new_v4(), employee_id = %request.id)
)]
async fn create_activity_handler(
    request: ActivityRequest,
    gateway: ActivityGateway,
) -> Result<Response, Infallible> {
    match gateway.create_record(&request.id, request.fields).await {
        Ok(records) => Ok(records_reply(CREATED, records, StatusCode::CREATED)),
        Err(e) => Ok(failure(e, CREATE_FAILED)),
    }
}

#[tracing::instrument(
    name = "update activity",
    skip(request, gateway),
    fields(request_id = %Uuid::new_v4(), employee_id = %request.id)
)]
async fn update_activity_handler(
    row: u32,
    request: ActivityRequest,
    gateway: ActivityGateway,
) -> Result<Response, Infallible> {
    match gateway.update_record(&request.id, row, request.fields).await {
        Ok(records) => Ok(records_reply(UPDATED, records, StatusCode::OK)),
        Err(e) => Ok(failure(e, UPDATE_FAILED)),
    }
}

#[tracing::instrument(
    name = "delete activity",
    skip(request, gateway),
    fields(request_id = %Uuid::new_v4(), employee_id = %request.id)
)]
async fn delete_activity_handler(
    row: u32,
    request: EmployeeRequest,
    gateway: ActivityGateway,
) -> Result<Response, Infallible> {
    match gateway.delete_record(&request.id, row).await {
        Ok(records) => Ok(records_reply(DELETED, records, StatusCode::OK)),
        Err(e) => Ok(failure(e, DELETE_FAILED)),
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (text, status) = if err.is_not_found() {
        ("Not found".to_string(), StatusCode::NOT_FOUND)
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (e.to_string(), StatusCode::BAD_REQUEST)
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ("Request body too large".to_string(), StatusCode::PAYLOAD_TOO_LARGE)
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        ("Content-Length required".to_string(), StatusCode::LENGTH_REQUIRED)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("Method not allowed".to_string(), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        error!(rejection = ?err, "unhandled rejection");
        ("Malformed request".to_string(), StatusCode::BAD_REQUEST)
    };

    Ok(message(text, status))
}

fn records_reply(text: &str, records: Vec<ActivityRecord>, status: StatusCode) -> Response {
    let body = RecordsReply {
        message: text.to_string(),
        records,
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn message(text: String, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(&MessageReply { message: text }), status)
        .into_response()
}

/// Missing tables and bad rows are reported as such, anything else as a
/// generic server error.
fn failure(err: GatewayError, fallback: &str) -> Response {
    error!(error = %err, "request failed");
    match err {
        GatewayError::TableNotFound(_) => message(err.to_string(), StatusCode::NOT_FOUND),
        GatewayError::InvalidRow(_) => message(err.to_string(), StatusCode::BAD_REQUEST),
        _ => message(fallback.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}
