use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::error::CareError;
use crate::models::{
    ClinicalEntryDraft, ClinicalEntryPatch, PatientDraft, PatientUpdate, UserDraft, UserUpdate,
};
use crate::patients::PatientService;
use crate::users::UserService;

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
}

impl ApiResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

pub struct RestApi {
    patients: Arc<PatientService>,
    users: Arc<UserService>,
    max_body_bytes: u64,
}

impl RestApi {
    pub fn new(
        patients: Arc<PatientService>,
        users: Arc<UserService>,
        max_body_bytes: u64,
    ) -> Self {
        RestApi {
            patients,
            users,
            max_body_bytes,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        self.patient_routes()
            .or(self.clinical_routes())
            .unify()
            .or(self.user_routes())
            .unify()
            .recover(handle_rejection)
            .with(warp::trace::request())
    }

    fn patient_routes(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        // Must come before the `{id}` route, which would otherwise take "critical" as an id.
        let critical = warp::path!("api" / "patients" / "critical")
            .and(warp::get())
            .and(with_service(&self.patients))
            .and_then(find_critical);

        let list = warp::path!("api" / "patients")
            .and(warp::get())
            .and(with_service(&self.patients))
            .and_then(list_patients);

        let create = warp::path!("api" / "patients")
            .and(warp::post())
            .and(json_body(self.max_body_bytes))
            .and(with_service(&self.patients))
            .and_then(create_patient);

        let get = warp::path!("api" / "patients" / String)
            .and(warp::get())
            .and(with_service(&self.patients))
            .and_then(get_patient);

        let update = warp::path!("api" / "patients" / String)
            .and(warp::put())
            .and(json_body(self.max_body_bytes))
            .and(with_service(&self.patients))
            .and_then(update_patient);

        let delete = warp::path!("api" / "patients" / String)
            .and(warp::delete())
            .and(with_service(&self.patients))
            .and_then(delete_patient);

        critical
            .or(list)
            .unify()
            .or(create)
            .unify()
            .or(get)
            .unify()
            .or(update)
            .unify()
            .or(delete)
            .unify()
    }

    fn clinical_routes(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        let append = warp::path!("api" / "patients" / String / "clinical")
            .and(warp::post())
            .and(json_body(self.max_body_bytes))
            .and(with_service(&self.patients))
            .and_then(append_entry);

        let get = warp::path!("api" / "patients" / String / "clinical" / String)
            .and(warp::get())
            .and(with_service(&self.patients))
            .and_then(get_entry);

        let update = warp::path!("api" / "patients" / String / "clinical" / String)
            .and(warp::put())
            .and(json_body(self.max_body_bytes))
            .and(with_service(&self.patients))
            .and_then(update_entry);

        let delete = warp::path!("api" / "patients" / String / "clinical" / String)
            .and(warp::delete())
            .and(with_service(&self.patients))
            .and_then(delete_entry);

        append.or(get).unify().or(update).unify().or(delete).unify()
    }

    fn user_routes(&self) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
        let list = warp::path!("api" / "users")
            .and(warp::get())
            .and(with_service(&self.users))
            .and_then(list_users);

        let create = warp::path!("api" / "users")
            .and(warp::post())
            .and(json_body(self.max_body_bytes))
            .and(with_service(&self.users))
            .and_then(create_user);

        let get = warp::path!("api" / "users" / String)
            .and(warp::get())
            .and(with_service(&self.users))
            .and_then(get_user);

        let update = warp::path!("api" / "users" / String)
            .and(warp::put())
            .and(json_body(self.max_body_bytes))
            .and(with_service(&self.users))
            .and_then(update_user);

        let delete = warp::path!("api" / "users" / String)
            .and(warp::delete())
            .and(with_service(&self.users))
            .and_then(delete_user);

        list.or(create)
            .unify()
            .or(get)
            .unify()
            .or(update)
            .unify()
            .or(delete)
            .unify()
    }
}

fn with_service<S: Send + Sync + 'static>(
    service: &Arc<S>,
) -> impl Filter<Extract = (Arc<S>,), Error = Infallible> + Clone {
    let service = Arc::clone(service);
    warp::any().map(move || Arc::clone(&service))
}

#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// Raw request body capped at `limit` bytes. A declared `Content-Length` is
/// checked up front; chunked bodies are checked once read.
fn json_body(limit: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(move |declared: Option<u64>| async move {
            match declared {
                Some(len) if len > limit => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok::<_, Rejection>(()),
            }
        })
        .untuple_one()
        .and(warp::body::bytes())
        .and_then(move |body: Bytes| async move {
            if body.len() as u64 > limit {
                Err(warp::reject::custom(BodyTooLarge))
            } else {
                Ok::<_, Rejection>(body)
            }
        })
}

// Patients

async fn find_critical(patients: Arc<PatientService>) -> Result<Response, Infallible> {
    Ok(respond(StatusCode::OK, patients.find_critical().await))
}

async fn list_patients(patients: Arc<PatientService>) -> Result<Response, Infallible> {
    Ok(respond(StatusCode::OK, patients.fetch_all().await))
}

async fn create_patient(
    body: Bytes,
    patients: Arc<PatientService>,
) -> Result<Response, Infallible> {
    let result = match decode::<PatientDraft>(&body) {
        Ok(draft) => patients.create(draft).await,
        Err(e) => Err(e),
    };
    Ok(respond(StatusCode::CREATED, result))
}

async fn get_patient(id: String, patients: Arc<PatientService>) -> Result<Response, Infallible> {
    let result = match parse_id("patients", &id) {
        Ok(id) => patients.fetch_by_id(id).await,
        Err(e) => Err(e),
    };
    Ok(respond(StatusCode::OK, result))
}

async fn update_patient(
    id: String,
    body: Bytes,
    patients: Arc<PatientService>,
) -> Result<Response, Infallible> {
    let result = async {
        let id = parse_id("patients", &id)?;
        let update = decode::<PatientUpdate>(&body)?;
        patients.update(id, update).await
    }
    .await;
    Ok(respond(StatusCode::OK, result))
}

async fn delete_patient(id: String, patients: Arc<PatientService>) -> Result<Response, Infallible> {
    let result = match parse_id("patients", &id) {
        Ok(id) => patients.delete(id).await,
        Err(e) => Err(e),
    };
    Ok(no_content(result))
}

// Clinical entries

async fn append_entry(
    id: String,
    body: Bytes,
    patients: Arc<PatientService>,
) -> Result<Response, Infallible> {
    let result = async {
        let id = parse_id("patients", &id)?;
        let draft = decode::<ClinicalEntryDraft>(&body)?;
        patients.clinical().append(id, draft).await
    }
    .await;
    Ok(respond(StatusCode::OK, result))
}

async fn get_entry(
    id: String,
    index: String,
    patients: Arc<PatientService>,
) -> Result<Response, Infallible> {
    let result = async {
        let id = parse_id("patients", &id)?;
        let index = parse_index(&index)?;
        patients.clinical().fetch_by_index(id, index).await
    }
    .await;
    Ok(respond(StatusCode::OK, result))
}

async fn update_entry(
    id: String,
    index: String,
    body: Bytes,
    patients: Arc<PatientService>,
) -> Result<Response, Infallible> {
    let result = async {
        let id = parse_id("patients", &id)?;
        let index = parse_index(&index)?;
        let patch = decode::<ClinicalEntryPatch>(&body)?;
        patients.clinical().update_by_index(id, index, patch).await
    }
    .await;
    Ok(respond(StatusCode::OK, result))
}

async fn delete_entry(
    id: String,
    index: String,
    patients: Arc<PatientService>,
) -> Result<Response, Infallible> {
    let result = async {
        let id = parse_id("patients", &id)?;
        let index = parse_index(&index)?;
        patients.clinical().delete_by_index(id, index).await
    }
    .await;
    Ok(respond(StatusCode::OK, result))
}

// Users

async fn list_users(users: Arc<UserService>) -> Result<Response, Infallible> {
    Ok(respond(StatusCode::OK, users.fetch_all().await))
}

async fn create_user(body: Bytes, users: Arc<UserService>) -> Result<Response, Infallible> {
    let result = match decode::<UserDraft>(&body) {
        Ok(draft) => users.create(draft).await,
        Err(e) => Err(e),
    };
    Ok(respond(StatusCode::CREATED, result))
}

async fn get_user(id: String, users: Arc<UserService>) -> Result<Response, Infallible> {
    let result = match parse_id("users", &id) {
        Ok(id) => users.fetch_by_id(id).await,
        Err(e) => Err(e),
    };
    Ok(respond(StatusCode::OK, result))
}

async fn update_user(
    id: String,
    body: Bytes,
    users: Arc<UserService>,
) -> Result<Response, Infallible> {
    let result = async {
        let id = parse_id("users", &id)?;
        let update = decode::<UserUpdate>(&body)?;
        users.update(id, update).await
    }
    .await;
    Ok(respond(StatusCode::OK, result))
}

async fn delete_user(id: String, users: Arc<UserService>) -> Result<Response, Infallible> {
    let result = match parse_id("users", &id) {
        Ok(id) => users.delete(id).await,
        Err(e) => Err(e),
    };
    Ok(no_content(result))
}

// Helpers

/// A malformed id cannot name a record, so it reads as "not found".
fn parse_id(collection: &str, raw: &str) -> Result<Uuid, CareError> {
    Uuid::parse_str(raw)
        .map_err(|_| CareError::NotFound(format!("no {} record with id {}", collection, raw)))
}

fn parse_index(raw: &str) -> Result<i64, CareError> {
    raw.parse::<i64>()
        .map_err(|_| CareError::Validation(format!("clinical index {} is not an integer", raw)))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, CareError> {
    serde_json::from_slice(body)
        .map_err(|e| CareError::Validation(format!("invalid request body: {}", e)))
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, CareError>) -> Response {
    match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), status).into_response(),
        Err(err) => error_response(&err),
    }
}

fn no_content(result: Result<(), CareError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &CareError) -> Response {
    match err {
        CareError::StoreUnavailable(detail) => error!(%detail, "request failed in storage"),
        other => debug!(error = %other, "request rejected"),
    }
    let body = ApiResponse::error(err.public_message());
    warp::reply::with_status(warp::reply::json(&body), err.status_code()).into_response()
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Resource not found")
    } else if err.find::<BodyTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::reject::InvalidHeader>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request header")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    let body = ApiResponse::error(message);
    Ok(warp::reply::with_status(warp::reply::json(&body), code).into_response())
}
