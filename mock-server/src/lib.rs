//! In-memory pets API used as the fixture server for the client's
//! integration tests.
//!
//! Besides plain CRUD it exposes endpoints that reflect the request back
//! (`/api/echo`, `/api/upload`) so tests can check exactly what the client
//! put on the wire, plus binary, streamed, authenticated and failing
//! endpoints.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Size of the chunks `/api/pets/stream` writes its body in.
const STREAM_CHUNK: usize = 16;

const FILES: &[(&str, &str, &[u8])] = &[
    ("report.pdf", "application/pdf", b"%PDF-1.4 not really a pdf"),
    ("logo.png", "image/png", &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetStatus {
    #[default]
    Available,
    Pending,
    Sold,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub status: PetStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPet {
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub status: PetStatus,
}

/// Error body returned by the API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    pub status: u16,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<PetStatus>,
    pub limit: Option<usize>,
}

/// What `/api/echo` saw.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// One part received by `/api/upload`.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    pub text: Option<String>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Pet>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/api/pets", get(list_pets).post(create_pet))
        .route("/api/pets/stream", get(stream_pets))
        .route("/api/pets/{id}", get(get_pet).delete(delete_pet))
        .route("/api/echo", get(echo).post(echo_body))
        .route("/api/upload", post(upload))
        .route("/api/files/{name}", get(download))
        .route("/api/secure", get(secure))
        .route("/api/fail", get(fail))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn problem(status: StatusCode, title: &str) -> (StatusCode, Json<Problem>) {
    (
        status,
        Json(Problem {
            title: title.to_string(),
            status: status.as_u16(),
        }),
    )
}

async fn sorted_pets(db: &Db) -> Vec<Pet> {
    let mut pets: Vec<Pet> = db.read().await.values().cloned().collect();
    pets.sort_by(|a, b| a.name.cmp(&b.name));
    pets
}

async fn list_pets(State(db): State<Db>, Query(params): Query<ListParams>) -> Json<Vec<Pet>> {
    let pets = sorted_pets(&db)
        .await
        .into_iter()
        .filter(|pet| params.status.map_or(true, |status| pet.status == status))
        .take(params.limit.unwrap_or(usize::MAX))
        .collect();
    Json(pets)
}

async fn create_pet(State(db): State<Db>, Json(input): Json<NewPet>) -> (StatusCode, Json<Pet>) {
    let pet = Pet {
        id: Uuid::new_v4(),
        name: input.name,
        tag: input.tag,
        status: input.status,
    };
    tracing::info!(id = %pet.id, name = %pet.name, "created pet");
    db.write().await.insert(pet.id, pet.clone());
    (StatusCode::CREATED, Json(pet))
}

async fn get_pet(State(db): State<Db>, Path(id): Path<Uuid>) -> Response {
    match db.read().await.get(&id) {
        Some(pet) => Json(pet.clone()).into_response(),
        None => problem(StatusCode::NOT_FOUND, "pet not found").into_response(),
    }
}

async fn delete_pet(State(db): State<Db>, Path(id): Path<Uuid>) -> Response {
    match db.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => problem(StatusCode::NOT_FOUND, "pet not found").into_response(),
    }
}

/// All pets as one JSON array, written in small chunks.
async fn stream_pets(State(db): State<Db>) -> Response {
    let pets = sorted_pets(&db).await;
    let json = match serde_json::to_vec(&pets) {
        Ok(json) => json,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    };
    let chunks: Vec<Result<Bytes, std::io::Error>> = json
        .chunks(STREAM_CHUNK)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream::iter(chunks)),
    )
        .into_response()
}

async fn echo(RawQuery(query): RawQuery, headers: HeaderMap) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(Echo { query, headers })
}

/// Send the request body back with the same content type.
async fn echo_body(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn upload(mut multipart: Multipart) -> Response {
    let mut parts = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return err.into_response(),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return err.into_response(),
        };
        parts.push(UploadedPart {
            name,
            file_name,
            content_type,
            size: bytes.len(),
            text: String::from_utf8(bytes.to_vec()).ok(),
        });
    }
    Json(parts).into_response()
}

async fn download(Path(name): Path<String>) -> Response {
    match FILES.iter().find(|(file, _, _)| *file == name) {
        Some((file, content_type, content)) => (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file}\"")),
            ],
            *content,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "file not found").into_response(),
    }
}

async fn secure(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer ") && value.len() > "Bearer ".len());
    if authorized {
        Json(serde_json::json!({ "authorized": true })).into_response()
    } else {
        problem(StatusCode::UNAUTHORIZED, "missing bearer token").into_response()
    }
}

async fn fail() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}
