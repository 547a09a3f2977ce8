//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port and drives it through a
//! `RestClient` backed by the `reqwest` transport, so request building, the
//! handler pipeline and response parsing are checked over real HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::{Method, StatusCode};
use mock_server::{Echo, Pet, PetStatus, Problem, UploadedPart};
use rest_client::{
    AccessToken, AuthenticationHandler, BearerTokenProvider, CompletionOption, CredentialProvider, FormFile,
    ResponseContent, RestClient, RestClientOptions,
};
use serde_json::json;

async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    addr
}

fn options(addr: SocketAddr) -> RestClientOptions {
    RestClientOptions::new(format!("http://{addr}/").parse().unwrap())
}

async fn client() -> RestClient {
    RestClient::new(options(start_server().await)).unwrap()
}

async fn create_pet(client: &RestClient, body: serde_json::Value) -> Pet {
    let request = client
        .factory()
        .from_template("/api/pets")
        .with_body(&body)
        .unwrap()
        .build(Method::POST);
    client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Pet>(StatusCode::CREATED)
        .build_typed_response::<Pet>()
        .await
        .unwrap()
        .into_success_content()
        .unwrap()
}

// --- pets ---

#[tokio::test]
async fn pet_lifecycle() {
    let client = client().await;

    let rex = create_pet(&client, json!({ "name": "Rex", "tag": "dog" })).await;
    assert_eq!(rex.name, "Rex");
    assert_eq!(rex.status, PetStatus::Available);
    let tom = create_pet(&client, json!({ "name": "Tom", "status": "sold" })).await;

    // enum query values go out under their wire names
    let request = client
        .factory()
        .from_template("/api/pets")
        .with_query_parameter("status", &PetStatus::Sold)
        .unwrap()
        .with_query_parameter("limit", &None::<u32>)
        .unwrap()
        .build(Method::GET);
    let sold = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Vec<Pet>>(StatusCode::OK)
        .build_typed_response::<Vec<Pet>>()
        .await
        .unwrap();
    assert!(sold.is_success());
    assert_eq!(sold.success_content(), Some(&vec![tom.clone()]));

    let request = client
        .factory()
        .from_template("/api/pets/{id}")
        .with_path_parameter("id", &rex.id)
        .unwrap()
        .build(Method::GET);
    let fetched = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Pet>(StatusCode::OK)
        .add_error_response_as::<Problem>(StatusCode::NOT_FOUND)
        .build_result::<Pet, Problem>()
        .await
        .unwrap();
    assert_eq!(fetched.success_content(), Some(&rex));
    assert!(fetched.error_content().is_none());

    let request = client
        .factory()
        .from_template("/api/pets/{id}")
        .with_path_parameter("id", &rex.id)
        .unwrap()
        .build(Method::DELETE);
    let deleted = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response(StatusCode::NO_CONTENT)
        .build_response()
        .await
        .unwrap();
    assert!(deleted.is_success());
    assert!(deleted.content_object().is_empty());
}

#[tokio::test]
async fn missing_pet_yields_problem_as_error_content() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/pets/{id}")
        .with_path_parameter("id", &uuid::Uuid::nil())
        .unwrap()
        .build(Method::GET);
    let result = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Pet>(StatusCode::OK)
        .add_error_response_as::<Problem>(StatusCode::NOT_FOUND)
        .build_result::<Pet, Problem>()
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.status(), StatusCode::NOT_FOUND);
    match result.into_content() {
        ResponseContent::Error(Some(problem)) => {
            assert_eq!(problem.status, 404);
            assert_eq!(problem.title, "pet not found");
        }
        other => panic!("expected error content, got {other:?}"),
    }
}

#[tokio::test]
async fn streams_pets_item_by_item() {
    let client = client().await;
    for name in ["Alf", "Bo", "Cy"] {
        create_pet(&client, json!({ "name": name })).await;
    }

    let request = client
        .factory()
        .from_template("/api/pets/stream")
        .with_completion_option(CompletionOption::ResponseHeadersRead)
        .build(Method::GET);
    let mut response = client
        .execute(request)
        .await
        .unwrap()
        .build_streaming_endpoint_response::<Pet>()
        .await
        .unwrap();
    assert!(response.is_success());

    let pets: Vec<Option<Pet>> = response.content().unwrap().try_collect().await.unwrap();
    let names: Vec<String> = pets.into_iter().flatten().map(|pet| pet.name).collect();
    assert_eq!(names, ["Alf", "Bo", "Cy"]);
    response.close();
}

#[tokio::test]
async fn borrowed_stream_reads_the_same_items() {
    let client = client().await;
    create_pet(&client, json!({ "name": "Rex" })).await;

    let request = client
        .factory()
        .from_template("/api/pets/stream")
        .with_completion_option(CompletionOption::ResponseHeadersRead)
        .build(Method::GET);
    let mut builder = client.execute(request).await.unwrap();
    let pets: Vec<Option<Pet>> = builder.build_streaming_response::<Pet>().try_collect().await.unwrap();

    assert_eq!(pets.len(), 1);
    assert_eq!(pets[0].as_ref().map(|pet| pet.name.as_str()), Some("Rex"));
}

// --- parameters and bodies on the wire ---

#[tokio::test]
async fn query_arrays_and_headers_reach_the_server() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/echo")
        .with_query_parameter("tag", &["a b", "c"])
        .unwrap()
        .with_query_parameter("empty", &Vec::<String>::new())
        .unwrap()
        .with_header_parameter("X-Trace", &42)
        .unwrap()
        .build(Method::GET);
    let echo = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Echo>(StatusCode::OK)
        .build_typed_response::<Echo>()
        .await
        .unwrap()
        .into_success_content()
        .unwrap();

    assert_eq!(echo.query.as_deref(), Some("tag=a%20b&tag=c"));
    assert_eq!(echo.headers.get("x-trace").map(String::as_str), Some("42"));
    assert_eq!(echo.headers.get("accept").map(String::as_str), Some("application/json"));
}

#[tokio::test]
async fn binary_body_roundtrips_as_binary_content() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/echo")
        .with_binary_body(vec![1u8, 2, 3], Some("image/png"))
        .unwrap()
        .build(Method::POST);
    let response = client.execute(request).await.unwrap().build_response().await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.content(), "");
    assert_eq!(response.content_as::<Bytes>(), Some(&Bytes::from_static(&[1, 2, 3])));
    assert_eq!(response.content_as::<String>(), None);
    assert_eq!(response.headers()[http::header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn multipart_fields_and_files_upload() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/upload")
        .with_form_field("title", "report")
        .unwrap()
        .with_file(b"hello".to_vec(), "doc", "a.txt", Some("text/plain"))
        .unwrap()
        .build(Method::POST);
    let parts = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Vec<UploadedPart>>(StatusCode::OK)
        .build_typed_response::<Vec<UploadedPart>>()
        .await
        .unwrap()
        .into_success_content()
        .unwrap();

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "title");
    assert_eq!(parts[0].text.as_deref(), Some("report"));
    assert_eq!(parts[1].name, "doc");
    assert_eq!(parts[1].file_name.as_deref(), Some("a.txt"));
    assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
    assert_eq!(parts[1].size, 5);
}

#[tokio::test]
async fn form_files_upload_as_request_parts() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/upload")
        .with_form_files(vec![FormFile::new("one.bin", vec![0u8; 4]), FormFile::new("two.bin", vec![1u8; 2])])
        .unwrap()
        .build(Method::POST);
    assert_eq!(request.header("accept"), Some("application/octet-stream"));
    let parts = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<Vec<UploadedPart>>(StatusCode::OK)
        .build_typed_response::<Vec<UploadedPart>>()
        .await
        .unwrap()
        .into_success_content()
        .unwrap();

    let summary: Vec<(&str, Option<&str>, usize)> = parts
        .iter()
        .map(|part| (part.name.as_str(), part.file_name.as_deref(), part.size))
        .collect();
    assert_eq!(summary, [("Request", Some("one.bin"), 4), ("Request", Some("two.bin"), 2)]);
}

// --- downloads ---

#[tokio::test]
async fn download_reads_bytes_and_metadata() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/files/{name}")
        .with_path_parameter("name", "report.pdf")
        .unwrap()
        .build(Method::GET);
    let file = client.execute(request).await.unwrap().build_binary_response().await.unwrap();

    assert!(file.is_success());
    assert_eq!(file.content_type(), Some("application/pdf"));
    assert_eq!(file.file_name(), Some("report.pdf"));
    assert_eq!(file.content_length(), Some(25));
    assert_eq!(file.content().map(|bytes| bytes.as_ref()), Some(&b"%PDF-1.4 not really a pdf"[..]));
}

#[tokio::test]
async fn stream_download_leaves_body_unread() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/files/{name}")
        .with_path_parameter("name", "logo.png")
        .unwrap()
        .with_completion_option(CompletionOption::ResponseHeadersRead)
        .build(Method::GET);
    let mut file = client
        .execute(request)
        .await
        .unwrap()
        .build_stream_binary_response()
        .await
        .unwrap();

    assert!(file.is_success());
    assert_eq!(file.content_type(), Some("image/png"));
    assert_eq!(file.file_name(), Some("logo.png"));
    let chunks: Vec<Bytes> = file.content().unwrap().chunks().try_collect().await.unwrap();
    assert_eq!(chunks.concat(), [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    file.close();
}

#[tokio::test]
async fn missing_download_carries_error_text() {
    let client = client().await;

    let request = client
        .factory()
        .from_template("/api/files/{name}")
        .with_path_parameter("name", "nope.bin")
        .unwrap()
        .build(Method::GET);
    let file = client.execute(request).await.unwrap().build_binary_response().await.unwrap();

    assert!(!file.is_success());
    assert_eq!(file.status(), StatusCode::NOT_FOUND);
    assert!(file.content().is_none());
    assert_eq!(file.error_content(), Some("file not found"));
}

// --- authentication and failures ---

#[derive(Debug)]
struct StaticCredential;

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn get_token(&self, scopes: &[String]) -> rest_client::Result<AccessToken> {
        assert_eq!(scopes, ["api://pets/.default"]);
        Ok(AccessToken::new("secret-token"))
    }
}

#[tokio::test]
async fn bearer_handler_authenticates_requests() {
    let addr = start_server().await;
    let tokens = BearerTokenProvider::new(Arc::new(StaticCredential), "api://pets/.default").unwrap();
    let client = RestClient::builder()
        .options(options(addr))
        .handler(AuthenticationHandler::new(Arc::new(tokens)))
        .build()
        .unwrap();

    let request = client.factory().from_template("/api/secure").build(Method::GET);
    let response = client
        .execute(request)
        .await
        .unwrap()
        .add_success_response_as::<serde_json::Value>(StatusCode::OK)
        .build_response()
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.content_as::<serde_json::Value>(), Some(&json!({ "authorized": true })));
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() {
    let client = client().await;

    let request = client.factory().from_template("/api/secure").build(Method::GET);
    let result = client
        .execute(request)
        .await
        .unwrap()
        .add_error_response_as::<Problem>(StatusCode::UNAUTHORIZED)
        .build_result::<serde_json::Value, Problem>()
        .await
        .unwrap();

    assert_eq!(result.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(result.error_content().map(|problem| problem.title.as_str()), Some("missing bearer token"));
}

#[tokio::test]
async fn server_error_keeps_raw_text() {
    let client = client().await;

    let request = client.factory().from_template("/api/fail").build(Method::GET);
    let response = client.execute(request).await.unwrap().build_response().await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.content(), "boom");
    assert_eq!(response.content_as::<String>(), Some(&"boom".to_string()));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = RestClient::new(options(addr)).unwrap();

    let request = client.factory().from_template("/api/pets").build(Method::GET);
    let err = client.send(request).await.unwrap_err();

    assert!(matches!(err, rest_client::RestClientError::Transport(_)), "{err:?}");
}
