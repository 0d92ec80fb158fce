//! Drives the board over HTTP: accounts, posting and the delayed delete.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fi_api::{configure_routes, AppState};
use fi_core::config::BoardSettings;
use fi_core::traits::{AuthProvider, SystemClock};
use fi_db_memory::MemoryRepo;
use fi_storage_local::LocalImageStore;
use serde_json::{json, Value};

const BOUNDARY: &str = "foundit-test-boundary";
const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const GRACE: Duration = Duration::from_millis(300);

/// Argon2 is slow without optimisations; these tests only need equality.
struct PlainAuth;

#[async_trait]
impl AuthProvider for PlainAuth {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        Ok(format!("plain:{password}"))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        hash == format!("plain:{password}")
    }
}

fn app_state(upload_dir: &Path) -> web::Data<AppState> {
    app_state_with_grace(upload_dir, GRACE)
}

fn app_state_with_grace(upload_dir: &Path, grace: Duration) -> web::Data<AppState> {
    let repo = Arc::new(MemoryRepo::new());
    let store = Arc::new(LocalImageStore::new(
        upload_dir.to_path_buf(),
        "/static/uploads".into(),
    ));
    web::Data::new(AppState::new(
        repo.clone(),
        repo,
        store,
        Arc::new(PlainAuth),
        Arc::new(SystemClock),
        grace,
        BoardSettings::default(),
    ))
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
            Part::File(filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"images\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn contact_fields() -> Vec<Part<'static>> {
    vec![
        Part::Text("item_name", "Blue water bottle"),
        Part::Text("description", "Milton, dented lid"),
        Part::Text("category", "Other"),
        Part::Text("place", "Library"),
        Part::Text("name", "Asha"),
        Part::Text("enrollment", "E23CSE042"),
        Part::Text("phone", "9876543210"),
        Part::Text("hostel", "B2"),
    ]
}

fn register_req(email: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post().uri("/register").set_json(json!({
        "name": "Asha",
        "enrollment": "E23CSE042",
        "phone": "9876543210",
        "hostel": "B2",
        "email": email,
        "password": password,
    }))
}

async fn token_of<B: MessageBody>(resp: ServiceResponse<B>) -> String {
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    body["token"].as_str().unwrap().to_string()
}

/// Registers an account and returns its session token.
macro_rules! signup {
    ($app:expr, $email:expr, $password:expr) => {
        token_of(test::call_service($app, register_req($email, $password).to_request()).await).await
    };
}

/// `delete_at` is request time plus `grace`; `seconds_remaining` counts down
/// to it.
fn assert_deadline(ack: &Value, requested_at: DateTime<Utc>, grace: Duration) {
    let grace = chrono::Duration::from_std(grace).unwrap();
    let delete_at = DateTime::parse_from_rfc3339(ack["delete_at"].as_str().unwrap())
        .unwrap()
        .with_timezone(&Utc);
    assert!(delete_at >= requested_at + grace, "deadline {delete_at} too early");
    assert!(
        delete_at <= Utc::now() + grace,
        "deadline {delete_at} later than the grace period allows"
    );

    let remaining = ack["seconds_remaining"].as_i64().unwrap();
    assert!((0..=grace.num_seconds()).contains(&remaining));
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

fn post_request(token: &str, kind: &str, parts: &[Part<'_>]) -> test::TestRequest {
    test::TestRequest::post()
        .uri(&format!("/posts/{kind}"))
        .insert_header(bearer(token))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(parts))
}

fn begin_delete(token: &str, post_id: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri(&format!("/posts/{post_id}/begin-delete"))
        .insert_header(bearer(token))
        .set_json(json!({ "password": password }))
}

#[actix_web::test]
async fn test_owner_deletes_post_after_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(dir.path()))
            .configure(configure_routes),
    )
    .await;

    let owner = signup!(&app, "asha@bennett.edu.in", "s3cret");
    let stranger = signup!(&app, "ravi@bennett.edu.in", "other");

    let mut parts = contact_fields();
    parts.push(Part::File("bottle.png", PNG_BYTES));
    let resp = test::call_service(&app, post_request(&owner, "found", &parts).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let post_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "active");
    assert_eq!(created["images"].as_array().unwrap().len(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let resp = test::call_service(&app, begin_delete(&owner, &post_id, "wrong").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, begin_delete(&stranger, &post_id, "other").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let requested_at = Utc::now();
    let resp = test::call_service(&app, begin_delete(&owner, &post_id, "s3cret").to_request()).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "pending_delete");
    assert_eq!(ack["post_id"], post_id.as_str());
    assert_deadline(&ack, requested_at, GRACE);

    let resp = test::call_service(&app, begin_delete(&owner, &post_id, "s3cret").to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Still visible, and flagged, while the grace period runs.
    let req = test::TestRequest::get().uri(&format!("/posts/{post_id}")).to_request();
    let shown: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(shown["status"], "pending_delete");

    let mut purged = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let req = test::TestRequest::get().uri(&format!("/posts/{post_id}")).to_request();
        if test::call_service(&app, req).await.status() == StatusCode::NOT_FOUND {
            purged = true;
            break;
        }
    }
    assert!(purged, "post should be purged after the grace period");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let req = test::TestRequest::get().uri("/posts").to_request();
    let board: Value = test::call_and_read_body_json(&app, req).await;
    assert!(board["found"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_begin_delete_reports_deadline() {
    let grace = Duration::from_secs(90);
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state_with_grace(dir.path(), grace))
            .configure(configure_routes),
    )
    .await;
    let owner = signup!(&app, "asha@bennett.edu.in", "s3cret");

    let resp = test::call_service(&app, post_request(&owner, "lost", &contact_fields()).to_request()).await;
    let created: Value = test::read_body_json(resp).await;
    let post_id = created["id"].as_str().unwrap().to_string();

    let requested_at = Utc::now();
    let resp = test::call_service(&app, begin_delete(&owner, &post_id, "s3cret").to_request()).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let ack: Value = test::read_body_json(resp).await;
    assert_deadline(&ack, requested_at, grace);
    // Whole seconds, truncated: a fresh request reports 89 or 90.
    assert!(ack["seconds_remaining"].as_i64().unwrap() >= 89);

    let req = test::TestRequest::get().uri(&format!("/posts/{post_id}")).to_request();
    let shown: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(shown["delete_at"], ack["delete_at"]);
}

#[actix_web::test]
async fn test_post_form_limits() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(dir.path()))
            .configure(configure_routes),
    )
    .await;
    let token = signup!(&app, "asha@bennett.edu.in", "s3cret");

    // Too many files.
    let mut parts = contact_fields();
    for name in ["a.png", "b.png", "c.png", "d.png"] {
        parts.push(Part::File(name, PNG_BYTES));
    }
    let resp = test::call_service(&app, post_request(&token, "lost", &parts).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Disallowed files are dropped, the post still goes up.
    let mut parts = contact_fields();
    parts.push(Part::File("notes.txt", b"plain text"));
    parts.push(Part::File("fake.png", b"not really a png"));
    let resp = test::call_service(&app, post_request(&token, "lost", &parts).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert!(created["images"].as_array().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    // Unknown board.
    let resp = test::call_service(&app, post_request(&token, "misc", &contact_fields()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Missing contact details.
    let parts = vec![Part::Text("item_name", "Umbrella")];
    let resp = test::call_service(&app, post_request(&token, "lost", &parts).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // No session.
    let req = test::TestRequest::post()
        .uri("/posts/lost")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(&contact_fields()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/posts?q=BOTTLE&place=Library").to_request();
    let board: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(board["lost"].as_array().unwrap().len(), 1);
    assert!(board["found"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(dir.path()))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(json!({
            "name": "Asha", "enrollment": "E1", "phone": "1", "hostel": "B2",
            "email": "asha@gmail.com", "password": "x",
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let token = signup!(&app, "Asha@Bennett.edu.in", "s3cret");

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(json!({
            "name": "Asha", "enrollment": "E1", "phone": "1", "hostel": "B2",
            "email": "asha@bennett.edu.in", "password": "x",
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "email": "asha@bennett.edu.in", "password": "nope" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid email or password.");

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "email": "asha@bennett.edu.in", "password": "s3cret" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["user"].get("password_hash").is_none());

    let req = test::TestRequest::post()
        .uri("/logout")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::post()
        .uri("/logout")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}
