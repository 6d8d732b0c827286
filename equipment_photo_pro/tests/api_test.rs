//! Router tests: real handlers, in-memory database, temp upload directory

use std::io::Cursor;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use photo_pro_auth::{AuthPolicy, AuthService, AuthStore, MemoryMailer, TrialPolicy};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use equipment_photo_pro::api;
use equipment_photo_pro::state::{AppState, UploadLimits};
use equipment_photo_pro::uploads::UploadStore;

const BOUNDARY: &str = "photo-pro-test-boundary";

struct Harness {
    app: Router,
    state: Arc<AppState>,
    mailer: Arc<MemoryMailer>,
    _dir: TempDir,
}

fn harness_with(trial: TrialPolicy) -> Harness {
    let dir = tempdir().unwrap();
    let mailer = Arc::new(MemoryMailer::new());
    let auth = AuthService::new(
        AuthStore::open_in_memory().unwrap(),
        mailer.clone(),
        AuthPolicy::default(),
        trial,
    );
    let uploads = UploadStore::new(&dir.path().join("uploads")).unwrap();
    let state = Arc::new(AppState::new(auth, None, uploads, UploadLimits::default()));

    Harness {
        app: api::router(state.clone(), &[]),
        state,
        mailer,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(TrialPolicy::default())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 120]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// (field name, file name, content type, bytes); file name `None` for plain fields
type Part<'a> = (&'a str, Option<&'a str>, &'a str, Vec<u8>);

fn multipart(uri: &str, token: Option<&str>, parts: Vec<Part<'_>>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, content_type, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::post(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn login(h: &Harness, email: &str) -> String {
    let (status, _) = send(&h.app, post_json("/api/auth/send-code", None, json!({ "email": email }))).await;
    assert_eq!(status, StatusCode::OK);

    let code = h
        .mailer
        .last_to(email)
        .unwrap()
        .text
        .split_whitespace()
        .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
        .unwrap()
        .to_string();

    let (status, body) = send(
        &h.app,
        post_json("/api/auth/verify-code", None, json!({ "email": email, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["sessionToken"].as_str().unwrap().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health_and_status() {
    let h = harness();

    let (status, body) = send(&h.app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, body) = send(&h.app, get("/api/ai-status", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], false);

    let (status, body) = send(&h.app, get("/api/prompt", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["prompt"].as_str().unwrap().contains("equipment"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTH
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_login_me_and_logout() {
    let h = harness();

    let (status, body) = send(&h.app, get("/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let token = login(&h, "dealer@farm.com").await;

    let (status, body) = send(&h.app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "dealer@farm.com");
    assert_eq!(body["trial"]["canProcess"], true);

    let (status, body) = send(&h.app, get("/api/auth/trial-status", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imagesRemaining"], 30);

    let (status, _) = send(&h.app, post_json("/api/auth/logout", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_validation_errors() {
    let h = harness();

    let (status, body) = send(&h.app, post_json("/api/auth/send-code", None, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email is required");

    let (status, _) = send(
        &h.app,
        post_json("/api/auth/send-code", None, json!({ "email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.app,
        post_json(
            "/api/auth/verify-code",
            None,
            json!({ "email": "dealer@farm.com", "code": "000000" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_json = Request::post("/api/auth/send-code")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&h.app, bad_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMIN
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let h = harness();
    let user_token = login(&h, "clerk@farm.com").await;

    let (status, _) = send(&h.app, get("/api/admin/stats", Some(&user_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    h.state.auth.promote_admin("boss@farm.com").unwrap();
    let admin_token = login(&h, "boss@farm.com").await;

    let (status, body) = send(&h.app, get("/api/admin/stats", Some(&admin_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalUsers"], 2);

    let clerk_id = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == "clerk@farm.com")
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let (status, body) = send(
        &h.app,
        post_json(
            &format!("/api/admin/users/{clerk_id}/subscription"),
            Some(&admin_token),
            json!({ "status": "active" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriptionStatus"], "active");

    let (status, _) = send(
        &h.app,
        post_json(
            &format!("/api/admin/users/{clerk_id}/subscription"),
            Some(&admin_token),
            json!({ "status": "platinum" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.app,
        post_json("/api/admin/test-email", Some(&admin_token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["to"], "boss@farm.com");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stats_routes_under_concurrent_load() {
    let h = harness();
    h.state.auth.promote_admin("boss@farm.com").unwrap();
    let admin_token = login(&h, "boss@farm.com").await;
    let user_token = login(&h, "clerk@farm.com").await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let app = h.app.clone();
        let request = if i % 2 == 0 {
            get("/api/admin/stats", Some(&admin_token))
        } else {
            get("/api/auth/me", Some(&user_token))
        };
        tasks.push(tokio::spawn(async move { send(&app, request).await }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        if i % 2 == 0 {
            assert_eq!(body["totalUsers"], 2);
        } else {
            assert_eq!(body["user"]["email"], "clerk@farm.com");
        }
    }
}

#[tokio::test]
async fn test_admin_test_email_without_body() {
    let h = harness();
    h.state.auth.promote_admin("boss@farm.com").unwrap();
    let admin_token = login(&h, "boss@farm.com").await;
    let before = h.mailer.sent().len();

    let request = Request::post("/api/admin/test-email")
        .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["to"], "boss@farm.com");
    assert_eq!(h.mailer.sent().len(), before + 1);

    let (status, body) = send(
        &h.app,
        post_json(
            "/api/admin/test-email",
            Some(&admin_token),
            json!({ "email": "yard@farm.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["to"], "yard@farm.com");
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMAGES
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upload_requires_session() {
    let h = harness();
    let request = multipart("/api/upload", None, vec![("images", Some("a.png"), "image/png", png(8, 8))]);

    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_enhance_and_download() {
    let h = harness();
    let token = login(&h, "dealer@farm.com").await;

    let settings = json!({ "skyType": "clear-blue", "equipmentType": "combine" }).to_string();
    let request = multipart(
        "/api/upload",
        Some(&token),
        vec![
            ("images", Some("tractor.png"), "image/png", png(120, 80)),
            ("promptSettings", None, "", settings.into_bytes()),
        ],
    );

    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["aiConfigured"], false);
    assert!(body["prompt"].as_str().unwrap().contains("combine"));

    let file = &body["files"][0];
    assert_eq!(file["original"]["filename"], "tractor.png");
    assert_eq!(file["method"], "filters");

    let url = file["enhanced"]["downloadUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("/api/download/enhanced-images-"));
    assert!(url.ends_with(".jpg"));

    let response = h.app.clone().oneshot(get(&url, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);

    let (_, me) = send(&h.app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(me["user"]["imagesProcessedCount"], 1);
    assert_eq!(me["recentProcessing"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_bad_input() {
    let h = harness();
    let token = login(&h, "dealer@farm.com").await;

    let text = multipart(
        "/api/upload",
        Some(&token),
        vec![("images", Some("notes.txt"), "text/plain", b"hello".to_vec())],
    );
    let (status, _) = send(&h.app, text).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let empty = multipart("/api/upload", Some(&token), vec![("dynamicPrompt", None, "", b"x".to_vec())]);
    let (status, body) = send(&h.app, empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No images uploaded");

    let bad_settings = multipart(
        "/api/upload",
        Some(&token),
        vec![
            ("images", Some("a.png"), "image/png", png(8, 8)),
            ("promptSettings", None, "", b"{oops".to_vec()),
        ],
    );
    let (status, _) = send(&h.app, bad_settings).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Claims to be an image but isn't one: skipped, not fatal
    let fake = multipart(
        "/api/upload",
        Some(&token),
        vec![("images", Some("fake.png"), "image/png", b"definitely not a png".to_vec())],
    );
    let (status, body) = send(&h.app, fake).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"].as_array().unwrap().len(), 0);
    assert_eq!(body["skipped"][0]["filename"], "fake.png");
}

#[tokio::test]
async fn test_trial_limit_skips_then_blocks() {
    let h = harness_with(TrialPolicy {
        image_limit: 1,
        period_days: 30,
    });
    let token = login(&h, "dealer@farm.com").await;

    let request = multipart(
        "/api/upload",
        Some(&token),
        vec![
            ("images", Some("one.png"), "image/png", png(16, 16)),
            ("images", Some("two.png"), "image/png", png(16, 16)),
        ],
    );
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
    assert_eq!(body["skipped"][0]["filename"], "two.png");
    assert_eq!(body["trial"]["canProcess"], false);

    let again = multipart(
        "/api/upload",
        Some(&token),
        vec![("images", Some("three.png"), "image/png", png(16, 16))],
    );
    let (status, body) = send(&h.app, again).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("limit"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_stay_within_trial_limit() {
    let h = harness_with(TrialPolicy {
        image_limit: 1,
        period_days: 30,
    });
    let token = login(&h, "dealer@farm.com").await;

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let app = h.app.clone();
            let request = multipart(
                "/api/upload",
                Some(&token),
                vec![("images", Some("shot.png"), "image/png", png(64 + i, 48))],
            );
            tokio::spawn(async move { send(&app, request).await })
        })
        .collect();

    let mut processed = 0;
    for task in tasks {
        let (status, body) = task.await.unwrap();
        if status == StatusCode::OK {
            processed += body["files"].as_array().unwrap().len();
        } else {
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
    }
    assert_eq!(processed, 1);

    let (_, me) = send(&h.app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(me["user"]["imagesProcessedCount"], 1);
    assert_eq!(me["trial"]["imagesUsed"], 1);
}

#[tokio::test]
async fn test_failed_image_returns_trial_slot() {
    let h = harness_with(TrialPolicy {
        image_limit: 1,
        period_days: 30,
    });
    let token = login(&h, "dealer@farm.com").await;

    let fake = multipart(
        "/api/upload",
        Some(&token),
        vec![("images", Some("fake.png"), "image/png", b"not an image".to_vec())],
    );
    let (status, body) = send(&h.app, fake).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trial"]["imagesUsed"], 0);

    let real = multipart(
        "/api/upload",
        Some(&token),
        vec![("images", Some("real.png"), "image/png", png(16, 16))],
    );
    let (status, body) = send(&h.app, real).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_download_guards() {
    let h = harness();

    let (status, _) = send(&h.app, get("/api/download/missing.jpg", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&h.app, get("/api/download/..%2Fsecret.db", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suggestions_without_ai_return_defaults() {
    let h = harness();

    let request = multipart(
        "/api/ai-suggestions",
        None,
        vec![("image", Some("a.png"), "image/png", png(8, 8))],
    );
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aiConfigured"], false);
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 4);

    let missing = multipart("/api/ai-suggestions", None, vec![]);
    let (status, _) = send(&h.app, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
