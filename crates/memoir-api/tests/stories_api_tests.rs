use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use image::{GenericImageView, ImageFormat, RgbImage};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use memoir_api::{AppState, AppStateInner, router};
use memoir_db::Database;
use memoir_media::{AssetStore, Ingestor, MAX_FILE_SIZE};
use memoir_types::api::Claims;

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "memoir-test-boundary";

struct TestApp {
    router: Router,
    state: AppState,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = AssetStore::new(dir.path().join("uploads"), dir.path().join("spool"))
            .await
            .unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            ingestor: Ingestor::new(Arc::new(store)),
            jwt_secret: SECRET.to_string(),
        });
        Self {
            router: router(state.clone()),
            state,
            _dir: dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn login(&self, user: &str) {
        let (status, _) = self.send(json_request(Method::POST, "/api/auth/login", user, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn create(&self, user: &str, title: &str, content: &str, tags: &str) -> Value {
        let req = multipart_request(user, &[("title", title), ("content", content), ("tags", tags)], &[]);
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    fn asset_files(&self) -> Vec<String> {
        std::fs::read_dir(self.state.ingestor.store().asset_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn spool_files(&self) -> usize {
        std::fs::read_dir(self.state.ingestor.store().spool_dir())
            .unwrap()
            .count()
    }
}

fn token(user: &str) -> String {
    let claims = Claims {
        sub: user.to_string(),
        email: Some(format!("{user}@example.com")),
        first_name: Some("Test".into()),
        last_name: None,
        profile_image_url: None,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn json_request(method: Method, uri: &str, user: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn multipart_request(user: &str, fields: &[(&str, &str)], files: &[(&str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    for (i, (mime, bytes)) in files.iter().enumerate() {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photos\"; filename=\"p{i}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    // Delivered in small pieces, the way a socket would.
    let pieces: Vec<Result<Vec<u8>, std::io::Error>> =
        body.chunks(64 * 1024).map(|c| Ok(c.to_vec())).collect();

    Request::builder()
        .method(Method::POST)
        .uri("/api/stories")
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user)))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from_stream(futures_util::stream::iter(pieces)))
        .unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn titles(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = TestApp::new().await;

    let req = Request::builder().uri("/api/stories").body(Body::empty()).unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/stories")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "unauthorized");
}

#[tokio::test]
async fn login_upserts_the_user() {
    let app = TestApp::new().await;

    let (status, _) = app.send(json_request(Method::GET, "/api/auth/user", "u1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, user) = app.send(json_request(Method::POST, "/api/auth/login", "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["id"], "u1");

    let (status, user) = app.send(json_request(Method::GET, "/api/auth/user", "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "u1@example.com");
    assert_eq!(user["firstName"], "Test");
}

#[tokio::test]
async fn create_story_normalizes_photos_in_order() {
    let app = TestApp::new().await;
    app.login("u1").await;

    let req = multipart_request(
        "u1",
        &[("title", "Coast"), ("content", "Windy day"), ("tags", "sea, travel")],
        &[("image/png", png(2400, 1200)), ("image/png", png(300, 200))],
    );
    let (status, story) = app.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{story}");
    assert_eq!(story["title"], "Coast");
    assert_eq!(story["tags"], json!(["sea", "travel"]));

    let photos = story["photos"].as_array().unwrap();
    assert_eq!(photos.len(), 2);
    assert_eq!(photos[0]["order"], 0);
    assert_eq!(photos[1]["order"], 1);

    let url = photos[0]["url"].as_str().unwrap();
    let name = url.strip_prefix("/uploads/").unwrap();
    let stored = image::open(app.state.ingestor.store().asset_path(name)).unwrap();
    assert_eq!(stored.dimensions(), (1200, 600));

    let req = Request::builder().uri(url).body(Body::empty()).unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (_, list) = app.send(json_request(Method::GET, "/api/stories", "u1", None)).await;
    assert_eq!(list[0]["photoCount"], 2);
    assert_eq!(list[0]["firstPhoto"]["url"], url);
}

#[tokio::test]
async fn stories_are_invisible_to_other_users() {
    let app = TestApp::new().await;
    app.login("u1").await;
    app.login("u2").await;
    let story = app.create("u1", "Private", "Mine only", "").await;
    let uri = format!("/api/stories/{}", story["id"].as_str().unwrap());

    let (status, _) = app.send(json_request(Method::GET, &uri, "u2", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let patch = json!({ "title": "Taken" });
    let (status, _) = app.send(json_request(Method::PATCH, &uri, "u2", Some(patch))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(json_request(Method::DELETE, &uri, "u2", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = app.send(json_request(Method::GET, "/api/stories", "u2", None)).await;
    assert_eq!(list, json!([]));

    let (status, fetched) = app.send(json_request(Method::GET, &uri, "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Private");
}

#[tokio::test]
async fn list_supports_search_and_tag_filters() {
    let app = TestApp::new().await;
    app.login("u1").await;
    app.create("u1", "Alpha hike", "mountains", "x").await;
    app.create("u1", "Dinner", "alphabet soup", "y, z").await;
    app.create("u1", "Nothing", "to see", "q").await;

    let (_, list) = app.send(json_request(Method::GET, "/api/stories", "u1", None)).await;
    assert_eq!(titles(&list), vec!["Nothing", "Dinner", "Alpha hike"]);

    let (_, list) = app
        .send(json_request(Method::GET, "/api/stories?search=ALPHA", "u1", None))
        .await;
    assert_eq!(titles(&list), vec!["Dinner", "Alpha hike"]);

    let (_, list) = app
        .send(json_request(Method::GET, "/api/stories?tags=x,z", "u1", None))
        .await;
    assert_eq!(titles(&list), vec!["Dinner", "Alpha hike"]);

    let (_, list) = app
        .send(json_request(Method::GET, "/api/stories?search=soup&tags=x", "u1", None))
        .await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn patch_updates_and_delete_removes_assets() {
    let app = TestApp::new().await;
    app.login("u1").await;

    let req = multipart_request(
        "u1",
        &[("title", "Park"), ("content", "Picnic")],
        &[("image/png", png(64, 64))],
    );
    let (_, story) = app.send(req).await;
    let uri = format!("/api/stories/{}", story["id"].as_str().unwrap());
    assert_eq!(app.asset_files().len(), 1);

    let patch = json!({ "tags": "summer, food" });
    let (status, updated) = app.send(json_request(Method::PATCH, &uri, "u1", Some(patch))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Park");
    assert_eq!(updated["tags"], json!(["summer", "food"]));
    assert_eq!(updated["photos"].as_array().unwrap().len(), 1);

    let patch = json!({ "title": "  " });
    let (status, _) = app.send(json_request(Method::PATCH, &uri, "u1", Some(patch))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send(json_request(Method::DELETE, &uri, "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.asset_files().is_empty());

    let (status, _) = app.send(json_request(Method::GET, &uri, "u1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_photo_is_scoped_to_story_owner() {
    let app = TestApp::new().await;
    app.login("u1").await;
    app.login("u2").await;

    let req = multipart_request(
        "u1",
        &[("title", "Two shots"), ("content", "c")],
        &[("image/png", png(20, 20)), ("image/png", png(30, 30))],
    );
    let (_, story) = app.send(req).await;
    let photo_id = story["photos"][0]["id"].as_str().unwrap();
    let uri = format!("/api/photos/{photo_id}");

    let (status, _) = app.send(json_request(Method::DELETE, &uri, "u2", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(json_request(Method::DELETE, &uri, "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.asset_files().len(), 1);

    let (_, list) = app.send(json_request(Method::GET, "/api/stories", "u1", None)).await;
    assert_eq!(list[0]["photoCount"], 1);
    assert_eq!(list[0]["firstPhoto"]["order"], 1);
}

#[tokio::test]
async fn eleven_photos_are_rejected_before_anything_is_stored() {
    let app = TestApp::new().await;
    app.login("u1").await;

    let files: Vec<_> = (0..11).map(|_| ("image/png", png(8, 8))).collect();
    let req = multipart_request("u1", &[("title", "Too many"), ("content", "c")], &files);
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("too many photos"));

    assert!(app.asset_files().is_empty());
    let (_, stats) = app.send(json_request(Method::GET, "/api/stats", "u1", None)).await;
    assert_eq!(stats["totalStories"], 0);
}

#[tokio::test]
async fn photo_count_limit_stops_reading_at_the_eleventh_part() {
    let app = TestApp::new().await;
    app.login("u1").await;

    // The twelfth part alone would blow the per-file limit; reading must
    // stop before it is reached.
    let mut files: Vec<_> = (0..11).map(|_| ("image/png", png(8, 8))).collect();
    files.push(("image/png", vec![0u8; 15 * 1024 * 1024]));
    files.extend((0..3).map(|_| ("image/png", png(8, 8))));
    let req = multipart_request("u1", &[("title", "Flood"), ("content", "c")], &files);
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "too many photos: 11 submitted, at most 10 allowed");

    assert_eq!(app.spool_files(), 0);
    assert!(app.asset_files().is_empty());
}

#[tokio::test]
async fn oversized_photo_is_cut_off_mid_stream() {
    let app = TestApp::new().await;
    app.login("u1").await;

    let huge = vec![0u8; 15 * 1024 * 1024];
    let req = multipart_request(
        "u1",
        &[("title", "Panorama"), ("content", "c")],
        &[("image/png", png(8, 8)), ("image/png", huge), ("image/png", png(8, 8))],
    );
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("photo 2 is "), "{message}");
    let read: u64 = message.split_whitespace().nth(3).unwrap().parse().unwrap();
    assert!(read > MAX_FILE_SIZE);
    assert!(read < 15 * 1024 * 1024, "whole part was buffered: {read}");

    assert_eq!(app.spool_files(), 0);
    assert!(app.asset_files().is_empty());
    let (_, list) = app.send(json_request(Method::GET, "/api/stories", "u1", None)).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn malformed_patch_bodies_get_json_errors() {
    let app = TestApp::new().await;
    app.login("u1").await;
    let story = app.create("u1", "Lake", "Swim", "").await;
    let uri = format!("/api/stories/{}", story["id"].as_str().unwrap());

    let patch = json!({ "mood": "sunny" });
    let (status, body) = app.send(json_request(Method::PATCH, &uri, "u1", Some(patch))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("mood"), "{body}");

    let req = Request::builder()
        .method(Method::PATCH)
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token("u1")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\":"))
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "{body}");

    let (_, unchanged) = app.send(json_request(Method::GET, &uri, "u1", None)).await;
    assert_eq!(unchanged["title"], "Lake");
}

#[tokio::test]
async fn bad_uploads_leave_no_story_behind() {
    let app = TestApp::new().await;
    app.login("u1").await;

    let req = multipart_request(
        "u1",
        &[("title", "Doc"), ("content", "c")],
        &[("text/plain", b"hello".to_vec())],
    );
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = multipart_request(
        "u1",
        &[("title", "Broken"), ("content", "c")],
        &[("image/png", png(10, 10)), ("image/jpeg", b"garbage".to_vec())],
    );
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().starts_with("photo 2"));

    let req = multipart_request("u1", &[("title", ""), ("content", "c")], &[("image/png", png(10, 10))]);
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.asset_files().is_empty());
    let (_, list) = app.send(json_request(Method::GET, "/api/stories", "u1", None)).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn stats_summarize_the_callers_journal() {
    let app = TestApp::new().await;
    app.login("u1").await;
    app.login("u2").await;

    let req = multipart_request(
        "u1",
        &[("title", "A"), ("content", "c"), ("tags", "x, y")],
        &[("image/png", png(5, 5)), ("image/png", png(6, 6)), ("image/png", png(7, 7))],
    );
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::CREATED);
    app.create("u1", "B", "c", "y,z").await;
    app.create("u2", "C", "c", "w").await;

    let (status, stats) = app.send(json_request(Method::GET, "/api/stats", "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalStories"], 2);
    assert_eq!(stats["totalPhotos"], 3);
    assert_eq!(stats["uniqueTags"], json!(["x", "y", "z"]));
}
