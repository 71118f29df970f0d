//! End-to-end tests for the `mdview` HTTP API.
//!
//! Each test builds the full router over a temporary root directory and
//! drives it with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use mdview_server::build_router;
use mdview_server::config::ServerConfig;
use mdview_server::state::AppState;

const SECRET: &str = "test-secret-key-that-is-long-enough-0123";

struct TestApp {
    router: Router,
    _root: TempDir,
    static_dir: TempDir,
}

async fn setup_with(production: bool) -> TestApp {
    let root = TempDir::new().unwrap();
    let static_dir = TempDir::new().unwrap();

    fs::create_dir_all(root.path().join("Documents/notes")).unwrap();
    fs::write(root.path().join("Documents/readme.md"), "# Hello\n").unwrap();
    fs::write(root.path().join("Documents/notes/todo.md"), "- [ ] tests\n").unwrap();
    fs::write(root.path().join("Documents/plain.txt"), "not markdown").unwrap();

    let big = fs::File::create(root.path().join("Documents/big.md")).unwrap();
    big.set_len(15 * 1024 * 1024).unwrap();

    let mut vars = HashMap::new();
    vars.insert("MDVIEW_ROOT", root.path().display().to_string());
    vars.insert("MDVIEW_STATIC_DIR", static_dir.path().display().to_string());
    vars.insert("MDVIEW_SECRET_KEY", SECRET.to_owned());
    if production {
        vars.insert("MDVIEW_PRODUCTION", "true".to_owned());
    }
    let config = ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let state = AppState::from_config(&config).await.unwrap();
    TestApp {
        router: build_router(state),
        _root: root,
        static_dir,
    }
}

async fn setup() -> TestApp {
    setup_with(false).await
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post_theme(&self, body: &Value, cookie: Option<&str>, token: Option<&str>) -> Response<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/themes")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        if let Some(token) = token {
            req = req.header("X-CSRF-Token", token);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    /// Fetch a CSRF token and return `(token, cookie pair)`.
    async fn csrf(&self) -> (String, String) {
        let resp = self.get("/api/csrf-token", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = cookie_pair(&set_cookie(&resp).unwrap());
        let body = json_body(resp).await;
        (body["csrf_token"].as_str().unwrap().to_owned(), cookie)
    }
}

async fn json_body(resp: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn set_cookie(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("mdview_session="))
        .map(str::to_owned)
}

fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_owned()
}

fn uri_for(path: &Path) -> String {
    let raw = path.display().to_string();
    raw.replace('%', "%25").replace(' ', "%20")
}

// ── Path guard ───────────────────────────────────────────────────────

#[tokio::test]
async fn absolute_path_outside_root_is_denied() {
    let app = setup().await;
    let resp = app.get("/api/file?path=/etc/passwd", None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body = text_body(resp).await;
    assert_eq!(body, r#"{"error":"Access denied"}"#);
    assert!(!body.contains("root:"));
}

#[tokio::test]
async fn dot_dot_segments_are_denied() {
    let app = setup().await;
    let resp = app
        .get("/api/file?path=Documents/../../../etc/passwd", None)
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app.get("/api/browse?path=..", None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["error"], "Access denied");
}

#[tokio::test]
async fn file_requires_path() {
    let app = setup().await;
    let resp = app.get("/api/file", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.get("/api/file?path=", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reads_markdown_inside_root() {
    let app = setup().await;
    let resp = app.get("/api/file?path=Documents/readme.md", None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["name"], "readme.md");
    assert_eq!(body["content"], "# Hello\n");
    assert!(body["path"].as_str().unwrap().ends_with("readme.md"));
}

#[tokio::test]
async fn file_errors_map_to_statuses() {
    let app = setup().await;

    let resp = app.get("/api/file?path=Documents/missing.md", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await, json!({"error": "Path not found"}));

    let resp = app.get("/api/file?path=Documents/plain.txt", None).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json_body(resp).await, json!({"error": "Not a markdown file"}));

    let resp = app.get("/api/file?path=Documents/notes", None).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn oversized_markdown_is_rejected() {
    let app = setup().await;
    let resp = app.get("/api/file?path=Documents/big.md", None).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(resp).await, json!({"error": "File too large"}));
}

// ── Browsing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn browse_defaults_to_documents() {
    let app = setup().await;
    let resp = app.get("/api/browse", None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert!(body["current_path"].as_str().unwrap().ends_with("Documents"));

    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["notes", "big.md", "readme.md"]);
    assert_eq!(body["items"][0]["type"], "directory");
    assert_eq!(body["items"][0]["has_markdown"], true);
}

#[tokio::test]
async fn browse_subdirectory_by_absolute_path() {
    let app = setup().await;
    let listing = json_body(app.get("/api/browse", None).await).await;
    let notes = listing["items"][0]["path"].as_str().unwrap().to_owned();

    let uri = format!("/api/browse?path={}", uri_for(Path::new(&notes)));
    let resp = app.get(&uri, None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["items"][0]["name"], "todo.md");
    assert_eq!(body["parent"], listing["current_path"]);
}

#[tokio::test]
async fn browse_rejects_files() {
    let app = setup().await;
    let resp = app.get("/api/browse?path=Documents/readme.md", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await, json!({"error": "Not a directory"}));
}

#[tokio::test]
async fn read_only_requests_set_no_cookie() {
    let app = setup().await;
    let resp = app.get("/api/browse", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(set_cookie(&resp).is_none());
}

// ── CSRF and sessions ────────────────────────────────────────────────

#[tokio::test]
async fn csrf_token_sets_hardened_cookie() {
    let app = setup().await;
    let resp = app.get("/api/csrf-token", None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = set_cookie(&resp).unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=86400"));
    assert!(!cookie.contains("Secure"));

    let body = json_body(resp).await;
    assert_eq!(body["csrf_token"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn production_cookie_is_secure() {
    let app = setup_with(true).await;
    let resp = app.get("/api/csrf-token", None).await;
    let cookie = set_cookie(&resp).unwrap();
    assert!(cookie.contains("Secure"));
}

#[tokio::test]
async fn csrf_token_is_stable_within_session() {
    let app = setup().await;
    let (first, cookie) = app.csrf().await;

    let resp = app.get("/api/csrf-token", Some(&cookie)).await;
    assert!(set_cookie(&resp).is_none());
    let second = json_body(resp).await;
    assert_eq!(second["csrf_token"], first.as_str());
}

#[tokio::test]
async fn tampered_cookie_starts_new_session() {
    let app = setup().await;
    let (first, cookie) = app.csrf().await;

    let mut tampered = cookie.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let resp = app.get("/api/csrf-token", Some(&tampered)).await;
    let new_cookie = set_cookie(&resp).unwrap();
    assert_ne!(cookie_pair(&new_cookie), cookie);

    let body = json_body(resp).await;
    assert_ne!(body["csrf_token"], first.as_str());
}

#[tokio::test]
async fn save_theme_without_token_is_forbidden() {
    let app = setup().await;
    let theme = json!({"id": "evil", "css": "body{}"});

    let resp = app.post_theme(&theme, None, None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await, json!({"error": "Invalid CSRF token"}));

    let (_, cookie) = app.csrf().await;
    let resp = app.post_theme(&theme, Some(&cookie), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert!(!app.static_dir.path().join("css/themes/evil.css").exists());
}

#[tokio::test]
async fn save_theme_with_wrong_token_is_forbidden() {
    let app = setup().await;
    let (_, cookie) = app.csrf().await;
    let (other_token, _) = app.csrf().await;

    let theme = json!({"id": "evil", "css": "body{}"});
    for token in ["invalid_token", "", other_token.as_str()] {
        let resp = app.post_theme(&theme, Some(&cookie), Some(token)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "token {token:?}");
    }
}

#[tokio::test]
async fn save_theme_with_valid_token() {
    let app = setup().await;
    let (token, cookie) = app.csrf().await;

    let theme = json!({
        "id": "Night Owl",
        "name": "Night Owl",
        "description": "For late sessions",
        "css": "body { background: #011627; }"
    });
    let resp = app.post_theme(&theme, Some(&cookie), Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"success": true, "id": "nightowl"}));

    // The token is not consumed by validation.
    let resp = app.post_theme(&theme, Some(&cookie), Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let themes = json_body(app.get("/api/themes", None).await).await;
    assert_eq!(
        themes["themes"][0],
        json!({
            "id": "nightowl",
            "name": "Night Owl",
            "description": "For late sessions",
            "file": "/static/css/themes/nightowl.css"
        })
    );

    let css = app.get("/static/css/themes/nightowl.css", None).await;
    assert_eq!(css.status(), StatusCode::OK);
    assert!(text_body(css).await.ends_with("body { background: #011627; }"));
}

#[tokio::test]
async fn save_theme_rejects_invalid_input() {
    let app = setup().await;
    let (token, cookie) = app.csrf().await;

    let resp = app
        .post_theme(&json!({"id": "../../"}), Some(&cookie), Some(&token))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await, json!({"error": "Invalid theme"}));
}

// ── Misc ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let app = setup().await;
    let resp = app.get("/api/health", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let app = setup().await;
    for uri in ["/api/health", "/", "/api/file?path=/etc/passwd"] {
        let resp = app.get(uri, None).await;
        let headers = resp.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff", "{uri}");
        assert_eq!(headers["x-frame-options"], "DENY", "{uri}");
        assert_eq!(headers["referrer-policy"], "same-origin", "{uri}");
        assert_eq!(headers["cache-control"], "no-store", "{uri}");
        assert!(headers.contains_key("content-security-policy"), "{uri}");
    }
}

#[tokio::test]
async fn landing_page_is_served() {
    let app = setup().await;
    let resp = app.get("/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(text_body(resp).await.contains("<title>mdview</title>"));

    let resp = app.get("/app.js", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(text_body(resp).await.contains("escapeHtml"));
}
