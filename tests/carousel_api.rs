use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use carousel_forge::{
    app,
    audit::AuditLog,
    config::AccessPolicy,
    error::UpstreamError,
    models::{NarrativeOut, StyleDna, StyleFamily, STYLE_DNA_SOURCE, STYLE_DNA_VERSION},
    pipeline::CarouselOrchestrator,
    routes::AppState,
    selection::basic_catalog,
    services::{ImageModel, IntelligenceModel, NarrativeRequest},
    store::InMemoryStore,
};

const ADMIN: &str = "ops@example.com";

#[derive(Default)]
struct StubIntelligence {
    style_calls: AtomicUsize,
    narrative_calls: AtomicUsize,
}

#[async_trait]
impl IntelligenceModel for StubIntelligence {
    async fn analyze_reference_image(&self, _image_url: &str, _model: &str) -> Result<StyleDna, UpstreamError> {
        self.style_calls.fetch_add(1, Ordering::SeqCst);
        Ok(StyleDna {
            version: STYLE_DNA_VERSION.into(),
            source: STYLE_DNA_SOURCE.into(),
            family: StyleFamily::Photo,
            render_medium: "editorial photo".into(),
            line_quality: None,
            shading: Some("soft".into()),
            lighting: Some("window light".into()),
            texture: None,
            color_behavior: None,
            palette: vec!["#fafafa".into()],
            description: Some("Quiet editorial photography".into()),
            confidence: Some(0.9),
            positives: vec!["clean framing".into()],
            negatives: vec!["no clutter".into()],
        })
    }

    async fn generate_narrative(&self, request: &NarrativeRequest, _model: &str) -> Result<NarrativeOut, UpstreamError> {
        self.narrative_calls.fetch_add(1, Ordering::SeqCst);
        Ok(NarrativeOut {
            slide: request.slide,
            subject: format!("barista sirviendo cafe, escena {}", request.slide),
            context: None,
            emotion: Some(vec!["calma".into()]),
        })
    }
}

/// Later slides answer faster than earlier ones.
#[derive(Default)]
struct StubImages {
    calls: AtomicUsize,
    fail_on_slide: Option<usize>,
}

#[async_trait]
impl ImageModel for StubImages {
    async fn generate_image(&self, prompt: &str, _model: &str, _aspect_ratio: Option<&str>) -> Result<String, UpstreamError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(n as u64 * 4))).await;
        if self.fail_on_slide == Some(n) {
            return Err(UpstreamError::Status { status: 503, message: "image backend unavailable".into() });
        }
        assert!(prompt.contains(&format!("slide {} of", n + 1)));
        Ok(format!("https://cdn.test/slide-{n}.png"))
    }
}

struct TestApp {
    router: Router,
    intelligence: Arc<StubIntelligence>,
    images: Arc<StubImages>,
}

fn test_app(images: StubImages) -> TestApp {
    let intelligence = Arc::new(StubIntelligence::default());
    let images = Arc::new(images);
    let store = Arc::new(InMemoryStore::default());
    let (audit, _worker) = AuditLog::spawn(store.clone(), 32);
    let orchestrator = CarouselOrchestrator::new(
        intelligence.clone(),
        images.clone(),
        store.clone(),
        audit,
        Duration::from_secs(5),
    );
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        store,
        access: Arc::new(AccessPolicy::new([ADMIN])),
        compositions: Arc::new(basic_catalog()),
    };
    TestApp { router: app(state), intelligence, images }
}

fn generate_body(slides: usize) -> Value {
    let slides: Vec<Value> = (0..slides)
        .map(|i| {
            json!({
                "slide": i,
                "guidance": format!("barista en la barra, paso {i}"),
                "text": { "headline": if i == 0 { "50% OFF HOY".to_string() } else { format!("Paso {i}") }, "body": "Solo esta semana" }
            })
        })
        .collect();
    json!({
        "brandId": "brand_1",
        "brandLock": {
            "brandName": "Cafe Lumen",
            "palette": { "background": "#f0e500", "text": "#141210", "accent": "#ff6a00" },
            "tone": ["cercano"]
        },
        "layoutSpec": { "blueprintId": "basic-hero", "rules": ["Headline in the top third", "Subject centered"] },
        "referenceImageUrl": "https://ref.test/look.png",
        "slides": slides,
        "textModel": "gemini-2.5-flash",
        "imageModel": "gemini-2.5-flash-image",
        "aspectRatio": "4:5"
    })
}

fn post(uri: &str, user: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: &str, email: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header("x-user-id", user);
    if let Some(email) = email {
        builder = builder.header("x-user-email", email);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

fn remote_calls(app: &TestApp) -> usize {
    app.intelligence.style_calls.load(Ordering::SeqCst)
        + app.intelligence.narrative_calls.load(Ordering::SeqCst)
        + app.images.calls.load(Ordering::SeqCst)
}

#[tokio::test]
async fn anonymous_callers_get_401_before_validation() {
    let app = test_app(StubImages::default());
    let (status, body) = send(&app.router, post("/api/carousel/generate", None, &json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(remote_calls(&app), 0);
}

#[tokio::test]
async fn missing_fields_are_a_bad_request() {
    let app = test_app(StubImages::default());
    let mut body = generate_body(2);
    body.as_object_mut().unwrap().remove("imageModel");
    let (status, body) = send(&app.router, post("/api/carousel/generate", Some("u1"), &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("imageModel"));
    assert_eq!(remote_calls(&app), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = test_app(StubImages::default());
    let request = Request::builder()
        .method("POST")
        .uri("/api/carousel/generate")
        .header("content-type", "application/json")
        .header("x-user-id", "u1")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forbidden_layout_tokens_stop_the_run_before_any_remote_call() {
    let app = test_app(StubImages::default());
    let mut body = generate_body(3);
    body["layoutSpec"]["rules"] = json!(["neon chrome finish"]);
    let (status, body) = send(&app.router, post("/api/carousel/generate", Some("u1"), &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("forbidden"));
    assert_eq!(remote_calls(&app), 0);
}

#[tokio::test]
async fn repeated_slide_indices_are_a_bad_request() {
    let app = test_app(StubImages::default());
    let mut body = generate_body(3);
    body["slides"][1]["slide"] = json!(0);
    let (status, body) = send(&app.router, post("/api/carousel/generate", Some("u1"), &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Duplicate slide index: 0");
    assert_eq!(remote_calls(&app), 0);
}

#[tokio::test]
async fn three_slides_end_to_end() {
    let app = test_app(StubImages::default());
    let (status, body) = send(&app.router, post("/api/carousel/generate", Some("u1"), &generate_body(3))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["styleDNA"]["family"], "photo");

    let results = body["results"].as_array().unwrap();
    let slides: Vec<u64> = results.iter().map(|r| r["slide"].as_u64().unwrap()).collect();
    assert_eq!(slides, vec![0, 1, 2]);
    let urls: Vec<&str> = results.iter().map(|r| r["imageUrl"].as_str().unwrap()).collect();
    assert_eq!(urls, vec!["https://cdn.test/slide-0.png", "https://cdn.test/slide-1.png", "https://cdn.test/slide-2.png"]);
    assert!(results[0]["prompt"].as_str().unwrap().contains("50% OFF HOY"));
    assert!(!results[0]["prompt"].as_str().unwrap().contains("CTA:"));

    let id = body["carouselId"].as_str().unwrap();
    let (status, stored) = send(&app.router, get(&format!("/api/carousels/{id}"), "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "complete");
    assert_eq!(stored["slides"].as_array().unwrap().len(), 3);

    let (status, _) = send(&app.router, get(&format!("/api/carousels/{id}"), "someone-else", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, get(&format!("/api/carousels/{id}"), "admin-user", Some(ADMIN))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn five_slides_keep_their_order() {
    let app = test_app(StubImages::default());
    let (status, body) = send(&app.router, post("/api/carousel/generate", Some("u1"), &generate_body(5))).await;
    assert_eq!(status, StatusCode::OK);
    let slides: Vec<u64> = body["results"].as_array().unwrap().iter().map(|r| r["slide"].as_u64().unwrap()).collect();
    assert_eq!(slides, vec![0, 1, 2, 3, 4]);
    assert_eq!(app.intelligence.style_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.intelligence.narrative_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn image_failure_on_third_slide_keeps_earlier_slides() {
    let app = test_app(StubImages { fail_on_slide: Some(2), ..Default::default() });
    let (status, body) = send(&app.router, post("/api/carousel/generate", Some("u1"), &generate_body(4))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("image backend unavailable"));
    assert_eq!(app.images.calls.load(Ordering::SeqCst), 3);

    let (status, carousels) = send(&app.router, get("/api/carousels", "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    let carousel = &carousels[0];
    assert_eq!(carousel["status"], "failed");
    let slides = carousel["slides"].as_array().unwrap();
    assert_eq!(slides[0]["imageUrl"], "https://cdn.test/slide-0.png");
    assert_eq!(slides[1]["imageUrl"], "https://cdn.test/slide-1.png");
    assert!(slides[2].get("imageUrl").is_none());
    assert_eq!(slides.len(), 3);
}

#[tokio::test]
async fn economic_events_are_admin_only() {
    let app = test_app(StubImages::default());
    let (status, _) = send(&app.router, post("/api/carousel/generate", Some("u1"), &generate_body(2))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, get("/api/admin/economic-events", "u1", Some("guest@example.com"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // style analysis + 2 narratives + 2 images, written by the background worker
    let mut events = Value::Null;
    for _ in 0..50 {
        let (status, body) = send(&app.router, get("/api/admin/economic-events", "admin", Some(ADMIN))).await;
        assert_eq!(status, StatusCode::OK);
        if body.as_array().map(|a| a.len()) == Some(5) {
            events = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let phases: Vec<&str> = events.as_array().unwrap().iter().map(|e| e["phase"].as_str().unwrap()).collect();
    assert_eq!(phases, vec!["image", "narrative", "image", "narrative", "style_analysis"]);

    let (_, limited) = send(&app.router, get("/api/admin/economic-events?limit=2", "admin", Some(ADMIN))).await;
    assert_eq!(limited.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn compositions_can_be_listed_and_selected() {
    let app = test_app(StubImages::default());
    let (status, catalog) = send(&app.router, get("/api/carousel/compositions", "u1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!catalog.as_array().unwrap().is_empty());

    let request = json!({ "prompt": "Oferta de verano, reserva ya", "slideCount": 4 });
    let (status, first) = send(&app.router, post("/api/carousel/compositions/select", Some("u1"), &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["seed"], "carousel|Oferta de verano, reserva ya|4");
    assert!(!first["layoutSpec"]["rules"].as_array().unwrap().is_empty());

    let (_, second) = send(&app.router, post("/api/carousel/compositions/select", Some("u1"), &request)).await;
    assert_eq!(first["composition"]["id"], second["composition"]["id"]);
}
