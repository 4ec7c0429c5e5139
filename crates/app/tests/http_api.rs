//! HTTP surface tests driving the real router with a stub camera and a
//! stub detector.

use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use anyhow::Result;
use detect_core::{Detection, Detector};
use image::RgbImage;
use serde_json::Value;
use video_capture::CaptureSource;

use lookout::data::AppState;
use lookout::detection_log::DetectionLog;
use lookout::server;

struct StubDetector {
    detections: Vec<Detection>,
}

impl Detector for StubDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}

fn cat_detection() -> Detection {
    Detection {
        bbox: [10.0, 10.0, 50.0, 50.0],
        label: "cat".to_string(),
        confidence: 0.9,
    }
}

fn stub_state(detections: Vec<Detection>) -> AppState {
    AppState {
        capture: Arc::new(CaptureSource::open("stub://camera", (64, 48)).unwrap()),
        detector: Arc::new(StubDetector { detections }),
        log: DetectionLog::new(),
        jpeg_quality: 85,
    }
}

fn png_fixture() -> Vec<u8> {
    let image = RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}

macro_rules! service {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(server::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn index_points_at_the_stream() {
    let state = stub_state(vec![]);
    let app = service!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("/video"));
}

#[actix_web::test]
async fn detections_snapshot_starts_empty() {
    let state = stub_state(vec![]);
    let app = service!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/detections").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detected_objects"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn upload_rejects_undecodable_bodies_with_400() {
    let state = stub_state(vec![cat_detection()]);
    let app = service!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/upload")
            .set_payload(&b"not an image"[..])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid image");
    // A rejected upload must not touch the shared log.
    assert!(state.log.snapshot().is_empty());
}

#[actix_web::test]
async fn upload_returns_labels_and_feeds_the_shared_log() {
    let state = stub_state(vec![cat_detection()]);
    let app = service!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/upload")
            .set_payload(png_fixture())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detected"], serde_json::json!(["cat"]));

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/detections").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detected_objects"], serde_json::json!(["cat"]));
}

#[actix_web::test]
async fn upload_with_no_detections_returns_an_empty_set() {
    let state = stub_state(vec![]);
    let app = service!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/upload")
            .set_payload(png_fixture())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detected"].as_array().unwrap().len(), 0);
    assert!(state.log.snapshot().is_empty());
}

#[actix_web::test]
async fn video_responds_with_a_multipart_stream() {
    let state = stub_state(vec![cat_detection()]);
    let app = service!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/video?width=320&height=240")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "multipart/x-mixed-replace; boundary=frame"
    );
    // Dropping the response here is the client-disconnect path; the shared
    // capture source must stay usable for the next session.
    drop(resp);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/video").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn video_tolerates_garbage_dimensions() {
    let state = stub_state(vec![]);
    let app = service!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/video?width=abc&height=-4")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}
