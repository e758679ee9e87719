use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::workflows::fulfillment::router::{accept_handler, create_handler};
use crate::workflows::fulfillment::{fulfillment_router, JobStatus, VENDOR_HEADER};

fn post_json(uri: &str, payload: &serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(payload).expect("serialize")))
        .expect("request")
}

fn vendor_post(uri: &str, vendor: &str) -> Request<Body> {
    Request::post(uri)
        .header(VENDOR_HEADER, vendor)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test(start_paused = true)]
async fn create_route_returns_created_with_the_offer() {
    let harness = harness(vec![vendor("shop", 1.0, cents(100))]);
    let router = fulfillment_router(harness.service.clone());

    let payload = serde_json::to_value(print_request()).expect("payload");
    let response = router
        .oneshot(post_json("/api/v1/jobs", &payload))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], json!("awaiting_acceptance"));
    assert_eq!(body["vendor_id"], json!("shop"));
    assert_eq!(body["total_price"], json!("10.00"));
    assert_eq!(body["deadline"], json!("decision_window"));
    assert!(body["tracking_code"].as_str().is_some());
}

#[tokio::test(start_paused = true)]
async fn create_handler_maps_validation_to_unprocessable() {
    let harness = harness(Vec::new());
    let mut request = print_request();
    request.page_count = 0;

    let response = create_handler(State(harness.service.clone()), axum::Json(request)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(harness.jobs.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unparseable_paper_size_is_rejected_before_the_service() {
    let harness = harness(Vec::new());
    let router = fulfillment_router(harness.service.clone());

    let mut payload = serde_json::to_value(print_request()).expect("payload");
    payload["paper_size"] = json!("B9");
    let response = router
        .oneshot(post_json("/api/v1/jobs", &payload))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(harness.jobs.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn vendor_routes_require_the_vendor_header() {
    let harness = harness(vec![vendor("shop", 1.0, cents(100))]);
    let job = harness.service.create_job(print_request()).expect("created");
    let router = fulfillment_router(harness.service.clone());

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/vendor/jobs/{}/accept", job.id))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        harness.jobs.stored(&job.id).status,
        JobStatus::AwaitingAcceptance
    );
}

#[tokio::test(start_paused = true)]
async fn vendor_errors_map_to_forbidden_and_conflict() {
    let harness = harness(vec![vendor("shop", 1.0, cents(100))]);
    let job = harness.service.create_job(print_request()).expect("created");

    let router = fulfillment_router(harness.service.clone());
    let response = router
        .oneshot(vendor_post(
            &format!("/api/v1/vendor/jobs/{}/accept", job.id),
            "intruder",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let router = fulfillment_router(harness.service.clone());
    let response = router
        .oneshot(vendor_post(
            &format!("/api/v1/vendor/jobs/{}/complete", job.id),
            "shop",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test(start_paused = true)]
async fn accept_handler_reports_the_new_status() {
    let harness = harness(vec![vendor("shop", 1.0, cents(100))]);
    let job = harness.service.create_job(print_request()).expect("created");
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(VENDOR_HEADER, "shop".parse().expect("header value"));

    let response = accept_handler(
        State(harness.service.clone()),
        Path(job.id.to_string()),
        headers,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], json!("accepted"));
    assert!(body.get("deadline").is_none());
}

#[tokio::test(start_paused = true)]
async fn unknown_jobs_and_codes_are_not_found() {
    let harness = harness(Vec::new());

    for uri in [
        "/api/v1/jobs/not-a-uuid".to_string(),
        format!("/api/v1/jobs/{}", crate::workflows::fulfillment::JobId::new()),
        "/api/v1/tracking/ABCD2345".to_string(),
    ] {
        let router = fulfillment_router(harness.service.clone());
        let response = router
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test(start_paused = true)]
async fn tracking_lookup_is_case_insensitive() {
    let harness = harness(vec![vendor("shop", 1.0, cents(100))]);
    let job = harness.service.create_job(print_request()).expect("created");
    let router = fulfillment_router(harness.service.clone());

    let uri = format!("/api/v1/tracking/{}", job.tracking_code.0.to_lowercase());
    let response = router
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["job_id"], json!(job.id.to_string()));
}

#[tokio::test(start_paused = true)]
async fn quote_route_lists_ranked_vendors() {
    let harness = harness(vec![
        vendor("near", 3.0, cents(200)),
        vendor("cheap", 5.0, cents(100)),
    ]);
    let router = fulfillment_router(harness.service.clone());

    let request = print_request();
    let payload = json!({
        "page_count": request.page_count,
        "paper_size": "A4",
        "color": false,
        "duplex": false,
        "copies": 1,
        "customer_location": { "latitude": ORIGIN.latitude, "longitude": ORIGIN.longitude },
    });
    let response = router
        .oneshot(post_json("/api/v1/quotes", &payload))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let vendors = body["vendors"].as_array().expect("vendor list");
    assert_eq!(vendors.len(), 2);
    assert_eq!(vendors[0]["vendor_id"], json!("cheap"));
}

#[tokio::test(start_paused = true)]
async fn vendor_queue_lists_pending_offers() {
    let harness = harness(vec![vendor("shop", 1.0, cents(100))]);
    let job = harness.service.create_job(print_request()).expect("created");
    let router = fulfillment_router(harness.service.clone());

    let response = router
        .oneshot(
            Request::get("/api/v1/vendor/jobs")
                .header(VENDOR_HEADER, "shop")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let listed = body.as_array().expect("job list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["job_id"], json!(job.id.to_string()));
    assert_eq!(listed[0]["status"], json!("awaiting_acceptance"));
}
