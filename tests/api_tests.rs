//! End-to-end tests against the HTTP router

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use roofline_lib::api::build_router;
use roofline_lib::db::SqliteDb;
use roofline_lib::error::Result;
use roofline_lib::pricing::{
    CalculationRequest, CalculationResponse, Calculations, PricingGateway,
};
use roofline_lib::state::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Prices everything at cost plus half
struct FlatMarkupGateway;

#[async_trait]
impl PricingGateway for FlatMarkupGateway {
    fn name(&self) -> &'static str {
        "flat-markup"
    }

    async fn calculate(&self, request: &CalculationRequest) -> Result<CalculationResponse> {
        let material_total: f64 = request
            .line_items
            .iter()
            .map(|item| item.quantity * item.unit_cost)
            .sum();
        Ok(CalculationResponse {
            calculations: Calculations {
                material_total,
                selling_price: material_total * 1.5,
                actual_profit_percent: 33.3,
                ..Default::default()
            },
            estimate: None,
        })
    }
}

fn app() -> Router {
    let state = AppState::with_parts(
        Arc::new(SqliteDb::open_in_memory().unwrap()),
        Arc::new(FlatMarkupGateway),
        Default::default(),
    );
    build_router(Arc::new(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn cached_measurement() -> Value {
    json!({
        "measurement": {
            "adjusted_squares": 25.0,
            "adjusted_waste_percent": 10.0,
            "pitch": "6/12",
            "ridge_ft": 40.0,
            "hip_ft": 10.0,
            "eave_ft": 120.0,
            "rake_ft": 60.0,
            "valley_ft": 0.0,
            "perimeter_ft": 180.0
        }
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["pricing_gateway"], "flat-markup");
    assert_eq!(body["data"]["active_sessions"], 0);
}

#[tokio::test]
async fn test_estimate_flow_over_http() {
    let app = app();

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/pipeline/entry-1/metadata",
        Some(cached_measurement()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, "/api/v1/estimates/entry-1/measure", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stage"], "measured");

    let (status, body) = send(&app, Method::POST, "/api/v1/estimates/entry-1/auto-populate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stage"], "populated");
    assert_eq!(body["data"]["line_items"].as_array().unwrap().len(), 6);

    let populated_items = body["data"]["line_items"].clone();

    // Populating again without confirmation keeps the existing items
    let (status, body) = send(&app, Method::POST, "/api/v1/estimates/entry-1/auto-populate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(&app, Method::GET, "/api/v1/estimates/entry-1/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stage"], "populated");
    assert_eq!(body["data"]["line_items"], populated_items);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/estimates/entry-1/calculate",
        Some(json!({
            "customer_name": "Dana Reyes",
            "customer_address": "14 Orchard Lane",
            "roof_type": "shingle"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["request"]["property_details"]["roof_area_sq_ft"], 2500.0);

    let (status, body) = send(&app, Method::POST, "/api/v1/estimates/entry-1/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["estimate_number"], "EST-00001");

    let (status, body) = send(&app, Method::GET, "/api/v1/estimates/number/EST-00001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pipeline_entry_id"], "entry-1");

    let (status, body) = send(&app, Method::GET, "/api/v1/estimates?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_incomplete_measurement_error_envelope() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/estimates/entry-2/measure",
        Some(json!({"manual": {"roof_area_sq_ft": 0.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["line_items"].as_array().unwrap().len(), 0);

    let (status, body) =
        send(&app, Method::POST, "/api/v1/estimates/entry-2/auto-populate?replace=true", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "INCOMPLETE_MEASUREMENT");

    // The failed population left the session as it was
    let (status, body) = send(&app, Method::GET, "/api/v1/estimates/entry-2/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stage"], "measured");
    assert_eq!(body["data"]["line_items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/estimates/nobody/session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&app, Method::DELETE, "/api/v1/estimates/nobody/session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_formula_evaluate() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/formula/evaluate",
        Some(json!({
            "formula": "ceil(total_squares * 3)",
            "values": {"total_squares": 25.0}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["value"], 75.0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/formula/evaluate",
        Some(json!({"formula": "system('rm')", "values": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FORMULA_ERROR");
}

#[tokio::test]
async fn test_pricing_defaults_are_bounded() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/settings/pricing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["target_margin_percent"], 30.0);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/settings/pricing",
        Some(json!({"target_margin_percent": 75.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/settings/pricing",
        Some(json!({"target_margin_percent": 35.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["target_margin_percent"], 35.0);
}

#[tokio::test]
async fn test_template_lifecycle() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/templates",
        Some(json!({
            "name": "Standard Shingle",
            "description": "",
            "items": [{
                "category": "material",
                "name": "Shingles",
                "description": "",
                "quantity_formula": "ceil({{ measure.surface_squares }} * 3)",
                "unit_cost": 35.0,
                "unit_type": "bundle",
                "markup_percent": 0.0
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, Method::GET, "/api/v1/templates", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/templates/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/templates/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_template_with_misspelled_measurement_is_rejected() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/templates",
        Some(json!({
            "name": "Typo",
            "items": [{
                "category": "material",
                "name": "Shingles",
                "quantity_formula": "ceil({{ measure.total_squares }} * 3)",
                "unit_cost": 35.0,
                "unit_type": "bundle"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, body) = send(&app, Method::GET, "/api/v1/templates", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}
