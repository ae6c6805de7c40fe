use std::str::FromStr;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use rotu_core::config::AppConfig;
use rotu_core::credentials::hash_password;
use rotu_db::fixtures::{AdminSeed, SeedDataset};
use rotu_db::{connect_with_settings, migrations};
use rotu_server::pdf::PdfGenerator;
use rotu_server::state::AppState;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    _dir: TempDir,
}

async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("rotu.db").display());
    let pool = connect_with_settings(&url, 2, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    SeedDataset::load(
        &pool,
        &AdminSeed {
            username: "admin".to_string(),
            email: "admin@rotuprinters.local".to_string(),
            password_hash: hash_password("admin123").expect("hash"),
        },
    )
    .await
    .expect("seed");

    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret".to_string().into();
    let pdf = PdfGenerator::with_embedded_templates().expect("templates").without_converter();

    TestApp { router: rotu_server::app(AppState::new(pool, config, pdf)), _dir: dir }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/users/auth/login",
                None,
                Some(json!({"username": username, "password": password})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access"].as_str().expect("access token").to_string()
    }
}

fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(text) => Decimal::from_str(text).expect("decimal string"),
        Value::Number(number) => Decimal::from_str(&number.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = spawn_app().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"]["status"], "ready");
}

#[tokio::test]
async fn api_requires_a_token() {
    let app = spawn_app().await;
    let (status, body) = app.send(Method::GET, "/api/clients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["correlation_id"].is_string());
}

#[tokio::test]
async fn login_rejects_a_wrong_password() {
    let app = spawn_app().await;
    let (status, _) = app
        .send(
            Method::POST,
            "/api/users/auth/login",
            None,
            Some(json!({"username": "admin", "password": "nope"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn designers_cannot_operate_sales() {
    let app = spawn_app().await;
    let admin = app.login("admin", "admin123").await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/users",
            Some(&admin),
            Some(json!({
                "username": "disena",
                "email": "disena@rotuprinters.local",
                "password": "disena-pass-1",
                "role": "DESIGNER"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let designer = app.login("disena", "disena-pass-1").await;
    let (status, _) = app.send(Method::GET, "/api/clients", Some(&designer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(Method::GET, "/api/inventory/products", Some(&designer), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn client_validation_errors_are_keyed_by_field() {
    let app = spawn_app().await;
    let token = app.login("admin", "admin123").await;
    let (status, body) = app
        .send(Method::POST, "/api/clients", Some(&token), Some(json!({"name": "", "phone": "9999-0000"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["name"].is_array(), "{body}");
}

#[tokio::test]
async fn quotation_to_completed_sale_moves_stock() {
    let app = spawn_app().await;
    let token = app.login("admin", "admin123").await;
    let token = Some(token.as_str());

    let (status, client) = app
        .send(
            Method::POST,
            "/api/clients",
            token,
            Some(json!({"name": "Maria Castillo", "phone": "9999-0000", "rtn": "08011990123456"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{client}");

    let (status, categories) = app.send(Method::GET, "/api/inventory/categories", token, None).await;
    assert_eq!(status, StatusCode::OK);
    let category_id = categories[0]["id"].clone();

    let (status, product) = app
        .send(
            Method::POST,
            "/api/inventory/products",
            token,
            Some(json!({
                "name": "Vinil blanco",
                "category_id": category_id,
                "unit_measure": "SQM",
                "quantity_available": "100",
                "price_per_square_inch": "10",
                "minimum_stock": "5"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    let product_id = product["id"].clone();

    let (status, quotation) = app
        .send(
            Method::POST,
            "/api/quotations",
            token,
            Some(json!({
                "client_id": client["id"],
                "discount_percentage": "10",
                "items": [{
                    "product_id": product_id,
                    "description": "Rótulo",
                    "width_inches": "2",
                    "height_inches": "3",
                    "price_per_square_inch": "10",
                    "quantity": 2
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{quotation}");
    assert!(quotation["quotation_number"].as_str().expect("number").starts_with("COT-"));
    assert_eq!(dec(&quotation["subtotal"]), Decimal::from(120));
    assert_eq!(dec(&quotation["total_amount"]), Decimal::from(108));

    let quotation_id = quotation["id"].as_i64().expect("id");
    let (status, approved) = app
        .send(Method::POST, &format!("/api/quotations/{quotation_id}/approve"), token, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["status"], "APPROVED");

    let (status, sale) = app
        .send(Method::POST, &format!("/api/quotations/{quotation_id}/convert_to_sale"), token, None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert!(sale["invoice_number"].as_str().expect("invoice").starts_with("FAC-"));
    assert_eq!(dec(&sale["total_amount"]), Decimal::new(12420, 2));

    let (status, body) = app
        .send(Method::POST, &format!("/api/quotations/{quotation_id}/convert_to_sale"), token, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let sale_id = sale["id"].as_i64().expect("id");
    let (status, completed) = app.send(Method::POST, &format!("/api/sales/{sale_id}/complete"), token, None).await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["status"], "COMPLETED");

    let (status, body) = app.send(Method::POST, &format!("/api/sales/{sale_id}/complete"), token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let product_id = product_id.as_i64().expect("id");
    let (_, product) = app
        .send(Method::GET, &format!("/api/inventory/products/{product_id}"), token, None)
        .await;
    assert_eq!(dec(&product["quantity_available"]), Decimal::from(88));

    let (status, dashboard) = app.send(Method::GET, "/api/reports/dashboard", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["sales"]["total_count"], 1);
}

#[tokio::test]
async fn invoice_download_falls_back_to_html() {
    let app = spawn_app().await;
    let token = app.login("admin", "admin123").await;
    let token = Some(token.as_str());

    let (_, client) = app
        .send(Method::POST, "/api/clients", token, Some(json!({"name": "Taller Lopez", "phone": "2222-1111"})))
        .await;
    let (_, categories) = app.send(Method::GET, "/api/inventory/categories", token, None).await;
    let (_, product) = app
        .send(
            Method::POST,
            "/api/inventory/products",
            token,
            Some(json!({"name": "Lona 13oz", "category_id": categories[0]["id"], "quantity_available": "10"})),
        )
        .await;
    let (status, sale) = app
        .send(
            Method::POST,
            "/api/sales",
            token,
            Some(json!({
                "client_id": client["id"],
                "items": [{"product_id": product["id"], "unit_price": "1000", "quantity": 1}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert_eq!(dec(&sale["tax_amount"]), Decimal::from(150));
    assert_eq!(dec(&sale["total_amount"]), Decimal::from(1150));

    let request = Request::builder()
        .uri(format!("/api/sales/{}/generate_pdf", sale["id"]))
        .header(header::AUTHORIZATION, format!("Bearer {}", token.expect("token")))
        .body(Body::empty())
        .expect("request");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()),
        Some("text/html; charset=utf-8")
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let html = String::from_utf8(bytes.to_vec()).expect("utf-8");
    assert!(html.contains(sale["invoice_number"].as_str().expect("invoice")));
    assert!(html.contains("1150.00"));
}

#[tokio::test]
async fn bulk_delete_needs_ids_and_reports_invoice_numbers() {
    let app = spawn_app().await;
    let token = app.login("admin", "admin123").await;
    let token = Some(token.as_str());

    let (status, _) = app.send(Method::POST, "/api/sales/delete_bulk", token, Some(json!({"ids": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, client) = app
        .send(Method::POST, "/api/clients", token, Some(json!({"name": "Ana", "phone": "3333-4444"})))
        .await;
    let (_, sale) = app
        .send(Method::POST, "/api/sales", token, Some(json!({"client_id": client["id"]})))
        .await;
    let (status, body) = app
        .send(Method::POST, "/api/sales/delete_bulk", token, Some(json!({"ids": [sale["id"]]})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["invoice_numbers"][0], sale["invoice_number"]);
}

#[tokio::test]
async fn deleted_products_drop_out_of_the_default_listing() {
    let app = spawn_app().await;
    let token = app.login("admin", "admin123").await;
    let token = Some(token.as_str());

    let (_, categories) = app.send(Method::GET, "/api/inventory/categories", token, None).await;
    let (status, product) = app
        .send(
            Method::POST,
            "/api/inventory/products",
            token,
            Some(json!({"name": "Lona mate", "category_id": categories[0]["id"], "unit_measure": "ROLL"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/inventory/products/{}", product["id"]), token, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, listed) = app.send(Method::GET, "/api/inventory/products", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().expect("list").iter().all(|row| row["id"] != product["id"]));

    let (_, inactive) = app.send(Method::GET, "/api/inventory/products?is_active=false", token, None).await;
    assert!(inactive.as_array().expect("list").iter().any(|row| row["id"] == product["id"]));
}

#[tokio::test]
async fn notes_only_sale_update_keeps_totals() {
    let app = spawn_app().await;
    let token = app.login("admin", "admin123").await;
    let token = Some(token.as_str());

    let (_, client) = app
        .send(Method::POST, "/api/clients", token, Some(json!({"name": "Taller Reyes", "phone": "2222-3333"})))
        .await;
    let (_, categories) = app.send(Method::GET, "/api/inventory/categories", token, None).await;
    let (_, product) = app
        .send(
            Method::POST,
            "/api/inventory/products",
            token,
            Some(json!({"name": "Papel bond", "category_id": categories[0]["id"], "unit_measure": "SHEET"})),
        )
        .await;
    let (status, sale) = app
        .send(
            Method::POST,
            "/api/sales",
            token,
            Some(json!({
                "client_id": client["id"],
                "payment_method": "TRANSFER",
                "discount_percentage": "10",
                "tax_rate": "0",
                "items": [{"product_id": product["id"], "description": "Volantes", "unit_price": "1000"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    assert_eq!(dec(&sale["total_amount"]), Decimal::from(900));

    let (status, updated) = app
        .send(
            Method::PUT,
            &format!("/api/sales/{}", sale["id"]),
            token,
            Some(json!({"client_id": client["id"], "notes": "entregar lunes"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["notes"], "entregar lunes");
    assert_eq!(updated["payment_method"], "TRANSFER");
    assert_eq!(dec(&updated["discount_percentage"]), Decimal::from(10));
    assert_eq!(dec(&updated["tax_rate"]), Decimal::ZERO);
    assert_eq!(dec(&updated["total_amount"]), Decimal::from(900));
    assert_eq!(updated["items"].as_array().map(Vec::len), Some(1));
}
