//! Integration tests for the order lifecycle: the forward-only fulfillment
//! walk, the payment verification junction, and the insert-only audit trail.

mod common;

use axum::http::Method;
use common::{response_json, TestApp};
use serde_json::json;
use uuid::Uuid;

async fn place_cod_order(app: &TestApp) -> String {
    let payload = json!({
        "lines": [
            { "product_id": Uuid::new_v4(), "title": "Ceramic mug", "unit_price": 1000, "quantity": 1 }
        ],
        "customer": {
            "name": "Asha Shrestha",
            "phone": "9800000001",
            "shipping_address": "12 Lakeside Rd, Pokhara"
        },
        "payment_method": "cash_on_delivery"
    });
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn place_wallet_order(app: &TestApp) -> String {
    let payload = json!({
        "lines": [
            { "product_id": Uuid::new_v4(), "title": "Ceramic mug", "unit_price": 1000, "quantity": 1 }
        ],
        "customer": {
            "name": "Asha Shrestha",
            "phone": "9800000001",
            "shipping_address": "12 Lakeside Rd, Pokhara"
        },
        "payment_method": "wallet_transfer",
        "transaction_ref": "TXN123",
        "evidence_ref": "img1"
    });
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn history_len(app: &TestApp, order_id: &str) -> usize {
    let body = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/orders/{}/history", order_id),
            None,
        )
        .await,
    )
    .await;
    body["data"].as_array().unwrap().len()
}

#[tokio::test]
async fn fulfillment_walks_the_happy_path_without_touching_payment() {
    let app = TestApp::new().await;
    let order_id = place_cod_order(&app).await;

    let confirm = response_json(
        app.admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/confirm", order_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(confirm["data"]["order_status"], "confirmed");

    let ship = response_json(
        app.admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/ship", order_id),
            Some(json!({ "tracking_number": "TRK-9001" })),
        )
        .await,
    )
    .await;
    assert_eq!(ship["data"]["order_status"], "shipped");
    assert_eq!(ship["data"]["tracking_number"], "TRK-9001");

    let out = response_json(
        app.admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/out-for-delivery", order_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(out["data"]["order_status"], "out_for_delivery");

    let delivered = response_json(
        app.admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/deliver", order_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(delivered["data"]["order_status"], "delivered");
    // The payment axis never moved.
    assert_eq!(delivered["data"]["payment_status"], "pending");

    // Placement + four transitions.
    assert_eq!(history_len(&app, &order_id).await, 5);

    // COD collected at the door; admin records it after delivery.
    let paid = response_json(
        app.admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/mark-paid", order_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(paid["data"]["payment_status"], "paid");
    assert_eq!(paid["data"]["order_status"], "delivered");
}

#[tokio::test]
async fn approving_twice_is_rejected_and_appends_no_history() {
    let app = TestApp::new().await;
    let order_id = place_wallet_order(&app).await;

    let first = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/approve-payment", order_id),
            None,
        )
        .await;
    assert_eq!(first.status(), 200);
    let after_first = history_len(&app, &order_id).await;

    let second = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/approve-payment", order_id),
            None,
        )
        .await;
    assert_eq!(second.status(), 409);
    let body = response_json(second).await;
    assert!(body["message"].as_str().unwrap().contains("Invalid transition"));

    // State and history untouched by the failed attempt.
    assert_eq!(history_len(&app, &order_id).await, after_first);
}

#[tokio::test]
async fn rejecting_payment_cancels_the_order_atomically() {
    let app = TestApp::new().await;
    let order_id = place_wallet_order(&app).await;

    let response = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/reject-payment", order_id),
            Some(json!({ "reason": "screenshot does not match the amount" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["payment_status"], "failed");
    assert_eq!(body["data"]["order_status"], "cancelled");

    let history = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/orders/{}/history", order_id),
            None,
        )
        .await,
    )
    .await;
    let entries = history["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1]["notes"]
        .as_str()
        .unwrap()
        .contains("screenshot does not match"));
}

#[tokio::test]
async fn unverified_orders_cannot_advance_fulfillment() {
    let app = TestApp::new().await;
    let order_id = place_wallet_order(&app).await;

    let response = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/confirm", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn fulfillment_cannot_skip_steps() {
    let app = TestApp::new().await;
    let order_id = place_cod_order(&app).await;

    let response = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/deliver", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn cancel_keeps_the_payment_axis_untouched() {
    let app = TestApp::new().await;
    let order_id = place_cod_order(&app).await;

    let response = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            Some(json!({ "reason": "customer changed their mind" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order_status"], "cancelled");
    assert_eq!(body["data"]["payment_status"], "pending");

    // Terminal: nothing further is accepted.
    let response = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn transitions_require_the_admin_key() {
    let app = TestApp::new().await;
    let order_id = place_cod_order(&app).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/confirm", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), 401);

    let response = app.request(Method::GET, "/api/v1/orders", None).await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn unknown_orders_return_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    let response = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/confirm", missing),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{}", missing), None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn admin_list_filters_by_both_axes() {
    let app = TestApp::new().await;
    let cod = place_cod_order(&app).await;
    let wallet = place_wallet_order(&app).await;

    let body = response_json(
        app.admin_request(
            Method::GET,
            "/api/v1/orders?payment_status=pending_verification",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], wallet.as_str());

    let body = response_json(
        app.admin_request(Method::GET, "/api/v1/orders?order_status=processing", None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["total"], 2);

    app.admin_request(
        Method::POST,
        &format!("/api/v1/orders/{}/cancel", cod),
        None,
    )
    .await;

    let body = response_json(
        app.admin_request(Method::GET, "/api/v1/orders?order_status=cancelled", None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], cod.as_str());
}

#[tokio::test]
async fn order_detail_exposes_lines_and_trail_to_the_customer() {
    let app = TestApp::new().await;
    let order_id = place_cod_order(&app).await;

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 1);
    assert!(body["data"]["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
}
