//! Integration tests for the checkout flow.
//!
//! Covers:
//! - Cash-on-delivery submission with a percentage code (scenario A)
//! - Wallet-transfer submission and admin approval (scenario B)
//! - Payment preconditions blocking submission with no partial state
//! - Cart validation
//! - Quote previews never consuming discount quota

mod common;

use axum::http::Method;
use common::{decimal_field, response_json, CodeSeed, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn cart_payload(payment: Value) -> Value {
    let mut payload = json!({
        "lines": [
            {
                "product_id": Uuid::new_v4(),
                "title": "Ceramic mug",
                "unit_price": 1000,
                "quantity": 2,
                "image_ref": "products/mug.jpg"
            }
        ],
        "customer": {
            "name": "Asha Shrestha",
            "email": "asha@example.com",
            "phone": "9800000001",
            "shipping_address": "12 Lakeside Rd, Pokhara"
        }
    });
    payload
        .as_object_mut()
        .unwrap()
        .extend(payment.as_object().unwrap().clone());
    payload
}

#[tokio::test]
async fn cod_checkout_applies_percentage_code_and_records_history() {
    let app = TestApp::new().await;
    app.seed_code(CodeSeed::percentage("SAVE10", dec!(10))).await;

    let payload = cart_payload(json!({
        "payment_method": "cash_on_delivery",
        "discount_code": "SAVE10"
    }));

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(decimal_field(&data["subtotal"]), dec!(2000));
    assert_eq!(decimal_field(&data["discount_amount"]), dec!(200));
    assert_eq!(decimal_field(&data["total_amount"]), dec!(1800));
    assert_eq!(data["discount_code"], "SAVE10");
    assert_eq!(data["order_status"], "processing");
    assert_eq!(data["payment_status"], "pending");
    assert_eq!(data["items"].as_array().unwrap().len(), 1);

    // Exactly one history entry: "Order placed".
    let order_id = data["id"].as_str().unwrap();
    let history_response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}/history", order_id),
            None,
        )
        .await;
    assert_eq!(history_response.status(), 200);
    let history = response_json(history_response).await;
    let entries = history["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["notes"], "Order placed");
    assert_eq!(entries[0]["order_status"], "processing");
}

#[tokio::test]
async fn checkout_consumes_one_use_of_the_applied_code() {
    let app = TestApp::new().await;
    let code = app.seed_code(CodeSeed::percentage("SAVE10", dec!(10))).await;

    let payload = cart_payload(json!({
        "payment_method": "cash_on_delivery",
        "discount_code": "save10"
    }));
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 201);

    let code_response = app
        .admin_request(Method::GET, &format!("/api/v1/discounts/{}", code.id), None)
        .await;
    let body = response_json(code_response).await;
    assert_eq!(body["data"]["current_uses"], 1);
}

#[tokio::test]
async fn wallet_transfer_checkout_awaits_verification_then_approval_confirms() {
    let app = TestApp::new().await;

    let payload = cart_payload(json!({
        "payment_method": "wallet_transfer",
        "transaction_ref": "TXN123",
        "evidence_ref": "img1"
    }));

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["payment_status"], "pending_verification");
    assert_eq!(body["data"]["order_status"], "processing");

    // Admin verifies the evidence: both axes move atomically.
    let approve = app
        .admin_request(
            Method::POST,
            &format!("/api/v1/orders/{}/approve-payment", order_id),
            None,
        )
        .await;
    assert_eq!(approve.status(), 200);
    let approved = response_json(approve).await;
    assert_eq!(approved["data"]["payment_status"], "paid");
    assert_eq!(approved["data"]["order_status"], "confirmed");

    // Two history entries in total: placement and the approval.
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
    assert_eq!(entries[1]["payment_status"], "paid");
    assert_eq!(entries[1]["order_status"], "confirmed");
}

#[tokio::test]
async fn wallet_transfer_without_evidence_fails_and_persists_nothing() {
    let app = TestApp::new().await;

    let payload = cart_payload(json!({
        "payment_method": "wallet_transfer",
        "transaction_ref": "TXN123"
    }));

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("evidence is required"));

    // No order was created.
    let list = response_json(app.admin_request(Method::GET, "/api/v1/orders", None).await).await;
    assert_eq!(list["data"]["total"], 0);
}

#[tokio::test]
async fn wallet_transfer_without_transaction_ref_is_rejected() {
    let app = TestApp::new().await;

    let payload = cart_payload(json!({
        "payment_method": "wallet_transfer",
        "evidence_ref": "img1"
    }));

    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("transaction reference"));
}

#[tokio::test]
async fn empty_cart_is_rejected_before_persistence() {
    let app = TestApp::new().await;

    let payload = json!({
        "lines": [],
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
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Cart is empty"));
}

#[tokio::test]
async fn order_without_discount_totals_exactly_the_subtotal() {
    let app = TestApp::new().await;

    let payload = cart_payload(json!({ "payment_method": "cash_on_delivery" }));
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(payload))
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    assert_eq!(
        decimal_field(&body["data"]["subtotal"]),
        decimal_field(&body["data"]["total_amount"])
    );
    assert_eq!(decimal_field(&body["data"]["discount_amount"]), dec!(0));
    assert_eq!(body["data"]["discount_code"], Value::Null);
}

#[tokio::test]
async fn quote_previews_pricing_without_consuming_quota() {
    let app = TestApp::new().await;
    let code = app.seed_code(CodeSeed::percentage("SAVE10", dec!(10))).await;

    let payload = json!({
        "lines": [
            { "product_id": Uuid::new_v4(), "title": "Ceramic mug", "unit_price": 1000, "quantity": 2 }
        ],
        "discount_code": "SAVE10"
    });

    let response = app
        .request(Method::POST, "/api/v1/checkout/quote", Some(payload))
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(decimal_field(&body["data"]["subtotal"]), dec!(2000));
    assert_eq!(decimal_field(&body["data"]["discount_amount"]), dec!(200));
    assert_eq!(decimal_field(&body["data"]["total"]), dec!(1800));
    assert_eq!(body["data"]["discount_code"], "SAVE10");

    // Preview is side-effect free.
    let code_body = response_json(
        app.admin_request(Method::GET, &format!("/api/v1/discounts/{}", code.id), None)
            .await,
    )
    .await;
    assert_eq!(code_body["data"]["current_uses"], 0);
}

#[tokio::test]
async fn payment_methods_advertise_their_required_fields() {
    let app = TestApp::new().await;

    let body = response_json(
        app.request(Method::GET, "/api/v1/checkout/payment-methods", None)
            .await,
    )
    .await;
    let methods = body["data"].as_array().unwrap();
    assert_eq!(methods.len(), 2);

    let wallet = methods
        .iter()
        .find(|m| m["method"] == "wallet_transfer")
        .unwrap();
    assert_eq!(wallet["required_fields"]["transaction_ref"], true);
    assert_eq!(wallet["required_fields"]["evidence"], true);
    assert_eq!(wallet["initial_payment_status"], "pending_verification");

    let cod = methods
        .iter()
        .find(|m| m["method"] == "cash_on_delivery")
        .unwrap();
    assert_eq!(cod["required_fields"]["transaction_ref"], false);
    assert_eq!(cod["required_fields"]["evidence"], false);
    assert_eq!(cod["initial_payment_status"], "pending");
}

#[tokio::test]
async fn evidence_metadata_contract_is_enforced() {
    let app = TestApp::new().await;

    let oversized = json!({ "content_type": "image/png", "size_bytes": 50 * 1024 * 1024 });
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/evidence/validate",
            Some(oversized),
        )
        .await;
    assert_eq!(response.status(), 400);

    let pdf = json!({ "content_type": "application/pdf", "size_bytes": 1024 });
    let response = app
        .request(Method::POST, "/api/v1/checkout/evidence/validate", Some(pdf))
        .await;
    assert_eq!(response.status(), 400);

    let ok = json!({ "content_type": "image/jpeg", "size_bytes": 1024 });
    let response = app
        .request(Method::POST, "/api/v1/checkout/evidence/validate", Some(ok))
        .await;
    assert_eq!(response.status(), 200);
}
