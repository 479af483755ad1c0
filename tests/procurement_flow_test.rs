//! Low-stock alerts through purchase orders, invoices and payment webhooks.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{id_of, response_json, TestApp, Tenant, WEBHOOK_SECRET};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use sms_api::services::invoices::InvoiceService;
use sms_api::webhooks::{sign_payload, STRIPE_SIGNATURE_HEADER};

fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a money value: {}", other),
    }
}

struct Fleet {
    admin: String,
    tenant: Tenant,
    vessel_id: String,
    part_id: String,
}

/// Activated company with one vessel carrying 5 fuel filters (minimum 2)
async fn fleet(app: &TestApp) -> Fleet {
    let admin = app.admin_token().await;
    let tenant = app.register_company("Harbour Works").await;
    app.activate(&admin, &tenant, "professional").await;
    let onboarded = app.onboard_vessel(&tenant.manager_token, "9074729", 5, 2).await;
    Fleet {
        admin,
        vessel_id: id_of(&onboarded["vessel"]),
        part_id: id_of(&onboarded["parts"][0]),
        tenant,
    }
}

async fn adjust(app: &TestApp, fleet: &Fleet, delta: i32) -> Value {
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/parts/{}/adjust", fleet.part_id),
            Some(json!({ "delta": delta, "reason": "consumed during overhaul" })),
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

/// Draft → submitted → approved → invoiced; returns (order id, invoice)
async fn invoiced_order(app: &TestApp, fleet: &Fleet, quantity: i32) -> (String, Value) {
    let (status, order) = app
        .call(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "vessel_id": fleet.vessel_id,
                "items": [{ "part_id": fleet.part_id, "quantity": quantity }],
            })),
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    let id = id_of(&order);
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/submit", id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/approve", id),
            None,
            &fleet.admin,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, invoice) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/invoice", id),
            None,
            &fleet.admin,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", invoice);
    (id, invoice)
}

async fn post_stripe(app: &TestApp, body: &Value, secret: &str) -> (StatusCode, Value) {
    let payload = serde_json::to_vec(body).unwrap();
    let ts = chrono::Utc::now().timestamp().to_string();
    let signature = format!("t={},v1={}", ts, sign_payload(secret, &ts, &payload));
    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/webhooks/stripe",
            &[
                (STRIPE_SIGNATURE_HEADER, signature.as_str()),
                ("content-type", "application/json"),
            ],
            payload,
            None,
        )
        .await;
    let status = response.status();
    (status, response_json(response).await)
}

#[tokio::test]
async fn low_stock_opens_a_single_alert_and_notifies_admins() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;

    let first = adjust(&app, &fleet, -3).await;
    assert_eq!(first["part"]["quantity"], 2);
    assert_eq!(first["alert"]["status"], "admin_notified");

    let second = adjust(&app, &fleet, -1).await;
    assert!(second["alert"].is_null(), "no second alert while one is open");

    let (status, open) = app
        .call(
            Method::GET,
            "/api/v1/alerts?open=true",
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open["pagination"]["total"], 1);

    // the scheduled scan finds nothing new either
    let (status, report) = app
        .call(Method::POST, "/api/v1/alerts/check", None, &fleet.admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["alerts_opened"], 0);
    assert_eq!(report["parts_below_minimum"], 1);

    let (status, notes) = app
        .call(Method::GET, "/api/v1/notifications", None, &fleet.admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(notes["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["kind"] == "low_stock"));

    // the vessel email waits for the configured delay
    let report = app.dispatcher().drain_once().await.unwrap();
    assert_eq!(report.sent, 0);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn vessel_is_emailed_once_the_delay_has_passed() {
    let app = TestApp::with_config(|cfg| cfg.vessel_notification_delay_secs = 0).await;
    let fleet = fleet(&app).await;
    let alert = adjust(&app, &fleet, -4).await["alert"].clone();
    let alert_id = id_of(&alert);

    let report = app.dispatcher().drain_once().await.unwrap();
    assert_eq!(report.sent, 1);
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "master.9074729@fleet.test");
    assert!(sent[0].subject.contains("Fuel filter"));

    let (status, alert) = app
        .call(
            Method::GET,
            &format!("/api/v1/alerts/{}", alert_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alert["status"], "vessel_notified");
    assert!(!alert["vessel_notified_at"].is_null());

    // nothing left to send
    let report = app.dispatcher().drain_once().await.unwrap();
    assert_eq!(report.sent, 0);
}

#[tokio::test]
async fn ordering_from_an_alert_links_and_cancelling_unlinks() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;
    let alert_id = id_of(&adjust(&app, &fleet, -4).await["alert"]);

    let uri = format!("/api/v1/alerts/{}/purchase-order", alert_id);
    let (status, order) = app
        .call(Method::POST, &uri, None, &fleet.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    // 1 in stock, minimum 2: reorder tops up to 4
    assert_eq!(order["items"][0]["quantity"], 3);
    assert_eq!(order["alert_id"], alert_id);

    let (status, _) = app
        .call(Method::POST, &uri, None, &fleet.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, alert) = app
        .call(
            Method::GET,
            &format!("/api/v1/alerts/{}", alert_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(alert["status"], "ordered");

    let (status, cancelled) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/cancel", id_of(&order)),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, alert) = app
        .call(
            Method::GET,
            &format!("/api/v1/alerts/{}", alert_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(alert["status"], "admin_notified");
    assert!(alert["purchase_order_id"].is_null());
}

#[tokio::test]
async fn purchase_order_applies_markup_and_follows_the_state_machine() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;

    let (status, order) = app
        .call(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "vessel_id": fleet.vessel_id,
                "items": [
                    { "part_id": fleet.part_id, "quantity": 4 },
                    { "description": "Gasket set", "quantity": 1, "unit_price": "120.00" },
                ],
            })),
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    assert_eq!(order["status"], "draft");
    assert!(order["po_number"].as_str().unwrap().starts_with("PO-"));
    assert_eq!(money(&order["subtotal"]), dec!(302.00));
    assert_eq!(money(&order["markup_amount"]), dec!(60.40));
    assert_eq!(money(&order["total"]), dec!(362.40));
    let id = id_of(&order);

    // approval needs a submitted order and an administrator
    let approve = format!("/api/v1/purchase-orders/{}/approve", id);
    let (status, _) = app.call(Method::POST, &approve, None, &fleet.admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, submitted) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/submit", id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["status"], "submitted");

    let (status, _) = app
        .call(Method::POST, &approve, None, &fleet.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app.call(Method::POST, &approve, None, &fleet.admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    // goods are received only after invoicing
    let receive = format!("/api/v1/purchase-orders/{}/receive", id);
    let (status, _) = app
        .call(Method::POST, &receive, None, &fleet.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/invoice", id),
            None,
            &fleet.admin,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, received) = app
        .call(Method::POST, &receive, None, &fleet.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["status"], "received");

    let (_, part) = app
        .call(
            Method::GET,
            &format!("/api/v1/parts/{}", fleet.part_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(part["quantity"], 9);

    // a vessel with purchase history cannot be deleted
    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/vessels/{}", fleet.vessel_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invoice_is_issued_once_with_pdf_and_email() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;
    let (order_id, invoice) = invoiced_order(&app, &fleet, 2).await;

    assert_eq!(invoice["status"], "issued");
    assert_eq!(money(&invoice["subtotal"]), dec!(91.00));
    assert_eq!(money(&invoice["total"]), dec!(109.20));
    let number = invoice["invoice_number"].as_str().unwrap().to_string();
    assert!(number.starts_with("INV-"), "{}", number);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/invoice", order_id),
            None,
            &fleet.admin,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // only the committed invoice has a document on disk
    let stored: Vec<_> = std::fs::read_dir(app.state.config.invoices_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(stored, vec![format!("{}.pdf", number)]);
    assert!(std::path::Path::new(invoice["pdf_path"].as_str().unwrap()).exists());

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/invoices/{}/pdf", id_of(&invoice)),
            None,
            Some(&fleet.tenant.manager_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    let report = app.dispatcher().drain_once().await.unwrap();
    assert_eq!(report.sent, 1);
    let sent = app.mailer.sent();
    assert_eq!(sent[0].to, fleet.tenant.manager_email);
    assert!(sent[0].subject.contains(&number));
    assert_eq!(sent[0].attachments.len(), 1);
    assert_eq!(sent[0].attachments[0].content_type, "application/pdf");
}

#[tokio::test]
async fn stripe_webhook_pays_the_invoice_exactly_once() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;
    let (_, invoice) = invoiced_order(&app, &fleet, 1).await;
    let invoice_id = id_of(&invoice);

    let event = json!({
        "id": "evt_paid_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "payment_intent": "pi_test_1",
            "metadata": { "invoice_id": invoice_id },
        }},
    });

    let (status, _) = post_stripe(&app, &event, "whsec_wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, outcome) = post_stripe(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "processed");

    let (status, outcome) = post_stripe(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "duplicate");

    let (_, paid) = app
        .call(
            Method::GET,
            &format!("/api/v1/invoices/{}", invoice_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["payment_provider"], "stripe");
    assert_eq!(paid["payment_reference"], "pi_test_1");

    let stray = json!({
        "id": "evt_unknown_invoice",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_x", "metadata": { "invoice_id": uuid::Uuid::new_v4() } } },
    });
    let (status, outcome) = post_stripe(&app, &stray, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "ignored");

    let (status, revenue) = app
        .call(Method::GET, "/api/v1/invoices/revenue", None, &fleet.admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revenue["paid_invoices"], 1);
    assert_eq!(money(&revenue["markup_revenue"]), dec!(9.10));
}

#[tokio::test]
async fn paypal_webhook_uses_the_timestamp_signature_pair() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;
    let (_, invoice) = invoiced_order(&app, &fleet, 1).await;

    let payload = serde_json::to_vec(&json!({
        "id": "WH-PAYPAL-1",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": { "id": "CAPTURE-1", "custom_id": id_of(&invoice) },
    }))
    .unwrap();
    let ts = chrono::Utc::now().timestamp().to_string();
    let signature = sign_payload(WEBHOOK_SECRET, &ts, &payload);

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/webhooks/paypal",
            &[("x-timestamp", ts.as_str()), ("x-signature", signature.as_str())],
            payload,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["status"], "processed");
}

#[tokio::test]
async fn overdue_sweep_flags_unpaid_invoices_once() {
    let app = TestApp::with_config(|cfg| cfg.invoice_due_days = -1).await;
    let fleet = fleet(&app).await;
    let (_, invoice) = invoiced_order(&app, &fleet, 1).await;
    let invoice_id = id_of(&invoice);

    let invoices = app.state.services.invoices.clone();
    assert_eq!(invoices.sweep_overdue().await.unwrap().marked_overdue, 1);
    assert_eq!(invoices.sweep_overdue().await.unwrap().marked_overdue, 0);

    let (_, overdue) = app
        .call(
            Method::GET,
            &format!("/api/v1/invoices/{}", invoice_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(overdue["status"], "overdue");

    // overdue invoices can still be settled
    let (status, paid) = app
        .call(
            Method::POST,
            &format!("/api/v1/invoices/{}/mark-paid", invoice_id),
            Some(json!({ "provider": "bank_transfer", "reference": "SWIFT-778" })),
            &fleet.admin,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/invoices/{}/void", invoice_id),
            None,
            &fleet.admin,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settled_invoices_are_not_overwritten_by_stale_transitions() {
    let app = TestApp::with_config(|cfg| cfg.invoice_due_days = -1).await;
    let fleet = fleet(&app).await;
    let (_, invoice) = invoiced_order(&app, &fleet, 1).await;
    let invoice_id = id_of(&invoice);
    let path = format!("/api/v1/invoices/{}/mark-paid", invoice_id);
    let body = json!({ "provider": "bank_transfer", "reference": "SWIFT-901" });

    let (first, second) = tokio::join!(
        app.call(Method::POST, &path, Some(body.clone()), &fleet.admin),
        app.call(Method::POST, &path, Some(body.clone()), &fleet.admin),
    );
    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    // an overdue decision taken before the payment landed must not apply
    let id = uuid::Uuid::parse_str(&invoice_id).unwrap();
    let flipped = InvoiceService::mark_overdue(&*app.state.db, id, chrono::Utc::now())
        .await
        .unwrap();
    assert!(!flipped);
    assert_eq!(
        app.state.services.invoices.sweep_overdue().await.unwrap().marked_overdue,
        0
    );

    let (_, stored) = app
        .call(
            Method::GET,
            &format!("/api/v1/invoices/{}", invoice_id),
            None,
            &fleet.admin,
        )
        .await;
    assert_eq!(stored["status"], "paid");
    assert_eq!(stored["payment_reference"], "SWIFT-901");
}

#[tokio::test]
async fn oversized_order_lines_are_rejected() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;

    for item in [
        json!({ "description": "Hull plating", "quantity": 1_000_000, "unit_price": "70000000000000000000000000" }),
        json!({ "description": "Hull plating", "quantity": 2_000_000_000, "unit_price": "1.00" }),
    ] {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/purchase-orders",
                Some(json!({ "vessel_id": fleet.vessel_id, "items": [item] })),
                &fleet.tenant.manager_token,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert!(body["message"].is_string(), "{}", body);
    }

    // the service is still answering
    let (status, _) = app
        .call(Method::GET, "/api/v1/purchase-orders", None, &fleet.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stock_quantities_stay_within_limits() {
    let app = TestApp::new().await;
    let fleet = fleet(&app).await;
    let adjust_path = format!("/api/v1/parts/{}/adjust", fleet.part_id);

    for delta in [1_000_000, i32::MAX] {
        let (status, body) = app
            .call(
                Method::POST,
                &adjust_path,
                Some(json!({ "delta": delta })),
                &fleet.tenant.manager_token,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    for (quantity, minimum, cost) in [
        (2_000_000_000, 1, "10.00"),
        (1, i32::MAX, "10.00"),
        (1, 1, "79228162514264337593543950335"),
    ] {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/parts",
                Some(json!({
                    "vessel_id": fleet.vessel_id,
                    "part_number": "GSK-900",
                    "name": "Head gasket",
                    "quantity": quantity,
                    "minimum_quantity": minimum,
                    "unit_cost": cost,
                })),
                &fleet.tenant.manager_token,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }

    // the part is untouched and still listed
    let (status, part) = app
        .call(
            Method::GET,
            &format!("/api/v1/parts/{}", fleet.part_id),
            None,
            &fleet.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(part["quantity"], 5);
}

#[tokio::test]
async fn a_part_has_at_most_one_unresolved_alert() {
    use sea_orm::{ActiveModelTrait, Set, SqlErr};
    use sms_api::entities::low_stock_alert;

    let app = TestApp::new().await;
    let fleet = fleet(&app).await;
    let first = adjust(&app, &fleet, -3).await;
    let open = &first["alert"];
    assert_eq!(open["status"], "admin_notified");

    // a racing writer that missed the open alert is stopped by the database
    let now = chrono::Utc::now();
    let duplicate = low_stock_alert::ActiveModel {
        id: Set(uuid::Uuid::new_v4()),
        part_id: Set(uuid::Uuid::parse_str(&fleet.part_id).unwrap()),
        vessel_id: Set(uuid::Uuid::parse_str(&fleet.vessel_id).unwrap()),
        company_id: Set(uuid::Uuid::parse_str(open["company_id"].as_str().unwrap()).unwrap()),
        quantity_at_alert: Set(2),
        minimum_quantity: Set(2),
        status: Set("open".to_string()),
        purchase_order_id: Set(None),
        admin_notified_at: Set(None),
        vessel_notified_at: Set(None),
        resolved_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect_err("second unresolved alert");
    assert!(matches!(
        duplicate.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(_))
    ));

    // restocking resolves it, and the next shortage opens a fresh one
    adjust(&app, &fleet, 10).await;
    let again = adjust(&app, &fleet, -10).await;
    assert_eq!(again["alert"]["status"], "admin_notified");
    assert_ne!(again["alert"]["id"], open["id"]);
}
