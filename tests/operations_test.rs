//! Shipboard operations: offline sync, running hours, faults, HSE board,
//! chat, attachments and the role dashboard.

mod common;

use axum::http::{Method, StatusCode};
use base64::Engine;
use chrono::{Duration, Utc};
use common::{id_of, response_json, TestApp, Tenant};
use serde_json::{json, Value};

struct Ship {
    admin: String,
    tenant: Tenant,
    technician: String,
    vessel_id: String,
    equipment_id: String,
    part_id: String,
}

async fn ship(app: &TestApp, name: &str) -> Ship {
    let admin = app.admin_token().await;
    let tenant = app.register_company(name).await;
    app.activate(&admin, &tenant, "basic").await;
    let onboarded = app.onboard_vessel(&tenant.manager_token, "9176187", 10, 2).await;
    let slug = name.to_lowercase().replace(' ', "-");
    let technician = app
        .add_staff(&admin, &tenant, &format!("engineer@{}.test", slug), "technician")
        .await;
    Ship {
        admin,
        technician,
        vessel_id: id_of(&onboarded["vessel"]),
        equipment_id: id_of(&onboarded["equipment"][0]),
        part_id: id_of(&onboarded["parts"][0]),
        tenant,
    }
}

#[tokio::test]
async fn offline_batch_is_applied_once() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Offline Lines").await;

    let batch = json!({ "operations": [
        {
            "client_op_id": "tablet-1:0001",
            "op_type": "equipment.hours",
            "payload": { "equipment_id": ship.equipment_id, "running_hours": 1350 },
        },
        {
            "client_op_id": "tablet-1:0002",
            "op_type": "part.adjust",
            "payload": { "part_id": ship.part_id, "delta": -2, "reason": "filter change" },
        },
        {
            "client_op_id": "tablet-1:0003",
            "op_type": "fault.report",
            "payload": {
                "vessel_id": ship.vessel_id,
                "equipment_id": ship.equipment_id,
                "title": "Exhaust temperature high",
                "description": "Cylinder 3 exhaust 40C above the others",
                "severity": "high",
            },
        },
    ]});

    let (status, first) = app
        .call(Method::POST, "/api/v1/sync", Some(batch.clone()), &ship.technician)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["applied"], 3);
    assert_eq!(first["failed"], 0);

    let (status, replay) = app
        .call(Method::POST, "/api/v1/sync", Some(batch), &ship.technician)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["applied"], 0);
    assert_eq!(replay["duplicates"], 3);
    assert!(replay["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["status"] == "duplicate"));

    // the adjustment landed exactly once
    let (_, part) = app
        .call(
            Method::GET,
            &format!("/api/v1/parts/{}", ship.part_id),
            None,
            &ship.technician,
        )
        .await;
    assert_eq!(part["quantity"], 8);

    let (_, faults) = app
        .call(
            Method::GET,
            &format!("/api/v1/faults?vessel_id={}", ship.vessel_id),
            None,
            &ship.tenant.manager_token,
        )
        .await;
    assert_eq!(faults["pagination"]["total"], 1);
}

#[tokio::test]
async fn concurrent_replays_apply_an_operation_once() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Racing Tablets").await;

    let batch = json!({ "operations": [{
        "client_op_id": "tablet-1:7",
        "op_type": "part.adjust",
        "payload": { "part_id": ship.part_id, "delta": -1 },
    }]});
    let send = || app.call(Method::POST, "/api/v1/sync", Some(batch.clone()), &ship.technician);
    let (a, b, c, d) = tokio::join!(send(), send(), send(), send());

    let mut applied = 0;
    for (status, body) in [a, b, c, d] {
        assert_eq!(status, StatusCode::OK, "{}", body);
        match body["results"][0]["status"].as_str() {
            Some("applied") => applied += 1,
            Some("duplicate") => {}
            other => panic!("unexpected sync status {:?}: {}", other, body),
        }
    }
    assert_eq!(applied, 1);

    let (_, part) = app
        .call(
            Method::GET,
            &format!("/api/v1/parts/{}", ship.part_id),
            None,
            &ship.technician,
        )
        .await;
    assert_eq!(part["quantity"], 9);
}

#[tokio::test]
async fn failed_operation_is_retried_on_replay() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Retry Shipping").await;

    let batch = |hours: i64| {
        json!({ "operations": [{
            "client_op_id": "tablet-3:0001",
            "op_type": "equipment.hours",
            "payload": { "equipment_id": ship.equipment_id, "running_hours": hours },
        }]})
    };
    let (_, first) = app
        .call(Method::POST, "/api/v1/sync", Some(batch(10)), &ship.technician)
        .await;
    assert_eq!(first["results"][0]["status"], "failed");

    let (_, second) = app
        .call(Method::POST, "/api/v1/sync", Some(batch(1500)), &ship.technician)
        .await;
    assert_eq!(second["results"][0]["status"], "applied", "{}", second);

    let (_, third) = app
        .call(Method::POST, "/api/v1/sync", Some(batch(1500)), &ship.technician)
        .await;
    assert_eq!(third["results"][0]["status"], "duplicate");
}

#[tokio::test]
async fn failed_sync_operation_is_reported_per_item() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Partial Sync").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/sync",
            Some(json!({ "operations": [
                {
                    "client_op_id": "tablet-2:0001",
                    "op_type": "equipment.hours",
                    "payload": { "equipment_id": ship.equipment_id, "running_hours": 10 },
                },
                {
                    "client_op_id": "tablet-2:0002",
                    "op_type": "part.adjust",
                    "payload": { "part_id": ship.part_id, "delta": 1 },
                },
            ]})),
            &ship.technician,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["applied"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["results"][0]["status"], "failed");
    assert!(body["results"][0]["error"].is_string());
    assert_eq!(body["results"][1]["status"], "applied");
}

#[tokio::test]
async fn running_hours_only_move_forward() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Hour Meter").await;
    let uri = format!("/api/v1/equipment/{}/hours", ship.equipment_id);

    let (status, equipment) = app
        .call(Method::POST, &uri, Some(json!({ "running_hours": 1800 })), &ship.technician)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", equipment);
    assert_eq!(equipment["running_hours"], 1800);

    let (status, _) = app
        .call(Method::POST, &uri, Some(json!({ "running_hours": 1700 })), &ship.technician)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 1800 hours against a 500 hour interval since 0
    let (status, due) = app
        .call(
            Method::GET,
            "/api/v1/equipment/maintenance-due",
            None,
            &ship.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(due["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn technician_reports_and_manager_resolves_a_fault() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Fault Finders").await;

    let (status, fault) = app
        .call(
            Method::POST,
            "/api/v1/faults",
            Some(json!({
                "vessel_id": ship.vessel_id,
                "equipment_id": ship.equipment_id,
                "title": "Fuel leak",
                "description": "Weeping at the injector return line",
                "severity": "critical",
            })),
            &ship.technician,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", fault);
    assert_eq!(fault["status"], "open");

    let uri = format!("/api/v1/faults/{}/status", id_of(&fault));
    let (status, _) = app
        .call(
            Method::POST,
            &uri,
            Some(json!({ "status": "closed" })),
            &ship.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, resolved) = app
        .call(
            Method::POST,
            &uri,
            Some(json!({ "status": "resolved", "resolution_notes": "Return line replaced" })),
            &ship.tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", resolved);
    assert_eq!(resolved["status"], "resolved");
    assert!(!resolved["resolved_at"].is_null());

    let (_, dashboard) = app
        .call(Method::GET, "/api/v1/dashboard", None, &ship.tenant.manager_token)
        .await;
    assert_eq!(dashboard["role"], "manager");
    assert_eq!(dashboard["open_faults"], 0);
}

#[tokio::test]
async fn hse_board_counts_items_needing_attention() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Safety First").await;
    let now = Utc::now();
    let token = &ship.tenant.manager_token;

    let items = [
        json!({
            "vessel_id": ship.vessel_id,
            "category": "certificate",
            "title": "Safety Management Certificate",
            "expires_at": now - Duration::days(3),
        }),
        json!({
            "vessel_id": ship.vessel_id,
            "category": "certificate",
            "title": "Load Line Certificate",
            "expires_at": now + Duration::days(400),
        }),
        json!({
            "vessel_id": ship.vessel_id,
            "category": "drill",
            "title": "Abandon ship drill",
            "due_at": now - Duration::days(1),
        }),
        json!({
            "vessel_id": ship.vessel_id,
            "category": "incident",
            "title": "Slip on deck",
            "severity": "minor",
        }),
    ];
    let mut ids = Vec::new();
    for item in items {
        let (status, body) = app.call(Method::POST, "/api/v1/hse", Some(item), token).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        ids.push(id_of(&body));
    }

    // a drill without a due date is rejected
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/hse",
            Some(json!({ "vessel_id": ship.vessel_id, "category": "drill", "title": "Fire drill" })),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, board) = app.call(Method::GET, "/api/v1/hse/board", None, token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["attention_count"], 3);
    assert_eq!(board["totals"]["certificate"]["expired"], 1);
    assert_eq!(board["totals"]["certificate"]["compliant"], 1);
    assert_eq!(board["totals"]["drill"]["overdue"], 1);
    assert_eq!(board["vessels"][0]["vessel_id"], ship.vessel_id);

    let (status, closed) = app
        .call(Method::POST, &format!("/api/v1/hse/{}/close", ids[3]), None, token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["compliance_status"], "closed");

    let (status, completed) = app
        .call(Method::POST, &format!("/api/v1/hse/{}/complete", ids[2]), None, token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["compliance_status"], "completed");

    let (_, board) = app.call(Method::GET, "/api/v1/hse/board", None, token).await;
    assert_eq!(board["attention_count"], 1);
}

#[tokio::test]
async fn vessel_chat_is_shared_within_the_company() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Chatty Crew").await;
    let channel = format!("/api/v1/chat/messages?vessel_id={}", ship.vessel_id);

    let (status, posted) = app
        .call(
            Method::POST,
            "/api/v1/chat/messages",
            Some(json!({ "vessel_id": ship.vessel_id, "body": "Filters changed on ME" })),
            &ship.technician,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", posted);

    let (status, empty) = app
        .call(
            Method::POST,
            "/api/v1/chat/messages",
            Some(json!({ "vessel_id": ship.vessel_id, "body": "   " })),
            &ship.technician,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", empty);

    let (status, messages) = app
        .call(Method::GET, &channel, None, &ship.tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages["data"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "Filters changed on ME");

    let outsider = app.register_company("Eavesdroppers").await;
    let (status, _) = app
        .call(Method::GET, &channel, None, &outsider.manager_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attachments_are_stored_and_served_back() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Paper Trail").await;
    let content = b"ME overhaul report".to_vec();

    let (status, file) = app
        .call(
            Method::POST,
            "/api/v1/files",
            Some(json!({
                "entity_type": "equipment",
                "entity_id": ship.equipment_id,
                "file_name": "../../etc/overhaul.txt",
                "content_type": "text/plain",
                "content_base64": base64::engine::general_purpose::STANDARD.encode(&content),
            })),
            &ship.technician,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", file);
    assert_eq!(file["file_name"], "overhaul.txt");
    assert_eq!(file["size_bytes"], content.len());
    assert!(file.get("storage_path").is_none());

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/files/{}", id_of(&file)),
            None,
            Some(&ship.tenant.manager_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), content.as_slice());

    let (status, listed) = app
        .call(
            Method::GET,
            &format!("/api/v1/files?entity_type=equipment&entity_id={}", ship.equipment_id),
            None,
            &ship.technician,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn dashboard_is_shaped_by_role() {
    let app = TestApp::new().await;
    let ship = ship(&app, "Dash Lines").await;

    let (status, admin) = app
        .call(Method::GET, "/api/v1/dashboard", None, &ship.admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin["role"], "admin");
    assert_eq!(admin["companies"], 1);
    assert_eq!(admin["vessels"], 1);

    let (status, tech) = app
        .call(Method::GET, "/api/v1/dashboard", None, &ship.technician)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tech["role"], "technician");
    assert!(tech["assigned_faults"].as_array().unwrap().is_empty());

    let response = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let health: Value = response_json(response).await;
    assert!(health.is_object());
}
