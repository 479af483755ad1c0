//! Activation codes, tier vessel limits and tenant isolation.

mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use serde_json::json;

fn vessel(imo: &str) -> serde_json::Value {
    json!({
        "name": format!("MV {}", imo),
        "imo_number": imo,
        "vessel_type": "container",
    })
}

#[tokio::test]
async fn company_without_subscription_cannot_add_vessels() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Unpaid Shipping").await;

    let (status, body) = app
        .call(Method::POST, "/api/v1/vessels", Some(vessel("9321483")), &tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);
}

#[tokio::test]
async fn basic_tier_allows_three_vessels() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let tenant = app.register_company("Fjord Freight").await;
    app.activate(&admin, &tenant, "basic").await;

    for imo in ["9074729", "9176187", "9288095"] {
        let (status, body) = app
            .call(Method::POST, "/api/v1/vessels", Some(vessel(imo)), &tenant.manager_token)
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }
    let (status, _) = app
        .call(Method::POST, "/api/v1/vessels", Some(vessel("9395044")), &tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, sub) = app
        .call(Method::GET, "/api/v1/subscription", None, &tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sub["active_tier"], "basic");
    assert_eq!(sub["vessel_limit"], 3);
    assert_eq!(sub["vessels_used"], 3);
}

#[tokio::test]
async fn activation_code_is_single_use() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let first = app.register_company("First Mover").await;
    let second = app.register_company("Second Mover").await;

    let (status, codes) = app
        .call(
            Method::POST,
            "/api/v1/tokens",
            Some(json!({ "tier": "professional", "duration_days": 30, "count": 1 })),
            &admin,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = codes["data"][0]["code"].as_str().unwrap().to_string();
    assert!(code.starts_with("SMS-"));

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/tokens/redeem",
            Some(json!({ "code": code.to_lowercase() })),
            &first.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/tokens/redeem",
            Some(json!({ "code": code })),
            &second.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/tokens/redeem",
            Some(json!({ "code": "SMS-2222-3333-4444" })),
            &second.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn managers_cannot_mint_codes() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Sneaky Lines").await;
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/tokens",
            Some(json!({ "tier": "enterprise", "duration_days": 365, "count": 1 })),
            &tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tenants_only_see_their_own_fleet() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let alpha = app.register_company("Alpha Marine").await;
    let beta = app.register_company("Beta Marine").await;
    app.activate(&admin, &alpha, "basic").await;
    app.activate(&admin, &beta, "basic").await;

    let onboarded = app.onboard_vessel(&alpha.manager_token, "9074729", 10, 2).await;
    let vessel_id = id_of(&onboarded["vessel"]);
    let part_id = id_of(&onboarded["parts"][0]);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/vessels/{}", vessel_id),
            None,
            &beta.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/parts/{}/adjust", part_id),
            Some(json!({ "delta": -1 })),
            &beta.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = app
        .call(Method::GET, "/api/v1/vessels", None, &beta.manager_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["pagination"]["total"], 0);

    // the platform admin sees both tenants
    let (status, list) = app.call(Method::GET, "/api/v1/vessels", None, &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["pagination"]["total"], 1);

    // the same IMO number cannot be registered twice
    let (status, _) = app
        .call(Method::POST, "/api/v1/vessels", Some(vessel("9074729")), &beta.manager_token)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn technicians_read_but_do_not_manage_vessels() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let tenant = app.register_company("Crew Test").await;
    app.activate(&admin, &tenant, "basic").await;
    app.onboard_vessel(&tenant.manager_token, "9074729", 10, 2).await;
    let tech = app
        .add_staff(&admin, &tenant, "tech@crew-test.test", "technician")
        .await;

    let (status, list) = app.call(Method::GET, "/api/v1/vessels", None, &tech).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["pagination"]["total"], 1);

    let (status, _) = app
        .call(Method::POST, "/api/v1/vessels", Some(vessel("9176187")), &tech)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn onboarding_rejects_bad_imo_numbers() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let tenant = app.register_company("Typo Shipping").await;
    app.activate(&admin, &tenant, "basic").await;

    let (status, _) = app
        .call(Method::POST, "/api/v1/vessels", Some(vessel("12AB")), &tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
