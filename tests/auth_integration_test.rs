//! Registration, login, token rotation and lockout through the HTTP surface.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp, PASSWORD};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use sms_api::entities::login_attempt;

#[tokio::test]
async fn self_service_registration_creates_company_and_manager() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Nordic Bulk").await;

    let (status, me) = app
        .call(Method::GET, "/auth/me", None, &tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "manager");
    assert_eq!(me["company_id"], tenant.company_id.to_string());

    let (status, company) = app
        .call(
            Method::GET,
            &format!("/api/v1/companies/{}", tenant.company_id),
            None,
            &tenant.manager_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(company["name"], "Nordic Bulk");
    assert_eq!(company["subscription_tier"], "none");
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let app = TestApp::new().await;
    app.register_company("Aegean Lines").await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "email": "manager@aegean-lines.test",
                "password": PASSWORD,
                "name": "Someone Else",
                "company_name": "Another Company",
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_password_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "email": "captain@weak.test",
                "password": "password",
                "name": "Captain",
                "company_name": "Weak Shipping",
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_admins_register_staff_into_a_company() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Baltic Feeder").await;
    let staff = json!({
        "email": "tech@baltic.test",
        "password": PASSWORD,
        "name": "Deck Technician",
        "company_id": tenant.company_id,
        "role": "technician",
    });

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(staff.clone()),
            Some(&tenant.manager_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.admin_token().await;
    let response = app
        .request(Method::POST, "/auth/register", Some(staff), Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["user"]["role"], "technician");
    assert!(body.get("tokens").is_none());
}

#[tokio::test]
async fn refresh_rotates_and_revokes_the_presented_token() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Coral Tankers").await;

    let login = response_json(app.login(&tenant.manager_email, PASSWORD).await).await;
    let refresh = login["refresh_token"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": refresh })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = response_json(response).await;
    assert_ne!(rotated["refresh_token"], login["refresh_token"]);

    let replay = app
        .request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": refresh })),
            None,
        )
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    // an access token is not accepted where a refresh token is expected
    let wrong_kind = app
        .request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": login["access_token"] })),
            None,
        )
        .await;
    assert_eq!(wrong_kind.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_refreshes_rotate_a_token_once() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Reef Carriers").await;

    let login = response_json(app.login(&tenant.manager_email, PASSWORD).await).await;
    let body = json!({ "refresh_token": login["refresh_token"] });
    let refresh = || app.request(Method::POST, "/auth/refresh", Some(body.clone()), None);

    let (a, b, c, d) = tokio::join!(refresh(), refresh(), refresh(), refresh());
    let statuses = [a.status(), b.status(), c.status(), d.status()];
    let granted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    assert_eq!(granted, 1, "{:?}", statuses);
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::OK || *s == StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn logout_blacklists_the_access_token() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Pacific Reefers").await;

    let response = app
        .request(Method::POST, "/auth/logout", None, Some(&tenant.manager_token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, "/api/v1/vessels", None, Some(&tenant.manager_token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn repeated_failures_lock_the_account_for_the_window() {
    let app = TestApp::new().await;
    let tenant = app.register_company("Atlantic Ro-Ro").await;

    for _ in 0..5 {
        let response = app.login(&tenant.manager_email, "Wrong-password-1").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // even the right password is refused while locked out
    let response = app.login(&tenant.manager_email, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // refused attempts are recorded too
    let recorded = login_attempt::Entity::find()
        .filter(login_attempt::Column::Email.eq(tenant.manager_email.clone()))
        .count(&*app.state.db)
        .await
        .expect("count login attempts");
    assert_eq!(recorded, 6);

    let admin = app.admin_token().await;
    let (status, scan) = app
        .call(Method::POST, "/api/v1/security/scan", None, &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(scan["alerts_raised"].as_u64().unwrap() >= 1, "{}", scan);

    let (status, alerts) = app
        .call(Method::GET, "/api/v1/security/alerts", None, &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!alerts["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn protected_routes_need_a_valid_token_and_permission() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/vessels", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/vessels", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let tenant = app.register_company("Hanse Coasters").await;
    let response = app
        .request(Method::GET, "/api/v1/security/alerts", None, Some(&tenant.manager_token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_requests_get_the_error_envelope() {
    let app = TestApp::new().await;

    let response = app
        .request_with_headers(
            Method::POST,
            "/auth/login",
            &[("content-type", "application/json")],
            b"{\"email\": ".to_vec(),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["message"].is_string());

    // well-formed JSON of the wrong shape
    let response = app
        .request(Method::POST, "/auth/login", Some(json!({ "email": 42 })), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["code"], "BAD_REQUEST");

    let tenant = app.register_company("Garbled Freight").await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/vessels/not-a-uuid", None, &tenant.manager_token)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["timestamp"].is_string());
}
