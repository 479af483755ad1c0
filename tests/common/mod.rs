#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use sms_api::{
    auth::{NewUser, UserRole},
    config::AppConfig,
    db,
    events::{self, outbox::Dispatcher, EventSender},
    notifications::{EmailMessage, MailError, Mailer},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Seaworthy-2024";
pub const ADMIN_EMAIL: &str = "ops@sms.test";
pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";

/// Keeps every message instead of delivering it
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

/// Company created through self-service registration
pub struct Tenant {
    pub company_id: Uuid,
    pub manager_email: String,
    pub manager_token: String,
}

/// Application wired against a throwaway SQLite file and storage directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build the app after letting the caller tweak the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}/sms.db?mode=rwc", dir.path().display()),
            "integration_secret_key_that_is_long_enough_for_hs256_signing_0001".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;
        cfg.jobs_enabled = false;
        cfg.storage_dir = dir.path().join("storage").display().to_string();
        cfg.sms_admin_email = ADMIN_EMAIL.to_string();
        cfg.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.paypal_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(Arc::new(pool), Arc::new(cfg), event_sender, mailer.clone());
        let router = sms_api::build_router(state.clone(), false);

        Self {
            router,
            state,
            mailer,
            _dir: dir,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Raw body with extra headers, for webhooks and uploads
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request and decode the JSON body in one go
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: &str,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, Some(token)).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    pub async fn login_token(&self, email: &str) -> String {
        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK, "login for {}", email);
        let body = response_json(response).await;
        body["access_token"]
            .as_str()
            .expect("access token in login response")
            .to_string()
    }

    /// Creates the platform administrator directly and logs in
    pub async fn admin_token(&self) -> String {
        let exists = self
            .state
            .auth
            .insert_user(
                &*self.state.db,
                NewUser {
                    company_id: None,
                    email: ADMIN_EMAIL.to_string(),
                    name: "SMS Operations".to_string(),
                    password: PASSWORD.to_string(),
                    role: UserRole::Admin,
                },
            )
            .await;
        if let Err(e) = exists {
            assert!(e.to_string().contains("already exists"), "{}", e);
        }
        self.login_token(ADMIN_EMAIL).await
    }

    /// Self-service registration: a company with its first manager
    pub async fn register_company(&self, name: &str) -> Tenant {
        let email = format!("manager@{}.test", name.to_lowercase().replace(' ', "-"));
        let response = self
            .request(
                Method::POST,
                "/auth/register",
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": format!("{} Manager", name),
                    "company_name": name,
                })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        Tenant {
            company_id: body["user"]["company_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .expect("company id on registered manager"),
            manager_email: email,
            manager_token: body["tokens"]["access_token"]
                .as_str()
                .expect("tokens for self-service registration")
                .to_string(),
        }
    }

    /// Issues a code as the admin and redeems it for the tenant
    pub async fn activate(&self, admin: &str, tenant: &Tenant, tier: &str) {
        let (status, codes) = self
            .call(
                Method::POST,
                "/api/v1/tokens",
                Some(json!({ "tier": tier, "duration_days": 365, "count": 1 })),
                admin,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", codes);
        let code = codes["data"][0]["code"].as_str().expect("generated code").to_string();
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/tokens/redeem",
                Some(json!({ "code": code })),
                &tenant.manager_token,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    /// Staff account registered by the admin, returned logged in
    pub async fn add_staff(&self, admin: &str, tenant: &Tenant, email: &str, role: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/auth/register",
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": email,
                    "company_id": tenant.company_id,
                    "role": role,
                })),
                Some(admin),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        self.login_token(email).await
    }

    /// Onboards a vessel with one engine and one part and returns the response body
    pub async fn onboard_vessel(
        &self,
        token: &str,
        imo: &str,
        quantity: i32,
        minimum: i32,
    ) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/vessels/onboard",
                Some(json!({
                    "vessel": {
                        "name": format!("MV {}", imo),
                        "imo_number": imo,
                        "vessel_type": "bulk_carrier",
                        "flag": "Malta",
                        "contact_email": format!("master.{}@fleet.test", imo),
                    },
                    "equipment": [{
                        "name": "Main Engine",
                        "category": "propulsion",
                        "running_hours": 1200,
                        "maintenance_interval_hours": 500,
                    }],
                    "parts": [{
                        "part_number": "FLT-100",
                        "name": "Fuel filter",
                        "quantity": quantity,
                        "minimum_quantity": minimum,
                        "unit_cost": "45.50",
                        "equipment_index": 0,
                    }],
                })),
                token,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.state.db.clone(),
            self.state.mailer.clone(),
            self.state.config.mail_from.clone(),
        )
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}
