use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SMS API",
        version = "0.3.0",
        description = r#"
# Smart Maintenance System

Backend for shipping companies running planned maintenance aboard their fleet.

- **Onboarding**: vessels with their equipment and spare parts in one request
- **Maintenance**: running hours, service intervals, fault reports
- **Inventory**: stock adjustments, low-stock alerts, valuation
- **Procurement**: purchase orders with platform markup, invoices, card and PayPal webhooks
- **HSE**: certificates, drills, incidents and inspections with a compliance board
- **Crew**: chat, notifications, file attachments, offline sync

## Authentication

Obtain a token pair from `/auth/login` and send the access token on every call:

```
Authorization: Bearer <access-token>
```

## Pagination

List endpoints take `page` (from 1) and `per_page` (at most 100) and answer with
`{ "data": [...], "pagination": { "page", "per_page", "total", "total_pages" } }`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and token refresh"),
        (name = "companies", description = "Tenants and subscriptions"),
        (name = "tokens", description = "Activation codes"),
        (name = "users", description = "Company staff"),
        (name = "vessels", description = "Fleet and onboarding"),
        (name = "equipment", description = "Machinery and planned maintenance"),
        (name = "parts", description = "Spare-part stock"),
        (name = "alerts", description = "Low-stock alerts"),
        (name = "purchase-orders", description = "Procurement"),
        (name = "invoices", description = "Billing"),
        (name = "webhooks", description = "Payment provider callbacks"),
        (name = "faults", description = "Fault reports"),
        (name = "hse", description = "Health, safety and environment"),
        (name = "chat", description = "Company and vessel channels"),
        (name = "notifications", description = "In-app notifications"),
        (name = "files", description = "Attachments"),
        (name = "sync", description = "Offline operation replay"),
        (name = "security", description = "Failed-login monitoring"),
        (name = "dashboard", description = "Role dashboards")
    ),
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh_token,
        handlers::auth::logout,
        handlers::auth::get_current_user,

        handlers::companies::list_companies,
        handlers::companies::get_company,
        handlers::companies::update_company,
        handlers::companies::get_subscription,

        handlers::tokens::generate_codes,
        handlers::tokens::list_codes,
        handlers::tokens::revoke_code,
        handlers::tokens::redeem_code,

        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::deactivate_user,

        handlers::vessels::list_vessels,
        handlers::vessels::create_vessel,
        handlers::vessels::onboard_vessel,
        handlers::vessels::get_vessel,
        handlers::vessels::update_vessel,
        handlers::vessels::delete_vessel,
        handlers::vessels::vessel_summary,

        handlers::equipment::list_equipment,
        handlers::equipment::create_equipment,
        handlers::equipment::get_equipment,
        handlers::equipment::update_equipment,
        handlers::equipment::delete_equipment,
        handlers::equipment::record_hours,
        handlers::equipment::log_maintenance,
        handlers::equipment::maintenance_due,

        handlers::parts::list_parts,
        handlers::parts::create_part,
        handlers::parts::get_part,
        handlers::parts::update_part,
        handlers::parts::delete_part,
        handlers::parts::adjust_stock,
        handlers::parts::low_stock,
        handlers::parts::valuation,

        handlers::alerts::list_alerts,
        handlers::alerts::get_alert,
        handlers::alerts::resolve_alert,
        handlers::alerts::check_stock,
        handlers::alerts::order_from_alert,

        handlers::purchase_orders::list_purchase_orders,
        handlers::purchase_orders::create_purchase_order,
        handlers::purchase_orders::get_purchase_order,
        handlers::purchase_orders::submit_purchase_order,
        handlers::purchase_orders::approve_purchase_order,
        handlers::purchase_orders::cancel_purchase_order,
        handlers::purchase_orders::receive_purchase_order,
        handlers::purchase_orders::issue_invoice,

        handlers::invoices::list_invoices,
        handlers::invoices::get_invoice,
        handlers::invoices::download_pdf,
        handlers::invoices::mark_paid,
        handlers::invoices::void_invoice,
        handlers::invoices::revenue,

        handlers::webhooks::stripe_webhook,
        handlers::webhooks::paypal_webhook,

        handlers::faults::list_faults,
        handlers::faults::report_fault,
        handlers::faults::get_fault,
        handlers::faults::update_fault_status,
        handlers::faults::assign_fault,

        handlers::hse::list_hse,
        handlers::hse::create_hse,
        handlers::hse::get_hse,
        handlers::hse::update_hse,
        handlers::hse::delete_hse,
        handlers::hse::complete_drill,
        handlers::hse::close_incident,
        handlers::hse::hse_board,

        handlers::chat::list_messages,
        handlers::chat::post_message,

        handlers::notifications::list_notifications,
        handlers::notifications::unread_count,
        handlers::notifications::mark_read,
        handlers::notifications::mark_all_read,

        handlers::files::upload_file,
        handlers::files::list_files,
        handlers::files::download_file,
        handlers::files::file_metadata,
        handlers::files::delete_file,

        handlers::sync::apply_batch,

        handlers::security::list_security_alerts,
        handlers::security::acknowledge_alert,
        handlers::security::run_monitor,

        handlers::dashboard::dashboard,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            handlers::common::PaginationMeta,
            crate::entities::company::Model,
            crate::entities::activation_code::Model,
            crate::entities::vessel::Model,
            crate::entities::equipment::Model,
            crate::entities::part::Model,
            crate::entities::low_stock_alert::Model,
            crate::entities::purchase_order::Model,
            crate::entities::purchase_order_item::Model,
            crate::entities::invoice::Model,
            crate::entities::fault::Model,
            crate::entities::hse_update::Model,
            crate::entities::chat_message::Model,
            crate::entities::notification::Model,
            crate::entities::file_attachment::Model,
            crate::entities::security_alert::Model,
            crate::services::equipment::MaintenanceDue,
            crate::services::sync::SyncResult,
        )
    )
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_sms_paths_and_bearer_scheme() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).expect("serializable");
        assert!(json.contains("SMS API"));
        assert!(json.contains("/api/v1/vessels/onboard"));
        assert!(json.contains("/api/v1/purchase-orders/{id}/approve"));
        assert!(json.contains("/auth/login"));
        assert!(json.contains("bearer_auth"));
    }
}
