pub mod alerts;
pub mod auth;
pub mod chat;
pub mod common;
pub mod companies;
pub mod dashboard;
pub mod equipment;
pub mod faults;
pub mod files;
pub mod hse;
pub mod invoices;
pub mod notifications;
pub mod parts;
pub mod purchase_orders;
pub mod security;
pub mod sync;
pub mod tokens;
pub mod users;
pub mod vessels;
pub mod webhooks;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    alerts::AlertService, chat::ChatService, companies::CompanyService,
    dashboard::DashboardService, equipment::EquipmentService, faults::FaultService,
    files::FileService, hse::HseService, inventory::InventoryService, invoices::InvoiceService,
    notifications::NotificationService, payments::PaymentService,
    purchase_orders::PurchaseOrderService, security::SecurityService, sync::SyncService,
    users::UserService, vessels::VesselService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub companies: Arc<CompanyService>,
    pub users: Arc<UserService>,
    pub vessels: Arc<VesselService>,
    pub equipment: Arc<EquipmentService>,
    pub inventory: Arc<InventoryService>,
    pub alerts: Arc<AlertService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub invoices: Arc<InvoiceService>,
    pub payments: Arc<PaymentService>,
    pub faults: Arc<FaultService>,
    pub hse: Arc<HseService>,
    pub chat: Arc<ChatService>,
    pub notifications: Arc<NotificationService>,
    pub files: Arc<FileService>,
    pub sync: Arc<SyncService>,
    pub security: Arc<SecurityService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        auth: Arc<AuthService>,
        event_sender: EventSender,
    ) -> Self {
        let notifications = Arc::new(NotificationService::new(db.clone(), config.clone()));
        let alerts = Arc::new(AlertService::new(
            db.clone(),
            config.clone(),
            notifications.clone(),
            event_sender.clone(),
        ));
        let equipment = Arc::new(EquipmentService::new(db.clone()));
        let inventory = Arc::new(InventoryService::new(
            db.clone(),
            config.clone(),
            alerts.clone(),
            event_sender.clone(),
        ));
        let faults = Arc::new(FaultService::new(
            db.clone(),
            notifications.clone(),
            event_sender.clone(),
        ));
        let invoices = Arc::new(InvoiceService::new(
            db.clone(),
            config.clone(),
            notifications.clone(),
            event_sender.clone(),
        ));
        let hse = Arc::new(HseService::new(db.clone()));

        Self {
            companies: Arc::new(CompanyService::new(db.clone(), event_sender.clone())),
            users: Arc::new(UserService::new(db.clone(), auth)),
            vessels: Arc::new(VesselService::new(db.clone(), event_sender.clone())),
            purchase_orders: Arc::new(PurchaseOrderService::new(
                db.clone(),
                config.clone(),
                notifications.clone(),
                event_sender.clone(),
            )),
            payments: Arc::new(PaymentService::new(
                db.clone(),
                config.clone(),
                invoices.clone(),
            )),
            chat: Arc::new(ChatService::new(db.clone())),
            files: Arc::new(FileService::new(db.clone(), config.clone())),
            sync: Arc::new(SyncService::new(
                db.clone(),
                faults.clone(),
                equipment.clone(),
                inventory.clone(),
            )),
            security: Arc::new(SecurityService::new(
                db.clone(),
                config,
                notifications.clone(),
                event_sender,
            )),
            dashboard: Arc::new(DashboardService::new(
                db,
                equipment.clone(),
                inventory.clone(),
                invoices.clone(),
                hse.clone(),
            )),
            notifications,
            alerts,
            equipment,
            inventory,
            faults,
            invoices,
            hse,
        }
    }
}
