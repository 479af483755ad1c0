pub mod activation_code;
pub mod chat_message;
pub mod company;
pub mod equipment;
pub mod fault;
pub mod file_attachment;
pub mod hse_update;
pub mod invoice;
pub mod login_attempt;
pub mod low_stock_alert;
pub mod notification;
pub mod part;
pub mod payment_event;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod refresh_token;
pub mod scheduled_notification;
pub mod security_alert;
pub mod sync_operation;
pub mod user;
pub mod vessel;
