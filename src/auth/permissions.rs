/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`; a role grants `resource:*` to
 * cover every action on a resource.
 */

/// Permission actions
pub struct Actions;

impl Actions {
    pub const READ: &'static str = "read";
    pub const CREATE: &'static str = "create";
    pub const UPDATE: &'static str = "update";
    pub const DELETE: &'static str = "delete";
    pub const MANAGE: &'static str = "manage";
    pub const ALL: &'static str = "*";
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const COMPANIES: &'static str = "companies";
    pub const USERS: &'static str = "users";
    pub const VESSELS: &'static str = "vessels";
    pub const EQUIPMENT: &'static str = "equipment";
    pub const PARTS: &'static str = "parts";
    pub const ALERTS: &'static str = "alerts";
    pub const PURCHASE_ORDERS: &'static str = "purchaseorders";
    pub const INVOICES: &'static str = "invoices";
    pub const TOKENS: &'static str = "tokens";
    pub const FAULTS: &'static str = "faults";
    pub const HSE: &'static str = "hse";
    pub const CHAT: &'static str = "chat";
    pub const NOTIFICATIONS: &'static str = "notifications";
    pub const FILES: &'static str = "files";
    pub const SYNC: &'static str = "sync";
    pub const SECURITY: &'static str = "security";
    pub const DASHBOARD: &'static str = "dashboard";
}

/// Common permission string constants for compile-time safety
pub mod consts {
    // Companies & users
    pub const COMPANIES_READ: &str = "companies:read";
    pub const COMPANIES_MANAGE: &str = "companies:manage";
    pub const USERS_READ: &str = "users:read";
    pub const USERS_MANAGE: &str = "users:manage";

    // Fleet
    pub const VESSELS_READ: &str = "vessels:read";
    pub const VESSELS_MANAGE: &str = "vessels:manage";
    pub const EQUIPMENT_READ: &str = "equipment:read";
    pub const EQUIPMENT_MANAGE: &str = "equipment:manage";
    pub const EQUIPMENT_LOG: &str = "equipment:log";

    // Inventory
    pub const PARTS_READ: &str = "parts:read";
    pub const PARTS_MANAGE: &str = "parts:manage";
    pub const PARTS_ADJUST: &str = "parts:adjust";
    pub const ALERTS_READ: &str = "alerts:read";
    pub const ALERTS_MANAGE: &str = "alerts:manage";

    // Procurement
    pub const PURCHASE_ORDERS_READ: &str = "purchaseorders:read";
    pub const PURCHASE_ORDERS_CREATE: &str = "purchaseorders:create";
    pub const PURCHASE_ORDERS_APPROVE: &str = "purchaseorders:approve";
    pub const PURCHASE_ORDERS_RECEIVE: &str = "purchaseorders:receive";
    pub const PURCHASE_ORDERS_CANCEL: &str = "purchaseorders:cancel";
    pub const INVOICES_READ: &str = "invoices:read";
    pub const INVOICES_MANAGE: &str = "invoices:manage";

    // Licensing
    pub const TOKENS_REDEEM: &str = "tokens:redeem";
    pub const TOKENS_MANAGE: &str = "tokens:manage";

    // Operations
    pub const FAULTS_READ: &str = "faults:read";
    pub const FAULTS_CREATE: &str = "faults:create";
    pub const FAULTS_UPDATE: &str = "faults:update";
    pub const FAULTS_ASSIGN: &str = "faults:assign";
    pub const HSE_READ: &str = "hse:read";
    pub const HSE_MANAGE: &str = "hse:manage";
    pub const CHAT_READ: &str = "chat:read";
    pub const CHAT_WRITE: &str = "chat:write";
    pub const NOTIFICATIONS_READ: &str = "notifications:read";
    pub const FILES_READ: &str = "files:read";
    pub const FILES_WRITE: &str = "files:write";
    pub const SYNC_WRITE: &str = "sync:write";
    pub const DASHBOARD_READ: &str = "dashboard:read";

    // Platform
    pub const SECURITY_READ: &str = "security:read";
    pub const SECURITY_MANAGE: &str = "security:manage";
}

/// Whether `granted` covers `required`, honouring `resource:*` and `*`
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == required || granted == Actions::ALL {
        return true;
    }
    match (granted.split_once(':'), required.split_once(':')) {
        (Some((g_res, g_act)), Some((r_res, _))) => g_act == Actions::ALL && g_res == r_res,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_cover_resource_actions() {
        assert!(permission_matches("vessels:*", consts::VESSELS_MANAGE));
        assert!(permission_matches("*", consts::SECURITY_MANAGE));
        assert!(permission_matches(consts::FAULTS_READ, consts::FAULTS_READ));
        assert!(!permission_matches("vessels:*", consts::FAULTS_READ));
        assert!(!permission_matches(consts::FAULTS_READ, consts::FAULTS_UPDATE));
    }
}
