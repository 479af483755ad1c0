/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Fixed role table for the platform. A user carries exactly one role and the
 * role's permissions are copied into the access token at login.
 */

use super::permissions::consts::*;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// SMS platform administrator, spans every tenant
    Admin,
    Manager,
    Technician,
    HseOfficer,
}

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: UserRole,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
}

lazy_static! {
    pub static ref ROLES: HashMap<UserRole, Role> = {
        let mut roles = HashMap::new();

        roles.insert(
            UserRole::Admin,
            Role {
                name: UserRole::Admin,
                description: "Platform administrator with access to every tenant",
                permissions: vec!["*"],
            },
        );

        roles.insert(
            UserRole::Manager,
            Role {
                name: UserRole::Manager,
                description: "Fleet manager for one company",
                permissions: vec![
                    COMPANIES_READ,
                    USERS_READ,
                    USERS_MANAGE,
                    "vessels:*",
                    "equipment:*",
                    "parts:*",
                    "alerts:*",
                    PURCHASE_ORDERS_READ,
                    PURCHASE_ORDERS_CREATE,
                    PURCHASE_ORDERS_RECEIVE,
                    PURCHASE_ORDERS_CANCEL,
                    INVOICES_READ,
                    TOKENS_REDEEM,
                    "faults:*",
                    "hse:*",
                    "chat:*",
                    NOTIFICATIONS_READ,
                    "files:*",
                    SYNC_WRITE,
                    DASHBOARD_READ,
                ],
            },
        );

        roles.insert(
            UserRole::Technician,
            Role {
                name: UserRole::Technician,
                description: "Crew technician maintaining equipment aboard",
                permissions: vec![
                    VESSELS_READ,
                    EQUIPMENT_READ,
                    EQUIPMENT_LOG,
                    PARTS_READ,
                    PARTS_ADJUST,
                    ALERTS_READ,
                    FAULTS_READ,
                    FAULTS_CREATE,
                    FAULTS_UPDATE,
                    HSE_READ,
                    "chat:*",
                    NOTIFICATIONS_READ,
                    "files:*",
                    SYNC_WRITE,
                    DASHBOARD_READ,
                ],
            },
        );

        roles.insert(
            UserRole::HseOfficer,
            Role {
                name: UserRole::HseOfficer,
                description: "Health, safety and environment compliance officer",
                permissions: vec![
                    VESSELS_READ,
                    EQUIPMENT_READ,
                    FAULTS_READ,
                    FAULTS_CREATE,
                    "hse:*",
                    "chat:*",
                    NOTIFICATIONS_READ,
                    "files:*",
                    SYNC_WRITE,
                    DASHBOARD_READ,
                ],
            },
        );

        roles
    };
}

/// Permissions granted by a role name; unknown roles get nothing
pub fn permissions_for_role(role_name: &str) -> Vec<String> {
    match role_name.parse::<UserRole>().ok().and_then(|r| ROLES.get(&r)) {
        Some(role) => role.permissions.iter().map(|p| p.to_string()).collect(),
        None => {
            warn!("Role not found: {}", role_name);
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::permission_matches;

    fn role_allows(role: UserRole, required: &str) -> bool {
        permissions_for_role(role.as_ref())
            .iter()
            .any(|p| permission_matches(p, required))
    }

    #[test]
    fn every_role_is_defined() {
        for role in [
            UserRole::Admin,
            UserRole::Manager,
            UserRole::Technician,
            UserRole::HseOfficer,
        ] {
            assert!(ROLES.contains_key(&role), "missing {role}");
        }
    }

    #[test]
    fn role_boundaries() {
        assert!(role_allows(UserRole::Admin, SECURITY_MANAGE));
        assert!(role_allows(UserRole::Manager, VESSELS_MANAGE));
        assert!(!role_allows(UserRole::Manager, PURCHASE_ORDERS_APPROVE));
        assert!(!role_allows(UserRole::Manager, INVOICES_MANAGE));
        assert!(role_allows(UserRole::Technician, PARTS_ADJUST));
        assert!(!role_allows(UserRole::Technician, VESSELS_MANAGE));
        assert!(role_allows(UserRole::HseOfficer, HSE_MANAGE));
        assert!(!role_allows(UserRole::HseOfficer, PARTS_ADJUST));
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        assert!(permissions_for_role("captain").is_empty());
    }
}
