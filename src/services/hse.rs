use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::vessels::VesselService;
use super::{fetch_page, Page};
use crate::auth::AuthUser;
use crate::entities::hse_update::{self, ComplianceStatus, HseCategory};
use crate::entities::vessel;
use crate::errors::ServiceError;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateHseRequest {
    /// Fleet-wide items leave this empty
    pub vessel_id: Option<Uuid>,
    /// Needed by administrators for fleet-wide items
    pub company_id: Option<Uuid>,
    pub category: HseCategory,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    #[validate(length(max = 50))]
    pub severity: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateHseRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    #[validate(length(max = 50))]
    pub severity: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HseFilter {
    pub vessel_id: Option<Uuid>,
    pub category: Option<HseCategory>,
    /// Only items that are expiring, expired, overdue or open
    #[serde(default)]
    pub attention: bool,
}

/// HSE item with its compliance status derived at read time
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HseItemView {
    #[serde(flatten)]
    pub item: hse_update::Model,
    pub compliance_status: ComplianceStatus,
}

impl HseItemView {
    pub fn at(item: hse_update::Model, now: DateTime<Utc>) -> Self {
        Self {
            compliance_status: item.compliance_status(now),
            item,
        }
    }
}

/// One board column: a vessel, or fleet-wide items when `vessel_id` is empty
#[derive(Debug, Serialize, ToSchema)]
pub struct VesselBoard {
    pub vessel_id: Option<Uuid>,
    pub vessel_name: Option<String>,
    /// category → compliance status → count
    pub counts: BTreeMap<String, BTreeMap<String, u64>>,
    pub attention: Vec<HseItemView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HseBoard {
    pub generated_at: DateTime<Utc>,
    pub totals: BTreeMap<String, BTreeMap<String, u64>>,
    pub attention_count: u64,
    pub vessels: Vec<VesselBoard>,
}

/// Builds the compliance board from a flat list of items
pub fn build_board(
    items: Vec<hse_update::Model>,
    vessel_names: &HashMap<Uuid, String>,
    now: DateTime<Utc>,
) -> HseBoard {
    let mut totals: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut columns: BTreeMap<Option<Uuid>, VesselBoard> = BTreeMap::new();
    let mut attention_count = 0;

    for item in items {
        let view = HseItemView::at(item, now);
        let category = view.item.category.clone();
        let status = view.compliance_status.to_string();
        *totals
            .entry(category.clone())
            .or_default()
            .entry(status.clone())
            .or_default() += 1;

        let vessel_id = view.item.vessel_id;
        let column = columns.entry(vessel_id).or_insert_with(|| VesselBoard {
            vessel_id,
            vessel_name: vessel_id.and_then(|id| vessel_names.get(&id).cloned()),
            counts: BTreeMap::new(),
            attention: Vec::new(),
        });
        *column
            .counts
            .entry(category)
            .or_default()
            .entry(status)
            .or_default() += 1;
        if view.compliance_status.needs_attention() {
            attention_count += 1;
            column.attention.push(view);
        }
    }

    let mut vessels: Vec<VesselBoard> = columns.into_values().collect();
    for column in &mut vessels {
        column.attention.sort_by_key(|v| {
            v.item
                .expires_at
                .or(v.item.due_at)
                .unwrap_or(v.item.created_at)
        });
    }
    HseBoard {
        generated_at: now,
        totals,
        attention_count,
        vessels,
    }
}

fn check_dates(
    category: HseCategory,
    expires_at: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    match category {
        HseCategory::Certificate | HseCategory::Inspection if expires_at.is_none() => Err(
            ServiceError::ValidationError(format!("{} items need expires_at", category)),
        ),
        HseCategory::Drill if due_at.is_none() => Err(ServiceError::ValidationError(
            "drill items need due_at".into(),
        )),
        _ => Ok(()),
    }
}

/// Health, safety & environment compliance register
#[derive(Clone)]
pub struct HseService {
    db: Arc<DatabaseConnection>,
}

impl HseService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find(&self, user: &AuthUser, id: Uuid) -> Result<hse_update::Model, ServiceError> {
        hse_update::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|h| user.can_access(h.company_id))
            .ok_or_else(|| ServiceError::not_found("HSE item", id))
    }

    #[instrument(skip(self, user, req), fields(category = %req.category))]
    pub async fn create(
        &self,
        user: &AuthUser,
        req: CreateHseRequest,
    ) -> Result<HseItemView, ServiceError> {
        req.validate()?;
        check_dates(req.category, req.expires_at, req.due_at)?;
        let company_id = match req.vessel_id {
            Some(vessel_id) => {
                VesselService::find_scoped(&*self.db, user, vessel_id)
                    .await?
                    .company_id
            }
            None => user.target_company(req.company_id)?,
        };
        let now = Utc::now();
        let created = hse_update::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            vessel_id: Set(req.vessel_id),
            category: Set(req.category.to_string()),
            title: Set(req.title.trim().to_string()),
            description: Set(req.description),
            reference: Set(req.reference),
            severity: Set(req.severity),
            issued_at: Set(req.issued_at),
            expires_at: Set(req.expires_at),
            due_at: Set(req.due_at),
            completed_at: Set(None),
            closed_at: Set(None),
            created_by: Set(user.user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        Ok(HseItemView::at(created, now))
    }

    pub async fn get(&self, user: &AuthUser, id: Uuid) -> Result<HseItemView, ServiceError> {
        Ok(HseItemView::at(self.find(user, id).await?, Utc::now()))
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: HseFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<HseItemView>, ServiceError> {
        let now = Utc::now();
        let mut query = hse_update::Entity::find();
        if let Some(company_id) = user.tenant_filter() {
            query = query.filter(hse_update::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = filter.vessel_id {
            query = query.filter(hse_update::Column::VesselId.eq(vessel_id));
        }
        if let Some(category) = filter.category {
            query = query.filter(hse_update::Column::Category.eq(category.to_string()));
        }
        let query = query.order_by_desc(hse_update::Column::CreatedAt);

        if filter.attention {
            // compliance is derived, so the attention filter runs in memory
            let items: Vec<HseItemView> = query
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|i| HseItemView::at(i, now))
                .filter(|v| v.compliance_status.needs_attention())
                .collect();
            let total = items.len() as u64;
            let per_page = per_page.max(1);
            let start = (page.saturating_sub(1) * per_page) as usize;
            let items = items.into_iter().skip(start).take(per_page as usize).collect();
            return Ok(Page { items, total });
        }

        let page = fetch_page(&self.db, query, page, per_page).await?;
        Ok(page.map(|i| HseItemView::at(i, now)))
    }

    #[instrument(skip(self, user, req))]
    pub async fn update(
        &self,
        user: &AuthUser,
        id: Uuid,
        req: UpdateHseRequest,
    ) -> Result<HseItemView, ServiceError> {
        req.validate()?;
        let existing = self.find(user, id).await?;
        let mut active: hse_update::ActiveModel = existing.into();
        if let Some(title) = req.title {
            active.title = Set(title.trim().to_string());
        }
        if req.description.is_some() {
            active.description = Set(req.description);
        }
        if req.reference.is_some() {
            active.reference = Set(req.reference);
        }
        if req.severity.is_some() {
            active.severity = Set(req.severity);
        }
        if req.issued_at.is_some() {
            active.issued_at = Set(req.issued_at);
        }
        if req.expires_at.is_some() {
            active.expires_at = Set(req.expires_at);
        }
        if req.due_at.is_some() {
            active.due_at = Set(req.due_at);
        }
        let now = Utc::now();
        active.updated_at = Set(now);
        Ok(HseItemView::at(active.update(&*self.db).await?, now))
    }

    /// Marks a drill as carried out
    pub async fn complete(&self, user: &AuthUser, id: Uuid) -> Result<HseItemView, ServiceError> {
        let existing = self.find(user, id).await?;
        if existing.category() != Some(HseCategory::Drill) {
            return Err(ServiceError::InvalidOperation(
                "Only drills can be completed".into(),
            ));
        }
        let now = Utc::now();
        let mut active: hse_update::ActiveModel = existing.into();
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(HseItemView::at(active.update(&*self.db).await?, now))
    }

    /// Closes an incident
    pub async fn close(&self, user: &AuthUser, id: Uuid) -> Result<HseItemView, ServiceError> {
        let existing = self.find(user, id).await?;
        if existing.category() != Some(HseCategory::Incident) {
            return Err(ServiceError::InvalidOperation(
                "Only incidents can be closed".into(),
            ));
        }
        if existing.closed_at.is_some() {
            return Err(ServiceError::InvalidStatus("Incident is already closed".into()));
        }
        let now = Utc::now();
        let mut active: hse_update::ActiveModel = existing.into();
        active.closed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(HseItemView::at(active.update(&*self.db).await?, now))
    }

    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.find(user, id).await?;
        hse_update::Entity::delete_by_id(existing.id)
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Compliance board for the caller's fleet, optionally a single vessel
    pub async fn board(
        &self,
        user: &AuthUser,
        vessel_id: Option<Uuid>,
    ) -> Result<HseBoard, ServiceError> {
        let mut items_query = hse_update::Entity::find();
        let mut vessels_query = vessel::Entity::find();
        if let Some(company_id) = user.tenant_filter() {
            items_query = items_query.filter(hse_update::Column::CompanyId.eq(company_id));
            vessels_query = vessels_query.filter(vessel::Column::CompanyId.eq(company_id));
        }
        if let Some(vessel_id) = vessel_id {
            items_query = items_query.filter(hse_update::Column::VesselId.eq(vessel_id));
            vessels_query = vessels_query.filter(vessel::Column::Id.eq(vessel_id));
        }
        let items = items_query.all(&*self.db).await?;
        let names: HashMap<Uuid, String> = vessels_query
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|v| (v.id, v.name))
            .collect();
        Ok(build_board(items, &names, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(category: HseCategory, vessel_id: Option<Uuid>) -> hse_update::Model {
        hse_update::Model {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            vessel_id,
            category: category.to_string(),
            title: format!("{} item", category),
            description: None,
            reference: None,
            severity: None,
            issued_at: None,
            expires_at: None,
            due_at: None,
            completed_at: None,
            closed_at: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn board_groups_by_vessel_and_counts_attention() {
        let now = Utc::now();
        let vessel = Uuid::new_v4();
        let mut expired = item(HseCategory::Certificate, Some(vessel));
        expired.expires_at = Some(now - Duration::days(3));
        let mut valid = item(HseCategory::Certificate, Some(vessel));
        valid.expires_at = Some(now + Duration::days(200));
        let mut drill = item(HseCategory::Drill, None);
        drill.due_at = Some(now - Duration::days(1));
        let incident = item(HseCategory::Incident, Some(vessel));

        let names = HashMap::from([(vessel, "MV Aurora".to_string())]);
        let board = build_board(vec![expired, valid, drill, incident], &names, now);

        assert_eq!(board.attention_count, 3);
        assert_eq!(board.totals["certificate"]["expired"], 1);
        assert_eq!(board.totals["certificate"]["compliant"], 1);
        assert_eq!(board.totals["drill"]["overdue"], 1);
        assert_eq!(board.vessels.len(), 2);

        let aurora = board
            .vessels
            .iter()
            .find(|v| v.vessel_id == Some(vessel))
            .unwrap();
        assert_eq!(aurora.vessel_name.as_deref(), Some("MV Aurora"));
        assert_eq!(aurora.attention.len(), 2);
    }

    #[test]
    fn certificates_require_expiry() {
        assert!(check_dates(HseCategory::Certificate, None, None).is_err());
        assert!(check_dates(HseCategory::Drill, None, None).is_err());
        assert!(check_dates(HseCategory::Incident, None, None).is_ok());
    }
}
