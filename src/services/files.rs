use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entities::{equipment, fault, file_attachment, hse_update, purchase_order, vessel};
use crate::errors::ServiceError;

/// Records a file may be attached to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttachmentEntity {
    Vessel,
    Equipment,
    Fault,
    HseUpdate,
    PurchaseOrder,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UploadFileRequest {
    pub entity_type: AttachmentEntity,
    pub entity_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1, max = 100))]
    pub content_type: String,
    /// Standard base64 of the file content
    pub content_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct FileFilter {
    pub entity_type: AttachmentEntity,
    pub entity_id: Uuid,
}

/// Strips directories and control characters from a client-supplied name
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Uploaded attachments stored on local disk under `storage_dir/uploads`
#[derive(Clone)]
pub struct FileService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
}

impl FileService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Company owning the target record, if it exists
    async fn owner_of(
        &self,
        entity: AttachmentEntity,
        id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        let db = &*self.db;
        Ok(match entity {
            AttachmentEntity::Vessel => vessel::Entity::find_by_id(id).one(db).await?.map(|m| m.company_id),
            AttachmentEntity::Equipment => equipment::Entity::find_by_id(id).one(db).await?.map(|m| m.company_id),
            AttachmentEntity::Fault => fault::Entity::find_by_id(id).one(db).await?.map(|m| m.company_id),
            AttachmentEntity::HseUpdate => hse_update::Entity::find_by_id(id).one(db).await?.map(|m| m.company_id),
            AttachmentEntity::PurchaseOrder => purchase_order::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(|m| m.company_id),
        })
    }

    async fn target_company(
        &self,
        user: &AuthUser,
        entity: AttachmentEntity,
        id: Uuid,
    ) -> Result<Uuid, ServiceError> {
        self.owner_of(entity, id)
            .await?
            .filter(|company_id| user.can_access(*company_id))
            .ok_or_else(|| ServiceError::not_found(&entity.to_string(), id))
    }

    async fn find(&self, user: &AuthUser, id: Uuid) -> Result<file_attachment::Model, ServiceError> {
        file_attachment::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|f| user.can_access(f.company_id))
            .ok_or_else(|| ServiceError::not_found("File", id))
    }

    #[instrument(skip(self, user, req), fields(entity = %req.entity_type, entity_id = %req.entity_id))]
    pub async fn upload(
        &self,
        user: &AuthUser,
        req: UploadFileRequest,
    ) -> Result<file_attachment::Model, ServiceError> {
        req.validate()?;
        let company_id = self
            .target_company(user, req.entity_type, req.entity_id)
            .await?;
        // base64 expands by 4/3; reject oversized bodies before decoding
        if req.content_base64.len() / 4 * 3 > self.config.max_upload_bytes + 3 {
            return Err(ServiceError::PayloadTooLarge(format!(
                "Files are limited to {} bytes",
                self.config.max_upload_bytes
            )));
        }
        let bytes = STANDARD
            .decode(req.content_base64.trim())
            .map_err(|e| ServiceError::ValidationError(format!("content_base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(ServiceError::ValidationError("File is empty".into()));
        }
        if bytes.len() > self.config.max_upload_bytes {
            return Err(ServiceError::PayloadTooLarge(format!(
                "Files are limited to {} bytes",
                self.config.max_upload_bytes
            )));
        }

        let id = Uuid::new_v4();
        let dir = self.config.uploads_dir().join(company_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::StorageError(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(id.to_string());
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ServiceError::StorageError(format!("{}: {}", path.display(), e)))?;

        let stored = file_attachment::ActiveModel {
            id: Set(id),
            company_id: Set(company_id),
            entity_type: Set(req.entity_type.to_string()),
            entity_id: Set(req.entity_id),
            file_name: Set(sanitize_file_name(&req.file_name)),
            content_type: Set(req.content_type),
            size_bytes: Set(bytes.len() as i64),
            storage_path: Set(path.to_string_lossy().into_owned()),
            uploaded_by: Set(user.user_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await;
        match stored {
            Ok(model) => {
                info!(file_id = %model.id, size = model.size_bytes, "file stored");
                Ok(model)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e.into())
            }
        }
    }

    pub async fn metadata(
        &self,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<file_attachment::Model, ServiceError> {
        self.find(user, id).await
    }

    /// Returns the attachment row and its bytes
    pub async fn download(
        &self,
        user: &AuthUser,
        id: Uuid,
    ) -> Result<(file_attachment::Model, Vec<u8>), ServiceError> {
        let file = self.find(user, id).await?;
        let bytes = tokio::fs::read(PathBuf::from(&file.storage_path))
            .await
            .map_err(|e| {
                warn!(file_id = %file.id, error = %e, "stored file unreadable");
                ServiceError::NotFound(format!("File content for {} is missing", file.id))
            })?;
        Ok((file, bytes))
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        filter: FileFilter,
    ) -> Result<Vec<file_attachment::Model>, ServiceError> {
        self.target_company(user, filter.entity_type, filter.entity_id)
            .await?;
        Ok(file_attachment::Entity::find()
            .filter(file_attachment::Column::EntityType.eq(filter.entity_type.to_string()))
            .filter(file_attachment::Column::EntityId.eq(filter.entity_id))
            .order_by_desc(file_attachment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let file = self.find(user, id).await?;
        file_attachment::Entity::delete_by_id(file.id)
            .exec(&*self.db)
            .await?;
        if let Err(e) = tokio::fs::remove_file(&file.storage_path).await {
            warn!(file_id = %file.id, error = %e, "could not remove stored file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf", "report.pdf")]
    #[case("../../etc/passwd", "passwd")]
    #[case("C:\\temp\\photo.jpg", "photo.jpg")]
    #[case(".hidden", "hidden")]
    #[case("   ", "file")]
    fn sanitizes_names(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_file_name(raw), expected);
    }

    #[test]
    fn attachment_entities_round_trip_through_strings() {
        assert_eq!(AttachmentEntity::HseUpdate.to_string(), "hse_update");
        assert_eq!(
            "purchase_order".parse::<AttachmentEntity>().ok(),
            Some(AttachmentEntity::PurchaseOrder)
        );
    }
}
