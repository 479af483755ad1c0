use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_tenancy_tables::Migration),
            Box::new(m20240601_000002_create_fleet_tables::Migration),
            Box::new(m20240601_000003_create_procurement_tables::Migration),
            Box::new(m20240601_000004_create_operations_tables::Migration),
            Box::new(m20240601_000005_create_messaging_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_tenancy_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_tenancy_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Companies::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Companies::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Companies::Name).string().not_null())
                        .col(ColumnDef::new(Companies::ContactEmail).string().not_null())
                        .col(ColumnDef::new(Companies::ContactPhone).string().null())
                        .col(ColumnDef::new(Companies::Address).string().null())
                        .col(
                            ColumnDef::new(Companies::SubscriptionTier)
                                .string()
                                .not_null()
                                .default("none"),
                        )
                        .col(
                            ColumnDef::new(Companies::SubscriptionExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Companies::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Companies::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Users::CompanyId).uuid().null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::LastLoginAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_users_company")
                                .from(Users::Table, Users::CompanyId)
                                .to(Companies::Table, Companies::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_company_id")
                        .table(Users::Table)
                        .col(Users::CompanyId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RefreshTokens::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RefreshTokens::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(RefreshTokens::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(RefreshTokens::Jti)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(RefreshTokens::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RefreshTokens::Revoked)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(RefreshTokens::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_refresh_tokens_user")
                                .from(RefreshTokens::Table, RefreshTokens::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LoginAttempts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LoginAttempts::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(LoginAttempts::Email).string().not_null())
                        .col(ColumnDef::new(LoginAttempts::IpAddress).string().null())
                        .col(ColumnDef::new(LoginAttempts::Success).boolean().not_null())
                        .col(
                            ColumnDef::new(LoginAttempts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_login_attempts_email_created")
                        .table(LoginAttempts::Table)
                        .col(LoginAttempts::Email)
                        .col(LoginAttempts::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SecurityAlerts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SecurityAlerts::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SecurityAlerts::Kind).string().not_null())
                        .col(ColumnDef::new(SecurityAlerts::Subject).string().not_null())
                        .col(
                            ColumnDef::new(SecurityAlerts::AttemptCount)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SecurityAlerts::Acknowledged)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(SecurityAlerts::AcknowledgedBy).uuid().null())
                        .col(
                            ColumnDef::new(SecurityAlerts::AcknowledgedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SecurityAlerts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ActivationCodes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ActivationCodes::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ActivationCodes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ActivationCodes::Tier).string().not_null())
                        .col(
                            ColumnDef::new(ActivationCodes::DurationDays)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ActivationCodes::Status).string().not_null())
                        .col(ColumnDef::new(ActivationCodes::PurchaserEmail).string().null())
                        .col(ColumnDef::new(ActivationCodes::CompanyId).uuid().null())
                        .col(ColumnDef::new(ActivationCodes::RedeemedBy).uuid().null())
                        .col(
                            ColumnDef::new(ActivationCodes::RedeemedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(ActivationCodes::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(ActivationCodes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ActivationCodes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SecurityAlerts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LoginAttempts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RefreshTokens::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Companies::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Companies {
        Table,
        Id,
        Name,
        ContactEmail,
        ContactPhone,
        Address,
        SubscriptionTier,
        SubscriptionExpiresAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        CompanyId,
        Email,
        PasswordHash,
        Name,
        Role,
        IsActive,
        LastLoginAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RefreshTokens {
        Table,
        Id,
        UserId,
        Jti,
        ExpiresAt,
        Revoked,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum LoginAttempts {
        Table,
        Id,
        Email,
        IpAddress,
        Success,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SecurityAlerts {
        Table,
        Id,
        Kind,
        Subject,
        AttemptCount,
        Acknowledged,
        AcknowledgedBy,
        AcknowledgedAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ActivationCodes {
        Table,
        Id,
        Code,
        Tier,
        DurationDays,
        Status,
        PurchaserEmail,
        CompanyId,
        RedeemedBy,
        RedeemedAt,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240601_000002_create_fleet_tables {
    use super::m20240601_000001_create_tenancy_tables::Companies;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_fleet_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vessels::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vessels::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Vessels::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Vessels::Name).string().not_null())
                        .col(
                            ColumnDef::new(Vessels::ImoNumber)
                                .string_len(7)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Vessels::VesselType).string().not_null())
                        .col(ColumnDef::new(Vessels::Flag).string().null())
                        .col(ColumnDef::new(Vessels::YearBuilt).integer().null())
                        .col(ColumnDef::new(Vessels::Status).string().not_null())
                        .col(ColumnDef::new(Vessels::ContactEmail).string().null())
                        .col(
                            ColumnDef::new(Vessels::OnboardedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Vessels::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vessels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_vessels_company")
                                .from(Vessels::Table, Vessels::CompanyId)
                                .to(Companies::Table, Companies::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vessels_company_id")
                        .table(Vessels::Table)
                        .col(Vessels::CompanyId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Equipment::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Equipment::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Equipment::VesselId).uuid().not_null())
                        .col(ColumnDef::new(Equipment::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Equipment::Name).string().not_null())
                        .col(ColumnDef::new(Equipment::Category).string().null())
                        .col(ColumnDef::new(Equipment::Manufacturer).string().null())
                        .col(ColumnDef::new(Equipment::Model).string().null())
                        .col(ColumnDef::new(Equipment::SerialNumber).string().null())
                        .col(ColumnDef::new(Equipment::Location).string().null())
                        .col(ColumnDef::new(Equipment::Status).string().not_null())
                        .col(
                            ColumnDef::new(Equipment::RunningHours)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Equipment::MaintenanceIntervalHours)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Equipment::HoursAtLastMaintenance)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Equipment::LastMaintenanceAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Equipment::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Equipment::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_equipment_vessel")
                                .from(Equipment::Table, Equipment::VesselId)
                                .to(Vessels::Table, Vessels::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_equipment_vessel_id")
                        .table(Equipment::Table)
                        .col(Equipment::VesselId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PartsInventory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PartsInventory::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PartsInventory::VesselId).uuid().not_null())
                        .col(ColumnDef::new(PartsInventory::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(PartsInventory::EquipmentId).uuid().null())
                        .col(ColumnDef::new(PartsInventory::PartNumber).string().not_null())
                        .col(ColumnDef::new(PartsInventory::Name).string().not_null())
                        .col(ColumnDef::new(PartsInventory::Description).string().null())
                        .col(
                            ColumnDef::new(PartsInventory::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PartsInventory::MinimumQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PartsInventory::UnitCost)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PartsInventory::Supplier).string().null())
                        .col(ColumnDef::new(PartsInventory::Location).string().null())
                        .col(
                            ColumnDef::new(PartsInventory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PartsInventory::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_parts_inventory_vessel")
                                .from(PartsInventory::Table, PartsInventory::VesselId)
                                .to(Vessels::Table, Vessels::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_parts_inventory_equipment")
                                .from(PartsInventory::Table, PartsInventory::EquipmentId)
                                .to(Equipment::Table, Equipment::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_parts_inventory_vessel_id")
                        .table(PartsInventory::Table)
                        .col(PartsInventory::VesselId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PartsInventory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Equipment::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Vessels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Vessels {
        Table,
        Id,
        CompanyId,
        Name,
        ImoNumber,
        VesselType,
        Flag,
        YearBuilt,
        Status,
        ContactEmail,
        OnboardedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Equipment {
        Table,
        Id,
        VesselId,
        CompanyId,
        Name,
        Category,
        Manufacturer,
        Model,
        SerialNumber,
        Location,
        Status,
        RunningHours,
        MaintenanceIntervalHours,
        HoursAtLastMaintenance,
        LastMaintenanceAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PartsInventory {
        Table,
        Id,
        VesselId,
        CompanyId,
        EquipmentId,
        PartNumber,
        Name,
        Description,
        Quantity,
        MinimumQuantity,
        UnitCost,
        Supplier,
        Location,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_procurement_tables {
    use super::m20240601_000002_create_fleet_tables::{PartsInventory, Vessels};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_procurement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LowStockAlerts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LowStockAlerts::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(LowStockAlerts::PartId).uuid().not_null())
                        .col(ColumnDef::new(LowStockAlerts::VesselId).uuid().not_null())
                        .col(ColumnDef::new(LowStockAlerts::CompanyId).uuid().not_null())
                        .col(
                            ColumnDef::new(LowStockAlerts::QuantityAtAlert)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LowStockAlerts::MinimumQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LowStockAlerts::Status).string().not_null())
                        .col(ColumnDef::new(LowStockAlerts::PurchaseOrderId).uuid().null())
                        .col(
                            ColumnDef::new(LowStockAlerts::AdminNotifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LowStockAlerts::VesselNotifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LowStockAlerts::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LowStockAlerts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LowStockAlerts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_low_stock_alerts_part")
                                .from(LowStockAlerts::Table, LowStockAlerts::PartId)
                                .to(PartsInventory::Table, PartsInventory::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_low_stock_alerts_part_status")
                        .table(LowStockAlerts::Table)
                        .col(LowStockAlerts::PartId)
                        .col(LowStockAlerts::Status)
                        .to_owned(),
                )
                .await?;

            // at most one unresolved alert per part
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_low_stock_alerts_open \
                     ON low_stock_alerts (part_id) WHERE status <> 'resolved'",
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PoNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::VesselId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::AlertId).uuid().null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Subtotal)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::MarkupRate)
                                .decimal_len(6, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::MarkupAmount)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Total)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(ColumnDef::new(PurchaseOrders::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::SubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_vessel")
                                .from(PurchaseOrders::Table, PurchaseOrders::VesselId)
                                .to(Vessels::Table, Vessels::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_company_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::CompanyId)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::PartId).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitPrice)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::LineTotal)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_order")
                                .from(PurchaseOrderItems::Table, PurchaseOrderItems::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Invoices::InvoiceNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Invoices::PurchaseOrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Invoices::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::Subtotal).decimal_len(14, 2).not_null())
                        .col(
                            ColumnDef::new(Invoices::MarkupAmount)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::Total).decimal_len(14, 2).not_null())
                        .col(ColumnDef::new(Invoices::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(
                            ColumnDef::new(Invoices::IssuedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::DueAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Invoices::PaymentProvider).string().null())
                        .col(ColumnDef::new(Invoices::PaymentReference).string().null())
                        .col(ColumnDef::new(Invoices::PdfPath).string().null())
                        .col(
                            ColumnDef::new(Invoices::OverdueNotifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_purchase_order")
                                .from(Invoices::Table, Invoices::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_status_due")
                        .table(Invoices::Table)
                        .col(Invoices::Status)
                        .col(Invoices::DueAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentEvents::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PaymentEvents::Provider).string().not_null())
                        .col(ColumnDef::new(PaymentEvents::EventId).string().not_null())
                        .col(ColumnDef::new(PaymentEvents::EventType).string().not_null())
                        .col(ColumnDef::new(PaymentEvents::InvoiceId).uuid().null())
                        .col(
                            ColumnDef::new(PaymentEvents::ProcessedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_payment_events_provider_event")
                        .table(PaymentEvents::Table)
                        .col(PaymentEvents::Provider)
                        .col(PaymentEvents::EventId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentEvents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LowStockAlerts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum LowStockAlerts {
        Table,
        Id,
        PartId,
        VesselId,
        CompanyId,
        QuantityAtAlert,
        MinimumQuantity,
        Status,
        PurchaseOrderId,
        AdminNotifiedAt,
        VesselNotifiedAt,
        ResolvedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        CompanyId,
        VesselId,
        AlertId,
        Status,
        Subtotal,
        MarkupRate,
        MarkupAmount,
        Total,
        Currency,
        Notes,
        CreatedBy,
        ApprovedBy,
        SubmittedAt,
        ApprovedAt,
        ReceivedAt,
        CancelledAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        PartId,
        Description,
        Quantity,
        UnitPrice,
        LineTotal,
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        InvoiceNumber,
        PurchaseOrderId,
        CompanyId,
        Subtotal,
        MarkupAmount,
        Total,
        Currency,
        Status,
        IssuedAt,
        DueAt,
        PaidAt,
        PaymentProvider,
        PaymentReference,
        PdfPath,
        OverdueNotifiedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PaymentEvents {
        Table,
        Id,
        Provider,
        EventId,
        EventType,
        InvoiceId,
        ProcessedAt,
    }
}

mod m20240601_000004_create_operations_tables {
    use super::m20240601_000002_create_fleet_tables::Vessels;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_operations_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Faults::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Faults::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Faults::VesselId).uuid().not_null())
                        .col(ColumnDef::new(Faults::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Faults::EquipmentId).uuid().null())
                        .col(ColumnDef::new(Faults::Title).string().not_null())
                        .col(ColumnDef::new(Faults::Description).text().not_null())
                        .col(ColumnDef::new(Faults::Severity).string().not_null())
                        .col(ColumnDef::new(Faults::Status).string().not_null())
                        .col(ColumnDef::new(Faults::ReportedBy).uuid().not_null())
                        .col(ColumnDef::new(Faults::AssignedTo).uuid().null())
                        .col(ColumnDef::new(Faults::ResolutionNotes).text().null())
                        .col(
                            ColumnDef::new(Faults::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Faults::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Faults::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_faults_vessel")
                                .from(Faults::Table, Faults::VesselId)
                                .to(Vessels::Table, Vessels::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_faults_vessel_status")
                        .table(Faults::Table)
                        .col(Faults::VesselId)
                        .col(Faults::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(HseUpdates::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(HseUpdates::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(HseUpdates::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(HseUpdates::VesselId).uuid().null())
                        .col(ColumnDef::new(HseUpdates::Category).string().not_null())
                        .col(ColumnDef::new(HseUpdates::Title).string().not_null())
                        .col(ColumnDef::new(HseUpdates::Description).text().null())
                        .col(ColumnDef::new(HseUpdates::Reference).string().null())
                        .col(ColumnDef::new(HseUpdates::Severity).string().null())
                        .col(
                            ColumnDef::new(HseUpdates::IssuedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(HseUpdates::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(HseUpdates::DueAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(HseUpdates::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(HseUpdates::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(HseUpdates::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(HseUpdates::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(HseUpdates::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_hse_updates_company_category")
                        .table(HseUpdates::Table)
                        .col(HseUpdates::CompanyId)
                        .col(HseUpdates::Category)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ChatMessages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ChatMessages::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ChatMessages::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(ChatMessages::VesselId).uuid().null())
                        .col(ColumnDef::new(ChatMessages::SenderId).uuid().not_null())
                        .col(ColumnDef::new(ChatMessages::SenderName).string().not_null())
                        .col(ColumnDef::new(ChatMessages::Body).text().not_null())
                        .col(
                            ColumnDef::new(ChatMessages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_chat_messages_channel_created")
                        .table(ChatMessages::Table)
                        .col(ChatMessages::CompanyId)
                        .col(ChatMessages::VesselId)
                        .col(ChatMessages::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ChatMessages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(HseUpdates::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Faults::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Faults {
        Table,
        Id,
        VesselId,
        CompanyId,
        EquipmentId,
        Title,
        Description,
        Severity,
        Status,
        ReportedBy,
        AssignedTo,
        ResolutionNotes,
        ResolvedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum HseUpdates {
        Table,
        Id,
        CompanyId,
        VesselId,
        Category,
        Title,
        Description,
        Reference,
        Severity,
        IssuedAt,
        ExpiresAt,
        DueAt,
        CompletedAt,
        ClosedAt,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ChatMessages {
        Table,
        Id,
        CompanyId,
        VesselId,
        SenderId,
        SenderName,
        Body,
        CreatedAt,
    }
}

mod m20240601_000005_create_messaging_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_messaging_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).uuid().not_null())
                        .col(ColumnDef::new(Notifications::CompanyId).uuid().null())
                        .col(ColumnDef::new(Notifications::Kind).string().not_null())
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Body).text().not_null())
                        .col(ColumnDef::new(Notifications::EntityType).string().null())
                        .col(ColumnDef::new(Notifications::EntityId).uuid().null())
                        .col(
                            ColumnDef::new(Notifications::ReadAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_user_read")
                        .table(Notifications::Table)
                        .col(Notifications::UserId)
                        .col(Notifications::ReadAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ScheduledNotifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ScheduledNotifications::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ScheduledNotifications::Kind).string().not_null())
                        .col(
                            ColumnDef::new(ScheduledNotifications::Recipient)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ScheduledNotifications::Subject)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ScheduledNotifications::Body).text().not_null())
                        .col(ColumnDef::new(ScheduledNotifications::RelatedId).uuid().null())
                        .col(
                            ColumnDef::new(ScheduledNotifications::DeliverAfter)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ScheduledNotifications::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ScheduledNotifications::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ScheduledNotifications::LastError).text().null())
                        .col(
                            ColumnDef::new(ScheduledNotifications::SentAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ScheduledNotifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ScheduledNotifications::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_scheduled_notifications_due")
                        .table(ScheduledNotifications::Table)
                        .col(ScheduledNotifications::Status)
                        .col(ScheduledNotifications::DeliverAfter)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FileAttachments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FileAttachments::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(FileAttachments::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(FileAttachments::EntityType).string().not_null())
                        .col(ColumnDef::new(FileAttachments::EntityId).uuid().not_null())
                        .col(ColumnDef::new(FileAttachments::FileName).string().not_null())
                        .col(ColumnDef::new(FileAttachments::ContentType).string().not_null())
                        .col(
                            ColumnDef::new(FileAttachments::SizeBytes)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FileAttachments::StoragePath).string().not_null())
                        .col(ColumnDef::new(FileAttachments::UploadedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(FileAttachments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_file_attachments_entity")
                        .table(FileAttachments::Table)
                        .col(FileAttachments::EntityType)
                        .col(FileAttachments::EntityId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SyncOperations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SyncOperations::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SyncOperations::UserId).uuid().not_null())
                        .col(ColumnDef::new(SyncOperations::ClientOpId).string().not_null())
                        .col(ColumnDef::new(SyncOperations::OpType).string().not_null())
                        .col(ColumnDef::new(SyncOperations::Status).string().not_null())
                        .col(ColumnDef::new(SyncOperations::Result).text().null())
                        .col(ColumnDef::new(SyncOperations::Error).text().null())
                        .col(
                            ColumnDef::new(SyncOperations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_sync_operations_user_op")
                        .table(SyncOperations::Table)
                        .col(SyncOperations::UserId)
                        .col(SyncOperations::ClientOpId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SyncOperations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(FileAttachments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ScheduledNotifications::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        UserId,
        CompanyId,
        Kind,
        Title,
        Body,
        EntityType,
        EntityId,
        ReadAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ScheduledNotifications {
        Table,
        Id,
        Kind,
        Recipient,
        Subject,
        Body,
        RelatedId,
        DeliverAfter,
        Status,
        Attempts,
        LastError,
        SentAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum FileAttachments {
        Table,
        Id,
        CompanyId,
        EntityType,
        EntityId,
        FileName,
        ContentType,
        SizeBytes,
        StoragePath,
        UploadedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SyncOperations {
        Table,
        Id,
        UserId,
        ClientOpId,
        OpType,
        Status,
        Result,
        Error,
        CreatedAt,
    }
}
