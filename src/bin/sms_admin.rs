use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use sms_api::{
    auth::{AuthConfig, AuthService, AuthUser, NewUser, UserRole},
    config::{self, AppConfig},
    db,
    entities::{company::SubscriptionTier, user},
    events::EventSender,
    services::companies::{CompanyService, GenerateCodesRequest},
};
use uuid::Uuid;

/// Operator tasks that run against the database directly
#[derive(Debug, Parser)]
#[command(name = "sms-admin", version, about = "SMS operator command line")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Create a platform administrator
    CreateAdmin(CreateAdminArgs),
    /// Issue a batch of activation codes
    IssueCodes(IssueCodesArgs),
}

#[derive(Debug, Args)]
struct CreateAdminArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: String,
    /// Falls back to SMS_ADMIN_PASSWORD
    #[arg(long, env = "SMS_ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Args)]
struct IssueCodesArgs {
    /// basic | professional | enterprise
    #[arg(long)]
    tier: SubscriptionTier,
    #[arg(long, default_value_t = 365)]
    days: i32,
    #[arg(long, default_value_t = 1)]
    count: u32,
    /// Recorded against the batch for later reference
    #[arg(long)]
    purchaser_email: Option<String>,
}

struct CliContext {
    config: Arc<AppConfig>,
    db: Arc<DatabaseConnection>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load configuration")?;
        config::init_tracing(config.log_level(), false);
        let pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(pool),
        })
    }

    fn auth_service(&self) -> AuthService {
        AuthService::new(AuthConfig::from(self.config.as_ref()), self.db.clone())
    }

    /// Acts as the earliest administrator, as the HTTP API would after login
    async fn acting_admin(&self) -> Result<AuthUser> {
        let admin = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Admin.to_string()))
            .filter(user::Column::IsActive.eq(true))
            .order_by_asc(user::Column::CreatedAt)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("no administrator exists; run `sms-admin create-admin` first"))?;
        Ok(AuthUser {
            user_id: admin.id,
            name: Some(admin.name),
            email: Some(admin.email),
            role: UserRole::Admin.to_string(),
            permissions: vec!["*".to_string()],
            company_id: None,
            token_id: format!("cli-{}", Uuid::new_v4()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("migration failed")?;
            println!("migrations applied");
        }
        Commands::CreateAdmin(args) => create_admin(&context, args, cli.json).await?,
        Commands::IssueCodes(args) => issue_codes(&context, args, cli.json).await?,
    }
    Ok(())
}

async fn create_admin(context: &CliContext, args: CreateAdminArgs, json: bool) -> Result<()> {
    let auth = context.auth_service();
    let created = auth
        .insert_user(
            &*context.db,
            NewUser {
                company_id: None,
                email: args.email,
                name: args.name,
                password: args.password,
                role: UserRole::Admin,
            },
        )
        .await
        .context("failed to create administrator")?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "id": created.id, "email": created.email })
        );
    } else {
        println!("administrator {} created ({})", created.email, created.id);
    }
    Ok(())
}

async fn issue_codes(context: &CliContext, args: IssueCodesArgs, json: bool) -> Result<()> {
    let admin = context.acting_admin().await?;
    let (events, _receiver) = EventSender::channel(16);
    let companies = CompanyService::new(context.db.clone(), events);
    let codes = companies
        .generate_codes(
            &admin,
            GenerateCodesRequest {
                tier: args.tier,
                duration_days: args.days,
                count: args.count,
                purchaser_email: args.purchaser_email,
            },
        )
        .await
        .context("failed to issue activation codes")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&codes)?);
    } else {
        for code in &codes {
            println!("{}  {}  {} days", code.code, code.tier, code.duration_days);
        }
    }
    Ok(())
}
