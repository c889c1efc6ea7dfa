use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use pantry_ledger::{
    config::{self, AppConfig},
    entities::{
        ConsumptionRecord, ConsumptionRecordPatch, FoodCategory, LogConsumptionRequest,
        NewStockRecord, StockRecord,
    },
    events::{self, EventSender},
    repositories::{InMemoryRepository, StoreSnapshot},
    services::{RankedStock, ServiceContainer, ServiceFactory},
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(&cli).await?;

    let mutated = match cli.command {
        Commands::Add(args) => handle_add(&context, args, cli.json).await?,
        Commands::List(args) => handle_list(&context, args, cli.json).await?,
        Commands::Rank(args) => handle_rank(&context, args, cli.json).await?,
        Commands::Consume(args) => handle_consume(&context, args, cli.json).await?,
        Commands::EditConsumption(args) => {
            handle_edit_consumption(&context, args, cli.json).await?
        }
        Commands::DeleteConsumption(args) => {
            handle_delete_consumption(&context, args, cli.json).await?
        }
        Commands::History(args) => handle_history(&context, args, cli.json).await?,
        Commands::Summary(args) => handle_summary(&context, args, cli.json).await?,
    };

    if mutated {
        context.persist()?;
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "pantry", about = "Track pantry stock, log consumption and rank spoilage risk", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "pantry.json",
        help = "Path of the JSON snapshot holding stock and consumption records"
    )]
    snapshot: PathBuf,
    #[arg(
        long,
        global = true,
        default_value_t = Uuid::nil(),
        help = "Owner whose records are read and written"
    )]
    owner: Uuid,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a stock record
    Add(AddArgs),
    /// List stock records
    List(ListArgs),
    /// Rank stock by spoilage risk
    Rank(RankArgs),
    /// Log consumption against a stock record
    Consume(ConsumeArgs),
    /// Edit a consumption record
    EditConsumption(EditConsumptionArgs),
    /// Delete a consumption record and restore its stock
    DeleteConsumption(DeleteConsumptionArgs),
    /// Show consumption history
    History(HistoryArgs),
    /// Summarize consumption or stock per category
    Summary(SummaryArgs),
}

#[derive(Args)]
struct AddArgs {
    #[arg(long, help = "Item name")]
    name: String,
    #[arg(long, help = "Food category, e.g. dairy or vegetables")]
    category: FoodCategory,
    #[arg(long, help = "Units on hand")]
    quantity: i64,
    #[arg(long, help = "Shelf life in days from today")]
    expiration_days: i64,
    #[arg(long, help = "Explicit expiry date (YYYY-MM-DD); overrides expiration days")]
    expiry_date: Option<NaiveDate>,
    #[arg(long, default_value = "0", help = "Cost per unit")]
    unit_cost: Decimal,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, help = "Only items expiring within this many days")]
    expiring_within: Option<i64>,
    #[arg(long, help = "Only items in this category")]
    category: Option<FoodCategory>,
}

#[derive(Args)]
struct RankArgs {
    #[arg(long, help = "Reference date for scoring (defaults to today)")]
    as_of: Option<NaiveDate>,
    #[arg(long, help = "Show only the top N items")]
    limit: Option<usize>,
}

#[derive(Args)]
struct ConsumeArgs {
    #[arg(long, help = "Stock record to draw from")]
    item: Uuid,
    #[arg(long, help = "Units consumed")]
    quantity: i64,
    #[arg(long, help = "When the consumption happened (RFC 3339)")]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct EditConsumptionArgs {
    #[arg(long, help = "Consumption record to edit")]
    id: Uuid,
    #[arg(long)]
    quantity: Option<i64>,
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct DeleteConsumptionArgs {
    #[arg(long, help = "Consumption record to delete")]
    id: Uuid,
}

#[derive(Args)]
struct HistoryArgs {
    #[arg(long, help = "Page number, starting at 1")]
    page: Option<u32>,
    #[arg(long, help = "Records per page")]
    limit: Option<u32>,
    #[arg(long, requires = "to", help = "Start of a date range (RFC 3339)")]
    from: Option<DateTime<Utc>>,
    #[arg(long, requires = "from", help = "End of a date range (RFC 3339)")]
    to: Option<DateTime<Utc>>,
    #[arg(long, conflicts_with_all = ["from", "page"])]
    category: Option<FoodCategory>,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        conflicts_with_all = ["from", "category", "page"],
        help = "Show the most recent records only"
    )]
    recent: bool,
}

#[derive(Args)]
struct SummaryArgs {
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Summarize stock on hand instead of consumption"
    )]
    stock: bool,
}

struct CliContext {
    snapshot_path: PathBuf,
    owner: Uuid,
    repo: Arc<InMemoryRepository>,
    services: ServiceContainer,
}

impl CliContext {
    async fn initialize(cli: &Cli) -> Result<Self> {
        let config: AppConfig =
            config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let snapshot = StoreSnapshot::load(&cli.snapshot)
            .with_context(|| format!("failed to read snapshot {}", cli.snapshot.display()))?;
        let repo = Arc::new(InMemoryRepository::from_snapshot(snapshot));

        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let factory = ServiceFactory::new(repo.clone(), config, Some(event_sender));
        let services = ServiceContainer::new(&factory);
        debug!(target: "pantry_cli", owner = %cli.owner, "cli context initialized");

        Ok(Self {
            snapshot_path: cli.snapshot.clone(),
            owner: cli.owner,
            repo,
            services,
        })
    }

    fn persist(&self) -> Result<()> {
        self.repo
            .snapshot()
            .save(&self.snapshot_path)
            .with_context(|| format!("failed to write snapshot {}", self.snapshot_path.display()))
    }
}

async fn handle_add(context: &CliContext, args: AddArgs, json: bool) -> Result<bool> {
    let record = context
        .services
        .inventory
        .add_item(
            context.owner,
            NewStockRecord {
                name: args.name,
                category: args.category,
                quantity: args.quantity,
                expiration_days: args.expiration_days,
                expiry_date: args.expiry_date,
                unit_cost: args.unit_cost,
            },
        )
        .await
        .context("failed to add stock record")?;

    if json {
        print_json(&record)?;
    } else {
        println!("Added stock record {}", record.id);
        render_stock(&record);
    }
    Ok(true)
}

async fn handle_list(context: &CliContext, args: ListArgs, json: bool) -> Result<bool> {
    let inventory = &context.services.inventory;
    let mut items = match args.expiring_within {
        Some(days) => inventory
            .expiring_items(context.owner, Some(days), Utc::now().date_naive())
            .await
            .context("failed to list expiring stock")?,
        None => inventory
            .list_items(context.owner)
            .await
            .context("failed to list stock")?,
    };
    if let Some(category) = args.category {
        items.retain(|item| item.category == category);
    }

    if json {
        print_json(&items)?;
    } else if items.is_empty() {
        println!("No stock records");
    } else {
        for item in &items {
            render_stock(item);
        }
    }
    Ok(false)
}

async fn handle_rank(context: &CliContext, args: RankArgs, json: bool) -> Result<bool> {
    let as_of = args.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let mut ranked = context
        .services
        .inventory
        .risk_report(context.owner, as_of)
        .await
        .context("failed to rank stock")?;
    if let Some(limit) = args.limit {
        ranked.truncate(limit);
    }

    if json {
        print_json(&ranked)?;
    } else {
        println!("Spoilage risk as of {}", as_of);
        for (position, entry) in ranked.iter().enumerate() {
            render_ranked(position + 1, entry);
        }
    }
    Ok(false)
}

async fn handle_consume(context: &CliContext, args: ConsumeArgs, json: bool) -> Result<bool> {
    let record = context
        .services
        .consumption
        .log_consumption(
            context.owner,
            LogConsumptionRequest {
                stock_record_id: args.item,
                quantity: args.quantity,
                date: args.date,
                notes: args.notes,
            },
        )
        .await
        .with_context(|| format!("failed to log consumption against {}", args.item))?;

    if json {
        print_json(&record)?;
    } else {
        println!("Logged consumption {}", record.id);
        render_consumption(&record);
    }
    Ok(true)
}

async fn handle_edit_consumption(
    context: &CliContext,
    args: EditConsumptionArgs,
    json: bool,
) -> Result<bool> {
    let patch = ConsumptionRecordPatch {
        quantity: args.quantity,
        date: args.date,
        notes: args.notes,
    };
    if patch.is_empty() {
        bail!("nothing to change: pass --quantity, --date or --notes");
    }

    let record = context
        .services
        .consumption
        .update_consumption(context.owner, args.id, patch)
        .await
        .with_context(|| format!("failed to update consumption {}", args.id))?;

    if json {
        print_json(&record)?;
    } else {
        println!("Updated consumption {}", record.id);
        render_consumption(&record);
    }
    Ok(true)
}

async fn handle_delete_consumption(
    context: &CliContext,
    args: DeleteConsumptionArgs,
    json: bool,
) -> Result<bool> {
    context
        .services
        .consumption
        .delete_consumption(context.owner, args.id)
        .await
        .with_context(|| format!("failed to delete consumption {}", args.id))?;

    if json {
        print_json(&serde_json::json!({ "deleted": args.id }))?;
    } else {
        println!("Deleted consumption {}", args.id);
    }
    Ok(true)
}

async fn handle_history(context: &CliContext, args: HistoryArgs, json: bool) -> Result<bool> {
    let consumption = &context.services.consumption;
    let owner = context.owner;

    if let (Some(from), Some(to)) = (args.from, args.to) {
        let records = consumption
            .get_by_date_range(owner, from, to)
            .await
            .context("failed to read consumption history")?;
        return render_records(&records, json).map(|_| false);
    }
    if let Some(category) = args.category {
        let records = consumption
            .get_by_category(owner, category)
            .await
            .context("failed to read consumption history")?;
        return render_records(&records, json).map(|_| false);
    }
    if args.recent {
        let records = consumption
            .get_recent(owner, args.limit)
            .await
            .context("failed to read recent consumption")?;
        return render_records(&records, json).map(|_| false);
    }

    let page = consumption
        .get_history(owner, args.page, args.limit)
        .await
        .context("failed to read consumption history")?;
    if json {
        print_json(&page)?;
    } else {
        println!(
            "Page {} of {} ({} record(s) total)",
            page.page, page.pages, page.total
        );
        for record in &page.items {
            render_consumption(record);
        }
    }
    Ok(false)
}

async fn handle_summary(context: &CliContext, args: SummaryArgs, json: bool) -> Result<bool> {
    if args.stock {
        let summary = context
            .services
            .inventory
            .summary(context.owner)
            .await
            .context("failed to summarize stock")?;
        if json {
            print_json(&summary)?;
        } else {
            for row in &summary {
                println!(
                    "- {} • {} item(s) • {} unit(s) • value {}",
                    row.category, row.item_count, row.total_quantity, row.total_value
                );
            }
        }
    } else {
        let summary = context
            .services
            .consumption
            .get_summary(context.owner)
            .await
            .context("failed to summarize consumption")?;
        if json {
            print_json(&summary)?;
        } else {
            for row in &summary {
                println!(
                    "- {} • {} event(s) • {} unit(s) consumed",
                    row.category, row.event_count, row.total_quantity
                );
            }
        }
    }
    Ok(false)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_records(records: &[ConsumptionRecord], json: bool) -> Result<()> {
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No consumption records");
    }
    for record in records {
        render_consumption(record);
    }
    Ok(())
}

fn render_stock(item: &StockRecord) {
    println!(
        "- {} • {} • {} • qty {} • expires {} • unit cost {}",
        item.id, item.name, item.category, item.quantity, item.expiry_date, item.unit_cost
    );
}

fn render_consumption(record: &ConsumptionRecord) {
    println!(
        "- {} • {} x {} • {} • stock {}{}",
        record.id,
        record.quantity,
        record.item_name,
        record.date.format("%Y-%m-%d %H:%M"),
        record.stock_record_id,
        if record.notes.is_empty() {
            String::new()
        } else {
            format!(" • {}", record.notes)
        }
    );
}

fn render_ranked(position: usize, entry: &RankedStock) {
    let assessment = &entry.assessment;
    println!(
        "{:>3}. {} • score {:.1} • {} • {} day(s) left",
        position,
        assessment.item_name,
        assessment.score,
        assessment.level,
        assessment.days_to_expiry
    );
    println!("     {}", assessment.recommended_action);
}
