use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use psw_review::api::{Api, CompanyActionRequest, CompanyListResponse, Reply};
use psw_review::filter::RawFilterParams;
use psw_review::models::{Candidate, Identity};
use psw_review::{RegistryConfig, StoreRegistry, schema};

#[derive(Parser)]
#[command(name = "psw")]
#[command(about = "Review pipeline for new companies - list, filter, approve and reject")]
struct Cli {
    /// Reviewer id recorded with approve/reject actions
    #[arg(long, global = true, default_value = "0")]
    reviewer: i64,

    /// Reviewer role
    #[arg(long, global = true, default_value = "admin")]
    role: String,

    /// Print the raw JSON envelope instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ListArgs {
    /// Free-text search over name, country and comment
    #[arg(short, long)]
    search: Option<String>,

    /// Filter by status (pending, approved, blocked, rejected, all)
    #[arg(long)]
    status: Option<String>,

    /// Filter by broker id ("all" for any)
    #[arg(short, long)]
    broker: Option<String>,

    /// Filter by country label ("all" for any)
    #[arg(short, long)]
    country: Option<String>,

    #[arg(short, long)]
    page: Option<String>,

    /// Page size (1-100)
    #[arg(short, long)]
    limit: Option<String>,
}

impl ListArgs {
    fn into_raw(self) -> RawFilterParams {
        RawFilterParams {
            search: self.search,
            status: self.status,
            broker_id: self.broker,
            country: self.country,
            page: self.page,
            page_size: self.limit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tables in every store
    Init,

    /// List new companies (pending unless --status is given)
    List(ListArgs),

    /// List approved companies
    Masterlist(ListArgs),

    /// Show company details
    Show {
        /// Company ID
        id: i64,
    },

    /// Approve a company
    Approve {
        /// Company ID
        id: String,
    },

    /// Reject a company
    Reject {
        /// Company ID
        id: String,
    },

    /// Brokers that can be used as a filter
    Brokers,

    /// Countries that can be used as a filter
    Countries,

    /// Dashboard statistics
    Stats {
        /// Show chart distributions instead of the overview
        #[arg(long)]
        charts: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("psw=info,psw_review=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RegistryConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {}", config.data_dir.display()))?;
    let registry = Arc::new(StoreRegistry::init(&config)?);
    let caller = Identity::new(cli.reviewer, cli.role.clone());

    let result = run(&cli, &registry, &config, &caller);
    registry.shutdown();
    result
}

fn run(cli: &Cli, registry: &Arc<StoreRegistry>, config: &RegistryConfig, caller: &Identity) -> Result<()> {
    let command = &cli.command;
    if !matches!(command, Commands::Init) && !schema::is_initialized(registry)? {
        return Err(anyhow!("Stores not initialized. Run 'psw init' first."));
    }
    let api = Api::new(Arc::clone(registry));

    match command {
        Commands::Init => {
            schema::bootstrap(registry)?;
            println!("Stores initialized in {}", config.data_dir.display());
        }

        Commands::List(args) => {
            let reply = api.list_new_companies(caller, &args.clone().into_raw());
            emit(cli.json, reply, print_companies)?;
        }

        Commands::Masterlist(args) => {
            let reply = api.masterlist(caller, &args.clone().into_raw());
            emit(cli.json, reply, print_companies)?;
        }

        Commands::Show { id } => {
            emit(cli.json, api.company(caller, *id), |body| print_company(&body.company))?;
        }

        Commands::Approve { id } | Commands::Reject { id } => {
            let action = if matches!(command, Commands::Approve { .. }) {
                "approve"
            } else {
                "reject"
            };
            let request = CompanyActionRequest {
                company_id: Some(id.clone()),
                action: Some(action.to_string()),
            };
            emit(cli.json, api.company_action(caller, &request), |body| {
                println!("{}", body.message);
            })?;
        }

        Commands::Brokers => {
            emit(cli.json, api.broker_options(caller), |body| {
                if body.brokers.is_empty() {
                    println!("No brokers in use.");
                    return;
                }
                println!("{:<6} {:<30}", "ID", "NAME");
                println!("{}", "-".repeat(36));
                for broker in &body.brokers {
                    println!("{:<6} {:<30}", broker.id, truncate(&broker.name, 28));
                }
            })?;
        }

        Commands::Countries => {
            emit(cli.json, api.country_options(caller), |body| {
                for country in &body.countries {
                    println!("{}", country);
                }
            })?;
        }

        Commands::Stats { charts: true } => {
            emit(cli.json, api.dashboard_charts(caller), |body| {
                for (title, rows) in [
                    ("Status", &body.data.status_distribution),
                    ("Country", &body.data.country_distribution),
                    ("Yield", &body.data.yield_distribution),
                ] {
                    println!("{}:", title);
                    for row in rows {
                        println!("  {:<20} {:>6}", truncate(&row.label, 18), row.count);
                    }
                }
            })?;
        }

        Commands::Stats { charts: false } => {
            emit(cli.json, api.dashboard_overview(caller), |body| {
                let s = &body.data.summary;
                println!("Total:     {}", s.total);
                println!("Pending:   {}", s.pending);
                println!("Approved:  {}", s.approved);
                println!("Blocked:   {}", s.blocked);
                println!("Rejected:  {}", s.rejected);
                println!("With yield: {}", s.with_yield);
                if let Some(avg) = s.average_yield {
                    println!("Avg yield: {}%", avg);
                }
                if let Some(max) = s.max_yield {
                    println!("Max yield: {}%", max);
                }
                println!("Added in the last 7 days: {}", s.added_last_week);
                if !body.data.top_countries.is_empty() {
                    println!("\nTop countries:");
                    for row in &body.data.top_countries {
                        println!("  {:<20} {:>6}", truncate(&row.label, 18), row.count);
                    }
                }
                if !body.data.recent.is_empty() {
                    println!("\nRecently added:");
                    for company in &body.data.recent {
                        println!("  #{} - {} ({})", company.id, company.name, company.status.label());
                    }
                }
            })?;
        }
    }

    Ok(())
}

/// Print the JSON envelope, or the table; failures become a non-zero exit.
fn emit<T: Serialize>(json: bool, reply: Reply<T>, render: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    }
    match reply {
        Reply::Ok(body) => {
            if !json {
                render(&body);
            }
            Ok(())
        }
        Reply::Err(err) => Err(anyhow!("{} (status {})", err.message, err.status)),
    }
}

fn print_companies(body: &CompanyListResponse) {
    if body.companies.is_empty() {
        println!("No companies found.");
        return;
    }
    println!(
        "{:<6} {:<10} {:<28} {:<14} {:<18} {:>7}",
        "ID", "STATUS", "NAME", "COUNTRY", "BROKER", "YIELD"
    );
    println!("{}", "-".repeat(88));
    for company in &body.companies {
        let yield_pct = company
            .yield_pct
            .map(|y| format!("{}%", y))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<10} {:<28} {:<14} {:<18} {:>7}",
            company.id,
            company.status.label(),
            truncate(&company.name, 26),
            truncate(company.country.as_deref().unwrap_or(""), 12),
            truncate(company.broker_name.as_deref().unwrap_or(""), 16),
            yield_pct
        );
    }
    println!("\n{} of {} total", body.companies.len(), body.total_count);
}

fn print_company(company: &Candidate) {
    println!("Company #{}", company.id);
    println!("Name: {}", company.name);
    println!("Status: {}", company.status.label());
    if let Some(ticker) = &company.ticker {
        println!("Ticker: {}", ticker);
    }
    if let Some(country) = &company.country {
        println!("Country: {}", country);
    }
    if let Some(broker) = &company.broker_name {
        println!("Broker: {}", broker);
    }
    if let Some(yield_pct) = company.yield_pct {
        println!("Yield: {}%", yield_pct);
    }
    if let Some(comment) = &company.comment {
        println!("\n--- Comment ---\n{}", comment);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
