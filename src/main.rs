use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use metrics_tracker_lib::commands::{metrics, records, settings};
use metrics_tracker_lib::dialog::terminal::{
    AutoConfirm, FixedPicker, TerminalConfirm, TerminalNotifier, TerminalPicker,
};
use metrics_tracker_lib::dialog::{Confirm, DirectoryPicker};
use metrics_tracker_lib::models::{parse_db_date, Metric, NewInvoice, NewKilometer, NewMetric, NewWeight, Weight};
use metrics_tracker_lib::settings::{default_settings_path, JsonSettingsStore};
use metrics_tracker_lib::{App, AppConfig, AppError, Collaborators};

#[derive(Parser)]
#[clap(author, version, about = "Track body weight and custom KPIs in local SQLite files", long_about = None)]
struct Cli {
    /// Data folder to use when none is saved yet (or the new one for change-path)
    #[clap(long)]
    root: Option<PathBuf>,

    /// Create missing databases without asking
    #[clap(short, long)]
    yes: bool,

    /// Settings file, by default <config dir>/metrics-tracker/store.json
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Print results as JSON
    #[clap(long)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the data folder and open (or create) both databases
    Init,
    /// Check that both database files exist, recreating missing ones
    Verify,
    /// Print the current data folder
    Path,
    /// Pick a new data folder and reload
    ChangePath,
    /// Body weight records
    Weight {
        #[clap(subcommand)]
        action: WeightAction,
    },
    /// Distance records
    Km {
        #[clap(subcommand)]
        action: SimpleAction,
    },
    /// Invoices
    Invoice {
        #[clap(subcommand)]
        action: InvoiceAction,
    },
    /// Tracked category / KPI definitions
    Metric {
        #[clap(subcommand)]
        action: MetricAction,
    },
}

#[derive(Subcommand)]
enum WeightAction {
    Add {
        #[clap(allow_negative_numbers = true)]
        kg: f64,
        /// YYYY-MM-DD or RFC 3339, defaults to now
        #[clap(long)]
        date: Option<String>,
    },
    Edit {
        id: i64,
        #[clap(allow_negative_numbers = true)]
        kg: f64,
        #[clap(long)]
        date: Option<String>,
    },
    Rm {
        ids: Vec<i64>,
    },
    List,
}

#[derive(Subcommand)]
enum SimpleAction {
    Add {
        #[clap(allow_negative_numbers = true)]
        value: f64,
        #[clap(long)]
        date: Option<String>,
    },
    Rm {
        ids: Vec<i64>,
    },
    List,
}

#[derive(Subcommand)]
enum InvoiceAction {
    Add {
        #[clap(allow_negative_numbers = true)]
        amount: f64,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        date: Option<String>,
    },
    Rm {
        ids: Vec<i64>,
    },
    List,
}

#[derive(Subcommand)]
enum MetricAction {
    Add {
        category: String,
        kpi: String,
    },
    Edit {
        id: i64,
        category: String,
        kpi: String,
    },
    Rm {
        ids: Vec<i64>,
    },
    List,
}

fn parse_date(raw: Option<&str>) -> Result<DateTime<Utc>, AppError> {
    match raw {
        None => Ok(Utc::now()),
        Some(raw) => parse_db_date(raw)
            .ok_or_else(|| AppError::Validation(format!("Invalid date: {}", raw))),
    }
}

fn print<T: Serialize + std::fmt::Debug>(json: bool, value: &T) -> Result<(), AppError> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{:?}", value);
    }
    Ok(())
}

fn print_rows<T: Serialize>(json: bool, rows: &[T], line: impl Fn(&T) -> String) -> Result<(), AppError> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        for row in rows {
            println!("{}", line(row));
        }
    }
    Ok(())
}

fn build_app(cli: &Cli) -> Result<App, AppError> {
    let config = AppConfig::load()?;
    let settings_path = match &cli.settings {
        Some(path) => path.clone(),
        None => default_settings_path(&config.settings_file)?,
    };
    log::debug!("settings file: {}", settings_path.display());

    let picker: Arc<dyn DirectoryPicker> = match &cli.root {
        Some(root) => Arc::new(FixedPicker(Some(root.clone()))),
        None => Arc::new(TerminalPicker),
    };
    let confirm: Arc<dyn Confirm> = if cli.yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(TerminalConfirm)
    };

    Ok(App::new(
        config,
        Collaborators {
            settings: Arc::new(JsonSettingsStore::new(settings_path)),
            picker,
            confirm,
            notifier: Arc::new(TerminalNotifier),
        },
    ))
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let app = build_app(&cli)?;
    let json = cli.json;

    let report = settings::initialize(&app).await?;
    if report.root.is_none() {
        return Err(AppError::PathUnset);
    }

    match cli.command {
        Commands::Init => print(json, &report)?,
        Commands::Verify => print(json, &settings::verify_databases(&app).await?)?,
        Commands::Path => match settings::current_path(&app).await {
            Some(root) => println!("{}", root),
            None => return Err(AppError::PathUnset),
        },
        Commands::ChangePath => match settings::change_setting_path(&app).await? {
            Some(report) => print(json, &report)?,
            None => println!("No folder selected."),
        },
        Commands::Weight { action } => match action {
            WeightAction::Add { kg, date } => {
                let entry = NewWeight {
                    weight: kg,
                    date: parse_date(date.as_deref())?,
                };
                print(json, &records::add_weight(&app, entry).await?)?;
            }
            WeightAction::Edit { id, kg, date } => {
                let current = app.records().weights.get(id);
                let date = match (date, current) {
                    (Some(raw), _) => parse_date(Some(raw.as_str()))?,
                    (None, Some(existing)) => existing.date,
                    (None, None) => return Err(AppError::NotFound { table: "weights", id }),
                };
                let entry = Weight { id, weight: kg, date };
                print(json, &records::update_weight(&app, entry).await?)?;
            }
            WeightAction::Rm { ids } => {
                records::delete_weights(&app, &ids).await?;
            }
            WeightAction::List => print_rows(json, &app.records().weights.snapshot(), |w| {
                format!("{:>5}  {}  {:.1} kg", w.id, w.date.format("%Y-%m-%d"), w.weight)
            })?,
        },
        Commands::Km { action } => match action {
            SimpleAction::Add { value, date } => {
                let entry = NewKilometer {
                    km: value,
                    date: parse_date(date.as_deref())?,
                };
                print(json, &records::add_kilometer(&app, entry).await?)?;
            }
            SimpleAction::Rm { ids } => {
                records::delete_kilometers(&app, &ids).await?;
            }
            SimpleAction::List => print_rows(json, &app.records().kilometers.snapshot(), |k| {
                format!("{:>5}  {}  {:.2} km", k.id, k.date.format("%Y-%m-%d"), k.km)
            })?,
        },
        Commands::Invoice { action } => match action {
            InvoiceAction::Add {
                amount,
                description,
                date,
            } => {
                let entry = NewInvoice {
                    amount,
                    description,
                    date: parse_date(date.as_deref())?,
                };
                print(json, &records::add_invoice(&app, entry).await?)?;
            }
            InvoiceAction::Rm { ids } => {
                records::delete_invoices(&app, &ids).await?;
            }
            InvoiceAction::List => print_rows(json, &app.records().invoices.snapshot(), |i| {
                format!(
                    "{:>5}  {}  {:.2}  {}",
                    i.id,
                    i.date.format("%Y-%m-%d"),
                    i.amount,
                    i.description.as_deref().unwrap_or("")
                )
            })?,
        },
        Commands::Metric { action } => match action {
            MetricAction::Add { category, kpi } => {
                let entry = NewMetric {
                    category,
                    kpi,
                    date: None,
                };
                print(json, &metrics::add_metric(&app, entry).await?)?;
            }
            MetricAction::Edit { id, category, kpi } => {
                let date = app
                    .definitions()
                    .metrics
                    .get(id)
                    .map(|m| m.date)
                    .ok_or(AppError::NotFound { table: "metrics", id })?;
                let entry = Metric {
                    id,
                    category,
                    kpi,
                    date,
                };
                print(json, &metrics::update_metric(&app, entry).await?)?;
            }
            MetricAction::Rm { ids } => {
                metrics::delete_metrics(&app, &ids).await?;
            }
            MetricAction::List => print_rows(json, &app.definitions().metrics.snapshot(), |m| {
                format!("{:>5}  {:<20}  {}", m.id, m.category, m.kpi)
            })?,
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // .env ファイルから環境変数を読み込む（なくてもエラーにしない）
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
