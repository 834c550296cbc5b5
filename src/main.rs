use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use pos_reconcile::application::orchestrator::PaymentOrchestrator;
use pos_reconcile::config::ReconcileConfig;
use pos_reconcile::domain::amount::Amount;
use pos_reconcile::domain::message::{
    ErrorCondition, LoginRequest, Notification, PaymentRequest, PaymentResponse, Response,
    TransactionId,
};
use pos_reconcile::infrastructure::simulated::{SimulatedTerminal, Step};
use pos_reconcile::interfaces::csv::sale_item_reader::SaleItemReader;
use rust_decimal::Decimal;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Style {
    /// Read responses inline on the payment flow
    Direct,
    /// Receive responses through a background listener
    Notified,
}

/// How the simulated terminal behaves for this run.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    Approved,
    Declined,
    /// Connection drops after the payment is sent; recovery finds it approved
    Disconnect,
    /// Connection drops and the terminal keeps reporting "in progress"
    InProgress,
    /// A response for another sale arrives before the real one
    Stale,
    /// The terminal cannot be reached at all
    Offline,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sale system identifier
    sale_id: String,

    /// Terminal (POI) identifier
    poi_id: String,

    /// Requested amount
    #[arg(long, default_value = "42.00")]
    amount: Decimal,

    /// Basket CSV file (product_code, product_label, quantity, unit_price)
    #[arg(long)]
    items: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "direct")]
    style: Style,

    #[arg(long, value_enum, default_value = "approved")]
    scenario: Scenario,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long)]
    budget_ms: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<ReconcileConfig> {
    let mut config = match &cli.config {
        Some(path) => ReconcileConfig::from_path(path).into_diagnostic()?,
        None => ReconcileConfig::default(),
    }
    .with_identity(&cli.sale_id, &cli.poi_id);

    if let Some(ms) = cli.poll_interval_ms {
        config = config.with_poll_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.budget_ms {
        config = config.with_budget(Duration::from_millis(ms));
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

fn build_request(cli: &Cli, amount: Amount) -> Result<PaymentRequest> {
    let request = PaymentRequest::new(TransactionId::now(), amount);
    let request = match &cli.items {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            request.with_sale_items(SaleItemReader::new(file).read_all().into_diagnostic()?)
        }
        None => {
            let mut request = request;
            request.add_sale_item("XXYYZZ123", "Name of product", amount);
            request
        }
    };
    Ok(request)
}

fn script(
    terminal: &SimulatedTerminal,
    scenario: Scenario,
    request: &PaymentRequest,
    config: &ReconcileConfig,
) {
    match scenario {
        Scenario::Approved => {
            terminal.on_payment(Step::approved());
        }
        Scenario::Declined => {
            terminal.on_payment(Step::declined(ErrorCondition::Refusal, "Insufficient funds"));
        }
        Scenario::Disconnect => {
            terminal
                .on_payment(Step::Disconnect)
                .on_status(Step::in_progress())
                .on_status(Step::found_approved());
        }
        Scenario::InProgress => {
            terminal.on_payment(Step::Disconnect);
            let polls = config.budget.as_millis() / config.poll_interval.as_millis().max(1) + 2;
            for _ in 0..polls {
                terminal.on_status(Step::in_progress());
            }
        }
        Scenario::Stale => {
            let reply = |id: TransactionId| {
                Notification::Payment(PaymentResponse {
                    sale_transaction_id: id,
                    response: Response::success(),
                    sale_receipt: None,
                })
            };
            terminal.on_payment(Step::Deliver(vec![
                reply(TransactionId::new("000000000000000000")),
                reply(request.sale_transaction_id.clone()),
            ]));
        }
        Scenario::Offline => {
            terminal.fail_next_connects(u32::MAX);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(&cli)?;
    let amount = Amount::new(cli.amount).into_diagnostic()?;
    let request = build_request(&cli, amount)?;

    let terminal = Arc::new(SimulatedTerminal::new(&config.sale_id, &config.poi_id));
    terminal.on_login(Step::approved());
    script(&terminal, cli.scenario, &request, &config);

    let orchestrator = match cli.style {
        Style::Direct => PaymentOrchestrator::direct(terminal.clone(), config),
        Style::Notified => {
            let orchestrator = PaymentOrchestrator::notified(terminal.clone(), config);
            let login = LoginRequest {
                provider_identification: "Company A".to_string(),
                application_name: "POS Retail".to_string(),
                software_version: env!("CARGO_PKG_VERSION").to_string(),
                certification_code: "98cf9dfc-0db7-4a92-8b8cb66d4d2d7169".to_string(),
            };
            if let Err(e) = orchestrator.login(login).await {
                tracing::warn!(error = %e, "Login failed");
            }
            orchestrator
        }
    };

    let outcome = orchestrator.execute_payment(request).await;

    println!("Purchase result: {}", outcome.is_success());
    println!("{}", outcome);
    if let Some(receipt) = &outcome.sale_receipt {
        println!("{}", receipt);
    }
    Ok(())
}
