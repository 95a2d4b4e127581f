//! Trade Training
//!
//! Interactive paper trading against historical daily bars.

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use trade_training::{
    config::Config,
    engine::OrderOutcome,
    history::{AnnotateTarget, LedgerFile},
    price::BarSeries,
    report,
    session::{discover_sessions, SessionOptions, TrainingSession},
    sizing, MarginPolicy, Timing, TrainingError,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "trade-training")]
#[command(about = "Paper trading practice against historical daily bars")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "training.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new session
    Start {
        /// Stock code
        code: String,
        /// First date of the data, yyyymmdd (defaults to the first bar)
        #[arg(short, long)]
        start: Option<String>,
        /// Shares per lot
        #[arg(short, long)]
        lot: Option<u64>,
        /// Initial assets
        #[arg(short, long)]
        assets: Option<Decimal>,
        /// forbidden or warning
        #[arg(long)]
        policy: Option<MarginPolicy>,
    },
    /// Resume the newest session of a stock
    Resume {
        code: String,
    },
    /// List resumable sessions of a stock
    Sessions {
        code: String,
    },
    /// Summarize a ledger by stock segment
    Report {
        ledger: PathBuf,
        /// Also write the summary CSV next to the ledger
        #[arg(long)]
        write: bool,
        /// Only show the last N segments
        #[arg(long)]
        tail: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print `date:short-long` pairs of a ledger for chart annotation
    TradingView {
        ledger: PathBuf,
        code: String,
        /// yyyymmdd
        from: String,
        /// yyyymmdd
        to: String,
    },
    /// Print `date:short-long` share counts from broker fill exports
    BrokerView {
        code: String,
        /// yyyymmdd
        from: String,
        /// yyyymmdd
        to: String,
        /// Export directory (defaults to data.broker_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Suggest a lot size
    LotSize {
        assets: Decimal,
        price: Decimal,
        /// Target number of positions
        #[arg(short = 'n', long, default_value_t = sizing::DEFAULT_TARGET_POSITIONS)]
        positions: u32,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Start {
            code,
            start,
            lot,
            assets,
            policy,
        } => start_session(config, &code, start.as_deref(), lot, assets, policy),
        Commands::Resume { code } => resume_session(config, &code),
        Commands::Sessions { code } => list_sessions(&config, &code),
        Commands::Report {
            ledger,
            write,
            tail,
            json,
        } => show_report(&ledger, write, tail, json),
        Commands::TradingView {
            ledger,
            code,
            from,
            to,
        } => show_trading_view(&ledger, &code, &from, &to),
        Commands::BrokerView { code, from, to, dir } => {
            let dir = dir.unwrap_or(config.data.broker_dir);
            show_broker_view(&dir, &code, &from, &to)
        }
        Commands::LotSize {
            assets,
            price,
            positions,
        } => {
            let size = sizing::calculate_lot_size(assets, positions, Some(price))?;
            println!("{}", size);
            Ok(())
        }
    }
}

fn start_session(
    config: Config,
    code: &str,
    start: Option<&str>,
    lot: Option<u64>,
    assets: Option<Decimal>,
    policy: Option<MarginPolicy>,
) -> anyhow::Result<()> {
    let prices = BarSeries::load_latest(&config.data.prices_dir, code)?;
    let data_start = match start {
        Some(raw) => parse_date(raw).with_context(|| format!("bad start date '{}'", raw))?,
        None => prices
            .first_date()
            .with_context(|| format!("no bars loaded for {}", code))?,
    };

    let mut options = SessionOptions::from_config(code, data_start, &config.session);
    if let Some(lot) = lot {
        options.lot_size = lot;
    }
    if let Some(assets) = assets {
        options.initial_assets = assets;
    }
    if let Some(policy) = policy {
        options.margin_policy = policy;
    }

    let session = TrainingSession::start(
        options,
        Rc::new(prices),
        &config.data.output_dir,
        Local::now().naive_local(),
    )?;
    run_loop(session, config.session.list_limit)
}

fn resume_session(config: Config, code: &str) -> anyhow::Result<()> {
    let found = discover_sessions(&config.data.output_dir, code)?;
    let newest = found
        .first()
        .with_context(|| format!("no resumable session for {} in {}", code, config.data.output_dir.display()))?;

    let prices = BarSeries::load_latest(&config.data.prices_dir, code)?;
    let options = SessionOptions::from_config(code, newest.data_start, &config.session);
    let session = TrainingSession::resume(options, Rc::new(prices), newest)?;
    println!("Resumed at {}", newest.last_trading_date);
    run_loop(session, config.session.list_limit)
}

fn list_sessions(config: &Config, code: &str) -> anyhow::Result<()> {
    let found = discover_sessions(&config.data.output_dir, code)?;
    if found.is_empty() {
        println!("No resumable session for {}", code);
        return Ok(());
    }
    for (i, session) in found.iter().enumerate() {
        let assets: Vec<String> = session
            .assets
            .iter()
            .map(|(timing, a)| format!("{} {}", timing, report::format_yen(*a)))
            .collect();
        println!(
            "[{}] {} data from {} started {} last traded {} ({})",
            i,
            session.code,
            session.data_start,
            session.session_started,
            session.last_trading_date,
            assets.join(", ")
        );
    }
    Ok(())
}

fn show_report(ledger: &std::path::Path, write: bool, tail: Option<usize>, json: bool) -> anyhow::Result<()> {
    let segments = report::summarize(ledger)?;
    if write {
        let path = report::write_summary(ledger, &segments)?;
        println!("Wrote {}", path.display());
    }
    if json {
        let start = tail.map_or(0, |n| segments.len().saturating_sub(n));
        println!("{}", serde_json::to_string_pretty(&segments[start..])?);
    } else {
        print!("{}", report::format_segments(&segments, tail));
    }
    Ok(())
}

fn show_trading_view(ledger: &std::path::Path, code: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let from = parse_date(from).with_context(|| format!("bad date '{}'", from))?;
    let to = parse_date(to).with_context(|| format!("bad date '{}'", to))?;
    let rows = LedgerFile::open(ledger)?.read_rows()?;
    match report::trading_view_string(&rows, code, from, to) {
        Some(line) => println!("{}", line),
        None => println!("No rows for {} between {} and {}", code, from, to),
    }
    Ok(())
}

fn show_broker_view(dir: &std::path::Path, code: &str, from: &str, to: &str) -> anyhow::Result<()> {
    let from = parse_date(from).with_context(|| format!("bad date '{}'", from))?;
    let to = parse_date(to).with_context(|| format!("bad date '{}'", to))?;
    match report::broker::broker_trading_view(dir, code, from, to)? {
        Some(line) => println!("{}", line),
        None => println!("No fills for {} between {} and {} in {}", code, from, to, dir.display()),
    }
    Ok(())
}

/// One line of interactive input
#[derive(Debug, Clone, PartialEq)]
enum LoopCommand {
    Order {
        date: NaiveDate,
        short_lot: u32,
        long_lot: u32,
        price: Option<Decimal>,
    },
    Undo(usize),
    Rollback(i64),
    List(Option<usize>),
    Memo(AnnotateTarget, String),
    Help,
    Quit,
}

const HELP: &str = "\
  <yyyy-mm-dd|yyyymmdd> <short lots> <long lots> [price]
  undo [n]            drop the last n orders
  rollback <index>    keep rows up to index (-1 = row before the last)
  list [n]            show recent rows
  memo <date|#row> <text>
  quit";

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}

fn parse_command(line: &str) -> Result<LoopCommand, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".into());
    };
    let rest: Vec<&str> = words.collect();

    let number = |raw: &str| raw.parse::<usize>().map_err(|_| format!("not a count: {}", raw));

    match head.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => Ok(LoopCommand::Quit),
        "help" | "?" => Ok(LoopCommand::Help),
        "undo" => match rest.first() {
            Some(n) => Ok(LoopCommand::Undo(number(*n)?)),
            None => Ok(LoopCommand::Undo(1)),
        },
        "rollback" => {
            let raw = rest.first().ok_or("rollback needs a row index")?;
            raw.parse::<i64>()
                .map(LoopCommand::Rollback)
                .map_err(|_| format!("not a row index: {}", raw))
        }
        "list" => match rest.first() {
            Some(n) => Ok(LoopCommand::List(Some(number(*n)?))),
            None => Ok(LoopCommand::List(None)),
        },
        "memo" => {
            let target = rest.first().ok_or("memo needs a date or #row")?;
            let target = match target.strip_prefix('#') {
                Some(idx) => AnnotateTarget::Row(
                    idx.parse::<i64>().map_err(|_| format!("not a row index: {}", idx))?,
                ),
                None => AnnotateTarget::Date(
                    parse_date(target).ok_or_else(|| format!("not a date: {}", target))?,
                ),
            };
            Ok(LoopCommand::Memo(target, rest[1..].join(" ")))
        }
        _ => {
            let date = parse_date(head).ok_or_else(|| format!("unknown command: {}", head))?;
            if rest.len() < 2 || rest.len() > 3 {
                return Err("expected <date> <short lots> <long lots> [price]".into());
            }
            let lots = |raw: &str| raw.parse::<u32>().map_err(|_| format!("not a lot count: {}", raw));
            let price = match rest.get(2) {
                Some(raw) => Some(
                    raw.parse::<Decimal>()
                        .map_err(|_| format!("not a price: {}", raw))?,
                ),
                None => None,
            };
            Ok(LoopCommand::Order {
                date,
                short_lot: lots(rest[0])?,
                long_lot: lots(rest[1])?,
                price,
            })
        }
    }
}

fn run_loop(mut session: TrainingSession<Rc<BarSeries>>, list_limit: usize) -> anyhow::Result<()> {
    println!(
        "{} lot size {} ({} leg(s)); type 'help' for commands",
        session.code(),
        session.lot_size(),
        session.legs().len()
    );

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(c) => c,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };

        let result = match command {
            LoopCommand::Quit => break,
            LoopCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            LoopCommand::Order {
                date,
                short_lot,
                long_lot,
                price,
            } => session
                .submit_all(date, short_lot, long_lot, price)
                .map(|outcomes| {
                    for (timing, outcome) in &outcomes {
                        print_outcome(*timing, outcome);
                    }
                }),
            LoopCommand::Undo(steps) => session.undo_all(steps).map(|_| print_state(&session)),
            LoopCommand::Rollback(index) => {
                session.rollback_all(index).map(|_| print_state(&session))
            }
            LoopCommand::List(limit) => print_recent(&session, limit.unwrap_or(list_limit)),
            LoopCommand::Memo(target, memo) => {
                session.annotate_all(target, &memo).map(|written| {
                    for (timing, row) in written {
                        println!("{} row {} noted", timing, row);
                    }
                })
            }
        };

        if let Err(e) = result {
            report_error(&e);
        }
    }
    Ok(())
}

fn report_error(e: &TrainingError) {
    if e.is_recoverable() {
        println!("{}", e);
    } else {
        tracing::error!("{}", e);
    }
}

fn print_outcome(timing: Timing, outcome: &OrderOutcome) {
    let s = &outcome.snapshot;
    let status = if outcome.is_persisted() { "" } else { " (unchanged)" };
    println!(
        "{:<9} {} @ {}: short {} lot(s) avg {:.2}, long {} lot(s) avg {:.2}, profit {}, assets {}{}",
        timing,
        outcome.execution_date,
        s.execution_price,
        s.short_lot,
        s.short_position.average_price(),
        s.long_lot,
        s.long_position.average_price(),
        report::format_yen(s.realized_profit()),
        report::format_yen(s.assets),
        status
    );
    if let Some(advisory) = &outcome.advisory {
        println!("          warning: {}", advisory);
    }
}

fn print_state(session: &TrainingSession<Rc<BarSeries>>) {
    for leg in session.legs() {
        match leg.snapshot() {
            Some(s) => println!(
                "{:<9} back at {}: short {} lot(s), long {} lot(s), assets {}",
                leg.timing(),
                s.trading_date,
                s.short_lot,
                s.long_lot,
                report::format_yen(leg.assets())
            ),
            None => println!(
                "{:<9} back at the start, assets {}",
                leg.timing(),
                report::format_yen(leg.assets())
            ),
        }
    }
}

fn print_recent(session: &TrainingSession<Rc<BarSeries>>, limit: usize) -> trade_training::Result<()> {
    for leg in session.legs() {
        println!("{}", leg.timing());
        for (index, row) in leg.list_recent(limit)? {
            println!(
                "  [{}] {} @ {} short {} long {} assets {} {}",
                index,
                row.trading_date,
                row.price,
                row.short_lot,
                row.long_lot,
                report::format_yen(row.assets),
                row.memo
            );
        }
    }
    Ok(())
}
