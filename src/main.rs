use std::time::Duration;

use crate::dataset::Dataset;
use crate::error::ValidationError;
use crate::holdings::{Holdings, HoldingsFilter, Selection};
use crate::logo::{LogoFetcher, DEFAULT_ENDPOINT};
use crate::lookup::Locale;
use crate::quarter::{quarter_end, Quarter};

use chrono::NaiveDate;
use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use eyre::{Result, WrapErr};
use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod dataset;
mod error;
mod holdings;
mod logo;
mod lookup;
mod observation;
mod quarter;
mod tui;

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    /// JSON file with raw holdings rows, empty for the built-in dataset
    dataset_file: String,
    /// JSON file with sector, name and logo-domain tables, empty for the built-in tables
    lookups_file: String,
    locale: String,
    logo_endpoint: String,
    logo_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_file: String::new(),
            lookups_file: String::new(),
            locale: "en".to_string(),
            logo_endpoint: DEFAULT_ENDPOINT.to_string(),
            logo_timeout_secs: 5,
        }
    }
}

fn filter_args() -> [Arg; 4] {
    [
        Arg::new("sector")
            .long("sector")
            .action(ArgAction::Append)
            .help("Only include this sector (repeatable)"),
        Arg::new("ticker")
            .long("ticker")
            .action(ArgAction::Append)
            .help("Only include this ticker or company name (repeatable)"),
        Arg::new("from")
            .long("from")
            .help("First date to include, YYYY-MM-DD or a quarter such as \"2010 Q4\""),
        Arg::new("to")
            .long("to")
            .help("Last date to include, YYYY-MM-DD or a quarter such as \"2020 Q4\""),
    ]
}

fn cli() -> Command {
    Command::new("holdings_rs")
        .about("Explore 25 years of curated equity holdings")
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .global(true)
                .help("Language for company and sector names: en or zh"),
        )
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("holdings")
                .about("Show the normalized holdings table")
                .args(filter_args()),
        )
        .subcommand(
            Command::new("summary")
                .about("Show the latest snapshot, top holding and top sector")
                .args(filter_args()),
        )
        .subcommand(
            Command::new("sectors")
                .about("Show value by sector for every quarter and the latest allocation")
                .args(filter_args()),
        )
        .subcommand(
            Command::new("stock")
                .about("Show the value and share history of one company")
                .arg(arg!(<TICKER> "Ticker symbol, e.g. AAPL")),
        )
        .subcommand(
            Command::new("export")
                .about("Print the normalized holdings as JSON")
                .args(filter_args()),
        )
        .subcommand(
            Command::new("logos")
                .about("List the logo domain of every company")
                .arg(arg!(--fetch "Download each logo and report whether it could be embedded")),
        )
        .subcommand(
            Command::new("tui")
                .about("Open the interactive dashboard")
                .arg(arg!(--tab <TAB> "Tab to open: composition, stock, sectors or logos").required(false)),
        )
}

fn init_logging(quiet: bool) {
    let default_directive = if quiet { "off" } else { "warn" };
    let filter = EnvFilter::try_from_env("HOLDINGS_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// Accepts a calendar date or a quarter label, which maps to its quarter end
fn parse_date_bound(s: &str) -> Result<NaiveDate, ValidationError> {
    quarter_end(s.trim())
        .or_else(|_| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d"))
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

fn build_filter(matches: &ArgMatches) -> Result<HoldingsFilter, ValidationError> {
    let strings = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };

    let mut filter = HoldingsFilter::new()
        .with_sectors(strings("sector"))
        .with_tickers(strings("ticker"));

    let from = matches.get_one::<String>("from");
    let to = matches.get_one::<String>("to");
    if from.is_some() || to.is_some() {
        let from = from.map(|s| parse_date_bound(s)).transpose()?.unwrap_or(NaiveDate::MIN);
        let to = to.map(|s| parse_date_bound(s)).transpose()?.unwrap_or(NaiveDate::MAX);
        if from > to {
            return Err(ValidationError::InvertedDateRange {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        filter = filter.with_date_range(from, to);
    }

    Ok(filter)
}

fn resolve_locale(matches: &ArgMatches, cfg: &Config) -> Result<Locale, ValidationError> {
    match matches.get_one::<String>("lang") {
        Some(lang) => lang.parse(),
        None => cfg.locale.parse(),
    }
}

fn print_empty_notice() {
    println!("{}", "No holdings match the current filters.".yellow());
}

fn print_summary(holdings: &Holdings) {
    let Some(latest) = holdings.latest_date() else {
        print_empty_notice();
        return;
    };

    println!("{:<18}{}", "Latest Snapshot".bold(), Quarter::containing(latest));
    if let Some(top) = holdings.top_holding() {
        println!(
            "{:<18}{} {}",
            "Top Holding".bold(),
            top.get_display_label(),
            format!("{:.1}%", top.get_percent_of_portfolio()).green()
        );
    }
    if let Some(sector) = holdings.top_sector_at(latest) {
        println!(
            "{:<18}{} {}",
            "Top Sector".bold(),
            sector.sector,
            format!("${:.2}B", sector.value / 1000.0).green()
        );
    }
    println!("{:<18}{}", "Holdings in View".bold(), holdings.len());
}

fn print_logos(
    dataset: &Dataset,
    holdings: &Holdings,
    locale: Locale,
    fetched: Option<&[(String, logo::Logo)]>,
) {
    use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color as TColor, ContentArrangement, Table};

    let tables = dataset.catalog.tables(locale);
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Ticker").add_attribute(Attribute::Bold),
            Cell::new("Company").add_attribute(Attribute::Bold),
            Cell::new("Domain").add_attribute(Attribute::Bold),
            Cell::new("Logo").add_attribute(Attribute::Bold),
        ]);

    for ticker in holdings.tickers() {
        let domain = dataset.catalog.logo_domain(&ticker);
        let status = match fetched.and_then(|f| f.iter().find(|(t, _)| *t == ticker)) {
            Some((_, logo)) if logo.is_placeholder() => Cell::new("placeholder").fg(TColor::DarkYellow),
            Some((_, logo)) => Cell::new(format!("embedded ({} chars)", logo.data_uri().len())).fg(TColor::Green),
            None => Cell::new("-"),
        };
        table.add_row(vec![
            Cell::new(&ticker),
            Cell::new(tables.company_name(&ticker)),
            Cell::new(domain.unwrap_or("-")),
            status,
        ]);
    }

    println!("{table}");
}

fn logo_fetcher(cfg: &Config) -> Option<LogoFetcher> {
    match LogoFetcher::new(&cfg.logo_endpoint, Duration::from_secs(cfg.logo_timeout_secs)) {
        Ok(fetcher) => Some(fetcher),
        Err(e) => {
            warn!(error = %e, "could not build the logo client, logos will use placeholders");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.subcommand_name() == Some("tui"));

    let cfg: Config = confy::load("holdings_rs", "config").wrap_err("Failed to load the config file")?;
    debug!(?cfg, "loaded config");

    let Some((subcommand, sub_matches)) = matches.subcommand() else {
        cli().print_help()?;
        return Ok(());
    };

    if subcommand == "config" {
        let path = confy::get_configuration_file_path("holdings_rs", "config")?;
        println!("Your config file is located here: \n{}", path.display());
        return Ok(());
    }

    let locale = resolve_locale(sub_matches, &cfg)?;
    let dataset = Dataset::load(&cfg.dataset_file, &cfg.lookups_file)
        .wrap_err("Failed to load the holdings dataset")?;
    let holdings = dataset.normalize(locale)?;

    match subcommand {
        "holdings" | "summary" | "sectors" | "export" => {
            let filter = build_filter(sub_matches)?;
            let selection = holdings.select(&filter);

            match (subcommand, selection) {
                ("export", selection) => {
                    let view = selection.into_holdings();
                    println!("{}", serde_json::to_string_pretty(view.rows())?);
                }
                (_, Selection::Empty) => print_empty_notice(),
                ("holdings", Selection::Rows(view)) => view.print(),
                ("summary", Selection::Rows(view)) => print_summary(&view),
                (_, Selection::Rows(view)) => {
                    view.print_sector_totals();
                    if let Some(latest) = view.latest_date() {
                        println!("Sector Allocation ({})", Quarter::containing(latest));
                        view.draw_sector_pie(latest);
                    }
                }
            }
        }
        "stock" => {
            let ticker = sub_matches
                .get_one::<String>("TICKER")
                .map(|t| t.to_uppercase())
                .unwrap_or_default();
            let history = holdings.history(&ticker);
            if history.is_empty() {
                println!("{}", format!("No holdings recorded for {ticker}.").yellow());
            } else {
                history.print();
            }
        }
        "logos" => {
            if sub_matches.get_flag("fetch") {
                let targets: Vec<(String, Option<String>)> = holdings
                    .tickers()
                    .into_iter()
                    .map(|t| {
                        let domain = dataset.catalog.logo_domain(&t).map(str::to_string);
                        (t, domain)
                    })
                    .collect();
                let fetched = match logo_fetcher(&cfg) {
                    Some(fetcher) => fetcher.fetch_all(&targets).await,
                    None => targets
                        .into_iter()
                        .map(|(t, _)| (t, logo::Logo::Placeholder))
                        .collect(),
                };
                print_logos(&dataset, &holdings, locale, Some(fetched.as_slice()));
            } else {
                print_logos(&dataset, &holdings, locale, None);
            }
        }
        "tui" => {
            let tab = match sub_matches.get_one::<String>("tab") {
                Some(name) => Some(
                    tui::Tab::from_str(name).ok_or_else(|| ValidationError::UnknownTab(name.clone()))?,
                ),
                None => None,
            };
            tui::run_tui(dataset, locale, tab, logo_fetcher(&cfg))
                .await
                .wrap_err("The dashboard exited with an error")?;
        }
        _ => (),
    }

    Ok(())
}
