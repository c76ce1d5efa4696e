use crate::error::InvalidQuarterError;
use crate::lookup::LocaleTables;
use crate::observation::{EnrichedObservation, RawObservation};
use crate::quarter::{quarter_end, Quarter};
use chrono::NaiveDate;
use piechart::{Chart, Color};
use std::collections::BTreeSet;
use tracing::debug;

/// The normalized holdings table.
///
/// Rows are sorted by date ascending, then by value descending. Rows that tie on
/// both keep their input order. The table is never mutated after construction;
/// every selection produces a new `Holdings`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holdings {
    rows: Vec<EnrichedObservation>,
}

/// Summed market value of one sector at one quarter-end.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorTotal {
    pub date: NaiveDate,
    pub sector: String,
    pub value: f64,
}

impl Holdings {
    /// Enriches and sorts the raw rows using one locale's lookup tables.
    ///
    /// Fails on the first row whose quarter label is malformed. The dataset is
    /// a vetted constant, so a bad row invalidates the whole table.
    pub fn normalize(
        raw: &[RawObservation],
        tables: &LocaleTables,
    ) -> Result<Holdings, InvalidQuarterError> {
        let mut rows = Vec::with_capacity(raw.len());

        for observation in raw {
            let as_of_date = quarter_end(observation.get_quarter_label())?;
            let ticker = observation.get_ticker();
            let sector = tables.sector(ticker).to_string();
            let company_name = tables.company_name(ticker).to_string();

            rows.push(EnrichedObservation::new(
                observation.clone(),
                as_of_date,
                sector,
                company_name,
            ));
        }

        // sort_by is stable, ties on (date, value) keep input order
        rows.sort_by(|a, b| {
            a.get_as_of_date()
                .cmp(&b.get_as_of_date())
                .then_with(|| b.get_value().total_cmp(&a.get_value()))
        });

        debug!(rows = rows.len(), "normalized holdings");
        Ok(Holdings { rows })
    }

    pub fn rows(&self) -> &[EnrichedObservation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct quarter-end dates, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.rows.iter().map(|r| r.get_as_of_date()).collect();
        dates.dedup();
        dates
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.get_as_of_date())
    }

    /// Rows at the given date, in table order.
    pub fn snapshot(&self, date: NaiveDate) -> &[EnrichedObservation] {
        let start = self.rows.partition_point(|r| r.get_as_of_date() < date);
        let end = self.rows.partition_point(|r| r.get_as_of_date() <= date);
        &self.rows[start..end]
    }

    pub fn latest_snapshot(&self) -> &[EnrichedObservation] {
        match self.latest_date() {
            Some(date) => self.snapshot(date),
            None => &[],
        }
    }

    /// The largest holding at the latest date. Equal values resolve to the row
    /// that came first in the input.
    pub fn top_holding(&self) -> Option<&EnrichedObservation> {
        self.latest_snapshot().first()
    }

    pub fn total_value_at(&self, date: NaiveDate) -> f64 {
        self.snapshot(date).iter().map(|r| r.get_value()).sum()
    }

    /// Sector totals for one date, sectors in order of first appearance.
    pub fn sector_totals_at(&self, date: NaiveDate) -> Vec<SectorTotal> {
        let mut totals: Vec<SectorTotal> = Vec::new();

        for row in self.snapshot(date) {
            if let Some(total) = totals.iter_mut().find(|t| t.sector == row.get_sector()) {
                total.value += row.get_value();
            } else {
                totals.push(SectorTotal {
                    date,
                    sector: row.get_sector().to_string(),
                    value: row.get_value(),
                });
            }
        }
        totals
    }

    /// Sector totals for every `(date, sector)` pair, dates ascending.
    pub fn sector_totals(&self) -> Vec<SectorTotal> {
        self.dates()
            .into_iter()
            .flat_map(|date| self.sector_totals_at(date))
            .collect()
    }

    /// The sector with the greatest summed value at `date`. An exact tie goes to
    /// the sector encountered first.
    pub fn top_sector_at(&self, date: NaiveDate) -> Option<SectorTotal> {
        let mut top: Option<SectorTotal> = None;
        for total in self.sector_totals_at(date) {
            let greater = top.as_ref().map_or(true, |current| total.value > current.value);
            if greater {
                top = Some(total);
            }
        }
        top
    }

    /// Percentage of the recorded value held in each sector at `date`.
    pub fn sector_share_at(&self, date: NaiveDate) -> Vec<(String, f64)> {
        let totals = self.sector_totals_at(date);
        let sum: f64 = totals.iter().map(|t| t.value).sum();

        totals
            .into_iter()
            .map(|t| {
                let share = if sum > 0.0 { t.value / sum * 100.0 } else { 0.0 };
                (t.sector, share)
            })
            .collect()
    }

    pub fn sectors(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.get_sector().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.get_ticker().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every row for one ticker, oldest first.
    pub fn history(&self, ticker: &str) -> Holdings {
        Holdings {
            rows: self
                .rows
                .iter()
                .filter(|r| r.get_ticker() == ticker)
                .cloned()
                .collect(),
        }
    }

    pub fn select(&self, filter: &HoldingsFilter) -> Selection {
        if filter.is_unconstrained() {
            return if self.is_empty() {
                Selection::Empty
            } else {
                Selection::Rows(self.clone())
            };
        }

        let rows: Vec<EnrichedObservation> = self
            .rows
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        debug!(matched = rows.len(), total = self.rows.len(), "applied holdings filter");
        if rows.is_empty() {
            Selection::Empty
        } else {
            Selection::Rows(Holdings { rows })
        }
    }

    // Print the holdings as a table
    pub fn print(&self) {
        use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table};

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(120);

        table.set_header(vec![
            Cell::new("Quarter").add_attribute(Attribute::Bold),
            Cell::new("Company").add_attribute(Attribute::Bold),
            Cell::new("Sector").add_attribute(Attribute::Bold),
            Cell::new("Shares").add_attribute(Attribute::Bold),
            Cell::new("Value ($B)").add_attribute(Attribute::Bold),
            Cell::new("%Portfolio").add_attribute(Attribute::Bold),
        ]);

        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.get_quarter_label()),
                Cell::new(row.get_display_label()),
                Cell::new(row.get_sector()),
                Cell::new(format!("{:.0}", row.get_shares())).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", row.value_billions())).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1}%", row.get_percent_of_portfolio()))
                    .set_alignment(CellAlignment::Right),
            ]);
        }

        println!("{table}");
    }

    // Print sector totals per quarter, largest sector first within a quarter
    pub fn print_sector_totals(&self) {
        use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table};

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(100)
            .set_header(vec![
                Cell::new("Quarter").add_attribute(Attribute::Bold),
                Cell::new("Sector").add_attribute(Attribute::Bold),
                Cell::new("Value ($B)").add_attribute(Attribute::Bold),
                Cell::new("%Recorded").add_attribute(Attribute::Bold),
            ]);

        for date in self.dates() {
            let quarter = Quarter::containing(date).to_string();
            let sum = self.total_value_at(date);
            let mut totals = self.sector_totals_at(date);
            totals.sort_by(|a, b| b.value.total_cmp(&a.value));

            for total in totals {
                let share = if sum > 0.0 { total.value / sum * 100.0 } else { 0.0 };
                table.add_row(vec![
                    Cell::new(&quarter),
                    Cell::new(&total.sector),
                    Cell::new(format!("{:.2}", total.value / 1000.0)).set_alignment(CellAlignment::Right),
                    Cell::new(format!("{share:.1}%")).set_alignment(CellAlignment::Right),
                ]);
            }
        }

        println!("{table}");
    }

    pub fn draw_sector_pie(&self, date: NaiveDate) {
        let colors = [
            Color::Blue,
            Color::Green,
            Color::Red,
            Color::Yellow,
            Color::Cyan,
            Color::Purple,
            Color::White,
            Color::Black,
        ];

        let data: Vec<piechart::Data> = self
            .sector_totals_at(date)
            .into_iter()
            .enumerate()
            .map(|(i, total)| piechart::Data {
                label: total.sector,
                value: total.value as f32,
                color: Some(colors[i % colors.len()].into()),
                fill: '•',
            })
            .collect();

        Chart::new()
            .legend(true)
            .radius(9)
            .aspect_ratio(3)
            .draw(&data);
    }
}

/// Result of applying a [`HoldingsFilter`].
///
/// `Empty` is a valid outcome that callers must show as such; it is not an
/// error. Code that has not computed a selection yet holds `None` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Empty,
    Rows(Holdings),
}

impl Selection {
    pub fn holdings(&self) -> Option<&Holdings> {
        match self {
            Selection::Empty => None,
            Selection::Rows(holdings) => Some(holdings),
        }
    }

    pub fn into_holdings(self) -> Holdings {
        match self {
            Selection::Empty => Holdings::default(),
            Selection::Rows(holdings) => holdings,
        }
    }
}

/// Row predicates combined with logical AND.
///
/// An unset or empty criterion places no constraint, the way a cleared
/// multiselect shows everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingsFilter {
    sectors: BTreeSet<String>,
    date_range: Option<(NaiveDate, NaiveDate)>,
    tickers: BTreeSet<String>,
}

impl HoldingsFilter {
    pub fn new() -> HoldingsFilter {
        HoldingsFilter::default()
    }

    pub fn with_sectors<I, S>(mut self, sectors: I) -> HoldingsFilter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sectors = sectors.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps rows dated within `from..=to`.
    pub fn with_date_range(mut self, from: NaiveDate, to: NaiveDate) -> HoldingsFilter {
        self.date_range = Some((from, to));
        self
    }

    /// Keeps rows whose ticker (any case), company name or display label is listed.
    pub fn with_tickers<I, S>(mut self, tickers: I) -> HoldingsFilter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tickers = tickers.into_iter().map(Into::into).collect();
        self
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.date_range
    }

    pub fn is_unconstrained(&self) -> bool {
        self.sectors.is_empty() && self.date_range.is_none() && self.tickers.is_empty()
    }

    pub fn matches(&self, row: &EnrichedObservation) -> bool {
        let sector_ok = self.sectors.is_empty() || self.sectors.contains(row.get_sector());
        let date_ok = match self.date_range {
            Some((from, to)) => from <= row.get_as_of_date() && row.get_as_of_date() <= to,
            None => true,
        };
        let ticker_ok = self.tickers.is_empty()
            || self.tickers.iter().any(|t| {
                t.eq_ignore_ascii_case(row.get_ticker())
                    || t == row.get_company_name()
                    || t == row.get_display_label()
            });

        sector_ok && date_ok && ticker_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::lookup::Locale;
    use approx::assert_relative_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture_tables() -> LocaleTables {
        LocaleTables::from_pairs(
            &[
                ("KO", "Consumer Staples"),
                ("AXP", "Financials"),
                ("BAC", "Financials"),
                ("CVX", "Energy"),
            ],
            &[
                ("KO", "The Coca-Cola Company"),
                ("AXP", "American Express Company"),
            ],
        )
    }

    fn embedded() -> Holdings {
        Dataset::embedded().unwrap().normalize(Locale::En).unwrap()
    }

    #[test]
    fn test_normalize_two_rows() {
        let raw = vec![
            RawObservation::new("2000 Q4", "KO", 200.0, 12.2, 31.5),
            RawObservation::new("2000 Q4", "AXP", 151.6, 8.3, 21.6),
        ];
        let holdings = Holdings::normalize(&raw, &fixture_tables()).unwrap();
        let rows = holdings.rows();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_ticker(), "KO");
        assert_eq!(rows[1].get_ticker(), "AXP");
        assert!(rows.iter().all(|r| r.get_as_of_date() == ymd(2000, 12, 31)));
        assert_eq!(rows[0].get_display_label(), "The Coca-Cola Company (KO)");
        assert_eq!(rows[1].get_display_label(), "American Express Company (AXP)");
        assert_eq!(rows[0].get_sector(), "Consumer Staples");
        assert_eq!(rows[1].get_sector(), "Financials");
    }

    #[test]
    fn test_normalize_unmapped_ticker() {
        let raw = vec![RawObservation::new("2020 Q1", "ZZZZ", 5.0, 1.0, 0.2)];
        let holdings = Holdings::normalize(&raw, &fixture_tables()).unwrap();
        let row = &holdings.rows()[0];

        assert_eq!(row.get_sector(), "Others");
        assert_eq!(row.get_company_name(), "ZZZZ");
        assert_eq!(row.get_display_label(), "ZZZZ (ZZZZ)");
        assert_eq!(row.get_as_of_date(), ymd(2020, 3, 31));
    }

    #[test]
    fn test_normalize_rejects_invalid_quarter() {
        let raw = vec![
            RawObservation::new("2021 Q4", "KO", 1.0, 1.0, 1.0),
            RawObservation::new("2021 Q5", "AXP", 1.0, 1.0, 1.0),
        ];
        assert_eq!(
            Holdings::normalize(&raw, &fixture_tables()),
            Err(InvalidQuarterError("2021 Q5".to_string()))
        );
    }

    #[test]
    fn test_sort_order_is_stable() {
        let raw = vec![
            RawObservation::new("2005 Q4", "A", 1.0, 5.0, 1.0),
            RawObservation::new("2000 Q4", "B", 1.0, 1.0, 1.0),
            RawObservation::new("2005 Q4", "C", 1.0, 9.0, 1.0),
            RawObservation::new("2005 Q4", "D", 1.0, 5.0, 1.0),
            RawObservation::new("2000 Q4", "E", 1.0, 3.0, 1.0),
            RawObservation::new("2005 Q4", "F", 1.0, 5.0, 1.0),
        ];
        let holdings = Holdings::normalize(&raw, &fixture_tables()).unwrap();
        let order: Vec<&str> = holdings.rows().iter().map(|r| r.get_ticker()).collect();

        assert_eq!(order, vec!["E", "B", "C", "A", "D", "F"]);
        assert_eq!(holdings.top_holding().unwrap().get_ticker(), "C");
    }

    #[test]
    fn test_top_holding_tie_goes_to_first_row() {
        let raw = vec![
            RawObservation::new("2024 Q4", "KO", 1.0, 50.0, 1.0),
            RawObservation::new("2025 Q3", "BAC", 1.0, 20.0, 1.0),
            RawObservation::new("2025 Q3", "AXP", 1.0, 30.0, 1.0),
            RawObservation::new("2025 Q3", "CVX", 1.0, 30.0, 1.0),
        ];
        let holdings = Holdings::normalize(&raw, &fixture_tables()).unwrap();
        assert_eq!(holdings.top_holding().unwrap().get_ticker(), "AXP");

        let reversed: Vec<RawObservation> = raw.into_iter().rev().collect();
        let holdings = Holdings::normalize(&reversed, &fixture_tables()).unwrap();
        assert_eq!(holdings.top_holding().unwrap().get_ticker(), "CVX");
    }

    #[test]
    fn test_embedded_table_is_sorted() {
        let holdings = embedded();
        assert_eq!(holdings.len(), 91);
        for pair in holdings.rows().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.get_as_of_date() < b.get_as_of_date()
                    || (a.get_as_of_date() == b.get_as_of_date() && a.get_value() >= b.get_value()),
                "{} before {} breaks the sort order",
                a.get_display_label(),
                b.get_display_label()
            );
        }
        assert!(holdings.rows().iter().all(|r| !r.get_sector().is_empty()));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let first = embedded();
        let raw: Vec<RawObservation> = first.rows().iter().map(|r| r.to_raw()).collect();
        let catalog = &Dataset::embedded().unwrap().catalog;
        let second = Holdings::normalize(&raw, catalog.tables(Locale::En)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_sector_totals_conserve_value() {
        let holdings = embedded();
        for date in holdings.dates() {
            let by_sector: f64 = holdings.sector_totals_at(date).iter().map(|t| t.value).sum();
            let by_row: f64 = holdings
                .rows()
                .iter()
                .filter(|r| r.get_as_of_date() == date)
                .map(|r| r.get_value())
                .sum();
            assert_relative_eq!(by_sector, by_row, max_relative = 1e-12);
        }

        let dates = holdings.dates();
        let pairs = holdings.sector_totals();
        assert!(pairs.windows(2).all(|w| w[0].date <= w[1].date));
        assert_eq!(
            pairs.iter().filter(|t| t.date == dates[0]).count(),
            holdings.sector_totals_at(dates[0]).len()
        );
    }

    #[test]
    fn test_latest_period_views() {
        let holdings = embedded();
        let latest = holdings.latest_date().unwrap();

        assert_eq!(latest, ymd(2025, 9, 30));
        assert_eq!(holdings.latest_snapshot().len(), 14);
        assert_eq!(holdings.top_holding().unwrap().get_ticker(), "AAPL");

        let top_sector = holdings.top_sector_at(latest).unwrap();
        assert_eq!(top_sector.sector, "Financials");

        let shares: f64 = holdings.sector_share_at(latest).iter().map(|(_, s)| s).sum();
        assert_relative_eq!(shares, 100.0, max_relative = 1e-9);
    }

    #[test]
    fn test_top_sector_tie_goes_to_first_encountered() {
        let raw = vec![
            RawObservation::new("2010 Q4", "KO", 1.0, 10.0, 1.0),
            RawObservation::new("2010 Q4", "AXP", 1.0, 6.0, 1.0),
            RawObservation::new("2010 Q4", "BAC", 1.0, 4.0, 1.0),
        ];
        let holdings = Holdings::normalize(&raw, &fixture_tables()).unwrap();
        let top = holdings.top_sector_at(ymd(2010, 12, 31)).unwrap();

        assert_eq!(top.sector, "Consumer Staples");
        assert_eq!(top.value, 10.0);
        assert!(holdings.top_sector_at(ymd(1999, 12, 31)).is_none());
    }

    #[test]
    fn test_select_by_sector_and_range() {
        let holdings = embedded();

        let energy = holdings.select(&HoldingsFilter::new().with_sectors(["Energy"]));
        let energy = energy.holdings().unwrap();
        assert!(energy.rows().iter().all(|r| r.get_sector() == "Energy"));

        let none = holdings.select(
            &HoldingsFilter::new()
                .with_sectors(["Energy"])
                .with_date_range(ymd(2000, 1, 1), ymd(2010, 12, 31)),
        );
        assert_eq!(none, Selection::Empty);
        assert!(none.into_holdings().is_empty());

        // the canonical table is untouched
        assert_eq!(holdings, embedded());
    }

    #[test]
    fn test_select_by_ticker_or_name() {
        let holdings = embedded();
        let selection = holdings.select(
            &HoldingsFilter::new().with_tickers(["KO", "Bank of America Corporation"]),
        );
        let selected = selection.holdings().unwrap();

        assert_eq!(selected.tickers(), vec!["BAC".to_string(), "KO".to_string()]);
        assert_eq!(selected.len(), holdings.history("KO").len() + holdings.history("BAC").len());
    }

    #[test]
    fn test_select_tickers_within_range() {
        let holdings = embedded();
        let filter = HoldingsFilter::new()
            .with_tickers(["ko", "AAPL"])
            .with_date_range(ymd(2020, 1, 1), ymd(2025, 12, 31));
        assert_eq!(filter.date_range(), Some((ymd(2020, 1, 1), ymd(2025, 12, 31))));

        let selected = holdings.select(&filter).into_holdings();
        assert_eq!(selected.tickers(), vec!["AAPL".to_string(), "KO".to_string()]);
        assert!(selected.rows().iter().all(|r| r.get_as_of_date() >= ymd(2020, 1, 1)));
    }

    #[test]
    fn test_unconstrained_filter_keeps_everything() {
        let holdings = embedded();
        let filter = HoldingsFilter::new().with_sectors(Vec::<String>::new());

        assert!(filter.is_unconstrained());
        assert_eq!(holdings.select(&filter).into_holdings(), holdings);
    }

    #[test]
    fn test_history_is_date_ordered() {
        let history = embedded().history("AAPL");
        let dates: Vec<NaiveDate> = history.rows().iter().map(|r| r.get_as_of_date()).collect();

        assert_eq!(dates.first(), Some(&ymd(2019, 12, 31)));
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }
}
