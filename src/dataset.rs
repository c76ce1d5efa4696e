//! The raw holdings rows and lookup tables, loaded from JSON.
//!
//! A default copy of both files is compiled into the binary. Paths in the
//! config replace either one so the data can be revised without a rebuild.

use crate::error::{DatasetError, InvalidQuarterError};
use crate::holdings::Holdings;
use crate::lookup::{catalog_from_string, Catalog, Locale};
use crate::observation::{from_string, RawObservation};
use once_cell::sync::OnceCell;
use std::fs::read_to_string;
use tracing::info;

const EMBEDDED_HOLDINGS: &str = include_str!("../data/holdings.json");
const EMBEDDED_LOOKUPS: &str = include_str!("../data/lookups.json");

static EMBEDDED: OnceCell<Dataset> = OnceCell::new();

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub raw: Vec<RawObservation>,
    pub catalog: Catalog,
}

impl Dataset {
    pub fn new(raw: Vec<RawObservation>, catalog: Catalog) -> Dataset {
        Dataset { raw, catalog }
    }

    /// The compiled-in dataset, parsed and validated once per process.
    pub fn embedded() -> Result<&'static Dataset, DatasetError> {
        EMBEDDED.get_or_try_init(|| {
            let dataset = Dataset::from_strings(EMBEDDED_HOLDINGS, EMBEDDED_LOOKUPS)?;
            dataset.validate()?;
            Ok(dataset)
        })
    }

    /// Loads the dataset, falling back to the embedded file for each empty path.
    ///
    /// Every quarter label is checked here so a malformed file fails at startup
    /// rather than on first render.
    pub fn load(holdings_file: &str, lookups_file: &str) -> Result<Dataset, DatasetError> {
        if holdings_file.is_empty() && lookups_file.is_empty() {
            return Dataset::embedded().cloned();
        }

        let holdings = if holdings_file.is_empty() {
            EMBEDDED_HOLDINGS.to_string()
        } else {
            read_file(holdings_file)?
        };
        let lookups = if lookups_file.is_empty() {
            EMBEDDED_LOOKUPS.to_string()
        } else {
            read_file(lookups_file)?
        };

        let dataset = Dataset::from_strings(&holdings, &lookups)?;
        dataset.validate()?;
        info!(
            rows = dataset.raw.len(),
            holdings_file, lookups_file, "loaded dataset from disk"
        );
        Ok(dataset)
    }

    pub fn from_strings(holdings: &str, lookups: &str) -> Result<Dataset, DatasetError> {
        let raw = from_string(holdings).map_err(|source| DatasetError::Parse {
            what: "holdings".to_string(),
            source,
        })?;
        let catalog = catalog_from_string(lookups).map_err(|source| DatasetError::Parse {
            what: "lookups".to_string(),
            source,
        })?;
        Ok(Dataset::new(raw, catalog))
    }

    // Rejects negative or non-finite numbers and malformed quarter labels
    fn validate(&self) -> Result<(), DatasetError> {
        for (index, row) in self.raw.iter().enumerate() {
            if let Some((field, value)) = row.out_of_range() {
                return Err(DatasetError::OutOfRange {
                    index,
                    ticker: row.get_ticker().to_string(),
                    field,
                    value,
                });
            }
        }
        self.normalize(Locale::default())?;
        Ok(())
    }

    pub fn normalize(&self, locale: Locale) -> Result<Holdings, InvalidQuarterError> {
        Holdings::normalize(&self.raw, self.catalog.tables(locale))
    }
}

fn read_file(path: &str) -> Result<String, DatasetError> {
    read_to_string(path).map_err(|source| DatasetError::Read {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_embedded_dataset() {
        let dataset = Dataset::embedded().unwrap();
        assert_eq!(dataset.raw.len(), 91);
        assert!(std::ptr::eq(dataset, Dataset::embedded().unwrap()));

        let en = dataset.normalize(Locale::En).unwrap();
        let zh = dataset.normalize(Locale::Zh).unwrap();
        assert_eq!(en.len(), zh.len());

        let ko = en.rows().iter().find(|r| r.get_ticker() == "KO").unwrap();
        assert_eq!(ko.get_display_label(), "The Coca-Cola Company (KO)");
        let ko = zh.rows().iter().find(|r| r.get_ticker() == "KO").unwrap();
        assert_eq!(ko.get_display_label(), "可口可乐 (KO)");
        assert_eq!(ko.get_sector(), "日常消费");
    }

    #[test]
    fn test_every_embedded_ticker_is_mapped() {
        let dataset = Dataset::embedded().unwrap();
        for raw in &dataset.raw {
            let ticker = raw.get_ticker();
            for locale in [Locale::En, Locale::Zh] {
                let tables = dataset.catalog.tables(locale);
                assert_ne!(tables.sector(ticker), tables.fallback_sector(), "{ticker} has no sector");
                assert_ne!(tables.company_name(ticker), ticker, "{ticker} has no name");
            }
            assert!(dataset.catalog.logo_domain(ticker).is_some(), "{ticker} has no logo domain");
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"QuarterLabel": "2020 Q1", "Ticker": "ZZZZ", "Shares": 1, "Value": 1.0, "PercentOfPortfolio": 0.5}}]"#
        )
        .unwrap();

        let dataset = Dataset::load(file.path().to_str().unwrap(), "").unwrap();
        assert_eq!(dataset.raw.len(), 1);
        let holdings = dataset.normalize(Locale::En).unwrap();
        assert_eq!(holdings.rows()[0].get_sector(), "Others");
    }

    #[test]
    fn test_load_rejects_invalid_quarter() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"QuarterLabel": "2021 Q5", "Ticker": "KO", "Shares": 1, "Value": 1, "PercentOfPortfolio": 1}}]"#
        )
        .unwrap();

        match Dataset::load(file.path().to_str().unwrap(), "") {
            Err(DatasetError::InvalidQuarter(e)) => assert_eq!(e.0, "2021 Q5"),
            other => panic!("expected an invalid quarter error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_negative_value() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"QuarterLabel": "2021 Q4", "Ticker": "KO", "Shares": 1, "Value": 2, "PercentOfPortfolio": 1}},
                {{"QuarterLabel": "2021 Q4", "Ticker": "AXP", "Shares": 1, "Value": -2, "PercentOfPortfolio": 1}}
            ]"#
        )
        .unwrap();

        match Dataset::load(file.path().to_str().unwrap(), "") {
            Err(DatasetError::OutOfRange { index, ticker, field, .. }) => {
                assert_eq!((index, ticker.as_str(), field), (1, "AXP", "Value"));
            }
            other => panic!("expected an out of range error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = Dataset::load("/nonexistent/holdings.json", "");
        assert!(matches!(result, Err(DatasetError::Read { .. })));
    }
}
