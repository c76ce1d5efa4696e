use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One reported holding as it appears in the dataset file.
///
/// `shares` is a raw share count and `value` is in millions of USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawObservation {
    quarter_label: String,
    ticker: String,
    shares: f64,
    value: f64,
    percent_of_portfolio: f64,
}

impl RawObservation {
    #[cfg(test)]
    pub fn new(
        quarter_label: &str,
        ticker: &str,
        shares: f64,
        value: f64,
        percent_of_portfolio: f64,
    ) -> RawObservation {
        RawObservation {
            quarter_label: quarter_label.to_string(),
            ticker: ticker.to_string(),
            shares,
            value,
            percent_of_portfolio,
        }
    }

    pub fn get_quarter_label(&self) -> &str {
        &self.quarter_label
    }

    pub fn get_ticker(&self) -> &str {
        &self.ticker
    }

    pub fn get_shares(&self) -> f64 {
        self.shares
    }

    pub fn get_value(&self) -> f64 {
        self.value
    }

    pub fn get_percent_of_portfolio(&self) -> f64 {
        self.percent_of_portfolio
    }

    /// The first numeric field outside its valid range, with its value.
    ///
    /// Shares and value must be finite and non-negative, and the portfolio
    /// weight must lie within 0 to 100.
    pub fn out_of_range(&self) -> Option<(&'static str, f64)> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if !non_negative(self.get_shares()) {
            Some(("Shares", self.get_shares()))
        } else if !non_negative(self.get_value()) {
            Some(("Value", self.get_value()))
        } else if !(0.0..=100.0).contains(&self.get_percent_of_portfolio()) {
            Some(("PercentOfPortfolio", self.get_percent_of_portfolio()))
        } else {
            None
        }
    }
}

/// A raw row enriched with its quarter-end date, sector and company name.
///
/// Rows are only built by [`crate::holdings::Holdings::normalize`] and have no
/// mutating methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedObservation {
    #[serde(flatten)]
    raw: RawObservation,
    #[serde(rename = "AsOfDate")]
    as_of_date: NaiveDate,
    #[serde(rename = "Sector")]
    sector: String,
    #[serde(rename = "CompanyName")]
    company_name: String,
    #[serde(rename = "DisplayLabel")]
    display_label: String,
}

impl EnrichedObservation {
    pub(crate) fn new(
        raw: RawObservation,
        as_of_date: NaiveDate,
        sector: String,
        company_name: String,
    ) -> EnrichedObservation {
        let display_label = format!("{company_name} ({})", raw.ticker);
        EnrichedObservation {
            raw,
            as_of_date,
            sector,
            company_name,
            display_label,
        }
    }

    pub fn get_quarter_label(&self) -> &str {
        &self.raw.quarter_label
    }

    pub fn get_ticker(&self) -> &str {
        &self.raw.ticker
    }

    pub fn get_shares(&self) -> f64 {
        self.raw.shares
    }

    pub fn get_value(&self) -> f64 {
        self.raw.value
    }

    /// Market value in billions of USD.
    pub fn value_billions(&self) -> f64 {
        self.raw.value / 1000.0
    }

    pub fn get_percent_of_portfolio(&self) -> f64 {
        self.raw.percent_of_portfolio
    }

    pub fn get_as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn get_sector(&self) -> &str {
        &self.sector
    }

    pub fn get_company_name(&self) -> &str {
        &self.company_name
    }

    pub fn get_display_label(&self) -> &str {
        &self.display_label
    }

    /// The unchanged input row this observation was derived from.
    #[cfg(test)]
    pub fn to_raw(&self) -> RawObservation {
        self.raw.clone()
    }
}

pub fn from_string(data: &str) -> Result<Vec<RawObservation>, serde_json::Error> {
    serde_json::from_str::<Vec<RawObservation>>(data)
}
