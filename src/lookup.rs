//! Ticker lookup tables: sector, company name and logo domain.
//!
//! Every lookup is total. A ticker missing from a table resolves to a fallback
//! value instead of an error, so new rows can be added to the dataset before the
//! tables know about them.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const FALLBACK_SECTOR: &str = "Others";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Zh => "zh",
        }
    }

    /// The locale after this one, wrapping around. Drives the language switcher.
    pub fn next(self) -> Locale {
        match self {
            Locale::En => Locale::Zh,
            Locale::Zh => Locale::En,
        }
    }
}

impl FromStr for Locale {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "zh" => Ok(Locale::Zh),
            _ => Err(ValidationError::UnknownLocale(s.to_string())),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_fallback_sector() -> String {
    FALLBACK_SECTOR.to_string()
}

/// Sector and company-name tables for one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleTables {
    #[serde(default)]
    sectors: HashMap<String, String>,
    #[serde(default)]
    names: HashMap<String, String>,
    #[serde(default = "default_fallback_sector")]
    fallback_sector: String,
}

impl Default for LocaleTables {
    fn default() -> Self {
        LocaleTables {
            sectors: HashMap::new(),
            names: HashMap::new(),
            fallback_sector: default_fallback_sector(),
        }
    }
}

impl LocaleTables {
    #[cfg(test)]
    pub fn new(sectors: HashMap<String, String>, names: HashMap<String, String>) -> LocaleTables {
        LocaleTables {
            sectors,
            names,
            fallback_sector: default_fallback_sector(),
        }
    }

    /// Builds tables from `(ticker, value)` pairs for fixtures.
    #[cfg(test)]
    pub fn from_pairs(sectors: &[(&str, &str)], names: &[(&str, &str)]) -> LocaleTables {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        LocaleTables::new(to_map(sectors), to_map(names))
    }

    pub fn sector<'a>(&'a self, ticker: &str) -> &'a str {
        match self.sectors.get(ticker) {
            Some(sector) if !sector.is_empty() => sector.as_str(),
            _ => self.fallback_sector(),
        }
    }

    pub fn company_name<'a>(&'a self, ticker: &'a str) -> &'a str {
        match self.names.get(ticker) {
            Some(name) if !name.is_empty() => name.as_str(),
            _ => ticker,
        }
    }

    pub fn display_label(&self, ticker: &str) -> String {
        format!("{} ({ticker})", self.company_name(ticker))
    }

    /// The sector for unmapped tickers. A blank value in the lookups file
    /// falls back to [`FALLBACK_SECTOR`].
    pub fn fallback_sector(&self) -> &str {
        if self.fallback_sector.trim().is_empty() {
            FALLBACK_SECTOR
        } else {
            &self.fallback_sector
        }
    }
}

/// All lookup tables, one [`LocaleTables`] per supported locale plus the
/// locale-independent logo domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    en: LocaleTables,
    #[serde(default)]
    zh: LocaleTables,
    #[serde(default)]
    logo_domains: HashMap<String, String>,
}

impl Catalog {
    pub fn tables(&self, locale: Locale) -> &LocaleTables {
        match locale {
            Locale::En => &self.en,
            Locale::Zh => &self.zh,
        }
    }

    pub fn logo_domain(&self, ticker: &str) -> Option<&str> {
        self.logo_domains
            .get(ticker)
            .map(String::as_str)
            .filter(|d| !d.is_empty())
    }
}

pub fn catalog_from_string(data: &str) -> Result<Catalog, serde_json::Error> {
    serde_json::from_str::<Catalog>(data)
}
