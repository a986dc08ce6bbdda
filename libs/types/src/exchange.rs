//! Exchange segments and instrument classes
//!
//! Both enums round-trip through the broker's string codes. Unknown codes
//! are preserved in an `Other` variant rather than rejected, since the
//! reference data grows new segments without notice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange segment an instrument is listed on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Exchange {
    /// NSE cash market
    #[default]
    Nse,
    /// BSE cash market
    Bse,
    /// NSE futures & options
    Nfo,
    /// BSE futures & options
    Bfo,
    /// Commodity
    Mcx,
    /// Currency derivatives
    Cds,
    /// Agricultural commodity
    Ncdex,
    Other(String),
}

impl Exchange {
    /// Parse a segment code, case-insensitively.
    ///
    /// Accepts both scrip-master codes ("NFO") and the streaming API's
    /// segment names ("nse_fo").
    pub fn parse(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        match code.as_str() {
            "NSE" | "NSE_CM" => Exchange::Nse,
            "BSE" | "BSE_CM" => Exchange::Bse,
            "NFO" | "NSE_FO" => Exchange::Nfo,
            "BFO" | "BSE_FO" => Exchange::Bfo,
            "MCX" | "MCX_FO" => Exchange::Mcx,
            "CDS" | "CDE_FO" => Exchange::Cds,
            "NCDEX" | "NCX" | "NCX_FO" => Exchange::Ncdex,
            _ => Exchange::Other(code),
        }
    }

    /// Map the numeric `exchange_type` code carried by streaming ticks.
    pub fn from_feed_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Exchange::Nse),
            2 => Some(Exchange::Nfo),
            3 => Some(Exchange::Bse),
            4 => Some(Exchange::Bfo),
            5 => Some(Exchange::Mcx),
            7 => Some(Exchange::Ncdex),
            13 => Some(Exchange::Cds),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Exchange::Nse => "NSE",
            Exchange::Bse => "BSE",
            Exchange::Nfo => "NFO",
            Exchange::Bfo => "BFO",
            Exchange::Mcx => "MCX",
            Exchange::Cds => "CDS",
            Exchange::Ncdex => "NCDEX",
            Exchange::Other(code) => code,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Exchange {
    fn from(s: String) -> Self {
        Exchange::parse(&s)
    }
}

impl From<Exchange> for String {
    fn from(e: Exchange) -> Self {
        e.as_str().to_string()
    }
}

/// Instrument class as coded in the scrip master
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstrumentType {
    Equity,
    Index,
    IndexFuture,
    StockFuture,
    IndexOption,
    StockOption,
    CommodityFuture,
    CommodityOption,
    CurrencyFuture,
    CurrencyOption,
    Other(String),
}

impl InstrumentType {
    /// Parse a scrip-master code. Cash-market rows carry an empty code.
    pub fn parse(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        match code.as_str() {
            "" | "EQ" | "EQUITY" => InstrumentType::Equity,
            "AMXIDX" | "INDEX" => InstrumentType::Index,
            "FUTIDX" => InstrumentType::IndexFuture,
            "FUTSTK" => InstrumentType::StockFuture,
            "OPTIDX" => InstrumentType::IndexOption,
            "OPTSTK" => InstrumentType::StockOption,
            "FUTCOM" => InstrumentType::CommodityFuture,
            "OPTFUT" | "OPTCOM" => InstrumentType::CommodityOption,
            "FUTCUR" => InstrumentType::CurrencyFuture,
            "OPTCUR" => InstrumentType::CurrencyOption,
            _ => InstrumentType::Other(code),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstrumentType::Equity => "EQ",
            InstrumentType::Index => "AMXIDX",
            InstrumentType::IndexFuture => "FUTIDX",
            InstrumentType::StockFuture => "FUTSTK",
            InstrumentType::IndexOption => "OPTIDX",
            InstrumentType::StockOption => "OPTSTK",
            InstrumentType::CommodityFuture => "FUTCOM",
            InstrumentType::CommodityOption => "OPTFUT",
            InstrumentType::CurrencyFuture => "FUTCUR",
            InstrumentType::CurrencyOption => "OPTCUR",
            InstrumentType::Other(code) => code,
        }
    }

    /// Futures and options; these are the rows that carry an expiry.
    pub fn is_derivative(&self) -> bool {
        !matches!(
            self,
            InstrumentType::Equity | InstrumentType::Index | InstrumentType::Other(_)
        )
    }

    pub fn is_option(&self) -> bool {
        matches!(
            self,
            InstrumentType::IndexOption
                | InstrumentType::StockOption
                | InstrumentType::CommodityOption
                | InstrumentType::CurrencyOption
        )
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for InstrumentType {
    fn from(s: String) -> Self {
        InstrumentType::parse(&s)
    }
}

impl From<InstrumentType> for String {
    fn from(t: InstrumentType) -> Self {
        t.as_str().to_string()
    }
}
