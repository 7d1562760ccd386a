use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Symbol, Volume};

/// Listing venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// China Financial Futures Exchange
    Cffex,
    /// Shanghai Futures Exchange
    Shfe,
    /// Zhengzhou Commodity Exchange
    Czce,
    /// Dalian Commodity Exchange
    Dce,
    /// Shanghai International Energy Exchange
    Ine,
    /// Guangzhou Futures Exchange
    Gfex,
    /// Shanghai Stock Exchange
    Sse,
    /// Shenzhen Stock Exchange
    Szse,
    /// Locally generated data
    Local,
}

impl Exchange {
    /// Venue code as used on the wire (`SHFE`, `DCE`, ...)
    pub fn code(&self) -> &'static str {
        match self {
            Exchange::Cffex => "CFFEX",
            Exchange::Shfe => "SHFE",
            Exchange::Czce => "CZCE",
            Exchange::Dce => "DCE",
            Exchange::Ine => "INE",
            Exchange::Gfex => "GFEX",
            Exchange::Sse => "SSE",
            Exchange::Szse => "SZSE",
            Exchange::Local => "LOCAL",
        }
    }

    /// Parse a venue code. Unknown codes return `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        let exchange = match code {
            "CFFEX" => Exchange::Cffex,
            "SHFE" => Exchange::Shfe,
            "CZCE" => Exchange::Czce,
            "DCE" => Exchange::Dce,
            "INE" => Exchange::Ine,
            "GFEX" => Exchange::Gfex,
            "SSE" => Exchange::Sse,
            "SZSE" => Exchange::Szse,
            "LOCAL" => Exchange::Local,
            _ => return None,
        };
        Some(exchange)
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Product class of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    Futures,
    Option,
    Spread,
    Equity,
    Index,
    Etf,
    Bond,
    Fund,
}

/// Static venue metadata for one tradable instrument
///
/// Loaded once per login during contract querying, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRef {
    pub symbol: Symbol,
    pub exchange: Exchange,
    pub name: String,
    pub product: ProductKind,
    /// Contract size; notional = price * volume * multiplier
    pub multiplier: Decimal,
    /// Minimum price increment
    pub tick_size: Price,
    pub min_volume: Volume,
}

impl ContractRef {
    /// Returns true if `price` lies on the tick grid
    pub fn is_tick_aligned(&self, price: Price) -> bool {
        if self.tick_size.is_zero() {
            return true;
        }
        (price % self.tick_size).is_zero()
    }

    /// Notional value of `volume` lots at `price`
    pub fn notional(&self, price: Price, volume: Volume) -> Decimal {
        price * Decimal::from(volume) * self.multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rebar() -> ContractRef {
        ContractRef {
            symbol: "rb2510".to_string(),
            exchange: Exchange::Shfe,
            name: "rebar 2510".to_string(),
            product: ProductKind::Futures,
            multiplier: dec!(10),
            tick_size: dec!(1),
            min_volume: 1,
        }
    }

    #[test]
    fn test_tick_alignment() {
        let contract = rebar();
        assert!(contract.is_tick_aligned(dec!(3500)));
        assert!(!contract.is_tick_aligned(dec!(3500.5)));
    }

    #[test]
    fn test_notional() {
        assert_eq!(rebar().notional(dec!(3500), 2), dec!(70000));
    }

    #[test]
    fn test_exchange_codes() {
        for exchange in [Exchange::Cffex, Exchange::Shfe, Exchange::Gfex, Exchange::Local] {
            assert_eq!(Exchange::from_code(exchange.code()), Some(exchange));
        }
        assert_eq!(Exchange::from_code("NYSE"), None);
    }
}
