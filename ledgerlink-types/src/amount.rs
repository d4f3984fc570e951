//! Amounts and their display styles.
//!
//! Numeric values are always [`Decimal`]; the display style of a commodity is
//! tracked separately so an amount can be re-rendered the way the server
//! renders it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a currency balances (1e-4).
pub const BALANCE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Returns true when `value` is zero within [`BALANCE_EPSILON`].
#[must_use]
pub fn is_effectively_zero(value: Decimal) -> bool {
    value.abs() < BALANCE_EPSILON
}

/// Builds a decimal from the wire representation `mantissa / 10^places`.
///
/// Returns `None` when the scale or the mantissa does not fit a [`Decimal`].
#[must_use]
pub fn decimal_from_mantissa(mantissa: i128, places: u32) -> Option<Decimal> {
    Decimal::try_from_i128_with_scale(mantissa, places).ok()
}

/// Splits a decimal into `(mantissa, places)` for the wire.
#[must_use]
pub fn decimal_to_mantissa(value: Decimal) -> (i128, u32) {
    (value.mantissa(), value.scale())
}

/// Where the commodity symbol goes relative to the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityPosition {
    /// `$10.00`
    Before,
    /// `10.00 EUR`
    After,
    /// No commodity is shown.
    #[default]
    None,
}

/// Per-commodity display style, decoded independently of the numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmountStyle {
    /// Symbol placement.
    pub position: CommodityPosition,
    /// Whether a space separates symbol and number.
    pub spaced: bool,
    /// Fixed number of decimal digits; `None` means natural precision.
    pub precision: Option<u32>,
    /// Decimal mark character.
    pub decimal_mark: char,
}

impl Default for AmountStyle {
    fn default() -> Self {
        Self {
            position: CommodityPosition::None,
            spaced: false,
            precision: None,
            decimal_mark: '.',
        }
    }
}

impl AmountStyle {
    /// Renders `amount` in `commodity` using this style.
    #[must_use]
    pub fn render(&self, amount: Decimal, commodity: &str) -> String {
        let rounded = match self.precision {
            Some(dp) => {
                let mut v = amount.round_dp(dp);
                v.rescale(dp);
                v
            }
            None => amount.normalize(),
        };
        let mut number = rounded.to_string();
        if self.decimal_mark != '.' {
            number = number.replace('.', &self.decimal_mark.to_string());
        }
        let gap = if self.spaced { " " } else { "" };
        match self.position {
            CommodityPosition::Before if !commodity.is_empty() => {
                format!("{commodity}{gap}{number}")
            }
            CommodityPosition::After if !commodity.is_empty() => {
                format!("{number}{gap}{commodity}")
            }
            _ => number,
        }
    }
}

/// One per-currency balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAmount {
    /// Commodity name; empty for the default commodity.
    pub currency: String,
    /// Balance in that commodity.
    pub amount: Decimal,
    /// How the server displays this commodity, when known.
    pub style: Option<AmountStyle>,
}

impl AccountAmount {
    /// Creates a balance without style information.
    pub fn new(currency: impl Into<String>, amount: Decimal) -> Self {
        Self {
            currency: currency.into(),
            amount,
            style: None,
        }
    }

    /// Attaches a display style.
    #[must_use]
    pub fn with_style(mut self, style: AmountStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Renders the balance the way the server does, or as `amount currency`
    /// when no style is known.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.style {
            Some(style) => style.render(self.amount, &self.currency),
            None if self.currency.is_empty() => self.amount.to_string(),
            None => format!("{} {}", self.amount, self.currency),
        }
    }
}
