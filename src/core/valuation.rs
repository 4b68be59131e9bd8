//! Valuation rule shared by assets, stocks and mutual funds.

use serde::Serialize;
use serde_json::Value;

/// Column names written by [`Valuation::write_into`]
pub const VALUATION_FIELDS: &[&str] = &[
    "investment_value",
    "current_value",
    "profit_loss",
    "profit_loss_percentage",
];

/// Amount invested, what it is worth now, and the gain or loss between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Valuation {
    /// Amount paid in
    pub investment_value: f64,
    /// Latest worth
    pub current_value: f64,
    /// `current_value - investment_value`
    pub profit_loss: f64,
    /// `profit_loss / investment_value * 100`, or 0 without an investment
    pub profit_loss_percentage: f64,
}

impl Valuation {
    /// Valuation of a holding with a known investment and current worth.
    #[must_use]
    pub fn new(investment_value: f64, current_value: f64) -> Self {
        let profit_loss = current_value - investment_value;
        let profit_loss_percentage = if investment_value == 0.0 {
            0.0
        } else {
            profit_loss / investment_value * 100.0
        };
        Self {
            investment_value,
            current_value,
            profit_loss,
            profit_loss_percentage,
        }
    }

    /// Valuation of `units` bought at `average_price` and now priced at `current_price`.
    #[must_use]
    pub fn of_units(units: f64, average_price: f64, current_price: f64) -> Self {
        Self::new(units * average_price, units * current_price)
    }

    /// Writes the four valuation columns into a JSON row.
    pub fn write_into(&self, row: &mut Value) {
        if let Value::Object(fields) = row {
            fields.insert("investment_value".into(), self.investment_value.into());
            fields.insert("current_value".into(), self.current_value.into());
            fields.insert("profit_loss".into(), self.profit_loss.into());
            fields.insert(
                "profit_loss_percentage".into(),
                self.profit_loss_percentage.into(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gain_and_percentage() {
        let v = Valuation::of_units(100.0, 120.0, 130.75);
        assert_eq!(v.investment_value, 12000.0);
        assert_eq!(v.current_value, 13075.0);
        assert_eq!(v.profit_loss, 1075.0);
        assert!((v.profit_loss_percentage - 8.958_333).abs() < 1e-5);
    }

    #[test]
    fn test_zero_investment_has_zero_percentage() {
        let v = Valuation::new(0.0, 500.0);
        assert_eq!(v.profit_loss, 500.0);
        assert_eq!(v.profit_loss_percentage, 0.0);
    }

    #[test]
    fn test_loss_is_negative() {
        let v = Valuation::new(1000.0, 750.0);
        assert_eq!(v.profit_loss, -250.0);
        assert_eq!(v.profit_loss_percentage, -25.0);
    }

    #[test]
    fn test_write_into_sets_columns() {
        let mut row = json!({"name": "Gold"});
        Valuation::new(100.0, 110.0).write_into(&mut row);
        assert_eq!(row["current_value"], json!(110.0));
        assert_eq!(row["profit_loss"], json!(10.0));
        assert_eq!(row["name"], "Gold");
    }
}
