//! Portfolio summary and net worth.
//!
//! Both are pure functions over the resource lists, with async wrappers that load
//! the lists for the current session.

use super::{
    ResourceApi, assets::Assets, liabilities::Liabilities, mutual_funds::MutualFunds,
    stocks::Stocks, valuation::Valuation,
};
use crate::{
    client::BackendClient,
    entities::{AssetModel, LiabilityModel, MutualFundModel, StockModel},
    errors::Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query name of the portfolio summary aggregate
pub const PORTFOLIO_SUMMARY: &str = "portfolio_summary";
/// Query name of the net worth aggregate
pub const NET_WORTH: &str = "net_worth";

/// Asset class used for every stock holding
pub const STOCK_CLASS: &str = "stocks";
/// Asset class used for every mutual fund holding
pub const MUTUAL_FUND_CLASS: &str = "mutual_funds";

/// Totals for one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTotal {
    /// `"stocks"`, `"mutual_funds"`, or an asset's `asset_type`
    pub class: String,
    /// Number of holdings in the class
    pub holdings: usize,
    /// Amount originally invested
    pub investment_value: f64,
    /// Value today
    pub current_value: f64,
    /// Current value minus investment
    pub profit_loss: f64,
}

/// Everything the caller holds, valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Sum of every holding's investment
    pub total_investment: f64,
    /// Sum of every holding's current value
    pub total_current_value: f64,
    /// Current value minus investment across holdings
    pub total_profit_loss: f64,
    /// 0 when nothing is invested
    pub profit_loss_percentage: f64,
    /// Per-class totals, ordered by class name
    pub by_class: Vec<ClassTotal>,
}

impl PortfolioSummary {
    /// Summarises the given holdings.
    #[must_use]
    pub fn from_holdings(
        stocks: &[StockModel],
        mutual_funds: &[MutualFundModel],
        assets: &[AssetModel],
    ) -> Self {
        let mut classes: BTreeMap<String, (usize, f64, f64)> = BTreeMap::new();
        let mut add = |class: &str, investment: f64, current: f64| {
            let entry = classes.entry(class.to_string()).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += investment;
            entry.2 += current;
        };

        for s in stocks {
            add(STOCK_CLASS, s.investment_value, s.current_value);
        }
        for f in mutual_funds {
            add(MUTUAL_FUND_CLASS, f.investment_value, f.current_value);
        }
        for a in assets {
            add(&a.asset_type, a.investment_value, a.current_value);
        }

        let by_class: Vec<ClassTotal> = classes
            .into_iter()
            .map(|(class, (holdings, investment, current))| ClassTotal {
                class,
                holdings,
                investment_value: investment,
                current_value: current,
                profit_loss: current - investment,
            })
            .collect();

        let total = Valuation::new(
            by_class.iter().map(|c| c.investment_value).sum(),
            by_class.iter().map(|c| c.current_value).sum(),
        );
        Self {
            total_investment: total.investment_value,
            total_current_value: total.current_value,
            total_profit_loss: total.profit_loss,
            profit_loss_percentage: total.profit_loss_percentage,
            by_class,
        }
    }
}

/// Holdings minus what is owed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetWorth {
    /// Current value of every holding
    pub total_assets: f64,
    /// Outstanding amount of every liability
    pub total_liabilities: f64,
    /// Assets minus liabilities
    pub net_worth: f64,
}

impl NetWorth {
    /// Nets a portfolio against liabilities.
    #[must_use]
    pub fn compute(portfolio: &PortfolioSummary, liabilities: &[LiabilityModel]) -> Self {
        let total_liabilities: f64 = liabilities.iter().map(|l| l.outstanding_amount).sum();
        Self {
            total_assets: portfolio.total_current_value,
            total_liabilities,
            net_worth: portfolio.total_current_value - total_liabilities,
        }
    }
}

/// Loads the caller's holdings and summarises them.
pub async fn portfolio_summary(client: &Arc<BackendClient>) -> Result<PortfolioSummary> {
    let stocks = ResourceApi::<Stocks>::new(Arc::clone(client));
    let funds = ResourceApi::<MutualFunds>::new(Arc::clone(client));
    let assets = ResourceApi::<Assets>::new(Arc::clone(client));
    let (stocks, funds, assets) = tokio::try_join!(stocks.list(), funds.list(), assets.list())?;
    Ok(PortfolioSummary::from_holdings(&stocks, &funds, &assets))
}

/// Loads the caller's holdings and liabilities and nets them.
pub async fn net_worth(client: &Arc<BackendClient>) -> Result<NetWorth> {
    let liabilities = ResourceApi::<Liabilities>::new(Arc::clone(client));
    let (portfolio, liabilities) =
        tokio::try_join!(portfolio_summary(client), liabilities.list())?;
    Ok(NetWorth::compute(&portfolio, &liabilities))
}
