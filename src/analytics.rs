//! Sales and profit figures for the reporting screens.
//!
//! Orders are filtered by their timestamp. Costs and incomes only carry a
//! calendar date, which is compared as midnight UTC of that date.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::{Cost, CostCategory, ExtraIncome, LedgerKind, Order};

const TOP_DRINKS: usize = 5;

/// Reporting period picked on the analytics screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Period {
    Today,
    #[serde(alias = "week")]
    Last7Days,
    #[serde(alias = "month")]
    Last30Days,
    Custom { start: NaiveDate, end: NaiveDate },
    All,
}

/// Inclusive instant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.contains(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

/// Interpret a wall-clock time in `tz`. Times skipped by a DST jump fall
/// back to UTC.
fn wall_clock<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

impl Period {
    /// Range in local time; `None` for all time.
    pub fn resolve(&self) -> Option<DateRange> {
        self.resolve_at(Local::now())
    }

    pub fn resolve_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<DateRange> {
        let tz = now.timezone();
        let today = now.date_naive();
        let now_utc = now.with_timezone(&Utc);
        let midnight = |day: NaiveDate| wall_clock(&tz, day.and_time(NaiveTime::MIN));
        match *self {
            Period::Today => Some(DateRange {
                start: midnight(today),
                end: wall_clock(&tz, today.and_time(end_of_day())),
            }),
            Period::Last7Days => Some(DateRange {
                start: midnight(today - Duration::days(7)),
                end: now_utc,
            }),
            Period::Last30Days => Some(DateRange {
                start: midnight(today - Duration::days(30)),
                end: now_utc,
            }),
            // Custom bounds are local calendar days, like the preset periods,
            // not UTC midnight.
            Period::Custom { start, end } => Some(DateRange {
                start: midnight(start),
                end: wall_clock(&tz, end.and_time(end_of_day())),
            }),
            Period::All => None,
        }
    }
}

fn in_range(range: Option<&DateRange>, at: DateTime<Utc>) -> bool {
    range.map_or(true, |r| r.contains(at))
}

fn date_in_range(range: Option<&DateRange>, date: NaiveDate) -> bool {
    range.map_or(true, |r| r.contains_date(date))
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrinkSales {
    pub drink_id: String,
    pub drink_name: String,
    pub quantity: u32,
    pub revenue: f64,
}

/// Revenue per day (`YYYY-MM-DD`) or month (`YYYY-MM`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSales {
    pub key: String,
    pub revenue: f64,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesAnalytics {
    pub total_revenue: f64,
    pub order_count: usize,
    pub average_order_value: f64,
    pub top_drinks: Vec<DrinkSales>,
    pub daily_sales: Vec<PeriodSales>,
    pub monthly_sales: Vec<PeriodSales>,
}

fn bucket(map: BTreeMap<String, (f64, usize)>) -> Vec<PeriodSales> {
    map.into_iter()
        .map(|(key, (revenue, orders))| PeriodSales {
            key,
            revenue,
            orders,
        })
        .collect()
}

pub fn sales_analytics(orders: &[Order], range: Option<&DateRange>) -> SalesAnalytics {
    let selected: Vec<&Order> = orders
        .iter()
        .filter(|o| in_range(range, o.timestamp))
        .collect();

    let total_revenue: f64 = selected.iter().map(|o| o.total).sum();
    let order_count = selected.len();
    let average_order_value = if order_count == 0 {
        0.0
    } else {
        total_revenue / order_count as f64
    };

    // First-seen order breaks ties between drinks with equal quantities.
    let mut drinks: Vec<DrinkSales> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut daily: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut monthly: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for order in &selected {
        for item in &order.items {
            let slot = *index.entry(item.drink_id.as_str()).or_insert_with(|| {
                drinks.push(DrinkSales {
                    drink_id: item.drink_id.clone(),
                    drink_name: item.drink_name.clone(),
                    quantity: 0,
                    revenue: 0.0,
                });
                drinks.len() - 1
            });
            drinks[slot].quantity += item.quantity;
            drinks[slot].revenue += item.subtotal;
        }

        let day = daily
            .entry(order.timestamp.format("%Y-%m-%d").to_string())
            .or_default();
        day.0 += order.total;
        day.1 += 1;
        let month = monthly
            .entry(order.timestamp.format("%Y-%m").to_string())
            .or_default();
        month.0 += order.total;
        month.1 += 1;
    }

    drinks.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    drinks.truncate(TOP_DRINKS);

    SalesAnalytics {
        total_revenue,
        order_count,
        average_order_value,
        top_drinks: drinks,
        daily_sales: bucket(daily),
        monthly_sales: bucket(monthly),
    }
}

// ---------------------------------------------------------------------------
// Profit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub category: CostCategory,
    pub label: &'static str,
    pub amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAnalysis {
    pub total_revenue: f64,
    pub total_costs: f64,
    pub total_extra_income: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub gross_margin: f64,
    pub net_margin: f64,
    pub cost_breakdown: Vec<CostBreakdown>,
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part * 100.0 / whole
    } else {
        0.0
    }
}

pub fn profit_analysis(
    orders: &[Order],
    costs: &[Cost],
    incomes: &[ExtraIncome],
    range: Option<&DateRange>,
) -> ProfitAnalysis {
    let total_revenue: f64 = orders
        .iter()
        .filter(|o| in_range(range, o.timestamp))
        .map(|o| o.total)
        .sum();
    let costs: Vec<&Cost> = costs
        .iter()
        .filter(|c| date_in_range(range, c.date))
        .collect();
    let total_costs: f64 = costs.iter().map(|c| c.amount).sum();
    let total_extra_income: f64 = incomes
        .iter()
        .filter(|i| date_in_range(range, i.date))
        .map(|i| i.amount)
        .sum();

    let gross_profit = total_revenue - total_costs;
    let net_profit = gross_profit + total_extra_income;

    let mut cost_breakdown: Vec<CostBreakdown> = CostCategory::ALL
        .iter()
        .filter_map(|category| {
            let amount: f64 = costs
                .iter()
                .filter(|c| c.category == *category)
                .map(|c| c.amount)
                .sum();
            let present = costs.iter().any(|c| c.category == *category);
            present.then(|| CostBreakdown {
                category: *category,
                label: category.label(),
                amount,
                percentage: percent_of(amount, total_costs),
            })
        })
        .collect();
    cost_breakdown.sort_by(|a, b| b.amount.total_cmp(&a.amount));

    ProfitAnalysis {
        total_revenue,
        total_costs,
        total_extra_income,
        gross_profit,
        net_profit,
        gross_margin: percent_of(gross_profit, total_revenue),
        net_margin: percent_of(net_profit, total_revenue),
        cost_breakdown,
    }
}
