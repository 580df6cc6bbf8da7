use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;

use crate::analytics::{self, Period, ProfitAnalysis, SalesAnalytics};
use crate::store::Store;

/// Accepts `"today"`, `"week"`, `"month"`, `"all"` or an object
/// `{ kind|period, start|startDate, end|endDate }`. A missing payload means
/// all time.
fn parse_period(arg0: Option<Value>) -> Result<Period, String> {
    let (kind, start, end) = match arg0 {
        None | Some(Value::Null) => return Ok(Period::All),
        Some(Value::String(kind)) => (kind, None, None),
        Some(obj @ Value::Object(_)) => (
            crate::value_str(&obj, &["kind", "period", "range"]).unwrap_or_else(|| "all".into()),
            crate::value_str(&obj, &["start", "startDate", "start_date"]),
            crate::value_str(&obj, &["end", "endDate", "end_date"]),
        ),
        Some(other) => return Err(format!("Invalid period: {other}")),
    };

    match kind.trim().to_ascii_lowercase().as_str() {
        "today" => Ok(Period::Today),
        "week" | "7d" | "last7_days" | "last_7_days" => Ok(Period::Last7Days),
        "month" | "30d" | "last30_days" | "last_30_days" => Ok(Period::Last30Days),
        "all" | "" => Ok(Period::All),
        "custom" => {
            let start = parse_date(start.as_deref(), "start")?;
            let end = parse_date(end.as_deref(), "end")?;
            if start > end {
                return Err(format!("Start date {start} is after end date {end}"));
            }
            Ok(Period::Custom { start, end })
        }
        other => Err(format!("Unknown period: {other}")),
    }
}

fn parse_date(raw: Option<&str>, which: &str) -> Result<NaiveDate, String> {
    let raw = raw.ok_or_else(|| format!("Custom period is missing the {which} date"))?;
    // Date inputs may send a full ISO timestamp.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| format!("Invalid {which} date: {raw}"))
}

fn sales_for(store: &Store, period: Period) -> SalesAnalytics {
    let range = period.resolve();
    analytics::sales_analytics(&store.snapshot().orders, range.as_ref())
}

fn profit_for(store: &Store, period: Period) -> Result<ProfitAnalysis, String> {
    let range = period.resolve();
    let storage = store.storage();
    let costs = storage.get_costs().map_err(|e| e.to_string())?;
    let incomes = storage.get_extra_incomes().map_err(|e| e.to_string())?;
    Ok(analytics::profit_analysis(
        &store.snapshot().orders,
        &costs,
        &incomes,
        range.as_ref(),
    ))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn analytics_sales(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<SalesAnalytics, String> {
    let period = parse_period(arg0)?;
    Ok(sales_for(&store, period))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn analytics_profit(
    arg0: Option<Value>,
    store: tauri::State<'_, Arc<Store>>,
) -> Result<ProfitAnalysis, String> {
    let period = parse_period(arg0)?;
    profit_for(&store, period)
}
