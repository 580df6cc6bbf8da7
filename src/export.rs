//! CSV export of the order history.

use chrono::{Local, NaiveDate, TimeZone};
use std::fmt::Display;

use crate::models::Order;

const HEADER: [&str; 10] = [
    "Order number",
    "Time",
    "Drink",
    "Sugar",
    "Ice",
    "Quantity",
    "Unit price",
    "Subtotal",
    "Order total",
    "Status",
];

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn push_row(out: &mut String, fields: &[String]) {
    let row: Vec<String> = fields.iter().map(|f| quote(f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

/// One row per order line. Order number, time, total and status are only
/// written on the first line of each order. Times are local.
pub fn orders_to_csv(orders: &[Order]) -> String {
    render(orders, &Local)
}

fn render<Tz>(orders: &[Order], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    push_row(
        &mut out,
        &HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
    );

    for order in orders {
        let time = order
            .timestamp
            .with_timezone(tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        for (i, item) in order.items.iter().enumerate() {
            let first = i == 0;
            let order_field = |value: String| if first { value } else { String::new() };
            push_row(
                &mut out,
                &[
                    order_field(order.order_number.clone()),
                    order_field(time.clone()),
                    item.drink_name.clone(),
                    item.sugar.label().to_string(),
                    item.ice.label().to_string(),
                    item.quantity.to_string(),
                    format!("{:.2}", item.price),
                    format!("{:.2}", item.subtotal),
                    order_field(format!("{:.2}", order.total)),
                    order_field(order.status.label().to_string()),
                ],
            );
        }
    }
    out
}

/// Suggested download name, e.g. `orders-2026-10-18.csv`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("orders-{}.csv", date.format("%Y-%m-%d"))
}
