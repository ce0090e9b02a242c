//! Expense lines of the form `item,amount,currency`.
//!
//! KRW amounts are converted to TWD at the fetched rate; every other currency
//! code is taken to already be TWD and is converted the other way.

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::rate::ExchangeRateProvider;
use crate::sheet::SheetClient;

pub const EXPECTED_FORMAT: &str = "項目,金額,幣別";

/// Failures the user is told about. Everything else is logged only.
#[derive(Debug, Error, PartialEq)]
pub enum ExpenseError {
    #[error("expected 3 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("item name is empty")]
    EmptyItem,
    #[error("currency code is empty")]
    EmptyCurrency,
    #[error("could not convert amount to a number: '{0}'")]
    InvalidAmount(String),
    #[error("GOOGLE_SHEET_WEBAPP_URL environment variable is not set")]
    SheetNotConfigured,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseLine {
    pub item: String,
    pub amount: f64,
    /// Uppercased currency code.
    pub currency: String,
}

/// The row sent to the spreadsheet webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseRecord {
    pub date: String,
    pub item: String,
    pub currency: String,
    pub twd: f64,
    pub krw: f64,
}

impl ExpenseLine {
    pub fn parse(text: &str) -> Result<Self, ExpenseError> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        let [item, amount, currency] = fields[..] else {
            return Err(ExpenseError::FieldCount(fields.len()));
        };

        if item.is_empty() {
            return Err(ExpenseError::EmptyItem);
        }
        if currency.is_empty() {
            return Err(ExpenseError::EmptyCurrency);
        }

        let amount = amount
            .parse::<f64>()
            .ok()
            .filter(|a| a.is_finite())
            .ok_or_else(|| ExpenseError::InvalidAmount(amount.to_string()))?;

        Ok(Self {
            item: item.to_string(),
            amount,
            currency: currency.to_uppercase(),
        })
    }

    pub fn is_krw(&self) -> bool {
        self.currency == "KRW"
    }

    /// Apply `rate` (TWD per KRW) and stamp the row with `at`.
    pub fn convert(&self, rate: f64, at: DateTime<Local>) -> ExpenseRecord {
        let (twd, krw) = if self.is_krw() {
            (round_to(self.amount * rate, 2), self.amount)
        } else {
            (self.amount, round_to(self.amount / rate, 0))
        };

        ExpenseRecord {
            date: at.format("%Y-%m-%d %H:%M:%S").to_string(),
            item: self.item.clone(),
            currency: self.currency.clone(),
            twd,
            krw,
        }
    }
}

/// Parse `text`, convert it at the current rate and hand the row to the sheet.
///
/// Input is validated before any outbound call is made. The sheet POST is
/// fire-and-forget, so a failed upload still yields `Ok`.
pub async fn record_expense(
    text: &str,
    rates: &dyn ExchangeRateProvider,
    sheet: Option<&SheetClient>,
) -> Result<(ExpenseLine, ExpenseRecord), ExpenseError> {
    let line = ExpenseLine::parse(text)?;
    let sheet = sheet.ok_or(ExpenseError::SheetNotConfigured)?;

    let rate = rates.krw_to_twd().await;
    let record = line.convert(rate, Local::now());

    info!(
        item = %record.item,
        currency = %record.currency,
        twd = record.twd,
        krw = record.krw,
        "Recording expense"
    );
    sheet.append(&record).await;

    Ok((line, record))
}

pub fn format_confirmation(line: &ExpenseLine, record: &ExpenseRecord) -> String {
    format!(
        "已記帳：{} {} {}\n台幣: {} TWD\n韓元: {} KRW",
        line.item,
        format_decimal(line.amount),
        line.currency,
        format_decimal(record.twd),
        format_won(record.krw)
    )
}

pub fn format_failure(err: &ExpenseError) -> String {
    format!("記帳失敗，請確認格式: {}\n錯誤訊息: {}", EXPECTED_FORMAT, err)
}

/// The user-facing reply for one expense line.
pub async fn expense_reply(
    text: &str,
    rates: &dyn ExchangeRateProvider,
    sheet: Option<&SheetClient>,
) -> String {
    match record_expense(text, rates, sheet).await {
        Ok((line, record)) => format_confirmation(&line, &record),
        Err(e) => {
            info!("Rejected expense line {:?}: {}", text, e);
            format_failure(&e)
        }
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

/// Always shows a fractional part: `330.0`, `22.55`.
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Whole won amounts without a fractional part: `15000`, `6818`.
pub fn format_won(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_parse_valid_line() {
        let line = ExpenseLine::parse("lunch, 15000 ,krw").unwrap();
        assert_eq!(line.item, "lunch");
        assert_eq!(line.amount, 15000.0);
        assert_eq!(line.currency, "KRW");
        assert!(line.is_krw());
    }

    #[test]
    fn test_parse_wrong_field_count() {
        assert_eq!(
            ExpenseLine::parse("onlyonefield"),
            Err(ExpenseError::FieldCount(1))
        );
        assert_eq!(
            ExpenseLine::parse("a,1,KRW,extra"),
            Err(ExpenseError::FieldCount(4))
        );
    }

    #[test]
    fn test_parse_non_numeric_amount() {
        assert_eq!(
            ExpenseLine::parse("item,abc,KRW"),
            Err(ExpenseError::InvalidAmount("abc".to_string()))
        );
        assert_eq!(
            ExpenseLine::parse("item,NaN,KRW"),
            Err(ExpenseError::InvalidAmount("NaN".to_string()))
        );
        assert_eq!(
            ExpenseLine::parse("item,inf,TWD"),
            Err(ExpenseError::InvalidAmount("inf".to_string()))
        );
    }

    #[test]
    fn test_parse_empty_fields() {
        assert_eq!(ExpenseLine::parse(" ,100,KRW"), Err(ExpenseError::EmptyItem));
        assert_eq!(ExpenseLine::parse("tea,100, "), Err(ExpenseError::EmptyCurrency));
    }

    #[test]
    fn test_convert_krw() {
        let line = ExpenseLine::parse("lunch,15000,KRW").unwrap();
        let record = line.convert(0.022, at());
        assert_eq!(record.twd, 330.0);
        assert_eq!(record.krw, 15000.0);
        assert_eq!(record.date, "2026-03-14 09:26:53");
        assert_eq!(record.currency, "KRW");
    }

    #[test]
    fn test_convert_other_currency_is_treated_as_twd() {
        let line = ExpenseLine::parse("coffee,150,TWD").unwrap();
        let record = line.convert(0.022, at());
        assert_eq!(record.twd, 150.0);
        assert_eq!(record.krw, 6818.0);

        let line = ExpenseLine::parse("snack,150,usd").unwrap();
        assert_eq!(line.convert(0.022, at()).krw, 6818.0);
    }

    #[test]
    fn test_krw_rounds_to_two_places() {
        let line = ExpenseLine::parse("bus,1250,KRW").unwrap();
        let record = line.convert(0.02315, at());
        assert_eq!(record.twd, 28.94);
    }

    #[test]
    fn test_confirmation_format() {
        let line = ExpenseLine::parse("lunch,15000,KRW").unwrap();
        let record = line.convert(0.022, at());
        assert_eq!(
            format_confirmation(&line, &record),
            "已記帳：lunch 15000.0 KRW\n台幣: 330.0 TWD\n韓元: 15000 KRW"
        );

        let line = ExpenseLine::parse("coffee,150,TWD").unwrap();
        let record = line.convert(0.022, at());
        let reply = format_confirmation(&line, &record);
        assert!(reply.contains("台幣: 150"));
        assert!(reply.contains("韓元: 6818 KRW"));
    }

    #[test]
    fn test_failure_format() {
        let reply = format_failure(&ExpenseError::FieldCount(1));
        assert!(reply.starts_with("記帳失敗"));
        assert!(reply.contains(EXPECTED_FORMAT));
        assert!(reply.contains("expected 3 comma-separated fields, got 1"));
    }

    #[test]
    fn test_record_serializes_for_sheet() {
        let line = ExpenseLine::parse("lunch,15000,KRW").unwrap();
        let json = serde_json::to_value(line.convert(0.022, at())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "date": "2026-03-14 09:26:53",
                "item": "lunch",
                "currency": "KRW",
                "twd": 330.0,
                "krw": 15000.0
            })
        );
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_decimal(22.0), "22.0");
        assert_eq!(format_decimal(22.55), "22.55");
        assert_eq!(format_won(6818.0), "6818");
        assert_eq!(format_won(1500.5), "1500.5");
        assert_eq!(round_to(6818.18, 0), 6818.0);
    }

    #[test]
    fn test_exact_halves_round_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);

        let line = ExpenseLine::parse("tea,0.011,TWD").unwrap();
        assert_eq!(line.convert(0.022, at()).krw, 0.0);

        let line = ExpenseLine::parse("tea,0.055,TWD").unwrap();
        assert_eq!(line.convert(0.022, at()).krw, 2.0);
    }
}
