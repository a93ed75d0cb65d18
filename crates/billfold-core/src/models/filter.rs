//! Invoice list filter

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::invoice::{Invoice, InvoiceStatus};
use crate::error::{Error, Result};

/// Criteria for listing invoices. The default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    /// Allowed statuses; empty means any status
    #[serde(default)]
    pub statuses: BTreeSet<InvoiceStatus>,
    /// Inclusive lower bound on the issue date
    #[serde(default)]
    pub issued_from: Option<NaiveDate>,
    /// Inclusive upper bound on the issue date
    #[serde(default)]
    pub issued_to: Option<NaiveDate>,
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub customer_ref: Option<String>,
}

impl InvoiceFilter {
    #[must_use]
    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.statuses.insert(status);
        self
    }

    #[must_use]
    pub fn issued_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.issued_from = from;
        self.issued_to = to;
        self
    }

    #[must_use]
    pub fn amount_between(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    /// Reject logically impossible ranges.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.issued_from, self.issued_to) {
            if from > to {
                return Err(Error::Validation(format!(
                    "issue date range is inverted: {from} > {to}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err(Error::Validation(format!(
                    "amount range is inverted: {min} > {max}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_unrestricted(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&invoice.status) {
            return false;
        }
        if self.issued_from.is_some_and(|from| invoice.issue_date < from) {
            return false;
        }
        if self.issued_to.is_some_and(|to| invoice.issue_date > to) {
            return false;
        }
        if self.min_amount.is_some_and(|min| invoice.amount < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| invoice.amount > max) {
            return false;
        }
        match self.customer_ref.as_deref().map(str::trim) {
            Some(customer) if !customer.is_empty() => {
                invoice.customer_ref.eq_ignore_ascii_case(customer)
            }
            _ => true,
        }
    }

    /// Stable identity of the query, used for list tickets and list freshness.
    pub fn cache_key(&self) -> String {
        if self.is_unrestricted() {
            return "all".to_string();
        }
        let statuses = self
            .statuses
            .iter()
            .map(|status| status.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let date = |value: Option<NaiveDate>| value.map(|d| d.to_string()).unwrap_or_default();
        let amount = |value: Option<Decimal>| {
            value
                .map(|a| a.normalize().to_string())
                .unwrap_or_default()
        };
        format!(
            "status={statuses};from={};to={};min={};max={};customer={}",
            date(self.issued_from),
            date(self.issued_to),
            amount(self.min_amount),
            amount(self.max_amount),
            self.customer_ref
                .as_deref()
                .map(|c| c.trim().to_ascii_lowercase())
                .unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvoiceDraft, LineItem};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(issued: NaiveDate, amount: Decimal, status: InvoiceStatus) -> Invoice {
        let draft = InvoiceDraft::from_lines(
            "ACME",
            issued,
            issued,
            vec![LineItem::new("Service", dec!(1), amount)],
        )
        .with_status(status);
        Invoice::from_draft(draft).unwrap()
    }

    #[test]
    fn default_matches_everything() {
        let filter = InvoiceFilter::default();
        assert!(filter.is_unrestricted());
        assert!(filter.matches(&invoice(date(2020, 1, 1), dec!(5), InvoiceStatus::Draft)));
        assert_eq!(filter.cache_key(), "all");
    }

    #[test]
    fn status_filter() {
        let filter = InvoiceFilter::default().with_status(InvoiceStatus::Paid);
        assert!(filter.matches(&invoice(date(2024, 1, 1), dec!(5), InvoiceStatus::Paid)));
        assert!(!filter.matches(&invoice(date(2024, 1, 1), dec!(5), InvoiceStatus::Issued)));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let filter = InvoiceFilter::default()
            .issued_between(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)));
        assert!(filter.matches(&invoice(date(2024, 1, 1), dec!(5), InvoiceStatus::Paid)));
        assert!(filter.matches(&invoice(date(2024, 1, 31), dec!(5), InvoiceStatus::Paid)));
        assert!(!filter.matches(&invoice(date(2024, 2, 1), dec!(5), InvoiceStatus::Paid)));
    }

    #[test]
    fn amount_bounds_are_inclusive() {
        let filter = InvoiceFilter::default().amount_between(Some(dec!(10)), Some(dec!(20)));
        assert!(filter.matches(&invoice(date(2024, 1, 1), dec!(10.00), InvoiceStatus::Paid)));
        assert!(filter.matches(&invoice(date(2024, 1, 1), dec!(20), InvoiceStatus::Paid)));
        assert!(!filter.matches(&invoice(date(2024, 1, 1), dec!(20.01), InvoiceStatus::Paid)));
    }

    #[test]
    fn inverted_ranges_are_invalid() {
        let dates =
            InvoiceFilter::default().issued_between(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)));
        assert!(matches!(dates.validate(), Err(Error::Validation(_))));

        let amounts = InvoiceFilter::default().amount_between(Some(dec!(5)), Some(dec!(1)));
        assert!(amounts.validate().is_err());
    }

    #[test]
    fn cache_key_ignores_decimal_scale() {
        let a = InvoiceFilter::default().amount_between(Some(dec!(10.00)), None);
        let b = InvoiceFilter::default().amount_between(Some(dec!(10)), None);
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
