//! # Totals Module
//!
//! Closeout arithmetic: totals over a set of sales, the minimum-price
//! check, and grouping of open sales into closable days.
//!
//! ## Closeout Data Flow
//! ```text
//! open sales ──► group_by_day ──► closable_days(closed, today)
//!                                         │
//!                                         ▼
//!                      for each day: compute_totals(day's sales)
//!                                         │
//!                                         ▼
//!                              Closure { sales, totals }
//! ```

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::money::Money;
use crate::types::{LineItem, Product, Sale, Totals};

/// Aggregates a set of sales.
///
/// - `total`: every payment amount
/// - `cash` / `electronic`: the same amounts split by method
/// - `alerts`: sales flagged below minimum price
/// - `items`: summed quantity per product name
///
/// ## Example
/// ```rust,ignore
/// let totals = compute_totals(&day_sales);
/// assert_eq!(totals.total(), totals.cash() + totals.electronic());
/// ```
pub fn compute_totals(sales: &[Sale]) -> Totals {
    let mut totals = Totals::default();

    for sale in sales {
        for payment in &sale.payments {
            totals.total_cents += payment.amount_cents;
            if payment.method.is_electronic() {
                totals.electronic_cents += payment.amount_cents;
            } else {
                totals.cash_cents += payment.amount_cents;
            }
        }

        if sale.below_minimum_alert {
            totals.alerts += 1;
        }

        for item in &sale.items {
            *totals.items.entry(item.product_name.clone()).or_insert(0) += item.quantity;
        }
    }

    totals
}

/// Sum of `quantity × min price` over the line items.
///
/// Items whose product is unknown contribute nothing.
pub fn minimum_total(items: &[LineItem], products: &[Product]) -> Money {
    items
        .iter()
        .filter_map(|item| {
            products
                .iter()
                .find(|p| p.name == item.product_name)
                .map(|p| p.min_price().multiply_quantity(item.quantity))
        })
        .sum()
}

/// True when the amount paid does not cover the minimum total.
#[inline]
pub fn is_below_minimum(paid: Money, minimum: Money) -> bool {
    paid < minimum
}

/// Groups sales by the calendar day of their timestamp.
pub fn group_by_day(sales: &[Sale]) -> BTreeMap<NaiveDate, Vec<Sale>> {
    let mut days: BTreeMap<NaiveDate, Vec<Sale>> = BTreeMap::new();
    for sale in sales {
        days.entry(sale.day()).or_default().push(sale.clone());
    }
    days
}

/// Days that can be closed automatically.
///
/// A day qualifies when it is strictly before `today`, has at least one
/// open sale, and has no closure yet. Returned oldest first.
pub fn closable_days(
    sales: &[Sale],
    closed: &BTreeSet<NaiveDate>,
    today: NaiveDate,
) -> Vec<NaiveDate> {
    sales
        .iter()
        .map(Sale::day)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|day| *day < today && !closed.contains(day))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Payment, PaymentMethod, RecordId};
    use chrono::{TimeZone, Utc};

    fn caderno(quantity: i64) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Caderno".to_string(),
            quantity,
            min_price_cents: 600,
            max_price_cents: 900,
            store: "Socorro".to_string(),
            version: 1,
        }
    }

    fn sale(id: &str, day: u32, qty: i64, method: PaymentMethod, cents: i64, alert: bool) -> Sale {
        Sale {
            id: RecordId::Remote(id.to_string()),
            correlation_id: Some(format!("c-{}", id)),
            store: "Socorro".to_string(),
            seller: "ryan".to_string(),
            items: vec![LineItem::new("Caderno", qty)],
            payments: vec![Payment::new(method, Money::from_cents(cents))],
            note: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 14, 0, 0).unwrap(),
            below_minimum_alert: alert,
            version: 1,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_socorro_closeout_totals() {
        let products = vec![caderno(10)];

        // Sale A: 2 × Caderno paid R$10 cash, minimum 2 × R$6 = R$12
        let a_items = vec![LineItem::new("Caderno", 2)];
        let a_alert = is_below_minimum(Money::from_cents(1000), minimum_total(&a_items, &products));
        assert!(a_alert);

        // Sale B: 1 × Caderno paid R$8 pix, minimum R$6
        let b_items = vec![LineItem::new("Caderno", 1)];
        let b_alert = is_below_minimum(Money::from_cents(800), minimum_total(&b_items, &products));
        assert!(!b_alert);

        let sales = vec![
            sale("a", 1, 2, PaymentMethod::Cash, 1000, a_alert),
            sale("b", 1, 1, PaymentMethod::Pix, 800, b_alert),
        ];
        let totals = compute_totals(&sales);

        assert_eq!(totals.total_cents, 1800);
        assert_eq!(totals.cash_cents, 1000);
        assert_eq!(totals.electronic_cents, 800);
        assert_eq!(totals.alerts, 1);
        assert_eq!(totals.items.get("Caderno"), Some(&3));
    }

    #[test]
    fn test_split_payments_are_attributed_per_method() {
        let mut s = sale("a", 1, 1, PaymentMethod::Cash, 500, false);
        s.payments.push(Payment::new(PaymentMethod::Credit, Money::from_cents(700)));
        s.payments.push(Payment::new(PaymentMethod::Debit, Money::from_cents(300)));

        let totals = compute_totals(&[s]);
        assert_eq!(totals.total(), Money::from_cents(1500));
        assert_eq!(totals.cash(), Money::from_cents(500));
        assert_eq!(totals.electronic(), Money::from_cents(1000));
    }

    #[test]
    fn test_empty_totals() {
        assert_eq!(compute_totals(&[]), Totals::default());
    }

    #[test]
    fn test_minimum_total_ignores_unknown_products() {
        let items = vec![LineItem::new("Caderno", 2), LineItem::new("Sumiu", 5)];
        assert_eq!(minimum_total(&items, &[caderno(1)]), Money::from_cents(1200));
    }

    #[test]
    fn test_exact_minimum_is_not_an_alert() {
        assert!(!is_below_minimum(Money::from_cents(1200), Money::from_cents(1200)));
        assert!(is_below_minimum(Money::from_cents(1199), Money::from_cents(1200)));
    }

    #[test]
    fn test_group_by_day() {
        let sales = vec![
            sale("a", 1, 1, PaymentMethod::Cash, 100, false),
            sale("b", 2, 1, PaymentMethod::Cash, 100, false),
            sale("c", 1, 1, PaymentMethod::Cash, 100, false),
        ];
        let days = group_by_day(&sales);
        assert_eq!(days.len(), 2);
        assert_eq!(days[&date(1)].len(), 2);
        assert_eq!(days[&date(2)].len(), 1);
    }

    #[test]
    fn test_closable_days_skips_today_and_closed() {
        let sales = vec![
            sale("a", 1, 1, PaymentMethod::Cash, 100, false),
            sale("b", 2, 1, PaymentMethod::Cash, 100, false),
            sale("c", 3, 1, PaymentMethod::Cash, 100, false),
            sale("d", 4, 1, PaymentMethod::Cash, 100, false),
        ];
        let closed: BTreeSet<_> = [date(2)].into_iter().collect();

        assert_eq!(closable_days(&sales, &closed, date(4)), vec![date(1), date(3)]);
    }

    #[test]
    fn test_closable_days_without_sales() {
        assert!(closable_days(&[], &BTreeSet::new(), date(4)).is_empty());
    }
}
