//! Advisory duplicate-order detection.
//!
//! Two lookups, in priority order:
//!
//! 1. **ERP reference**: an active order carrying the same external reference
//!    is a duplicate regardless of any other field.
//! 2. **Combined**: active orders with the same order number whose customer
//!    name overlaps the candidate's are examined newest first; the first one
//!    whose delivery date lies within the configured window wins.
//!
//! A failed lookup is logged and counts as "no match" for that step only.
//! Detection never blocks order entry, so nothing here returns an error.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DuplicateConfig;
use crate::db::{OrderField, OrderQuery, OrderStore};
use crate::models::{Order, OrderCandidate, INACTIVE_STATUSES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DuplicateType {
    /// Same ERP (TOTVS) order reference.
    ExternalRef,
    /// Same order number, overlapping customer name, close delivery date.
    Combined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    pub existing_order: Option<Order>,
    pub duplicate_type: Option<DuplicateType>,
}

impl DuplicateCheckResult {
    fn none() -> Self {
        Self {
            is_duplicate: false,
            existing_order: None,
            duplicate_type: None,
        }
    }

    fn found(order: Order, kind: DuplicateType) -> Self {
        Self {
            is_duplicate: true,
            existing_order: Some(order),
            duplicate_type: Some(kind),
        }
    }
}

/// Case-insensitive containment in either direction. Blank names never match.
pub fn customer_names_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Check whether `candidate` looks like an order that was already entered.
pub fn check_for_duplicate_order<S: OrderStore + ?Sized>(
    store: &S,
    candidate: &OrderCandidate,
    config: &DuplicateConfig,
) -> DuplicateCheckResult {
    if let Some(existing) = find_by_external_ref(store, candidate) {
        info!(
            order_number = %candidate.order_number,
            existing_id = %existing.id,
            "Duplicate order detected by external reference"
        );
        return DuplicateCheckResult::found(existing, DuplicateType::ExternalRef);
    }

    if let Some(existing) = find_combined_match(store, candidate, config) {
        info!(
            order_number = %candidate.order_number,
            existing_id = %existing.id,
            "Duplicate order detected by number, customer and delivery date"
        );
        return DuplicateCheckResult::found(existing, DuplicateType::Combined);
    }

    DuplicateCheckResult::none()
}

fn find_by_external_ref<S: OrderStore + ?Sized>(
    store: &S,
    candidate: &OrderCandidate,
) -> Option<Order> {
    let external_ref = candidate
        .external_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())?;

    let query = OrderQuery::new()
        .eq(OrderField::ExternalRef, external_ref)
        .status_not_in(INACTIVE_STATUSES)
        .limit(1);

    match store.query_orders(&query) {
        Ok(orders) => orders.into_iter().next(),
        Err(e) => {
            warn!(external_ref = %external_ref, error = %e, "External reference lookup failed");
            None
        }
    }
}

fn find_combined_match<S: OrderStore + ?Sized>(
    store: &S,
    candidate: &OrderCandidate,
    config: &DuplicateConfig,
) -> Option<Order> {
    let order_number = candidate.order_number.trim();
    if order_number.is_empty() {
        return None;
    }

    let query = OrderQuery::new()
        .eq(OrderField::OrderNumber, order_number)
        .status_not_in(INACTIVE_STATUSES)
        .newest_first();

    let orders = match store.query_orders(&query) {
        Ok(orders) => orders,
        Err(e) => {
            warn!(order_number = %order_number, error = %e, "Order number lookup failed");
            return None;
        }
    };

    let new_date = candidate.delivery_date?;

    // First date hit in newest-first order wins, even if an older match is closer.
    orders
        .into_iter()
        .filter(|o| customer_names_match(&o.customer_name, &candidate.customer_name))
        .find(|o| {
            let Some(existing_date) = o.delivery_date else {
                return false;
            };
            let diff = (existing_date - new_date).num_days().abs();
            debug!(existing_id = %o.id, diff_days = diff, "Comparing delivery dates");
            diff <= config.date_window_days
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DbState};
    use crate::error::{Error, Result};
    use chrono::{Duration, NaiveDate, Utc};

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 3, day)
    }

    fn seed(db: &DbState, number: &str, customer: &str, day: u32, minutes_ago: i64) -> Order {
        let mut order = Order::new(number, customer);
        order.delivery_date = date(day);
        order.created_at = Utc::now() - Duration::minutes(minutes_ago);
        db::insert_order(&db.lock().unwrap(), &order).unwrap();
        order
    }

    fn candidate(number: &str, customer: &str, day: u32) -> OrderCandidate {
        OrderCandidate {
            order_number: number.into(),
            customer_name: customer.into(),
            delivery_date: date(day),
            external_ref: None,
        }
    }

    struct FailingStore;

    impl OrderStore for FailingStore {
        fn query_orders(&self, _query: &OrderQuery) -> Result<Vec<Order>> {
            Err(Error::Http("connection reset".into()))
        }
    }

    /// Fails the first lookup, then answers every query with `order`.
    struct FlakyStore {
        order: Order,
        calls: std::sync::Mutex<usize>,
    }

    impl OrderStore for FlakyStore {
        fn query_orders(&self, _query: &OrderQuery) -> Result<Vec<Order>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return Err(Error::Http("connection reset".into()));
            }
            Ok(vec![self.order.clone()])
        }
    }

    #[test]
    fn name_matching_is_bidirectional() {
        assert!(customer_names_match("ACME Industria Ltda", "acme"));
        assert!(customer_names_match("acme", "  ACME Industria Ltda "));
        assert!(!customer_names_match("ACME", "Beta"));
        assert!(!customer_names_match("", "ACME"));
        assert!(!customer_names_match("ACME", "   "));
    }

    #[test]
    fn external_ref_wins_regardless_of_other_fields() {
        let db = DbState::open_in_memory().unwrap();
        let mut existing = Order::new("1001", "ACME");
        existing.external_ref = Some("TOTVS-123".into());
        db::insert_order(&db.lock().unwrap(), &existing).unwrap();

        let mut c = candidate("9999", "Someone Else", 28);
        c.external_ref = Some("TOTVS-123".into());
        let result = check_for_duplicate_order(&db, &c, &DuplicateConfig::default());
        assert!(result.is_duplicate);
        assert_eq!(result.duplicate_type, Some(DuplicateType::ExternalRef));
        assert_eq!(result.existing_order.unwrap().id, existing.id);
    }

    #[test]
    fn inactive_orders_are_ignored() {
        let db = DbState::open_in_memory().unwrap();
        let mut existing = Order::new("1001", "ACME");
        existing.external_ref = Some("TOTVS-123".into());
        existing.status = "cancelled".into();
        existing.delivery_date = date(10);
        db::insert_order(&db.lock().unwrap(), &existing).unwrap();

        let mut c = candidate("1001", "ACME", 10);
        c.external_ref = Some("TOTVS-123".into());
        let result = check_for_duplicate_order(&db, &c, &DuplicateConfig::default());
        assert!(!result.is_duplicate);
        assert_eq!(result.duplicate_type, None);
    }

    #[test]
    fn combined_match_within_window() {
        let db = DbState::open_in_memory().unwrap();
        let existing = seed(&db, "1001", "ACME Industria", 10, 5);

        let result = check_for_duplicate_order(
            &db,
            &candidate("1001", "acme", 13),
            &DuplicateConfig::default(),
        );
        assert!(result.is_duplicate);
        assert_eq!(result.duplicate_type, Some(DuplicateType::Combined));
        assert_eq!(result.existing_order.unwrap().id, existing.id);
    }

    #[test]
    fn combined_match_outside_window() {
        let db = DbState::open_in_memory().unwrap();
        seed(&db, "1001", "ACME Industria", 10, 5);

        let result = check_for_duplicate_order(
            &db,
            &candidate("1001", "ACME Industria", 14),
            &DuplicateConfig::default(),
        );
        assert!(!result.is_duplicate);
    }

    #[test]
    fn different_customer_is_not_duplicate() {
        let db = DbState::open_in_memory().unwrap();
        seed(&db, "1001", "ACME Industria", 10, 5);

        let result = check_for_duplicate_order(
            &db,
            &candidate("1001", "Beta Comercio", 10),
            &DuplicateConfig::default(),
        );
        assert!(!result.is_duplicate);
    }

    #[test]
    fn missing_delivery_dates_never_match() {
        let db = DbState::open_in_memory().unwrap();
        let mut existing = Order::new("1001", "ACME");
        existing.delivery_date = None;
        db::insert_order(&db.lock().unwrap(), &existing).unwrap();

        let result = check_for_duplicate_order(
            &db,
            &candidate("1001", "ACME", 10),
            &DuplicateConfig::default(),
        );
        assert!(!result.is_duplicate);

        seed(&db, "1001", "ACME", 10, 1);
        let mut undated = candidate("1001", "ACME", 10);
        undated.delivery_date = None;
        let result = check_for_duplicate_order(&db, &undated, &DuplicateConfig::default());
        assert!(!result.is_duplicate);
    }

    #[test]
    fn newest_date_match_wins_over_closest() {
        let db = DbState::open_in_memory().unwrap();
        // Older order has the exact date; newer one is 3 days off.
        let _closest = seed(&db, "1001", "ACME", 10, 60);
        let newest = seed(&db, "1001", "ACME", 13, 1);

        let result = check_for_duplicate_order(
            &db,
            &candidate("1001", "ACME", 10),
            &DuplicateConfig::default(),
        );
        assert_eq!(result.existing_order.unwrap().id, newest.id);
    }

    #[test]
    fn window_is_configurable() {
        let db = DbState::open_in_memory().unwrap();
        seed(&db, "1001", "ACME", 10, 5);
        let wide = DuplicateConfig {
            date_window_days: 7,
        };
        assert!(check_for_duplicate_order(&db, &candidate("1001", "ACME", 17), &wide).is_duplicate);
    }

    #[test]
    fn query_failures_degrade_to_not_duplicate() {
        let mut c = candidate("1001", "ACME", 10);
        c.external_ref = Some("TOTVS-1".into());
        let result = check_for_duplicate_order(&FailingStore, &c, &DuplicateConfig::default());
        assert_eq!(result, DuplicateCheckResult::none());
    }

    #[test]
    fn external_ref_failure_still_runs_combined_match() {
        let mut existing = Order::new("1001", "ACME Industria");
        existing.delivery_date = date(11);
        let store = FlakyStore {
            order: existing.clone(),
            calls: std::sync::Mutex::new(0),
        };
        let mut c = candidate("1001", "acme", 10);
        c.external_ref = Some("TOTVS-1".into());

        let result = check_for_duplicate_order(&store, &c, &DuplicateConfig::default());
        assert!(result.is_duplicate);
        assert_eq!(result.duplicate_type, Some(DuplicateType::Combined));
        assert_eq!(result.existing_order.unwrap().id, existing.id);
        assert_eq!(*store.calls.lock().unwrap(), 2);
    }

    #[test]
    fn result_serializes_for_frontend() {
        let result = DuplicateCheckResult::found(Order::new("1", "A"), DuplicateType::ExternalRef);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isDuplicate"], true);
        assert_eq!(json["duplicateType"], "externalRef");
        assert_eq!(json["existingOrder"]["orderNumber"], "1");
    }
}
