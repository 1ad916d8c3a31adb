//! Best-effort enrichment of the wide table with reference data.
//!
//! Each enricher left-joins one reference source onto the table. A source that
//! cannot be loaded leaves the table unchanged, and a join never removes rows.

pub mod error;
pub mod geo;
pub mod population;
pub mod weather;
pub mod weather_source;

use crate::types::columns::WIDE_KEYS;
use crate::utils::has_column;
use polars::prelude::*;

/// Left-joins `right` onto `left` on `keys`, then restores the wide-table order
/// (date, country, city). Every row of `left` is kept.
pub(crate) fn left_join_sorted(
    left: &DataFrame,
    right: LazyFrame,
    keys: &[&str],
) -> PolarsResult<DataFrame> {
    let on: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    let order: Vec<Expr> = WIDE_KEYS
        .iter()
        .filter(|key| has_column(left, key))
        .map(|key| col(*key))
        .collect();

    let joined = left
        .clone()
        .lazy()
        .join(right, on.clone(), on, JoinArgs::new(JoinType::Left));
    if order.is_empty() {
        joined.collect()
    } else {
        joined
            .sort_by_exprs(order, SortMultipleOptions::default().with_maintain_order(true))
            .collect()
    }
}
