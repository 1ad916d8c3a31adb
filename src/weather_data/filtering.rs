use crate::types::columns::DATE;
use chrono::NaiveDate;
use polars::prelude::{col, lit, DataType, LazyFrame};

pub trait DailyFrameFilterExt {
    /// Filters a daily LazyFrame by a NaiveDate range (inclusive).
    /// Assumes the 'date' column holds dates or 'YYYY-MM-DD' strings.
    fn filter_daily(self, start_date: NaiveDate, end_date: NaiveDate) -> LazyFrame;

    /// Drops rows in which every one of `observation_columns` is null.
    /// With no observation columns every row is dropped.
    fn drop_empty_observations(self, observation_columns: &[&str]) -> LazyFrame;
}

impl DailyFrameFilterExt for LazyFrame {
    fn filter_daily(self, start_date: NaiveDate, end_date: NaiveDate) -> LazyFrame {
        self.filter(
            col(DATE)
                .cast(DataType::Date)
                .gt_eq(lit(start_date))
                .and(col(DATE).cast(DataType::Date).lt_eq(lit(end_date))),
        )
    }

    fn drop_empty_observations(self, observation_columns: &[&str]) -> LazyFrame {
        let any_present = observation_columns
            .iter()
            .map(|name| col(*name).is_not_null())
            .reduce(|acc, present| acc.or(present))
            .unwrap_or(lit(false));
        self.filter(any_present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame() -> PolarsResult<LazyFrame> {
        Ok(df!(
            "date" => ["2014-12-31", "2015-01-01", "2015-06-01", "2025-01-01"],
            "tavg" => [Some(1.0), None, Some(3.0), Some(4.0)],
            "wdir" => [None, None, Some(180.0), None::<f64>],
        )?
        .lazy())
    }

    #[test]
    fn test_filter_daily_is_inclusive() -> PolarsResult<()> {
        let filtered = frame()?
            .filter_daily(
                NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2015, 6, 1).unwrap(),
            )
            .collect()?;
        assert_eq!(filtered.height(), 2);
        Ok(())
    }

    #[test]
    fn test_drop_empty_observations() -> PolarsResult<()> {
        let kept = frame()?
            .drop_empty_observations(&["tavg", "wdir"])
            .collect()?;
        assert_eq!(kept.height(), 3);
        let dates: Vec<_> = kept.column("date")?.str()?.into_iter().flatten().collect();
        assert_eq!(dates, ["2014-12-31", "2015-06-01", "2025-01-01"]);
        Ok(())
    }
}
