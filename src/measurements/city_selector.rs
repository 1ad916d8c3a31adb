//! City Selector: keeps one representative city per country.
//!
//! The representative is the city with the most measurement rows. Ties go to the
//! lexicographically smallest city name.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::columns::{raw, COUNT};
use crate::utils::write_csv;
use log::info;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Row count per (Country, City). Rows without a country or city are not counted.
pub fn count_rows_per_city(long: &DataFrame) -> PolarsResult<DataFrame> {
    long.clone()
        .lazy()
        .filter(
            col(raw::COUNTRY)
                .is_not_null()
                .and(col(raw::CITY).is_not_null()),
        )
        .group_by([col(raw::COUNTRY), col(raw::CITY)])
        .agg([len().cast(DataType::Int64).alias(COUNT)])
        .collect()
}

/// One row per country, sorted by country: `Country, City, count`.
pub fn select_representative_cities(long: &DataFrame) -> PolarsResult<DataFrame> {
    let counts = count_rows_per_city(long)?;
    let countries = counts.column(raw::COUNTRY)?.str()?;
    let cities = counts.column(raw::CITY)?.str()?;
    let row_counts = counts.column(COUNT)?.i64()?;

    let mut best: BTreeMap<&str, (&str, i64)> = BTreeMap::new();
    for ((country, city), count) in countries.into_iter().zip(cities).zip(row_counts) {
        let (Some(country), Some(city), Some(count)) = (country, city, count) else {
            continue;
        };
        best.entry(country)
            .and_modify(|(best_city, best_count)| {
                if count > *best_count || (count == *best_count && city < *best_city) {
                    *best_city = city;
                    *best_count = count;
                }
            })
            .or_insert((city, count));
    }

    let selected_countries: Vec<&str> = best.keys().copied().collect();
    let selected_cities: Vec<&str> = best.values().map(|(city, _)| *city).collect();
    let selected_counts: Vec<i64> = best.values().map(|(_, count)| *count).collect();
    df!(
        raw::COUNTRY => selected_countries,
        raw::CITY => selected_cities,
        COUNT => selected_counts,
    )
}

/// Keeps the rows whose City is one of the selected cities, in any country.
pub fn filter_to_selected_cities(long: &DataFrame, selection: &DataFrame) -> PolarsResult<DataFrame> {
    let cities: Vec<&str> = selection.column(raw::CITY)?.str()?.into_iter().flatten().collect();
    let cities = Series::new(raw::CITY.into(), cities);
    long.clone()
        .lazy()
        .filter(col(raw::CITY).is_in(lit(cities)))
        .collect()
}

/// Selects the representative cities, persists the selection to
/// `city_per_country.csv` and returns the filtered long table.
pub fn apply_city_selection(
    long: &DataFrame,
    config: &PipelineConfig,
) -> Result<DataFrame, PipelineError> {
    let mut selection = select_representative_cities(long)?;
    write_csv(&mut selection, &config.city_selection_path())?;

    let filtered = filter_to_selected_cities(long, &selection)?;
    info!(
        "Kept {} of {} rows for {} representative cities",
        filtered.height(),
        long.height(),
        selection.height()
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_table(rows: &[(&str, &str, usize)]) -> PolarsResult<DataFrame> {
        let mut countries = Vec::new();
        let mut cities = Vec::new();
        for (country, city, n) in rows {
            for _ in 0..*n {
                countries.push(*country);
                cities.push(*city);
            }
        }
        let species = vec!["pm25"; countries.len()];
        df!(raw::COUNTRY => countries, raw::CITY => cities, raw::SPECIE => species)
    }

    fn selected(selection: &DataFrame) -> Vec<(String, String, i64)> {
        let countries = selection.column(raw::COUNTRY).unwrap().str().unwrap();
        let cities = selection.column(raw::CITY).unwrap().str().unwrap();
        let counts = selection.column(COUNT).unwrap().i64().unwrap();
        countries
            .into_iter()
            .zip(cities)
            .zip(counts)
            .map(|((country, city), count)| {
                (
                    country.unwrap().to_string(),
                    city.unwrap().to_string(),
                    count.unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_city_with_most_rows_wins() -> PolarsResult<()> {
        let long = long_table(&[("DE", "Berlin", 5), ("DE", "Hamburg", 3), ("FR", "Lyon", 2)])?;
        let selection = select_representative_cities(&long)?;
        assert_eq!(
            selected(&selection),
            [
                ("DE".to_string(), "Berlin".to_string(), 5),
                ("FR".to_string(), "Lyon".to_string(), 2)
            ]
        );
        Ok(())
    }

    #[test]
    fn test_tie_goes_to_smallest_city_name() -> PolarsResult<()> {
        let long = long_table(&[("NL", "Utrecht", 4), ("NL", "Amsterdam", 4)])?;
        let selection = select_representative_cities(&long)?;
        assert_eq!(selected(&selection)[0].1, "Amsterdam");
        Ok(())
    }

    #[test]
    fn test_selection_is_persisted_and_rows_filtered() -> Result<(), PipelineError> {
        let dir = tempfile::tempdir().map_err(|e| PipelineError::PersistIo(std::path::PathBuf::new(), e))?;
        let config = PipelineConfig::builder().output_directory(dir.path()).build();
        let long = long_table(&[("DE", "Berlin", 5), ("DE", "Hamburg", 3)])?;

        let filtered = apply_city_selection(&long, &config)?;
        assert_eq!(filtered.height(), 5);

        let written = std::fs::read_to_string(config.city_selection_path())
            .map_err(|e| PipelineError::PersistIo(config.city_selection_path(), e))?;
        assert_eq!(written, "Country,City,count\nDE,Berlin,5\n");
        Ok(())
    }

    #[test]
    fn test_filter_handles_many_selected_cities() -> PolarsResult<()> {
        let countries: Vec<String> = (0..500).map(|n| format!("C{n}")).collect();
        let cities: Vec<String> = (0..500).map(|n| format!("City{n}")).collect();
        let mut rows: Vec<(&str, &str, usize)> = countries
            .iter()
            .zip(&cities)
            .map(|(country, city)| (country.as_str(), city.as_str(), 2))
            .collect();
        rows.push(("C0", "Other", 1));
        rows.push(("XX", "City1", 1));
        let long = long_table(&rows)?;

        let selection = select_representative_cities(&long)?;
        assert_eq!(selection.height(), 501);
        let filtered = filter_to_selected_cities(&long, &selection)?;
        assert_eq!(filtered.height(), 1001);
        let kept: Vec<&str> = filtered.column(raw::CITY)?.str()?.into_iter().flatten().collect();
        assert!(!kept.contains(&"Other"));
        Ok(())
    }
}
