/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
/// Both values are represented as `f64`.
///
/// # Examples
///
/// ```
/// use waqi_etl::LatLon;
///
/// let berlin_center = LatLon(52.5200, 13.4050);
/// assert_eq!(berlin_center.0, 52.5200); // Latitude
/// assert_eq!(berlin_center.1, 13.4050); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    /// Builds a coordinate from two optional parts, as read from a nullable table row.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(LatLon(lat, lon)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_requires_both_coordinates() {
        assert_eq!(
            LatLon::from_parts(Some(52.52), Some(13.405)),
            Some(LatLon(52.52, 13.405))
        );
        assert_eq!(LatLon::from_parts(Some(52.52), None), None);
        assert_eq!(LatLon::from_parts(None, Some(13.405)), None);
        assert_eq!(LatLon::from_parts(Some(f64::NAN), Some(13.405)), None);
    }
}
