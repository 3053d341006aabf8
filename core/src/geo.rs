//! Great-circle distance. The one Haversine implementation in the crate.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two lat/lng pairs (degrees).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// True when the pair lies inside [-90,90] x [-180,180].
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        assert_eq!(haversine_km(28.6139, 77.2090, 28.6139, 77.2090), 0.0);
    }

    #[test]
    fn delhi_to_mumbai_is_about_1150_km() {
        let d = haversine_km(28.6139, 77.2090, 19.0760, 72.8777);
        assert!((1140.0..1160.0).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = haversine_km(51.5074, -0.1278, 40.7128, -74.0060);
        let b = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn coordinate_bounds() {
        assert!(is_valid_coordinate(90.0, -180.0));
        assert!(!is_valid_coordinate(90.1, 0.0));
        assert!(!is_valid_coordinate(0.0, 180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
