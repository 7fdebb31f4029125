use crate::models::courier::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two points, used to price rides by length.
pub fn haversine_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let half_lat = (delta_lat / 2.0).sin();
    let half_lng = (delta_lng / 2.0).sin();

    let a = half_lat * half_lat
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * half_lng * half_lng;

    EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
}
