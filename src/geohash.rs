use crate::models::GeoCoordinate;
use thiserror::Error;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

#[derive(Debug, Error, Clone, PartialEq)]
pub(crate) enum GeoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Which half a value lying exactly on a bisection midpoint falls into.
///
/// `Inclusive` matches the reference geohash implementations (`0,0` encodes to `s`).
/// `Exclusive` reproduces hashes written by the legacy mobile client, which only
/// moved to the upper half when the value was strictly greater than the midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Boundary {
    #[default]
    Inclusive,
    Exclusive,
}

impl Boundary {
    fn upper(self, value: f64, mid: f64) -> bool {
        match self {
            Boundary::Inclusive => value >= mid,
            Boundary::Exclusive => value > mid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn center(&self) -> GeoCoordinate {
        GeoCoordinate {
            latitude: (self.min_lat + self.max_lat) / 2.0,
            longitude: (self.min_lon + self.max_lon) / 2.0,
        }
    }
}

/// Encodes with [`Boundary::Inclusive`].
///
/// A point lying exactly on a bisection midpoint may get a different hash than
/// the one the legacy mobile client stored for it. Use [`encode_with`] and
/// [`Boundary::Exclusive`] to match those stored hashes.
pub(crate) fn encode(coord: GeoCoordinate, precision: usize) -> Result<String, GeoError> {
    encode_with(coord, precision, Boundary::default())
}

/// Interleaved binary-search geohash, longitude first.
pub(crate) fn encode_with(coord: GeoCoordinate, precision: usize, boundary: Boundary) -> Result<String, GeoError> {
    validate(coord)?;
    if precision == 0 {
        return Err(GeoError::InvalidArgument("geohash precision must be at least 1".to_owned()));
    }
    let (mut min_lat, mut max_lat) = (-90.0, 90.0);
    let (mut min_lon, mut max_lon) = (-180.0, 180.0);
    let mut is_even = true;
    let mut bit = 0;
    let mut current_char = 0usize;
    let mut hash = String::with_capacity(precision);
    while hash.len() < precision {
        if is_even {
            let mid = (min_lon + max_lon) / 2.0;
            if boundary.upper(coord.longitude, mid) {
                current_char |= 1 << (4 - bit);
                min_lon = mid;
            } else {
                max_lon = mid;
            }
        } else {
            let mid = (min_lat + max_lat) / 2.0;
            if boundary.upper(coord.latitude, mid) {
                current_char |= 1 << (4 - bit);
                min_lat = mid;
            } else {
                max_lat = mid;
            }
        }
        is_even = !is_even;
        if bit < 4 {
            bit += 1;
        } else {
            hash.push(BASE32[current_char] as char);
            bit = 0;
            current_char = 0;
        }
    }
    Ok(hash)
}

pub(crate) fn decode_bbox(hash: &str) -> Result<BoundingBox, GeoError> {
    if hash.is_empty() {
        return Err(GeoError::InvalidArgument("empty geohash".to_owned()));
    }
    let mut bbox = BoundingBox {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };
    let mut is_even = true;
    for c in hash.chars() {
        let value = BASE32
            .iter()
            .position(|&b| b as char == c)
            .ok_or_else(|| GeoError::InvalidArgument(format!("invalid geohash symbol: {:?}", c)))?;
        for shift in (0..5).rev() {
            let set = (value >> shift) & 1 == 1;
            if is_even {
                let mid = (bbox.min_lon + bbox.max_lon) / 2.0;
                if set {
                    bbox.min_lon = mid;
                } else {
                    bbox.max_lon = mid;
                }
            } else {
                let mid = (bbox.min_lat + bbox.max_lat) / 2.0;
                if set {
                    bbox.min_lat = mid;
                } else {
                    bbox.max_lat = mid;
                }
            }
            is_even = !is_even;
        }
    }
    Ok(bbox)
}

/// Cells of the same precision surrounding `hash`. Longitude wraps around the
/// antimeridian; rows beyond the poles are skipped.
pub(crate) fn neighbors(hash: &str) -> Result<Vec<String>, GeoError> {
    let bbox = decode_bbox(hash)?;
    let center = bbox.center();
    let height = bbox.max_lat - bbox.min_lat;
    let width = bbox.max_lon - bbox.min_lon;
    let precision = hash.chars().count();
    let mut cells: Vec<String> = Vec::with_capacity(8);
    for dlat in [-1.0, 0.0, 1.0] {
        let latitude = center.latitude + dlat * height;
        if !(-90.0..=90.0).contains(&latitude) {
            continue;
        }
        for dlon in [-1.0, 0.0, 1.0] {
            if dlat == 0.0 && dlon == 0.0 {
                continue;
            }
            let longitude = wrap_longitude(center.longitude + dlon * width);
            let cell = encode(GeoCoordinate { latitude, longitude }, precision)?;
            if cell != hash && !cells.contains(&cell) {
                cells.push(cell);
            }
        }
    }
    Ok(cells)
}

fn wrap_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else if longitude < -180.0 {
        longitude + 360.0
    } else {
        longitude
    }
}

fn validate(coord: GeoCoordinate) -> Result<(), GeoError> {
    if !coord.latitude.is_finite() || !(-90.0..=90.0).contains(&coord.latitude) {
        return Err(GeoError::InvalidArgument(format!("latitude out of range: {}", coord.latitude)));
    }
    if !coord.longitude.is_finite() || !(-180.0..=180.0).contains(&coord.longitude) {
        return Err(GeoError::InvalidArgument(format!("longitude out of range: {}", coord.longitude)));
    }
    Ok(())
}
