use crate::core::Indexer;
use crate::geohash::{self, Boundary, GeoError};
use crate::models::GeoCoordinate;
use anyhow::Error;

pub(crate) const MAX_PRECISION: usize = 12;

#[derive(Debug, Clone)]
pub(crate) struct GeohashIndexer {
    precision: usize,
    boundary: Boundary,
}

impl GeohashIndexer {
    pub fn new(precision: usize) -> Result<Self, Error> {
        if precision < 1 || precision > MAX_PRECISION {
            return Err(Error::msg(format!("invalid precision for geohash indexer: {}", precision)));
        }
        Ok(Self {
            precision,
            boundary: Boundary::default(),
        })
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }
}

impl Indexer<String> for GeohashIndexer {
    fn index(&self, coord: GeoCoordinate) -> Result<String, GeoError> {
        geohash::encode_with(coord, self.precision, self.boundary)
    }

    fn neighbors(&self, index: &String) -> Result<Vec<String>, GeoError> {
        let mut cells = vec![index.clone()];
        cells.extend(geohash::neighbors(index)?);
        Ok(cells)
    }
}
