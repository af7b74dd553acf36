use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::config::{MapSettings, MAP_CENTER};
use crate::geo::{Coordinate, JoinedTable};
use crate::models::{EntityKind, GeoEntity, MapPoint};

/// Rows that may carry a map position.
pub trait Located {
    fn coordinates(&self) -> Option<(f64, f64)>;
}

impl Located for GeoEntity {
    fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }
}

/// Draws up to `requested` located rows uniformly without replacement.
///
/// The draw is driven by a generator seeded from `seed`, so identical inputs
/// always give the same subset. Selected rows keep their source order. A
/// request larger than the located set returns the whole set.
pub fn sample<T: Located + Clone>(rows: &[T], requested: usize, seed: u64) -> Vec<T> {
    let valid: Vec<&T> = rows
        .iter()
        .filter(|row| row.coordinates().is_some())
        .collect();

    if requested >= valid.len() {
        return valid.into_iter().cloned().collect();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, valid.len(), requested).into_vec();
    picked.sort_unstable();

    picked.into_iter().map(|i| valid[i].clone()).collect()
}

pub fn to_map_point(entity: &GeoEntity, kind: EntityKind) -> Option<MapPoint> {
    let (lat, lng) = entity.coordinates()?;
    Some(MapPoint {
        entity_id: entity.entity_id.clone(),
        kind,
        lat,
        lng,
        label: format!("{}, {}", entity.city, entity.state),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparativeMap {
    pub center: Coordinate,
    pub available_sellers: usize,
    pub available_customers: usize,
    pub sellers: Vec<MapPoint>,
    pub customers: Vec<MapPoint>,
}

impl ComparativeMap {
    pub fn total(&self) -> usize {
        self.sellers.len() + self.customers.len()
    }
}

fn sampled_points(
    joined: &JoinedTable,
    kind: EntityKind,
    requested: usize,
    settings: &MapSettings,
) -> Vec<MapPoint> {
    let count = settings.resolve(requested, joined.located());
    sample(&joined.rows, count, settings.seed)
        .iter()
        .filter_map(|entity| to_map_point(entity, kind))
        .collect()
}

/// Sellers and customers side by side, each sampled independently with the same seed.
pub fn comparative_map(
    sellers: &JoinedTable,
    customers: &JoinedTable,
    settings: &MapSettings,
) -> ComparativeMap {
    let map = ComparativeMap {
        center: Coordinate {
            lat: MAP_CENTER.0,
            lng: MAP_CENTER.1,
        },
        available_sellers: sellers.located(),
        available_customers: customers.located(),
        sellers: sampled_points(sellers, EntityKind::Seller, settings.sellers, settings),
        customers: sampled_points(customers, EntityKind::Customer, settings.customers, settings),
    };

    debug!(
        sellers = map.sellers.len(),
        customers = map.customers.len(),
        "sampled comparative map"
    );
    map
}
