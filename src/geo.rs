use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::error::AnalysisError;
use crate::models::{EntityKind, GeoEntity};
use crate::store::{field, parse_coordinate, Dataset, Table, TableStore};

#[derive(Debug, Clone, Copy)]
pub struct EntityColumns {
    pub id: &'static str,
    pub zip: &'static str,
    pub city: &'static str,
    pub state: &'static str,
}

pub const CUSTOMER_COLUMNS: EntityColumns = EntityColumns {
    id: "customer_id",
    zip: "customer_zip_code_prefix",
    city: "customer_city",
    state: "customer_state",
};

pub const SELLER_COLUMNS: EntityColumns = EntityColumns {
    id: "seller_id",
    zip: "seller_zip_code_prefix",
    city: "seller_city",
    state: "seller_state",
};

#[derive(Debug, Clone, Copy)]
pub struct GeoColumns {
    pub zip: &'static str,
    pub lat: &'static str,
    pub lng: &'static str,
}

pub const GEOLOCATION_COLUMNS: GeoColumns = GeoColumns {
    zip: "geolocation_zip_code_prefix",
    lat: "geolocation_lat",
    lng: "geolocation_lng",
};

impl EntityKind {
    pub fn columns(&self) -> EntityColumns {
        match self {
            Self::Customer => CUSTOMER_COLUMNS,
            Self::Seller => SELLER_COLUMNS,
        }
    }

    pub fn dataset(&self) -> Dataset {
        match self {
            Self::Customer => Dataset::Customers,
            Self::Seller => Dataset::Sellers,
        }
    }
}

/// Informational record of duplicates collapsed by the first-match rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinAmbiguityResolved {
    /// Entities whose prefix matched more than one geolocation row
    pub entities_affected: usize,
    /// Extra geolocation matches discarded for those entities
    pub rows_collapsed: usize,
    /// Repeated entity ids dropped after their first row
    pub duplicate_entities: usize,
}

impl JoinAmbiguityResolved {
    pub fn is_empty(&self) -> bool {
        self.rows_collapsed == 0 && self.duplicate_entities == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinedTable {
    pub rows: Vec<GeoEntity>,
    pub ambiguity: JoinAmbiguityResolved,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn located(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.lat.is_some() && row.lng.is_some())
            .count()
    }
}

/// Postal prefixes appear both zero-padded and as bare integers across exports.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = trimmed.trim_start_matches('0');
    if digits.is_empty() && !trimmed.is_empty() {
        "0".to_string()
    } else {
        digits.to_string()
    }
}

struct PrefixMatch {
    lat: Option<f64>,
    lng: Option<f64>,
    rows: usize,
}

/// Left join on postal prefix with one output row per entity id.
///
/// The first geolocation row for a prefix, in geolocation table order, supplies
/// the coordinates. Entities with no match keep `None` coordinates.
pub fn join(
    entities: &Table,
    entity_table: &str,
    columns: &EntityColumns,
    geolocation: &Table,
    geo_columns: &GeoColumns,
) -> Result<JoinedTable, AnalysisError> {
    let entity_idx = entities.require_columns(
        entity_table,
        &[columns.id, columns.zip, columns.city, columns.state],
    )?;
    let geo_idx = geolocation.require_columns(
        Dataset::Geolocation.file_name(),
        &[geo_columns.zip, geo_columns.lat, geo_columns.lng],
    )?;

    let mut index: HashMap<String, PrefixMatch> = HashMap::new();
    for row in geolocation.rows() {
        let prefix = normalize_prefix(field(row, geo_idx[0]));
        if prefix.is_empty() {
            continue;
        }
        index
            .entry(prefix)
            .and_modify(|matched| matched.rows += 1)
            .or_insert_with(|| PrefixMatch {
                lat: parse_coordinate(field(row, geo_idx[1])),
                lng: parse_coordinate(field(row, geo_idx[2])),
                rows: 1,
            });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut rows = Vec::new();
    let mut ambiguity = JoinAmbiguityResolved::default();

    for row in entities.rows() {
        let entity_id = field(row, entity_idx[0]);
        if !seen.insert(entity_id) {
            ambiguity.duplicate_entities += 1;
            continue;
        }

        let zip_prefix = field(row, entity_idx[1]);
        let matched = index.get(&normalize_prefix(zip_prefix));
        if let Some(matched) = matched.filter(|m| m.rows > 1) {
            ambiguity.entities_affected += 1;
            ambiguity.rows_collapsed += matched.rows - 1;
        }

        rows.push(GeoEntity {
            entity_id: entity_id.to_string(),
            zip_prefix: zip_prefix.to_string(),
            lat: matched.and_then(|m| m.lat),
            lng: matched.and_then(|m| m.lng),
            city: field(row, entity_idx[2]).to_string(),
            state: field(row, entity_idx[3]).to_string(),
        });
    }

    if !ambiguity.is_empty() {
        debug!(
            table = entity_table,
            entities_affected = ambiguity.entities_affected,
            rows_collapsed = ambiguity.rows_collapsed,
            duplicate_entities = ambiguity.duplicate_entities,
            "collapsed duplicate geolocation matches"
        );
    }

    Ok(JoinedTable { rows, ambiguity })
}

/// Joins the customer or seller table from the store to geolocation.
pub fn join_entities(store: &TableStore, kind: EntityKind) -> Result<JoinedTable, AnalysisError> {
    let dataset = kind.dataset();
    let entities = store.require(dataset)?;
    let geolocation = store.require(Dataset::Geolocation)?;
    join(
        entities,
        dataset.file_name(),
        &kind.columns(),
        geolocation,
        &GEOLOCATION_COLUMNS,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Every surveyed location with usable coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct GeoCloud {
    pub center: Option<Coordinate>,
    pub points: Vec<Coordinate>,
}

pub fn geolocation_cloud(geolocation: &Table) -> Result<GeoCloud, AnalysisError> {
    let idx = geolocation.require_columns(
        Dataset::Geolocation.file_name(),
        &[GEOLOCATION_COLUMNS.lat, GEOLOCATION_COLUMNS.lng],
    )?;

    let points: Vec<Coordinate> = geolocation
        .rows()
        .iter()
        .filter_map(|row| {
            Some(Coordinate {
                lat: parse_coordinate(field(row, idx[0]))?,
                lng: parse_coordinate(field(row, idx[1]))?,
            })
        })
        .collect();

    let center = (!points.is_empty()).then(|| {
        let n = points.len() as f64;
        Coordinate {
            lat: points.iter().map(|p| p.lat).sum::<f64>() / n,
            lng: points.iter().map(|p| p.lng).sum::<f64>() / n,
        }
    });

    Ok(GeoCloud { center, points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::table_from_str;
    use pretty_assertions::assert_eq;

    const GEOLOCATION_CSV: &str = "geolocation_zip_code_prefix,geolocation_lat,geolocation_lng,geolocation_city,geolocation_state\n\
        01000,-23.55,-46.63,sao paulo,SP\n\
        01000,-23.56,-46.64,sao paulo,SP\n\
        13023,-22.89,-47.06,campinas,SP\n\
        99999,,,nowhere,XX\n";

    fn customers(csv_rows: &str) -> Table {
        table_from_str(&format!(
            "customer_id,customer_unique_id,customer_zip_code_prefix,customer_city,customer_state\n{csv_rows}"
        ))
    }

    fn join_customers(entities: &Table) -> JoinedTable {
        join(
            entities,
            "olist_customers_dataset.csv",
            &CUSTOMER_COLUMNS,
            &table_from_str(GEOLOCATION_CSV),
            &GEOLOCATION_COLUMNS,
        )
        .unwrap()
    }

    #[test]
    fn shared_prefix_keeps_one_row_per_entity() {
        let entities = customers(
            "c1,u1,01000,sao paulo,SP\n\
             c2,u2,01000,sao paulo,SP\n\
             c3,u3,01000,sao paulo,SP\n",
        );

        let joined = join_customers(&entities);
        assert_eq!(joined.len(), 3);
        for row in &joined.rows {
            assert_eq!(row.lat, Some(-23.55));
            assert_eq!(row.lng, Some(-46.63));
        }
        assert_eq!(
            joined.ambiguity,
            JoinAmbiguityResolved {
                entities_affected: 3,
                rows_collapsed: 3,
                duplicate_entities: 0,
            }
        );
    }

    #[test]
    fn unmatched_entities_are_retained() {
        let entities = customers(
            "c1,u1,13023,campinas,SP\n\
             c2,u2,55555,recife,PE\n\
             c3,u3,99999,nowhere,XX\n",
        );

        let joined = join_customers(&entities);
        let ids: Vec<&str> = joined.rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(joined.rows[0].lat, Some(-22.89));
        assert_eq!(joined.rows[1].lat, None);
        assert_eq!(joined.rows[2].lng, None);
        assert_eq!(joined.located(), 1);
        assert!(joined.ambiguity.is_empty());
    }

    #[test]
    fn duplicate_entity_ids_keep_first_row() {
        let entities = customers(
            "c1,u1,13023,campinas,SP\n\
             c1,u1,01000,sao paulo,SP\n\
             c2,u2,01000,sao paulo,SP\n",
        );

        let joined = join_customers(&entities);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.rows[0].city, "campinas");
        assert_eq!(joined.ambiguity.duplicate_entities, 1);
    }

    #[test]
    fn prefixes_match_without_zero_padding() {
        assert_eq!(normalize_prefix("01000"), "1000");
        assert_eq!(normalize_prefix(" 1000 "), "1000");
        assert_eq!(normalize_prefix("000"), "0");
        assert_eq!(normalize_prefix(""), "");

        let entities = customers("c1,u1,1000,sao paulo,SP\n");
        assert_eq!(join_customers(&entities).rows[0].lat, Some(-23.55));
    }

    #[test]
    fn missing_tables_and_columns_are_reported() {
        let store = TableStore::new();
        assert_eq!(
            join_entities(&store, EntityKind::Seller).unwrap_err(),
            AnalysisError::MissingTable("olist_sellers_dataset.csv".to_string())
        );

        let mut store = TableStore::new();
        store.insert(
            Dataset::Sellers.file_name(),
            table_from_str("seller_id,seller_city\ns1,campinas\n"),
        );
        store.insert(
            Dataset::Geolocation.file_name(),
            table_from_str(GEOLOCATION_CSV),
        );
        assert_eq!(
            join_entities(&store, EntityKind::Seller).unwrap_err(),
            AnalysisError::MissingColumns {
                table: "olist_sellers_dataset.csv".to_string(),
                columns: vec![
                    "seller_zip_code_prefix".to_string(),
                    "seller_state".to_string(),
                ],
            }
        );
    }

    #[test]
    fn cloud_skips_rows_without_coordinates() {
        let cloud = geolocation_cloud(&table_from_str(GEOLOCATION_CSV)).unwrap();
        assert_eq!(cloud.points.len(), 3);
        let center = cloud.center.unwrap();
        assert!((center.lat - (-23.55 - 23.56 - 22.89) / 3.0).abs() < 1e-9);

        let empty = geolocation_cloud(&table_from_str(
            "geolocation_zip_code_prefix,geolocation_lat,geolocation_lng\n",
        ))
        .unwrap();
        assert_eq!(empty.center, None);
    }
}
