use anyhow::{Context, Result};
use geo::{Coord, InteriorPoint};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::DatasetError;
use crate::geometric::area::{GeoPolygon, GeoRing};

/// Overpass `out body geom` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsmResponse {
    #[serde(default)]
    pub elements: Vec<OsmElement>,
}

/// One way element with inline node geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmElement {
    #[serde(rename = "type", default)]
    pub element_type: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub geometry: Vec<OsmNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OsmNode {
    pub lat: f64,
    pub lon: f64,
}

/// Processed building, one entry of `processed.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub osm_id: i64,
    /// Representative point inside the footprint
    pub longitude: f64,
    pub latitude: f64,
    /// Height in meters from the `height` tag
    pub building_height: Option<f64>,
    pub levels: Option<i64>,
    #[serde(default)]
    pub building_type: String,
    #[serde(default)]
    pub building_material: String,
    #[serde(default)]
    pub roof_material: String,
    #[serde(default)]
    pub roof_shape: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub housenumber: String,
    #[serde(default)]
    pub postcode: String,
    #[serde(default)]
    pub city: String,
    pub footprint_wkt: String,
    /// Ground area in square meters
    pub footprint_area: f64,
}

impl OsmResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse Overpass JSON")
    }

    /// Load a saved `raw.json`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read OSM data: {:?}", path))?;
        Self::from_slice(&bytes).with_context(|| format!("Invalid OSM data in {:?}", path))
    }
}

impl OsmElement {
    /// Tag value, `None` when the tag is missing or the element has no tags
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref()?.get(key).map(String::as_str)
    }

    /// `building` tag, or "unknown"
    pub fn building_type(&self) -> &str {
        self.tag("building").unwrap_or("unknown")
    }

    /// Closed exterior ring built from the node geometry
    pub fn to_ring(&self) -> GeoRing {
        let mut ring = GeoRing::new(
            self.geometry
                .iter()
                .map(|n| Coord { x: n.lon, y: n.lat })
                .collect(),
        );
        ring.close();
        ring
    }

    pub fn to_polygon(&self) -> GeoPolygon {
        GeoPolygon::simple(self.to_ring())
    }
}

/// `POLYGON((lon lat, ...))` for a ring, closed first
pub fn footprint_wkt(ring: &GeoRing) -> String {
    let coords = ring
        .closed()
        .coords()
        .iter()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(", ");
    format!("POLYGON(({}))", coords)
}

fn tag_or_empty(element: &OsmElement, key: &str) -> String {
    element.tag(key).unwrap_or_default().to_string()
}

/// Turn one Overpass element into a processed record.
pub fn process_osm_building(element: &OsmElement) -> Result<BuildingRecord> {
    let polygon = element.to_polygon();
    polygon.exterior.validate()?;

    let representative = polygon.to_geo().interior_point().ok_or_else(|| {
        DatasetError::invalid_geometry("footprint has no interior point")
    })?;

    let footprint_area = polygon.area_m2()?;

    // Unparseable values become null, not errors
    let building_height = element
        .tag("height")
        .and_then(|h| h.trim().parse::<f64>().ok());
    let levels = element
        .tag("building:levels")
        .and_then(|l| l.trim().parse::<i64>().ok());

    Ok(BuildingRecord {
        osm_id: element.id,
        longitude: representative.x(),
        latitude: representative.y(),
        building_height,
        levels,
        building_type: tag_or_empty(element, "building"),
        building_material: tag_or_empty(element, "building:material"),
        roof_material: tag_or_empty(element, "roof:material"),
        roof_shape: tag_or_empty(element, "roof:shape"),
        name: tag_or_empty(element, "name"),
        street: tag_or_empty(element, "addr:street"),
        housenumber: tag_or_empty(element, "addr:housenumber"),
        postcode: tag_or_empty(element, "addr:postcode"),
        city: tag_or_empty(element, "addr:city"),
        footprint_wkt: footprint_wkt(&polygon.exterior),
        footprint_area,
    })
}

/// Counters from `filter_buildings_by_street`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterStats {
    pub total: usize,
    pub no_tags: usize,
    /// Kept, since there is no street to deduplicate on
    pub no_street: usize,
    pub duplicate_street: usize,
    pub excluded_type: usize,
    pub types_before: BTreeMap<String, usize>,
    pub types_after: BTreeMap<String, usize>,
}

impl FilterStats {
    pub fn kept(&self) -> usize {
        self.types_after.values().sum()
    }
}

fn type_histogram(elements: &[OsmElement]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for element in elements.iter().filter(|e| e.tags.is_some()) {
        *counts
            .entry(element.building_type().to_string())
            .or_insert(0) += 1;
    }
    counts
}

fn log_histogram(title: &str, counts: &BTreeMap<String, usize>) {
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    info!("{}", title);
    for (building_type, count) in sorted {
        info!("  {}: {}", building_type, count);
    }
}

/// Keep one building per street.
///
/// Elements without tags and of an excluded type are dropped. Buildings with no
/// `addr:street` are all kept. For every other street only the first building
/// encountered survives.
pub fn filter_buildings_by_street(
    elements: Vec<OsmElement>,
    exclude_types: &HashSet<String>,
) -> (Vec<OsmElement>, FilterStats) {
    let mut stats = FilterStats {
        total: elements.len(),
        types_before: type_histogram(&elements),
        ..FilterStats::default()
    };
    log_histogram("Building types before filtering:", &stats.types_before);

    let mut seen_streets: HashSet<String> = HashSet::new();
    let mut filtered = Vec::new();

    for element in elements {
        if element.tags.is_none() {
            stats.no_tags += 1;
            continue;
        }

        if exclude_types.contains(element.tag("building").unwrap_or_default()) {
            stats.excluded_type += 1;
            continue;
        }

        let street = element
            .tag("addr:street")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        match street {
            None => {
                stats.no_street += 1;
                filtered.push(element);
            }
            Some(street) => {
                if seen_streets.insert(street) {
                    filtered.push(element);
                } else {
                    stats.duplicate_street += 1;
                }
            }
        }
    }

    stats.types_after = type_histogram(&filtered);

    info!("Filtering stats:");
    info!("  Total buildings: {}", stats.total);
    info!("  Without tags (dropped): {}", stats.no_tags);
    info!("  Excluded types: {}", stats.excluded_type);
    info!("  No street (kept): {}", stats.no_street);
    info!("  Duplicate streets (dropped): {}", stats.duplicate_street);
    info!("  Unique streets (kept): {}", filtered.len() - stats.no_street);
    log_histogram("Building types after filtering:", &stats.types_after);

    (filtered, stats)
}

/// Processed buildings plus the count of elements that could not be processed
#[derive(Debug, Clone, Default)]
pub struct BuildingCollection {
    pub buildings: Vec<BuildingRecord>,
    pub failed: usize,
}

impl BuildingCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process every element; failures are logged with the OSM id and dropped.
    pub fn process(elements: &[OsmElement]) -> Self {
        let mut collection = Self::new();
        for element in elements {
            match process_osm_building(element) {
                Ok(record) => collection.buildings.push(record),
                Err(e) => {
                    warn!("Error processing building {}: {:#}", element.id, e);
                    collection.failed += 1;
                }
            }
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Load a `processed.json`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read processed buildings: {:?}", path))?;
        let buildings: Vec<BuildingRecord> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid processed buildings in {:?}", path))?;
        Ok(BuildingCollection {
            buildings,
            failed: 0,
        })
    }

    /// Write the records as a pretty-printed JSON array
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.buildings)
            .context("Failed to serialize buildings")?;
        fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// Representative points as a GeoJSON FeatureCollection, record fields as properties
    pub fn to_geojson(&self) -> Result<GeoJson> {
        let mut features = Vec::with_capacity(self.buildings.len());
        for building in &self.buildings {
            let geometry = Geometry::new(Value::Point(vec![building.longitude, building.latitude]));
            let properties = match serde_json::to_value(building)
                .context("Failed to serialize building properties")?
            {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };

            let mut feature = Feature::from(geometry);
            feature.id = Some(geojson::feature::Id::Number(building.osm_id.into()));
            feature.properties = Some(properties);
            features.push(feature);
        }

        Ok(GeoJson::from(FeatureCollection {
            bbox: None,
            foreign_members: None,
            features,
        }))
    }

    /// Save the GeoJSON view next to the JSON output
    pub fn save_geojson<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let geojson = self.to_geojson()?;
        fs::write(path, geojson.to_string())
            .with_context(|| format!("Failed to write GeoJSON file: {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tags(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Roughly 20 m x 11 m block near Oxford, open ring
    fn square_nodes() -> Vec<OsmNode> {
        vec![
            OsmNode { lat: 51.7520, lon: -1.2577 },
            OsmNode { lat: 51.7520, lon: -1.2574 },
            OsmNode { lat: 51.7521, lon: -1.2574 },
            OsmNode { lat: 51.7521, lon: -1.2577 },
        ]
    }

    fn element(id: i64, tag_pairs: &[(&str, &str)]) -> OsmElement {
        OsmElement {
            element_type: "way".to_string(),
            id,
            tags: tags(tag_pairs),
            geometry: square_nodes(),
        }
    }

    #[test]
    fn test_parse_overpass_document() {
        let json = r#"{
            "version": 0.6,
            "generator": "Overpass API",
            "elements": [
                {"type": "way", "id": 7, "tags": {"building": "office", "height": "12"},
                 "geometry": [{"lat": 51.0, "lon": -1.0}, {"lat": 51.0, "lon": -0.999},
                              {"lat": 51.001, "lon": -0.999}, {"lat": 51.0, "lon": -1.0}]}
            ]
        }"#;
        let response = OsmResponse::from_slice(json.as_bytes()).unwrap();
        assert_eq!(response.elements.len(), 1);
        assert_eq!(response.elements[0].id, 7);
        assert_eq!(response.elements[0].tag("height"), Some("12"));
        assert_eq!(response.elements[0].geometry.len(), 4);
    }

    #[test]
    fn test_footprint_wkt_is_closed() {
        let wkt = footprint_wkt(&GeoRing::from_lonlat(&[(0.5, 1.0), (1.5, 1.0), (1.5, 2.0)]));
        assert_eq!(wkt, "POLYGON((0.5 1, 1.5 1, 1.5 2, 0.5 1))");
    }

    #[test]
    fn test_process_osm_building() {
        let e = element(
            42,
            &[
                ("building", "office"),
                ("height", "14.5"),
                ("building:levels", "4"),
                ("building:material", "brick"),
                ("addr:street", "High Street"),
                ("addr:city", "Oxford"),
            ],
        );
        let record = process_osm_building(&e).unwrap();

        assert_eq!(record.osm_id, 42);
        assert_eq!(record.building_height, Some(14.5));
        assert_eq!(record.levels, Some(4));
        assert_eq!(record.building_type, "office");
        assert_eq!(record.building_material, "brick");
        assert_eq!(record.street, "High Street");
        assert_eq!(record.roof_shape, "");
        assert!(record.footprint_wkt.starts_with("POLYGON((-1.2577 51.752, "));

        // Representative point lies inside the footprint
        assert!(record.longitude > -1.2577 && record.longitude < -1.2574);
        assert!(record.latitude > 51.7520 && record.latitude < 51.7521);

        // 0.0003 deg lon x 0.0001 deg lat at 51.75 N
        assert_relative_eq!(record.footprint_area, 20.7 * 11.1, max_relative = 0.03);
    }

    #[test]
    fn test_bad_tag_values_become_none() {
        let e = element(1, &[("building", "house"), ("height", "12 m"), ("building:levels", "2.5")]);
        let record = process_osm_building(&e).unwrap();
        assert_eq!(record.building_height, None);
        assert_eq!(record.levels, None);
    }

    #[test]
    fn test_degenerate_geometry_fails() {
        let mut e = element(3, &[("building", "retail")]);
        e.geometry.truncate(2);
        let err = process_osm_building(&e).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_filter_keeps_one_per_street() {
        let mut no_tags = element(5, &[]);
        no_tags.tags = None;

        let elements = vec![
            element(1, &[("building", "office"), ("addr:street", "Broad Street")]),
            element(2, &[("building", "retail"), ("addr:street", "Broad Street")]),
            element(3, &[("building", "house"), ("addr:street", "Cornmarket")]),
            element(4, &[("building", "apartments")]),
            no_tags,
            element(6, &[("building", "apartments"), ("addr:street", "Cornmarket")]),
            element(7, &[("building", "terrace")]),
        ];
        let exclude: HashSet<String> = ["house".to_string()].into_iter().collect();

        let (kept, stats) = filter_buildings_by_street(elements, &exclude);
        let ids: Vec<i64> = kept.iter().map(|e| e.id).collect();

        assert_eq!(ids, vec![1, 4, 6, 7]);
        assert_eq!(stats.total, 7);
        assert_eq!(stats.no_tags, 1);
        assert_eq!(stats.excluded_type, 1);
        assert_eq!(stats.no_street, 2);
        assert_eq!(stats.duplicate_street, 1);
        assert_eq!(stats.kept(), 4);
        assert_eq!(stats.types_before.get("apartments"), Some(&2));
        assert_eq!(stats.types_after.get("retail"), None);
    }

    #[test]
    fn test_collection_drops_failures() {
        let mut broken = element(9, &[("building", "office")]);
        broken.geometry.clear();
        let elements = vec![element(8, &[("building", "office")]), broken];

        let collection = BuildingCollection::process(&elements);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.failed, 1);
        assert_eq!(collection.buildings[0].osm_id, 8);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        let collection =
            BuildingCollection::process(&[element(11, &[("building", "office"), ("height", "9")])]);
        collection.save(&path).unwrap();

        let loaded = BuildingCollection::load(&path).unwrap();
        assert_eq!(loaded.buildings, collection.buildings);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"building_height\": 9.0"));
        assert!(text.contains("\"levels\": null"));
    }

    #[test]
    fn test_to_geojson() {
        let collection = BuildingCollection::process(&[element(12, &[("building", "office")])]);
        match collection.to_geojson().unwrap() {
            GeoJson::FeatureCollection(fc) => {
                assert_eq!(fc.features.len(), 1);
                let props = fc.features[0].properties.as_ref().unwrap();
                assert_eq!(props.get("osm_id"), Some(&serde_json::json!(12)));
            }
            _ => panic!("expected a FeatureCollection"),
        }
    }
}
