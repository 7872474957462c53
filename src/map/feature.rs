use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::map_tile::{Coordinate, GeoBounds};

pub type Properties = Map<String, Value>;

/// A GeoJSON `FeatureCollection` as returned by WFS `GetFeature` and WMS
/// `GetFeatureInfo` with a JSON output format.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn first(&self) -> Option<&Feature> {
        self.features.first()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Option<geojson::Geometry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Properties,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Properties>::deserialize(deserializer)?.unwrap_or_default())
}

impl Feature {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property rows in server order, values rendered for display.
    pub fn display_properties(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.clone(), display_value(value)))
            .collect()
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        let geometry = self.geometry.as_ref()?;
        GeoBounds::from_coordinates(positions(&geometry.value))
    }

    pub fn shapes(&self) -> Vec<Shape> {
        let mut shapes = Vec::new();
        if let Some(geometry) = &self.geometry {
            collect_shapes(&geometry.value, &mut shapes);
        }
        shapes
    }
}

/// Drawable pieces of a geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Marker(Coordinate),
    Line(Vec<Coordinate>),
    Ring(Vec<Coordinate>),
}

fn to_coordinate(position: &[f64]) -> Option<Coordinate> {
    match position {
        [longitude, latitude, ..] => Some(Coordinate::new(*latitude, *longitude)),
        _ => None,
    }
}

fn to_coordinates(positions: &[Vec<f64>]) -> Vec<Coordinate> {
    positions.iter().filter_map(|p| to_coordinate(p)).collect()
}

fn collect_shapes(value: &geojson::Value, shapes: &mut Vec<Shape>) {
    use geojson::Value;

    match value {
        Value::Point(point) => shapes.extend(to_coordinate(point).map(Shape::Marker)),
        Value::MultiPoint(points) => shapes.extend(to_coordinates(points).into_iter().map(Shape::Marker)),
        Value::LineString(line) => shapes.push(Shape::Line(to_coordinates(line))),
        Value::MultiLineString(lines) => {
            shapes.extend(lines.iter().map(|line| Shape::Line(to_coordinates(line))))
        }
        Value::Polygon(rings) => shapes.extend(rings.iter().map(|ring| Shape::Ring(to_coordinates(ring)))),
        Value::MultiPolygon(polygons) => shapes.extend(
            polygons
                .iter()
                .flatten()
                .map(|ring| Shape::Ring(to_coordinates(ring))),
        ),
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_shapes(&geometry.value, shapes);
            }
        }
    }
}

fn positions(value: &geojson::Value) -> Vec<Coordinate> {
    let mut shapes = Vec::new();
    collect_shapes(value, &mut shapes);
    shapes
        .into_iter()
        .flat_map(|shape| match shape {
            Shape::Marker(coordinate) => vec![coordinate],
            Shape::Line(coordinates) | Shape::Ring(coordinates) => coordinates,
        })
        .collect()
}

/// Text shown for a property value in the popup and the attribute table.
/// Numbers print the way the server's JSON wrote them, except that integral
/// floats drop their fraction (`12.0` shows as `12`).
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INFO_RESPONSE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "id": "barrios.1",
            "geometry": {"type": "MultiPolygon", "coordinates": [[[[-74.1, 4.6], [-74.0, 4.6], [-74.0, 4.7], [-74.1, 4.6]]]]},
            "properties": {"NOMBRE": "Chapinero", "CODIGO": 2, "AREA": 12.5, "ACTIVO": true}
        }],
        "totalFeatures": "unknown",
        "numberReturned": 1
    }"#;

    #[test]
    fn parses_feature_collection_keeping_property_order() {
        let collection = FeatureCollection::from_slice(INFO_RESPONSE.as_bytes()).unwrap();
        let feature = collection.first().unwrap();

        let keys: Vec<&str> = feature.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, ["NOMBRE", "CODIGO", "AREA", "ACTIVO"]);
        assert_eq!(feature.property("NOMBRE"), Some(&json!("Chapinero")));
    }

    #[test]
    fn missing_features_and_null_properties_are_empty() {
        let collection = FeatureCollection::from_slice(br#"{"type": "FeatureCollection"}"#).unwrap();
        assert!(collection.is_empty());

        let collection =
            FeatureCollection::from_slice(br#"{"features": [{"geometry": null, "properties": null}]}"#).unwrap();
        let feature = collection.first().unwrap();
        assert!(feature.properties.is_empty());
        assert!(feature.bounds().is_none());
    }

    #[test]
    fn bounds_span_every_ring() {
        let collection = FeatureCollection::from_slice(INFO_RESPONSE.as_bytes()).unwrap();
        let bounds = collection.first().unwrap().bounds().unwrap();

        assert_eq!(bounds.west(), -74.1);
        assert_eq!(bounds.east(), -74.0);
        assert_eq!(bounds.south(), 4.6);
        assert_eq!(bounds.north(), 4.7);
    }

    #[test]
    fn points_become_markers() {
        let collection = FeatureCollection::from_slice(
            br#"{"features": [{"geometry": {"type": "Point", "coordinates": [-74.06, 4.66]}, "properties": {}}]}"#,
        )
        .unwrap();

        assert_eq!(
            collection.first().unwrap().shapes(),
            vec![Shape::Marker(Coordinate::new(4.66, -74.06))]
        );
    }

    #[test]
    fn display_value_matches_table_text() {
        assert_eq!(display_value(&json!("Usaquén")), "Usaquén");
        assert_eq!(display_value(&json!(42)), "42");
        assert_eq!(display_value(&json!(-3)), "-3");
        assert_eq!(display_value(&json!(12.5)), "12.5");
        assert_eq!(display_value(&json!(12.0)), "12");
        assert_eq!(display_value(&json!(false)), "false");
        assert_eq!(display_value(&Value::Null), "");
        assert_eq!(display_value(&json!([1, 2])), "[1,2]");
    }
}
