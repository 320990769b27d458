//! List response formatting
//!
//! Lists are wrapped in a `ResultSet` envelope, rendered as JSON (default)
//! or XML. Station lists may also be requested as GeoJSON.

use crate::db::stations::StationRecord;
use crate::{ApiError, ApiResult};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quick_xml::escape::escape;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    Json,
    Xml,
    GeoJson,
}

impl ListFormat {
    /// Parse the `format` query parameter
    pub fn parse(value: Option<&str>, allow_geojson: bool) -> ApiResult<Self> {
        match value.map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("json") => Ok(ListFormat::Json),
            Some("xml") => Ok(ListFormat::Xml),
            Some("geojson") if allow_geojson => Ok(ListFormat::GeoJson),
            Some(other) => {
                let supported = if allow_geojson { "json, xml, geojson" } else { "json, xml" };
                Err(ApiError::BadRequest(format!(
                    "'{}' is an unsupported format. Supported formats: {}",
                    other, supported
                )))
            }
        }
    }
}

/// Render `items` as a `ResultSet` in JSON or XML
pub fn result_set<T: Serialize>(items: &[T], format: ListFormat) -> ApiResult<Response> {
    let values = items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::Internal(format!("Failed to serialize results: {}", e)))?;

    match format {
        ListFormat::Xml => Ok(xml_response(to_xml(&values))),
        _ => Ok(Json(json!({
            "ResultSet": {
                "totalResultsAvailable": values.len(),
                "totalResultsReturned": values.len(),
                "firstResultPosition": 0,
                "Result": values,
            }
        }))
        .into_response()),
    }
}

/// GeoJSON `FeatureCollection` of the stations with known coordinates
pub fn station_features(stations: &[StationRecord]) -> Response {
    let features: Vec<Value> = stations
        .iter()
        .filter_map(|s| {
            let c = s.coordinates()?;
            Some(json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [c.longitude, c.latitude],
                },
                "properties": {
                    "network": s.network,
                    "station": s.station,
                    "elevation_in_m": c.elevation_in_m,
                    "local_depth_in_m": c.local_depth_in_m,
                },
            }))
        })
        .collect();

    (
        [(header::CONTENT_TYPE, "application/geo+json")],
        Json(json!({ "type": "FeatureCollection", "features": features })),
    )
        .into_response()
}

pub fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], body).into_response()
}

fn to_xml(values: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<ResultSet totalResultsAvailable=\"{n}\" totalResultsReturned=\"{n}\" firstResultPosition=\"0\">",
        n = values.len()
    ));
    for value in values {
        out.push_str("<Item>");
        match value {
            Value::Object(map) => {
                for (key, field) in map {
                    push_element(&mut out, key, field);
                }
            }
            other => out.push_str(&scalar_text(other)),
        }
        out.push_str("</Item>");
    }
    out.push_str("</ResultSet>");
    out
}

fn push_element(out: &mut String, key: &str, value: &Value) {
    match value {
        Value::Null => out.push_str(&format!("<{}/>", key)),
        Value::Object(map) => {
            out.push_str(&format!("<{}>", key));
            for (k, v) in map {
                push_element(out, k, v);
            }
            out.push_str(&format!("</{}>", key));
        }
        Value::Array(items) => {
            out.push_str(&format!("<{}>", key));
            for item in items {
                push_element(out, "Item", item);
            }
            out.push_str(&format!("</{}>", key));
        }
        scalar => out.push_str(&format!("<{k}>{}</{k}>", scalar_text(scalar), k = key)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => escape(s.as_str()).into_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[derive(Serialize)]
    struct Row {
        network: String,
        latitude: Option<f64>,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { network: "GR".to_string(), latitude: Some(48.8) },
            Row { network: "A&B".to_string(), latitude: None },
        ]
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(ListFormat::parse(None, false).unwrap(), ListFormat::Json);
        assert_eq!(ListFormat::parse(Some("XML"), false).unwrap(), ListFormat::Xml);
        assert_eq!(ListFormat::parse(Some("geojson"), true).unwrap(), ListFormat::GeoJson);
        assert!(ListFormat::parse(Some("geojson"), false).is_err());
        assert!(ListFormat::parse(Some("csv"), true).is_err());
    }

    #[test]
    fn test_xml_escapes_and_nulls() {
        let values: Vec<Value> = rows().iter().map(|r| serde_json::to_value(r).unwrap()).collect();
        let xml = to_xml(&values);
        assert!(xml.contains("totalResultsAvailable=\"2\""));
        assert!(xml.contains("<Item><network>GR</network><latitude>48.8</latitude></Item>"));
        assert!(xml.contains("<network>A&amp;B</network><latitude/>"));
    }

    #[tokio::test]
    async fn test_geojson_skips_stations_without_coordinates() {
        let station = |id: i64, latitude: Option<f64>| StationRecord {
            id,
            network: "BW".to_string(),
            station: format!("S{}", id),
            latitude,
            longitude: Some(11.3),
            elevation_in_m: Some(560.0),
            local_depth_in_m: Some(0.0),
        };
        let response = station_features(&[station(1, Some(48.1)), station(2, None)]);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["coordinates"][0], 11.3);
        assert_eq!(features[0]["properties"]["station"], "S1");
    }

    #[tokio::test]
    async fn test_json_envelope() {
        let response = result_set(&rows(), ListFormat::Json).unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["ResultSet"]["totalResultsReturned"], 2);
        assert_eq!(value["ResultSet"]["Result"][0]["network"], "GR");
        assert!(value["ResultSet"]["Result"][1]["latitude"].is_null());
    }
}
