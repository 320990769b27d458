//! Integration tests for the station information endpoints

mod helpers;

use axum::http::StatusCode;
use ebd_server::db::{filepaths, stations};
use helpers::{files_below, fixtures, row_counts, TestServer};

#[tokio::test]
async fn test_resp_upload() {
    let server = TestServer::new().await;

    let response = server.post("/station", fixtures::RESP_PFVI).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
    let json = response.json();
    assert_eq!(json["channels"].as_array().unwrap().len(), 1);
    assert_eq!(json["channels"][0]["format"], "RESP");

    assert_eq!(row_counts(&server.pool).await, (1, 1, 1, 0));

    let station = stations::get_station(&server.pool, "PM", "PFVI").await.unwrap().unwrap();
    assert_eq!(station.coordinates(), None);
    assert_eq!(station.latitude, None);

    let stored = server.station_root().join("PM").join("PM.PFVI..BHZ-2007_1");
    assert_eq!(std::fs::read(&stored).unwrap(), fixtures::RESP_PFVI.as_bytes());

    let file_id = json["filepath_id"].as_i64().unwrap();
    let record = filepaths::get_filepath(&server.pool, file_id).await.unwrap().unwrap();
    assert!(record.is_managed);
    assert_eq!(record.filepath, stored);
}

#[tokio::test]
async fn test_xseed_upload_with_three_channels() {
    let server = TestServer::new().await;

    let xseed = fixtures::xseed_gec2(&["HHE", "HHN", "HHZ"]);
    let response = server.post("/station", xseed.clone()).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());

    assert_eq!(row_counts(&server.pool).await, (1, 3, 3, 0));
    let station = stations::get_station(&server.pool, "GR", "GEC2").await.unwrap().unwrap();
    assert_eq!(station.latitude, Some(48.845085));
    assert_eq!(station.longitude, Some(13.701584));
    assert_eq!(station.elevation_in_m, Some(1132.5));
    assert_eq!(station.local_depth_in_m, Some(0.0));

    // Named after the first channel
    let stored = server.station_root().join("GR").join("GR.GEC2..HHE-2002_8");
    assert!(stored.is_file());

    let response = server.get("/station/GR.GEC2").await;
    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    let result = json["ResultSet"]["Result"].as_array().unwrap();
    assert_eq!(result.len(), 3);
    assert!(result.iter().all(|epoch| epoch["format"] == "XSEED"));
    assert_eq!(result[2]["channel"], "HHZ");
}

#[tokio::test]
async fn test_duplicate_checksum_is_rejected() {
    let server = TestServer::new().await;

    assert_eq!(server.post("/station", fixtures::RESP_PFVI).await.status, StatusCode::CREATED);
    let response = server.post("/station", fixtures::RESP_PFVI).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["error"]["code"], "DUPLICATE_OBJECT");

    // Same bytes under another name on disk
    let copy = server.dir.path().join("renamed.resp");
    std::fs::write(&copy, fixtures::RESP_PFVI).unwrap();
    let response = server
        .post(&format!("/station?index_file={}", copy.display()), Vec::new())
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    assert_eq!(row_counts(&server.pool).await, (1, 1, 1, 0));
    assert_eq!(files_below(server.station_root()).len(), 1);
}

#[tokio::test]
async fn test_coordinates_survive_upload_without_coordinates() {
    let server = TestServer::new().await;

    let xseed = fixtures::xseed_gec2(&["HHZ"]);
    assert_eq!(server.post("/station", xseed).await.status, StatusCode::CREATED);
    assert_eq!(server.post("/station", fixtures::RESP_GEC2).await.status, StatusCode::CREATED);

    let station = stations::get_station(&server.pool, "GR", "GEC2").await.unwrap().unwrap();
    assert_eq!(station.latitude, Some(48.845085));
    assert_eq!(station.elevation_in_m, Some(1132.5));
    assert_eq!(stations::count_channels(&server.pool).await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_upload_leaves_nothing_behind() {
    let server = TestServer::new().await;

    // The second epoch repeats the first one exactly
    let xseed = fixtures::xseed_gec2(&["HHZ", "HHZ"]);
    let response = server.post("/station", xseed).await;
    assert_eq!(response.status, StatusCode::CONFLICT, "{}", response.text());
    let message = response.json()["error"]["message"].as_str().unwrap().to_string();
    assert!(message.ends_with(" - Rolling back all changes."), "{}", message);

    assert_eq!(row_counts(&server.pool).await, (0, 0, 0, 0));
    assert!(stations::list_stations(&server.pool, None, None).await.unwrap().is_empty());
    assert!(files_below(server.station_root()).is_empty());
}

#[tokio::test]
async fn test_path_codes_stay_inside_station_root() {
    let server = TestServer::new().await;

    let resp = fixtures::RESP_PFVI.replace("Network:     PM", "Network:     ../../../escaped");
    let response = server.post("/station", resp).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());

    let stored = server.station_root().join("XX").join("XX.PFVI..BHZ-2007_1");
    assert_eq!(response.json()["filepath"], &*stored.to_string_lossy());
    assert_eq!(files_below(server.station_root()), vec![stored]);
}

#[tokio::test]
async fn test_index_file_in_place() {
    let server = TestServer::new().await;

    let outside = server.dir.path().join("outside").join("PFVI.resp");
    std::fs::create_dir_all(outside.parent().unwrap()).unwrap();
    std::fs::write(&outside, fixtures::RESP_PFVI).unwrap();

    let response = server
        .post(&format!("/station?index_file={}", outside.display()), Vec::new())
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());

    let file_id = response.json()["filepath_id"].as_i64().unwrap();
    let record = filepaths::get_filepath(&server.pool, file_id).await.unwrap().unwrap();
    assert_eq!(record.filepath, outside);
    assert!(!record.is_managed);
    assert!(files_below(server.station_root()).is_empty());
}

#[tokio::test]
async fn test_index_file_must_exist() {
    let server = TestServer::new().await;
    let missing = server.dir.path().join("missing.resp");
    let response = server
        .post(&format!("/station?index_file={}", missing.display()), Vec::new())
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(row_counts(&server.pool).await, (0, 0, 0, 0));
}

#[tokio::test]
async fn test_unreadable_station_file() {
    let server = TestServer::new().await;
    let response = server.post("/station", "this is not station information").await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["error"]["code"], "INVALID_OBJECT");
    assert!(files_below(server.station_root()).is_empty());
}

#[tokio::test]
async fn test_station_list_formats() {
    let server = TestServer::new().await;
    server.post("/station", fixtures::RESP_PFVI).await;
    server.post("/station", fixtures::xseed_gec2(&["HHZ"])).await;

    let json = server.get("/station").await.json();
    assert_eq!(json["ResultSet"]["totalResultsReturned"], 2);
    assert_eq!(json["ResultSet"]["Result"][0]["network"], "GR");

    let filtered = server.get("/station?network=PM").await.json();
    assert_eq!(filtered["ResultSet"]["totalResultsReturned"], 1);
    assert_eq!(filtered["ResultSet"]["Result"][0]["station"], "PFVI");

    let xml = server.get("/station?format=xml").await;
    assert_eq!(xml.status, StatusCode::OK);
    assert!(xml.header("content-type").unwrap().starts_with("application/xml"));
    assert!(xml.text().contains("<station>PFVI</station>"));

    // Only GEC2 has coordinates
    let geojson = server.get("/station?format=geojson").await.json();
    assert_eq!(geojson["type"], "FeatureCollection");
    assert_eq!(geojson["features"].as_array().unwrap().len(), 1);
    assert_eq!(geojson["features"][0]["properties"]["station"], "GEC2");

    assert_eq!(server.get("/station?format=csv").await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_station_lookup_errors() {
    let server = TestServer::new().await;
    server.post("/station", fixtures::RESP_PFVI).await;

    assert_eq!(server.get("/station/PFVI").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(server.get("/station/PM.PFVI.00").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(server.get("/station/PM.NONE").await.status, StatusCode::NOT_FOUND);

    let json = server.get("/station/PM.PFVI").await.json();
    assert_eq!(json["ResultSet"]["Result"][0]["format"], "RESP");
    assert!(json["ResultSet"]["Result"][0]["endtime"].is_null());
}
