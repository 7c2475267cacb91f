//! HTTP-level tests for the two adapters, upstreams played by wiremock.
//!

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetfusion_formats::EventKind;
use fleetfusion_sources::{Auth, Events, FetchError, Fetchable, Records, Site, Tracking};

fn tracking_site(url: &str) -> Site {
    Site::new("fm-track", url).auth(Auth::Key {
        api_key: "k-123".to_string(),
    })
}

fn events_site(url: &str) -> Site {
    Site::new("events", url).auth(Auth::Header {
        name: "x-user-id".to_string(),
        value: "user_1".to_string(),
    })
}

#[tokio::test]
async fn tracking_fetch_ok() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/objects"))
        .and(query_param("api_key", "k-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1273,
                "name": "BV-07-XYZ",
                "latitude": 47.15,
                "longitude": 27.60,
                "speed": 54.0,
                "updated_at": "2025-09-29T07:30:24Z"
            }
        ])))
        .mount(&server)
        .await;

    let mut src = Tracking::new();
    src.load(&tracking_site(&server.uri()));

    let recs = src.fetch().await.unwrap();
    match recs {
        Records::Vehicles(v) => {
            assert_eq!(1, v.len());
            assert_eq!("1273", v[0].id);
        }
        _ => panic!("expected vehicles"),
    }
}

#[tokio::test]
async fn tracking_fetch_honors_route_override() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1273,
                "latitude": 47.15,
                "longitude": 27.60,
                "updated_at": "2025-09-29T07:30:24Z"
            }
        ])))
        .mount(&server)
        .await;

    let site = tracking_site(&server.uri()).add_route("get", "/v2/objects");
    let mut src = Tracking::new();
    src.load(&site);

    let recs = src.fetch().await.unwrap();
    assert!(matches!(recs, Records::Vehicles(v) if v.len() == 1));
}

#[tokio::test]
async fn tracking_fetch_rejected_on_500() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let mut src = Tracking::new();
    src.load(&tracking_site(&server.uri()));

    match src.fetch().await {
        Err(FetchError::Rejected { status, body }) => {
            assert_eq!(500, status);
            assert_eq!("boom", body);
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn tracking_fetch_malformed_on_bad_json() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let mut src = Tracking::new();
    src.load(&tracking_site(&server.uri()));

    assert!(matches!(
        src.fetch().await,
        Err(FetchError::Malformed(_))
    ));
}

#[tokio::test]
async fn tracking_fetch_malformed_on_bad_record() {
    let server = MockServer::start().await;

    // Well-formed JSON, but the record has no position at all
    //
    Mock::given(method("GET"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;

    let mut src = Tracking::new();
    src.load(&tracking_site(&server.uri()));

    assert!(matches!(
        src.fetch().await,
        Err(FetchError::Malformed(_))
    ));
}

#[tokio::test]
async fn tracking_fetch_unreachable() {
    // Nothing listens there
    //
    let mut src = Tracking::new();
    src.load(&tracking_site("http://127.0.0.1:9"));

    assert!(matches!(
        src.fetch().await,
        Err(FetchError::Unreachable(_))
    ));
}

#[tokio::test]
async fn events_fetch_ok_sends_header_and_window() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("x-user-id", "user_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1462,
                "vehicle_id": 1273,
                "event_type": "STOP",
                "event_start": "2025-09-29T07:03:18.000Z",
                "duration_sec": 81
            },
            {
                "id": 16,
                "vehicle_id": 1273,
                "event_type": "REFUEL",
                "event_start": "2025-09-29T07:30:24.000Z",
                "fuel_difference": 31.59
            }
        ])))
        .mount(&server)
        .await;

    let mut src = Events::new();
    src.load(&events_site(&server.uri()));

    let recs = src.fetch().await.unwrap();
    match recs {
        Records::Events(evs) => {
            assert_eq!(2, evs.len());
            assert_eq!(EventKind::Stop, evs[0].kind);
            assert_eq!(EventKind::Refuel, evs[1].kind);
            assert_eq!(Some("1273".to_string()), evs[0].vehicle_id);
        }
        _ => panic!("expected events"),
    }

    // The from/to query params must have been sent (the mock only matched
    // on path & header, check the recorded request).
    //
    let reqs = server.received_requests().await.unwrap();
    let q = reqs[0].url.query().unwrap_or_default();
    assert!(q.contains("from="));
    assert!(q.contains("to="));
}

#[tokio::test]
async fn events_fetch_rejected_on_403() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(403).set_body_string("no such user"))
        .mount(&server)
        .await;

    let mut src = Events::new();
    src.load(&events_site(&server.uri()));

    assert!(matches!(
        src.fetch().await,
        Err(FetchError::Rejected { status: 403, .. })
    ));
}
