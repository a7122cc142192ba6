mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{geocoding_config, resolver_for, QueryContains, RecordingSurface};
use freight_quote::{
    circuit_breaker::CircuitState, config::GeocodingConfig, Confidence, Coordinate, ServiceError,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[tokio::test]
async fn not_found_after_two_full_passes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let resolver = resolver_for(geocoding_config(&server.uri()), Arc::new(RecordingSurface::default()));

    let err = resolver.locate_address("Calle Sin Nombre").await.unwrap_err();

    assert_matches!(err, ServiceError::GeocodingNotFound { ref query } if query == "Calle Sin Nombre");
    assert!(err.user_message().contains("tap the location on the map"));
    // two suffixed variants plus the raw text, twice
    assert_eq!(request_count(&server).await, 6);
}

#[tokio::test]
async fn raw_text_is_tried_after_suffixed_variants() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Metrocentro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"lat": "13.7057", "lon": "-89.2137", "display_name": "Metrocentro, San Salvador"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    let resolver = resolver_for(geocoding_config(&server.uri()), Arc::new(RecordingSurface::default()));

    let point = resolver.locate_address("Metrocentro").await.unwrap();

    assert_eq!(point.coordinate, Some(Coordinate::new(13.7057, -89.2137)));
    assert_eq!(point.confidence, Confidence::Resolved);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn candidate_inside_region_is_preferred() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(QueryContains("Independencia".into()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"lat": "14.0723", "lon": "-87.1921", "display_name": "Independencia, Tegucigalpa, Honduras"},
            {"lat": "13.7034", "lon": "-89.1797", "display_name": "Avenida Independencia, San Salvador, El Salvador"}
        ])))
        .mount(&server)
        .await;
    let resolver = resolver_for(geocoding_config(&server.uri()), Arc::new(RecordingSurface::default()));

    let point = resolver.locate_address("Avenida Independencia").await.unwrap();
    assert_eq!(point.coordinate, Some(Coordinate::new(13.7034, -89.1797)));
}

#[tokio::test]
async fn reverse_falls_back_to_coordinate_label() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let resolver = resolver_for(geocoding_config(&server.uri()), Arc::new(RecordingSurface::default()));

    let label = resolver.reverse_geocode(Coordinate::new(13.794_2, -89.556_4)).await;

    assert_eq!(label, "Ubicación: 13.79420, -89.55640");
    assert_eq!(request_count(&server).await, 4);
}

#[tokio::test]
async fn reverse_uses_coarser_zoom_when_precise_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("zoom", "18"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "Unable to geocode"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("zoom", "16"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"display_name": "Antiguo Cuscatlán"})))
        .mount(&server)
        .await;
    let resolver = resolver_for(geocoding_config(&server.uri()), Arc::new(RecordingSurface::default()));

    let point = resolver.resolve_tapped_point(Coordinate::new(13.66, -89.25)).await;
    assert_eq!(point.resolved_label, "Antiguo Cuscatlán");
    assert_eq!(point.confidence, Confidence::Resolved);
}

#[tokio::test]
async fn open_breaker_short_circuits_lookups() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let config = GeocodingConfig {
        breaker_failure_threshold: 2,
        breaker_reset_secs: 60,
        ..geocoding_config(&server.uri())
    };
    let resolver = resolver_for(config, Arc::new(RecordingSurface::default()));

    let err = resolver.locate_address("Soyapango").await.unwrap_err();
    assert_matches!(err, ServiceError::CircuitBreakerOpen);
    assert_eq!(resolver.breaker().state(), CircuitState::Open);
    assert_eq!(request_count(&server).await, 2);

    // degraded reverse lookups skip the service entirely
    let point = resolver.resolve_tapped_point(Coordinate::new(13.71, -89.14)).await;
    assert_eq!(point.confidence, Confidence::Fallback);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn hung_service_is_bounded_by_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let config = GeocodingConfig {
        timeout_secs: 1,
        max_attempts: 1,
        locality_suffixes: vec![],
        ..geocoding_config(&server.uri())
    };
    let resolver = resolver_for(config, Arc::new(RecordingSurface::default()));

    let started = std::time::Instant::now();
    let err = resolver.locate_address("Ilopango").await.unwrap_err();

    assert_matches!(err, ServiceError::GeocodingNotFound { .. });
    assert!(started.elapsed() < Duration::from_secs(3));
}
