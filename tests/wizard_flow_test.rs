mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{FixedDevice, QueryContains, TestApp};
use freight_quote::{
    events::WizardEvent,
    models::{LocationStep, TruckType},
    AddressPoint, Confidence, Coordinate, MapMessage, ServiceError, WizardStage,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn full_quote_flow_submits_and_reports_first_quote() {
    let mut app = TestApp::new().await;
    app.mount_routes().await;
    app.mount_quote_api(json!([]), "q-2024-001").await;

    app.controller
        .resolve_address("Calle Principal, San Salvador")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        app.controller.confirm_origin().await.unwrap(),
        WizardStage::Location(LocationStep::Destination)
    );

    app.controller
        .resolve_address("Avenida Independencia")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        app.controller.confirm_destination().await.unwrap(),
        WizardStage::TruckSelection
    );
    let route = app.controller.state().await.route().expect("route estimated");
    assert!(route.distance_km > 0.0);

    app.controller.select_truck(TruckType::Pickup).await.unwrap();
    assert_eq!(
        app.controller.proceed_to_details().await.unwrap(),
        WizardStage::Details
    );
    app.fill_details().await;

    let outcome = app.controller.submit().await.unwrap();
    assert_eq!(outcome.quote.id, "q-2024-001");
    assert!(outcome.first_quote);

    let events = app.drain_events();
    assert!(events.iter().any(|e| matches!(e, WizardEvent::RouteEstimated(_))));
    assert_matches!(
        events.last(),
        Some(WizardEvent::QuoteSubmitted { quote_id, first_quote: true }) if quote_id == "q-2024-001"
    );
}

#[tokio::test]
async fn map_messages_wait_for_ready_and_keep_order() {
    let app = TestApp::new().await;
    app.mount_routes().await;
    app.advance_to_truck_selection().await;
    assert!(app.surface.messages().is_empty());

    app.controller
        .handle_map_message(r#"{"type":"mapReady"}"#)
        .await
        .unwrap();

    let messages = app.surface.messages();
    assert_eq!(messages.len(), 3);
    assert_matches!(
        &messages[0],
        MapMessage::AddMarker { step: LocationStep::Origin, .. }
    );
    assert_matches!(
        &messages[1],
        MapMessage::AddMarker { step: LocationStep::Destination, .. }
    );
    assert_matches!(&messages[2], MapMessage::ShowRoute { .. });
}

#[tokio::test]
async fn map_click_outside_location_stage_changes_nothing() {
    let app = TestApp::new().await;
    app.mount_routes().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"display_name": "x"})))
        .expect(0)
        .mount(&app.geocoder)
        .await;

    app.advance_to_truck_selection().await;
    let before = app.controller.state().await;

    let applied = app
        .controller
        .handle_map_message(r#"{"type":"mapClick","coords":{"latitude":14.0,"longitude":-89.5}}"#)
        .await
        .unwrap();

    assert_eq!(applied, None);
    let after = app.controller.state().await;
    assert_eq!(after.pickup(), before.pickup());
    assert_eq!(after.destination(), before.destination());
}

#[tokio::test]
async fn map_click_fills_active_point_with_reverse_label() {
    let app = TestApp::new().await;
    app.mount_reverse("Plaza Libertad, San Salvador").await;

    let point = app
        .controller
        .handle_map_message(r#"{"type":"mapClick","coords":{"latitude":13.6975,"longitude":-89.1897}}"#)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(point.resolved_label, "Plaza Libertad, San Salvador");
    assert_eq!(point.confidence, Confidence::Resolved);
    assert_eq!(app.controller.state().await.pickup(), &point);
}

#[tokio::test]
async fn malformed_map_message_is_ignored() {
    let app = TestApp::new().await;
    let applied = app.controller.handle_map_message("{not json").await.unwrap();
    assert_eq!(applied, None);
    assert_eq!(
        app.controller.stage().await,
        WizardStage::Location(LocationStep::Origin)
    );
}

#[tokio::test]
async fn superseded_resolution_is_dropped() {
    let app = TestApp::new().await;

    let stale = app
        .controller
        .begin_address_resolution(Some("Calle Arce"))
        .await
        .unwrap();
    let fresh = app
        .controller
        .begin_address_resolution(Some("Calle Arce 1120"))
        .await
        .unwrap();

    let late = AddressPoint::resolved("Calle Arce", "Calle Arce, San Salvador", Coordinate::new(13.70, -89.20));
    assert_eq!(app.controller.complete_resolution(stale, late).await, None);
    assert_eq!(app.controller.state().await.pickup().raw_text, "Calle Arce 1120");

    let current = AddressPoint::resolved(
        "Calle Arce 1120",
        "Calle Arce 1120, San Salvador",
        Coordinate::new(13.701, -89.201),
    );
    assert!(app
        .controller
        .complete_resolution(fresh, current.clone())
        .await
        .is_some());
    assert_eq!(app.controller.state().await.pickup(), &current);
}

#[tokio::test]
async fn failed_lookup_overtaken_by_newer_input_is_not_reported() {
    let app = TestApp::new().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(QueryContains("Lugar Inexistente".to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&app.geocoder)
        .await;
    app.mount_routes().await;

    let (stale, fresh) = tokio::join!(
        app.controller.resolve_address("Lugar Inexistente"),
        app.controller.resolve_address("Calle Principal"),
    );

    assert_matches!(stale, Ok(None));
    let fresh = fresh.unwrap().expect("newest lookup applied");
    assert_eq!(app.controller.state().await.pickup(), &fresh);
    assert_eq!(fresh.raw_text, "Calle Principal");
}

#[tokio::test]
async fn failed_lookup_is_reported_while_current() {
    let app = TestApp::new().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.geocoder)
        .await;

    let err = app
        .controller
        .resolve_address("Lugar Inexistente")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::GeocodingNotFound { .. });
}

#[tokio::test]
async fn destination_marker_cleared_on_back_does_not_reappear_in_route() {
    let app = TestApp::new().await;
    app.mount_routes().await;
    app.controller
        .handle_map_message(r#"{"type":"mapReady"}"#)
        .await
        .unwrap();
    app.controller
        .resolve_address("Calle Principal")
        .await
        .unwrap()
        .unwrap();
    app.controller.confirm_origin().await.unwrap();

    let token = app
        .controller
        .begin_address_resolution(Some("Avenida Independencia"))
        .await
        .unwrap();
    let point = AddressPoint::resolved(
        "Avenida Independencia",
        "Avenida Independencia, San Salvador",
        Coordinate::new(13.7034, -89.1797),
    );
    let (applied, stage) = tokio::join!(
        app.controller.complete_resolution(token, point),
        async {
            while app.controller.confirm_destination().await.is_err() {
                tokio::task::yield_now().await;
            }
            app.controller.back().await
        },
    );
    assert!(applied.is_some());
    assert_eq!(stage, Some(WizardStage::Location(LocationStep::Destination)));

    app.controller.back().await;
    app.controller
        .resolve_address("Calle Principal")
        .await
        .unwrap()
        .unwrap();

    let routes = app
        .surface
        .messages()
        .into_iter()
        .filter(|m| matches!(m, MapMessage::ShowRoute { .. }))
        .count();
    assert_eq!(routes, 1);
}

#[tokio::test]
async fn invalid_details_block_submission_and_keep_state() {
    let app = TestApp::new().await;
    app.mount_routes().await;
    Mock::given(method("POST"))
        .and(path("/quotes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.quotes)
        .await;

    app.advance_to_details().await;
    let before = app.controller.state().await;

    let err = app.controller.submit().await.unwrap_err();
    let ServiceError::Validation(violations) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
    assert_eq!(fields, vec!["cargo_type", "weight", "request_date", "delivery_date"]);
    assert!(err.user_message().contains("Cargo type is required"));
    assert_eq!(app.controller.state().await, before);
}

#[tokio::test]
async fn submit_outside_details_is_rejected() {
    let app = TestApp::new().await;
    assert_matches!(
        app.controller.submit().await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn back_from_truck_selection_clears_destination() {
    let mut app = TestApp::new().await;
    app.mount_routes().await;
    app.advance_to_truck_selection().await;

    assert_eq!(
        app.controller.back().await,
        Some(WizardStage::Location(LocationStep::Destination))
    );
    let state = app.controller.state().await;
    assert!(!state.destination().is_resolved());
    assert!(state.pickup().is_resolved());
    assert!(state.route().is_none());

    assert_eq!(
        app.controller.back().await,
        Some(WizardStage::Location(LocationStep::Origin))
    );
    assert_eq!(app.controller.back().await, None);
    assert_matches!(app.drain_events().last(), Some(WizardEvent::Exited));
}

#[tokio::test]
async fn current_location_fills_point_and_centres_map() {
    let app = TestApp::with_device(FixedDevice(Ok(Coordinate::new(13.6769, -89.2797)))).await;
    app.mount_reverse("Santa Tecla, La Libertad").await;
    app.controller
        .handle_map_message(r#"{"type":"mapReady"}"#)
        .await
        .unwrap();

    let point = app.controller.use_current_location().await.unwrap().unwrap();
    assert_eq!(point.resolved_label, "Santa Tecla, La Libertad");

    let messages = app.surface.messages();
    assert_matches!(messages.last(), Some(MapMessage::UpdateCurrentLocation { coords }) if *coords == Coordinate::new(13.6769, -89.2797));
}

#[tokio::test]
async fn denied_location_permission_leaves_points_untouched() {
    let app = TestApp::with_device(FixedDevice(Err(()))).await;

    let err = app.controller.use_current_location().await.unwrap_err();
    assert_matches!(err, ServiceError::LocationPermissionDenied);
    assert_eq!(app.controller.state().await.pickup(), &AddressPoint::default());
    assert!(app.surface.messages().is_empty());
}
