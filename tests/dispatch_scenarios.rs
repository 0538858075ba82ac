mod common;

use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{test_state, wait_for_enrichment, FailingDirections, FakeBackend, FixedDirections};
use field_dispatch::clients::map_display::MapDisplayCommand;
use field_dispatch::dto::hub_dto::HubEvent;
use field_dispatch::models::{
    AcceptanceConfirmation, BranchId, EngineerId, EngineerStatus, RequestStatus, RouteStatus, CALCULATING,
};
use field_dispatch::utils::errors::AppError;

#[tokio::test]
async fn test_request_match_accept_and_enrich() {
    let backend = Arc::new(FakeBackend::scenario());
    let state = test_state(backend.clone(), Arc::new(FixedDirections::new(3200.0, 480.0)));
    let dispatch = state.dispatch.clone();
    dispatch.refresh_roster().await.unwrap();

    let request = dispatch.request_service(&BranchId::new("B1")).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_radius_km, 5.0);
    assert_eq!(request.branch_name, "Ermita");

    let (_, candidates) = dispatch.candidates_for(&request.request_id).await.unwrap();
    let ids: Vec<&str> = candidates.iter().map(|c| c.fe_id.as_str()).collect();
    assert_eq!(ids, vec!["E1"]);

    let outcome = dispatch
        .accept_request(&request.request_id, &EngineerId::new("E1"))
        .await
        .unwrap();
    assert!(outcome.newly_accepted);
    assert_eq!(outcome.request.status, RequestStatus::Accepted);
    assert_eq!(outcome.request.confirmation, Some(AcceptanceConfirmation::Confirmed));

    let route = outcome.route.unwrap();
    assert_eq!(route.enrichment.distance_text, CALCULATING);
    assert_eq!(route.branch_id, BranchId::new("B1"));

    let store = dispatch.store();
    assert!(wait_for_enrichment(&store, route.route_id).await);

    let store = store.read().await;
    let enriched = store.route(route.route_id).unwrap();
    assert_eq!(enriched.enrichment.distance_text, "3.2 km");
    assert_eq!(enriched.enrichment.duration_text, "8 min");
    assert_eq!(enriched.enrichment.fare_text, "₱93");
    assert_eq!(
        store.engineer(&EngineerId::new("E1")).unwrap().status,
        EngineerStatus::OnAssignment
    );

    let accepted = backend.accepted.lock().unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].1.route_id, route.route_id);
}

#[tokio::test]
async fn test_duplicate_new_service_request_events() {
    let backend = Arc::new(FakeBackend::scenario());
    let state = test_state(backend, Arc::new(FixedDirections::new(1000.0, 60.0)));
    let dispatch = state.dispatch.clone();
    dispatch.refresh_roster().await.unwrap();

    let payload = json!({"ServiceRequestId": "R77", "BranchId": "B1", "Status": "Pending"});
    for _ in 0..2 {
        let event = HubEvent::decode("newServiceRequest", payload.clone()).unwrap();
        dispatch.handle_event(event).await;
    }

    let snapshot = dispatch.snapshot().await;
    assert_eq!(snapshot.service_requests.len(), 1);
    assert_eq!(snapshot.service_requests[0].request_id.as_str(), "R77");
}

#[tokio::test]
async fn test_repeated_accept_creates_one_route() {
    let backend = Arc::new(FakeBackend::scenario());
    let state = test_state(backend.clone(), Arc::new(FixedDirections::new(1000.0, 60.0)));
    let dispatch = state.dispatch.clone();
    dispatch.refresh_roster().await.unwrap();
    let request = dispatch.request_service(&BranchId::new("B1")).await.unwrap();

    let first = dispatch.accept_request(&request.request_id, &EngineerId::new("E1")).await.unwrap();
    let second = dispatch.accept_request(&request.request_id, &EngineerId::new("E1")).await.unwrap();

    assert!(first.newly_accepted);
    assert!(!second.newly_accepted);
    assert_eq!(second.request.status, RequestStatus::Accepted);
    assert_eq!(dispatch.snapshot().await.routes.len(), 1);
    assert_eq!(backend.accept_calls(), 1);
}

#[tokio::test]
async fn test_backend_failure_marks_acceptance_failed_and_retry_confirms() {
    let backend = Arc::new(FakeBackend::scenario());
    backend.fail_accept.store(true, Ordering::SeqCst);
    let state = test_state(backend.clone(), Arc::new(FixedDirections::new(1000.0, 60.0)));
    let dispatch = state.dispatch.clone();
    dispatch.refresh_roster().await.unwrap();
    let request = dispatch.request_service(&BranchId::new("B1")).await.unwrap();

    let result = dispatch.accept_request(&request.request_id, &EngineerId::new("E1")).await;
    assert!(matches!(result, Err(AppError::ExternalApi(_))));

    // Sin rollback: la aceptación local se mantiene, marcada como fallida
    let snapshot = dispatch.snapshot().await;
    assert_eq!(snapshot.service_requests[0].status, RequestStatus::Accepted);
    assert_eq!(snapshot.service_requests[0].confirmation, Some(AcceptanceConfirmation::Failed));
    assert_eq!(snapshot.routes.len(), 1);

    backend.fail_accept.store(false, Ordering::SeqCst);
    let retried = dispatch.accept_request(&request.request_id, &EngineerId::new("E1")).await.unwrap();

    assert_eq!(retried.request.confirmation, Some(AcceptanceConfirmation::Confirmed));
    assert_eq!(backend.accept_calls(), 2);
    assert_eq!(dispatch.snapshot().await.routes.len(), 1);
}

#[tokio::test]
async fn test_directions_failure_keeps_sentinels() {
    let backend = Arc::new(FakeBackend::scenario());
    let state = test_state(backend, Arc::new(FailingDirections));
    let dispatch = state.dispatch.clone();
    dispatch.refresh_roster().await.unwrap();
    let request = dispatch.request_service(&BranchId::new("B1")).await.unwrap();

    let outcome = dispatch.accept_request(&request.request_id, &EngineerId::new("E1")).await.unwrap();
    let route_id = outcome.route.unwrap().route_id;

    let store = dispatch.store();
    assert!(!wait_for_enrichment(&store, route_id).await);

    let store = store.read().await;
    let route = store.route(route_id).unwrap();
    assert_eq!(route.enrichment.distance_text, CALCULATING);
    assert_eq!(route.enrichment.duration_text, CALCULATING);
    assert_eq!(route.enrichment.fare_text, CALCULATING);
    assert_eq!(route.enrichment.estimated_arrival_text, CALCULATING);
}

#[tokio::test]
async fn test_selected_route_is_painted_and_cleared() {
    let backend = Arc::new(FakeBackend::scenario());
    let state = test_state(backend, Arc::new(FixedDirections::new(3200.0, 480.0)));
    let dispatch = state.dispatch.clone();
    let mut commands = state.map_display.subscribe();
    dispatch.refresh_roster().await.unwrap();
    let request = dispatch.request_service(&BranchId::new("B1")).await.unwrap();
    let outcome = dispatch.accept_request(&request.request_id, &EngineerId::new("E1")).await.unwrap();
    let route_id = outcome.route.unwrap().route_id;
    assert!(wait_for_enrichment(&dispatch.store(), route_id).await);

    dispatch.select_route_for_display(route_id).await.unwrap();
    match tokio::time::timeout(Duration::from_secs(1), commands.recv()).await {
        Ok(Ok(MapDisplayCommand::ShowRoute(overlay))) => {
            assert_eq!(overlay.route_id, route_id);
            assert!(overlay.paint_style.line_dasharray.is_none());
        }
        other => panic!("expected ShowRoute, got {:?}", other),
    }

    let delayed = HubEvent::decode("routeUpdate", json!({"routeId": route_id.0, "status": "Delayed"})).unwrap();
    dispatch.handle_event(delayed).await;
    let mut saw_dashed = false;
    while let Ok(Ok(command)) = tokio::time::timeout(Duration::from_millis(200), commands.recv()).await {
        if let MapDisplayCommand::ShowRoute(overlay) = command {
            if overlay.paint_style.line_dasharray.is_some() {
                saw_dashed = true;
                break;
            }
        }
    }
    assert!(saw_dashed);
    assert_eq!(
        dispatch.store().read().await.route(route_id).unwrap().status,
        RouteStatus::Delayed
    );

    let completed = HubEvent::decode("routeCompleted", json!({"RouteId": route_id.0})).unwrap();
    dispatch.handle_event(completed).await;
    let mut saw_clear = false;
    while let Ok(Ok(command)) = tokio::time::timeout(Duration::from_millis(200), commands.recv()).await {
        if command == MapDisplayCommand::ClearRoute {
            saw_clear = true;
            break;
        }
    }
    assert!(saw_clear);

    let snapshot = dispatch.snapshot().await;
    assert!(snapshot.routes.is_empty());
    assert_eq!(snapshot.selected_route_id, None);
}

#[tokio::test]
async fn test_hub_disconnect_keeps_roster() {
    let backend = Arc::new(FakeBackend::scenario());
    let state = test_state(backend, Arc::new(FixedDirections::new(1000.0, 60.0)));
    let dispatch = state.dispatch.clone();
    dispatch.refresh_roster().await.unwrap();

    dispatch.handle_event(HubEvent::Connected).await;
    assert!(dispatch.is_hub_connected().await);

    dispatch.handle_event(HubEvent::Disconnected).await;
    let snapshot = dispatch.snapshot().await;
    assert!(!snapshot.hub_connected);
    assert_eq!(snapshot.engineers.len(), 2);
    assert_eq!(snapshot.branches.len(), 1);
}
