/// Background loop closing rooms abandoned by their host.
pub mod cleanup;
/// OpenAPI documentation generation.
pub mod documentation;
/// Room broadcast helpers.
pub mod events;
/// Health check service.
pub mod health_service;
/// Reconnection snapshots for hosts and players.
pub mod hydration;
/// Room lifecycle operations and the timeout finalizer.
pub mod room_service;
/// Points awarded for closed questions.
pub mod scoring;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Background loop finalizing overdue questions.
pub mod watchdog;
/// WebSocket connection and message handling service.
pub mod websocket_service;
