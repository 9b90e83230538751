//! Service layer sitting between the HTTP routes and the engine.

pub mod health_service;
pub mod storage_supervisor;
pub mod websocket_service;
