//! opslog-server — HTTP surface for the unified action logging core.
//!
//! Routes:
//!   POST /v1/actions                       — write an action (admission middleware applied)
//!   GET  /v1/actions/recent                — recent log items
//!   GET  /v1/actions/session/:session_id   — log items for a session
//!   POST /v1/reconcile                     — on-demand reconciliation
//!   GET  /health                           — liveness
//!   GET  /ready                             — readiness

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod reconcile_loop;
pub mod router;
pub mod state;
