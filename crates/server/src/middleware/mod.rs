//! HTTP middleware stack for the order API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Request ID (recorded on the request span)
//! 4. CORS (any origin, GET only)

pub mod request_id;

pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
