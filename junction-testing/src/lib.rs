//! Testing utilities for Junction routers.
//!
//! Requests are dispatched in-process through [`Mux::handle`](junction_core::Mux::handle),
//! so tests exercise the full middleware and error-handling path without a
//! transport.
//!
//! ```ignore
//! use junction_testing::*;
//!
//! let client = TestClient::new(Arc::new(mux));
//! let response = client.get("/users/1").await;
//! assert_status(&response, 200);
//! assert_json(&response, &json!({"id": "1"}));
//! ```

pub mod assertions;
pub mod test_client;

pub use assertions::*;
pub use test_client::*;
