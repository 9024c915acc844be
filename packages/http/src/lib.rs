//! # opbridge-http
//!
//! The host-side network surface of opbridge.
//!
//! Host code talks to "the network" through an [`HttpExecutor`]. The
//! production executor ([`ReqwestExecutor`]) really goes over the wire;
//! the bridge crate installs its own executor in front of it to answer
//! API calls in-process.
//!
//! ```ignore
//! use opbridge_http::{HttpExecutor, HttpRequest, ReqwestExecutor};
//!
//! let executor = ReqwestExecutor::with_default_timeout()?
//!     .with_base_url("http://localhost:8000")?;
//!
//! let response = executor
//!     .execute(HttpRequest::get("/health").with_header("Accept", "application/json"))
//!     .await?;
//! assert!(response.is_success());
//! ```

pub mod error;
pub mod executor;
pub mod types;

pub use error::Error;
pub use executor::{HttpExecutor, ReqwestExecutor};
pub use types::{status_text, HttpRequest, HttpResponse, Method, RequestBody};
