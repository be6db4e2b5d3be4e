//! pipevine - Pipeline and trigger definition resolver
//!
//! pipevine turns raw declarative pipeline and trigger definitions into
//! validated, dependency-ordered resource graphs with partially-evaluated
//! attributes. It also provides the parameter validation/coercion system,
//! the retry/backoff policy engine, and the trigger argument resolver used
//! when a trigger fires.
//!
//! ## Example
//!
//! ```yaml
//! name: my_mod
//!
//! pipelines:
//!   - name: fetch_user
//!     params:
//!       - name: city
//!         type: string
//!         default: "New York"
//!     steps:
//!       - kind: http
//!         name: get
//!         url: "https://example.com/${param.city}"
//!         method: get
//!     outputs:
//!       - name: body
//!         value: "${step.http.get.response_body}"
//!
//! triggers:
//!   - kind: schedule
//!     name: nightly
//!     schedule: daily
//!     pipeline: fetch_user
//! ```

pub mod config;
pub mod definition;
pub mod error;
pub mod expr;
pub mod params;
pub mod retry;
pub mod trigger;

pub use error::{Error, Result};
