//! Network probes against monitored endpoints.

pub mod http;

pub use http::{health_url, HttpProbeResult, HttpProber};
