//! External service integrations

pub mod enrichment;
pub mod forecast;

pub use enrichment::{
    build_prompt, parse_enrichment, strip_decorative, BackendStatus, EnrichmentBackend,
    EnrichmentRequest, OllamaClient,
};
pub use forecast::{ForecastSource, HttpForecastClient};
