//! Vendor status API response model.
//!
//! The vendor reports one JSON document per poll:
//!
//! ```json
//! {
//!   "response_time": "482ms",
//!   "http_status": 200,
//!   "data": {
//!     "sites": [
//!       {
//!         "site_id": 101, "site_name": "HQ", "company_name": "Acme", "company_id": 7,
//!         "site_status": "Site Healthy",
//!         "circuits": [{ "circuit_name": "wan1", "circuit_status": "Healthy" }]
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! The top-level `response_time` and `http_status` fields are optional.
//! Everything under `data` is required; a missing key there is a schema error
//! and aborts the tick.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Schema errors raised while extracting site records from a poll response.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("response is missing required key `data`")]
    MissingData,
    #[error("malformed site data: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// An identifier the vendor sends either as a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
}

impl IdValue {
    /// Render the identifier as a label value.
    pub fn as_label(&self) -> String {
        match self {
            IdValue::Number(n) => n.to_string(),
            IdValue::Text(s) => s.clone(),
        }
    }
}

/// One site in the poll response. Replaced wholesale every tick.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteRecord {
    pub site_id: IdValue,
    pub site_name: String,
    pub company_name: String,
    pub company_id: IdValue,
    pub site_status: String,
    pub circuits: Vec<CircuitRecord>,
}

/// One circuit under a site.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitRecord {
    pub circuit_name: String,
    pub circuit_status: String,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    sites: Vec<SiteRecord>,
}

/// Extract the site records from a decoded poll response.
pub fn extract_sites(body: &Value) -> Result<Vec<SiteRecord>, SchemaError> {
    let data = body.get("data").ok_or(SchemaError::MissingData)?;
    let envelope: DataEnvelope = serde_json::from_value(data.clone())?;
    Ok(envelope.sites)
}
