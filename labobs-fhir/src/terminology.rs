//! Concept display resolution via `CodeSystem/$lookup`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fhirpath::{FhirPathQuery, PROPERTY_DISPLAY};

/// Public Ontoserver R4 endpoint.
pub const DEFAULT_TERMINOLOGY_SERVER: &str = "https://r4.ontoserver.csiro.au/fhir";

/// Per-request timeout for lookups.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, thiserror::Error)]
pub enum TerminologyError {
    #[error("terminology request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("terminology server answered HTTP {status}")]
    Status { status: u16 },
    #[error("terminology response is not JSON: {0}")]
    Decode(String),
}

/// Transport for the `$lookup` operation.
pub trait ConceptLookup {
    /// The raw `Parameters` answer, or `None` when the server does not know the concept.
    fn lookup(&self, system: &str, code: &str) -> Result<Option<Value>, TerminologyError>;
}

/// Blocking HTTP lookup against a FHIR terminology server.
#[derive(Debug, Clone)]
pub struct HttpConceptLookup {
    client: Client,
    base_url: String,
}

impl HttpConceptLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TerminologyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn lookup_url(&self) -> String {
        format!("{}/CodeSystem/$lookup", self.base_url)
    }
}

impl ConceptLookup for HttpConceptLookup {
    fn lookup(&self, system: &str, code: &str) -> Result<Option<Value>, TerminologyError> {
        debug!(system, code, "looking up concept");

        let response = self
            .client
            .get(self.lookup_url())
            .query(&[("system", system), ("code", code)])
            .header(ACCEPT, FHIR_JSON)
            .send()?;

        let status = response.status();
        if status.is_client_error() {
            warn!(system, code, status = status.as_u16(), "concept not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TerminologyError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<Value>()
            .map_err(|err| TerminologyError::Decode(err.to_string()))?;
        Ok(Some(body))
    }
}

/// Lookup that never reaches a server; every concept is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLookup;

impl ConceptLookup for OfflineLookup {
    fn lookup(&self, _system: &str, _code: &str) -> Result<Option<Value>, TerminologyError> {
        Ok(None)
    }
}

impl<L: ConceptLookup + ?Sized> ConceptLookup for &L {
    fn lookup(&self, system: &str, code: &str) -> Result<Option<Value>, TerminologyError> {
        (**self).lookup(system, code)
    }
}

impl<L: ConceptLookup + ?Sized> ConceptLookup for Box<L> {
    fn lookup(&self, system: &str, code: &str) -> Result<Option<Value>, TerminologyError> {
        (**self).lookup(system, code)
    }
}

type CacheKey = (String, String);

/// Resolves `(code, system)` to a display label, memoized for the life of the process.
///
/// Only answers are cached; a failed lookup is retried the next time the
/// same concept shows up.
pub struct ConceptDisplayResolver<L> {
    lookup: L,
    /// Built on first use; `None` when the engine could not start.
    fallback: OnceLock<Option<FhirPathQuery>>,
    cache: Mutex<HashMap<CacheKey, Option<String>>>,
}

impl<L: ConceptLookup> ConceptDisplayResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            fallback: OnceLock::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, code: &str, system: &str) -> Result<Option<String>, TerminologyError> {
        let key = (system.to_string(), code.to_string());
        if let Some(display) = self.cache().get(&key) {
            return Ok(display.clone());
        }

        let display = match self.lookup.lookup(system, code)? {
            Some(response) => self.extract(&response),
            None => None,
        };
        if display.is_none() {
            warn!(system, code, "no display found for concept");
        }

        self.cache().insert(key, display.clone());
        Ok(display)
    }

    /// Number of distinct concepts answered so far.
    pub fn cached_concepts(&self) -> usize {
        self.cache().len()
    }

    fn extract(&self, response: &Value) -> Option<String> {
        preferred_display(response).or_else(|| self.fallback_display(response))
    }

    fn fallback_display(&self, response: &Value) -> Option<String> {
        let query = self
            .fallback
            .get_or_init(|| match FhirPathQuery::new(PROPERTY_DISPLAY) {
                Ok(query) => Some(query),
                Err(err) => {
                    warn!(error = %err, "display fallback unavailable");
                    None
                }
            })
            .as_ref()?;

        match query.strings(response) {
            Ok(found) => {
                debug!(query = query.expression(), matches = found.len(), "display fallback");
                found.into_iter().next()
            }
            Err(err) => {
                warn!(error = %err, "display fallback failed");
                None
            }
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<CacheKey, Option<String>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Primary extraction: a top-level `display` parameter, or the `display` part
/// of a `property` parameter flagged `preferred`. First match wins.
pub fn preferred_display(response: &Value) -> Option<String> {
    let parameters = response.get("parameter")?.as_array()?;

    for parameter in parameters {
        match parameter.get("name").and_then(Value::as_str) {
            Some("display") => {
                if let Some(display) = parameter.get("valueString").and_then(Value::as_str) {
                    return Some(display.to_string());
                }
            }
            Some("property") => {
                let Some(parts) = parameter.get("part").and_then(Value::as_array) else {
                    continue;
                };
                let preferred = parts.iter().any(|part| {
                    part_named(part, "preferred")
                        && part.get("valueBoolean").and_then(Value::as_bool) == Some(true)
                });
                if !preferred {
                    continue;
                }
                if let Some(display) = parts
                    .iter()
                    .find(|part| part_named(part, "display"))
                    .and_then(|part| part.get("valueString"))
                    .and_then(Value::as_str)
                {
                    return Some(display.to_string());
                }
            }
            _ => {}
        }
    }

    None
}

fn part_named(part: &Value, name: &str) -> bool {
    part.get("name").and_then(Value::as_str) == Some(name)
}
