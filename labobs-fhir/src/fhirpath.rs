//! FHIRPath evaluation over raw `$lookup` answers.
//!
//! The engine is async; a current-thread runtime owned by the query drives it
//! so callers stay synchronous.

use octofhir_fhirpath::{
    create_engine_with_empty_provider, Collection, EvaluationContext, FhirPathEngine,
    FhirPathValue,
};
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

/// `display` parts of any `property` parameter, evaluated against `Parameters`.
pub const PROPERTY_DISPLAY: &str =
    "parameter.where(name='property').part.where(name='display').valueString";

#[derive(Debug, thiserror::Error)]
pub enum FhirPathError {
    #[error("cannot start FHIRPath runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("cannot create FHIRPath engine: {0}")]
    Engine(String),
    #[error("cannot evaluate `{expression}`: {message}")]
    Evaluation { expression: String, message: String },
}

/// One compiled-in expression bound to its own engine.
pub struct FhirPathQuery {
    runtime: Runtime,
    engine: FhirPathEngine,
    expression: &'static str,
}

impl FhirPathQuery {
    pub fn new(expression: &'static str) -> Result<Self, FhirPathError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let engine = runtime
            .block_on(create_engine_with_empty_provider())
            .map_err(|err| FhirPathError::Engine(err.to_string()))?;
        Ok(Self {
            runtime,
            engine,
            expression,
        })
    }

    pub fn expression(&self) -> &str {
        self.expression
    }

    /// String results in document order; other result types are skipped.
    pub fn strings(&self, resource: &Value) -> Result<Vec<String>, FhirPathError> {
        let input = Collection::single(FhirPathValue::resource(resource.clone()));
        let context =
            EvaluationContext::new(input, self.engine.get_model_provider(), None, None, None);
        let result = self
            .runtime
            .block_on(self.engine.evaluate(self.expression, &context))
            .map_err(|err| FhirPathError::Evaluation {
                expression: self.expression.to_string(),
                message: err.to_string(),
            })?;

        Ok(result
            .value
            .iter()
            .filter_map(|item| match item {
                FhirPathValue::String(text, ..) => Some(text.to_string()),
                _ => None,
            })
            .collect())
    }
}
