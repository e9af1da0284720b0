use serde::Serialize;
use thiserror::Error;

use crate::generator::GenerationResult;
use crate::spec::UnifiedSpec;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComplianceError {
    #[error("generated tests are empty")]
    EmptyTestSuite,

    #[error("tests do not reference the following endpoints: {}", missing_paths.join(", "))]
    MissingEndpoints { missing_paths: Vec<String> },
}

/// Every endpoint path of the spec must appear verbatim in the generated
/// source. Missing paths are reported in spec order without duplicates.
pub fn check(result: &GenerationResult, spec: &UnifiedSpec) -> Result<(), ComplianceError> {
    let code = &result.generated_tests;
    if code.trim().is_empty() {
        return Err(ComplianceError::EmptyTestSuite);
    }

    let mut missing_paths: Vec<String> = Vec::new();
    for endpoint in &spec.endpoints {
        if !code.contains(endpoint.path.as_str()) && !missing_paths.contains(&endpoint.path) {
            missing_paths.push(endpoint.path.clone());
        }
    }

    if missing_paths.is_empty() {
        Ok(())
    } else {
        Err(ComplianceError::MissingEndpoints { missing_paths })
    }
}
