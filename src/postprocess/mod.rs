//! Checks applied to generated tests. Each one annotates a
//! `GenerationResult` and never discards the generated code.

pub mod compliance;
pub mod security;
pub mod syntax;

pub use compliance::ComplianceError;
pub use security::SecurityFinding;
pub use syntax::SyntaxCheckError;

use tracing::{debug, warn};

use crate::generator::GenerationResult;
use crate::spec::UnifiedSpec;

/// Run the syntax, compliance and security checks in that order.
pub fn annotate(result: &mut GenerationResult, spec: &UnifiedSpec) {
    let category = result.category;

    if let Err(e) = syntax::check(&result.generated_tests) {
        warn!("{} tests: {}", category, e);
        result.syntax_errors = Some(e);
    }

    if let Err(e) = compliance::check(result, spec) {
        warn!("{} tests: {}", category, e);
        result.spec_compliance_errors = Some(e);
    }

    let findings = security::scan(&result.generated_tests);
    for finding in &findings {
        warn!(
            "{} tests line {}: {} ({})",
            category, finding.line, finding.message, finding.rule
        );
    }
    result.security_issues = findings;

    debug!("Post-processing finished for {} tests", category);
}
