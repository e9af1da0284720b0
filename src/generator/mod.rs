//! Per-category test generators.
//!
//! Every category shares one pipeline (compose prompt, call the provider,
//! sanitize, persist); the `Category` tag supplies the bundled prompt, the
//! output file name and the well-formedness predicate.

pub mod sanitizer;

use minijinja::context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::client::{CompletionOptions, LlmClient};
use crate::postprocess::{ComplianceError, SecurityFinding, SyntaxCheckError};
use crate::prompt::{PromptComposer, TemplateError, TemplateRegistry, TemplateVersion};
use crate::spec::UnifiedSpec;

static TEST_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(test_[A-Za-z0-9_]*)\s*\(").expect("valid regex")
});

static HTTP_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(get|post|put|patch|delete)\(").expect("valid regex"));

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("completion provider failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("failed to write '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Kind of test suite being generated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Category {
    #[serde(rename = "functional")]
    Functional,
    #[serde(rename = "security")]
    Security,
    #[serde(rename = "performance")]
    Performance,
    #[serde(rename = "e2e")]
    EndToEnd,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Functional,
        Category::Security,
        Category::Performance,
        Category::EndToEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Functional => "functional",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::EndToEnd => "e2e",
        }
    }

    /// Human wording used inside prompts
    pub fn description(&self) -> &'static str {
        match self {
            Category::Functional => "functional",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::EndToEnd => "end-to-end",
        }
    }

    /// `<category>_tests.py`
    pub fn file_name(&self) -> String {
        format!("{}_tests.py", self.as_str())
    }

    pub fn default_template(&self) -> &'static str {
        match self {
            Category::Functional => FUNCTIONAL_TEMPLATE,
            Category::Security => SECURITY_TEMPLATE,
            Category::Performance => PERFORMANCE_TEMPLATE,
            Category::EndToEnd => E2E_TEMPLATE,
        }
    }

    /// Minimal pass/fail signal for a result, separate from the detailed
    /// post-processing annotations.
    pub fn is_well_formed(&self, result: &GenerationResult) -> bool {
        let code = &result.generated_tests;
        if code.trim().is_empty() || result.test_names().is_empty() {
            return false;
        }

        match self {
            Category::Functional => code.contains("assert"),
            Category::Security => {
                let lower = code.to_lowercase();
                ["401", "403", "auth", "token", "injection"]
                    .iter()
                    .any(|needle| lower.contains(needle))
            }
            Category::Performance => {
                ["perf_counter", "time.", "elapsed", "benchmark", "locust"]
                    .iter()
                    .any(|needle| code.contains(needle))
            }
            Category::EndToEnd => HTTP_CALL.find_iter(code).count() >= 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "functional" => Ok(Category::Functional),
            "security" => Ok(Category::Security),
            "performance" => Ok(Category::Performance),
            "e2e" | "end-to-end" | "end_to_end" => Ok(Category::EndToEnd),
            other => anyhow::bail!("Unknown test category: {}", other),
        }
    }
}

const FUNCTIONAL_TEMPLATE: &str = r#"You are a senior QA engineer. Generate functional tests for the API "{{ spec.title }}" (version {{ spec.version }}) using pytest and requests.

Endpoints:
{{ spec.endpoints | tojson }}

Requirements:
- Write at least one test_* function for EVERY endpoint above and use each endpoint path string literally in the request URL.
- Build URLs from the `base_url` fixture, which is already provided. Do not redefine it.
- Cover success responses, validation errors and not-found cases with real assertions.
- Return only Python code in a single ```python fenced block."#;

const SECURITY_TEMPLATE: &str = r#"You are an application security engineer. Generate security tests for the API "{{ spec.title }}" (version {{ spec.version }}) using pytest and requests.

Endpoints:
{{ spec.endpoints | tojson }}

Requirements:
- For EVERY endpoint above, use the endpoint path string literally and check authentication and authorization (expect 401/403 for missing or invalid credentials).
- Probe injection payloads in parameters and bodies, and assert the API rejects them without a 5xx response.
- Build URLs from the `base_url` fixture, which is already provided. Do not redefine it.
- Never call eval, exec or shell commands in the tests.
- Return only Python code in a single ```python fenced block."#;

const PERFORMANCE_TEMPLATE: &str = r#"You are a performance engineer. Generate performance tests for the API "{{ spec.title }}" (version {{ spec.version }}) using pytest and requests.

Endpoints:
{{ spec.endpoints | tojson }}

Requirements:
- For EVERY endpoint above, use the endpoint path string literally and measure response latency with time.perf_counter().
- Assert each request completes under a reasonable threshold, and add one test issuing repeated requests to estimate throughput.
- Build URLs from the `base_url` fixture, which is already provided. Do not redefine it.
- Return only Python code in a single ```python fenced block."#;

const E2E_TEMPLATE: &str = r#"You are a QA automation engineer. Generate end-to-end tests for the API "{{ spec.title }}" (version {{ spec.version }}) using pytest and requests.

Endpoints:
{{ spec.endpoints | tojson }}

Requirements:
- Chain several requests into realistic user flows (for example create, read, update, delete) and check the state after each step.
- Every endpoint path above must appear literally in at least one flow.
- Build URLs from the `base_url` fixture, which is already provided. Do not redefine it.
- Return only Python code in a single ```python fenced block."#;

/// Short description of the spec a result was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecSummary {
    pub title: String,
    pub version: String,
    pub endpoint_count: usize,
}

impl From<&UnifiedSpec> for SpecSummary {
    fn from(spec: &UnifiedSpec) -> Self {
        Self {
            title: spec.title.clone(),
            version: spec.version.clone(),
            endpoint_count: spec.endpoints.len(),
        }
    }
}

/// Output of one category's generation, plus the annotations attached by
/// post-processing.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub category: Category,
    pub spec_summary: SpecSummary,
    pub generated_tests: String,
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_errors: Option<SyntaxCheckError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_compliance_errors: Option<ComplianceError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_issues: Vec<SecurityFinding>,
}

impl GenerationResult {
    pub fn new(category: Category, spec: &UnifiedSpec, generated_tests: String) -> Self {
        Self {
            category,
            spec_summary: SpecSummary::from(spec),
            generated_tests,
            output_path: None,
            generation_error: None,
            syntax_errors: None,
            spec_compliance_errors: None,
            security_issues: Vec::new(),
        }
    }

    /// A result for a category whose generation aborted.
    pub fn failed(category: Category, spec: &UnifiedSpec, error: String) -> Self {
        let mut result = Self::new(category, spec, String::new());
        result.generation_error = Some(error);
        result
    }

    /// Names of the `test_*` functions in the generated source.
    pub fn test_names(&self) -> Vec<String> {
        TEST_FN
            .captures_iter(&self.generated_tests)
            .map(|c| c[1].to_string())
            .collect()
    }

    pub fn has_annotations(&self) -> bool {
        self.generation_error.is_some()
            || self.syntax_errors.is_some()
            || self.spec_compliance_errors.is_some()
            || !self.security_issues.is_empty()
    }
}

/// Generator for one test category.
pub struct TestGenerator {
    category: Category,
    client: Arc<dyn LlmClient>,
    template: String,
    output_dir: PathBuf,
    composer: PromptComposer,
}

impl TestGenerator {
    pub fn new(category: Category, client: Arc<dyn LlmClient>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            category,
            client,
            template: category.default_template().to_string(),
            output_dir: output_dir.into(),
            composer: PromptComposer::new(),
        }
    }

    pub fn with_template(mut self, template: String) -> Self {
        self.template = template;
        self
    }

    /// Use the latest `<category>/<name>` template from the registry, keeping
    /// the bundled prompt when the registry has no match.
    pub fn with_registry(mut self, registry: &TemplateRegistry, name: &str) -> Self {
        match registry.get(self.category.as_str(), name, TemplateVersion::Latest) {
            Ok(content) => {
                debug!("Using registry template {}/{}", self.category, name);
                self.template = content.to_string();
            }
            Err(e) => debug!("{}; using bundled {} prompt", e, self.category),
        }
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.category.file_name())
    }

    pub fn compose_prompt(&self, spec: &UnifiedSpec) -> Result<String, TemplateError> {
        self.composer.compose(
            &self.template,
            context! {
                spec => spec,
                category => self.category.as_str(),
                kind => self.category.description(),
            },
        )
    }

    pub async fn generate(
        &self,
        spec: &UnifiedSpec,
        options: &CompletionOptions,
    ) -> Result<GenerationResult, GenerateError> {
        let prompt = self.compose_prompt(spec)?;
        debug!("Composed {} prompt ({} bytes)", self.category, prompt.len());

        let raw = self
            .client
            .complete(&prompt, options)
            .await
            .map_err(GenerateError::Provider)?;

        let code = sanitizer::sanitize(&raw);
        if code.is_empty() {
            info!("Model output for {} contained no code", self.category);
        }

        let path = self.output_path();
        persist(&path, &code).await?;
        debug!("Wrote {} bytes to {}", code.len(), path.display());

        let mut result = GenerationResult::new(self.category, spec, code);
        result.output_path = Some(path);
        Ok(result)
    }

    pub fn is_well_formed(&self, result: &GenerationResult) -> bool {
        self.category.is_well_formed(result)
    }
}

async fn persist(path: &Path, content: &str) -> Result<(), GenerateError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| GenerateError::Persist {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|source| GenerateError::Persist {
            path: path.to_path_buf(),
            source,
        })
}
