//! Runs the requested generators against one spec and collects the
//! annotated results.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::generator::{Category, GenerateError, GenerationResult, TestGenerator};
use crate::llm::client::{CompletionOptions, LlmClient};
use crate::postprocess;
use crate::prompt::TemplateRegistry;
use crate::spec::UnifiedSpec;

/// Results of one run, keyed by category.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub results: BTreeMap<Category, GenerationResult>,
    /// Output file name -> generated source, for non-empty results
    pub files: BTreeMap<String, String>,
    /// Requested test types with no matching generator
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn get(&self, category: Category) -> Option<&GenerationResult> {
        self.results.get(&category)
    }

    pub fn failed(&self) -> impl Iterator<Item = &GenerationResult> {
        self.results
            .values()
            .filter(|r| r.generation_error.is_some())
    }

    fn record(&mut self, result: GenerationResult) {
        if !result.generated_tests.is_empty() {
            self.files
                .insert(result.category.file_name(), result.generated_tests.clone());
        }
        self.results.insert(result.category, result);
    }
}

pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    spec: Arc<UnifiedSpec>,
    options: CompletionOptions,
    output_dir: PathBuf,
    registry: Option<Arc<TemplateRegistry>>,
    template_name: String,
    parallel: bool,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>, spec: UnifiedSpec) -> Self {
        Self {
            client,
            spec: Arc::new(spec),
            options: CompletionOptions::default(),
            output_dir: PathBuf::from("generated_tests"),
            registry: None,
            template_name: "default".to_string(),
            parallel: false,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_registry(mut self, registry: Arc<TemplateRegistry>, template_name: &str) -> Self {
        self.registry = Some(registry);
        self.template_name = template_name.to_string();
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn spec(&self) -> &UnifiedSpec {
        &self.spec
    }

    fn generator(&self, category: Category) -> TestGenerator {
        let generator = TestGenerator::new(category, Arc::clone(&self.client), &self.output_dir);
        match &self.registry {
            Some(registry) => generator.with_registry(registry, &self.template_name),
            None => generator,
        }
    }

    /// Resolve test type tags, warning about and skipping unknown or
    /// repeated ones.
    fn resolve(&self, test_types: &[String], report: &mut RunReport) -> Vec<Category> {
        let mut categories: Vec<Category> = Vec::new();
        for tag in test_types {
            match tag.parse::<Category>() {
                Ok(category) if categories.contains(&category) => {
                    warn!("Test type {} requested more than once. Skipping repeat.", tag);
                }
                Ok(category) => categories.push(category),
                Err(_) => {
                    warn!("No generator found for test type: {}. Skipping.", tag);
                    report.skipped.push(tag.clone());
                }
            }
        }
        categories
    }

    /// Generate and post-process every requested category. A failing
    /// category is recorded with its error; the others still run.
    pub async fn run(&self, test_types: &[String]) -> RunReport {
        let mut report = RunReport::default();
        let categories = self.resolve(test_types, &mut report);

        info!(
            "Generating {} test suite(s) for {} v{} ({} endpoints)",
            categories.len(),
            self.spec.title,
            self.spec.version,
            self.spec.endpoints.len()
        );

        let outcomes = if self.parallel {
            self.generate_parallel(&categories).await
        } else {
            self.generate_sequential(&categories).await
        };

        for (category, outcome) in outcomes {
            let result = self.finish(category, outcome);
            report.record(result);
        }

        info!(
            "Generation finished: {} succeeded, {} failed",
            report.results.len() - report.failed().count(),
            report.failed().count()
        );
        report
    }

    async fn generate_sequential(
        &self,
        categories: &[Category],
    ) -> Vec<(Category, Result<GenerationResult, String>)> {
        let mut outcomes = Vec::with_capacity(categories.len());
        for &category in categories {
            info!("Generating {} tests...", category);
            let outcome = self
                .generator(category)
                .generate(&self.spec, &self.options)
                .await
                .map_err(|e: GenerateError| e.to_string());
            outcomes.push((category, outcome));
        }
        outcomes
    }

    async fn generate_parallel(
        &self,
        categories: &[Category],
    ) -> Vec<(Category, Result<GenerationResult, String>)> {
        let mut handles: Vec<(Category, JoinHandle<Result<GenerationResult, GenerateError>>)> =
            Vec::with_capacity(categories.len());

        for &category in categories {
            info!("Generating {} tests (parallel)...", category);
            let generator = self.generator(category);
            let spec = Arc::clone(&self.spec);
            let options = self.options.clone();
            handles.push((
                category,
                tokio::spawn(async move { generator.generate(&spec, &options).await }),
            ));
        }

        // Awaited in request order so the report does not depend on timing
        let mut outcomes = Vec::with_capacity(handles.len());
        for (category, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("generation task failed: {}", e)),
            };
            outcomes.push((category, outcome));
        }
        outcomes
    }

    fn finish(
        &self,
        category: Category,
        outcome: Result<GenerationResult, String>,
    ) -> GenerationResult {
        match outcome {
            Ok(mut result) => {
                postprocess::annotate(&mut result, &self.spec);
                result
            }
            Err(e) => {
                error!("Failed to generate {} tests: {}", category, e);
                GenerationResult::failed(category, &self.spec, e)
            }
        }
    }
}
