// End-to-end orchestration with scripted completion providers
use aitestgen::generator::Category;
use aitestgen::llm::client::{CompletionOptions, LlmClient, MockLlmClient};
use aitestgen::llm::client_impl::OpenAIClient;
use aitestgen::orchestrator::Orchestrator;
use aitestgen::postprocess::{ComplianceError, SyntaxCheckError};
use aitestgen::prompt::TemplateRegistry;
use aitestgen::spec::UnifiedSpec;
use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Fails security prompts, answers everything else with fixed code.
struct ScriptedClient {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("security tests") {
            anyhow::bail!("OpenAI API error 401 Unauthorized: invalid api key");
        }
        Ok(self.reply.clone())
    }
}

fn users_spec() -> UnifiedSpec {
    UnifiedSpec::new("User API", "1.2.0")
        .with_endpoint("POST", "/login")
        .with_endpoint("POST", "/logout")
        .with_endpoint("GET", "/users/{id}")
}

fn types(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn test_partial_failure_keeps_other_categories() {
    let dir = TempDir::new().unwrap();
    let reply = "```python\ndef test_login(base_url):\n    requests.post(base_url + \"/login\")\n    requests.post(base_url + \"/logout\")\n    requests.get(base_url + \"/users/{id}\")\n    assert True\n```";
    let client = Arc::new(ScriptedClient::new(reply));

    let report = Orchestrator::new(client.clone(), users_spec())
        .with_output_dir(dir.path())
        .run(&types(&["functional", "security", "e2e"]))
        .await;

    assert_eq!(report.results.len(), 3);

    let security = report.get(Category::Security).unwrap();
    let error = security.generation_error.as_deref().unwrap();
    assert!(error.contains("401 Unauthorized"), "{}", error);
    assert!(security.generated_tests.is_empty());
    // Failed categories are not post-processed
    assert!(security.syntax_errors.is_none());
    assert!(security.spec_compliance_errors.is_none());
    assert!(!dir.path().join("security_tests.py").exists());

    for category in [Category::Functional, Category::EndToEnd] {
        let result = report.get(category).unwrap();
        assert!(result.generation_error.is_none());
        assert!(!result.has_annotations(), "{:?}", result);
        assert!(dir.path().join(category.file_name()).is_file());
    }

    assert_eq!(report.failed().count(), 1);
    assert_eq!(
        report.files.keys().cloned().collect::<Vec<_>>(),
        vec!["e2e_tests.py".to_string(), "functional_tests.py".to_string()]
    );
    assert_eq!(client.prompts.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_findings_are_annotations_not_failures() {
    let dir = TempDir::new().unwrap();
    let reply = "Sure!\n```python\ndef test_login(base_url):\n    payload = eval(\"{'user': 'a'}\")\n    assert requests.post(base_url + \"/login\", json=payload, verify=False).ok\n```";
    let client = Arc::new(ScriptedClient::new(reply));

    let report = Orchestrator::new(client, users_spec())
        .with_output_dir(dir.path())
        .run(&types(&["functional"]))
        .await;

    let result = report.get(Category::Functional).unwrap();
    assert!(result.generation_error.is_none());
    assert!(result.syntax_errors.is_none());
    assert!(result.generated_tests.contains("eval("));

    assert_eq!(
        result.spec_compliance_errors,
        Some(ComplianceError::MissingEndpoints {
            missing_paths: vec!["/logout".to_string(), "/users/{id}".to_string()]
        })
    );

    let rules: Vec<&str> = result.security_issues.iter().map(|f| f.rule).collect();
    assert_eq!(rules, vec!["eval", "tls-verify-disabled"]);

    let on_disk = fs::read_to_string(dir.path().join("functional_tests.py")).unwrap();
    assert_eq!(on_disk, result.generated_tests);
}

#[tokio::test]
async fn test_invalid_python_is_flagged() {
    let dir = TempDir::new().unwrap();
    let reply = "```python\ndef test_login(base_url:\n    requests.post(base_url + \"/login\")\n```";
    let client = Arc::new(ScriptedClient::new(reply));

    let report = Orchestrator::new(client, users_spec())
        .with_output_dir(dir.path())
        .run(&types(&["performance"]))
        .await;

    let result = report.get(Category::Performance).unwrap();
    assert!(matches!(
        result.syntax_errors,
        Some(SyntaxCheckError::SyntaxInvalid { .. })
    ));
    assert!(report.files.contains_key("performance_tests.py"));
}

#[tokio::test]
async fn test_empty_reply_annotated() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(ScriptedClient::new("I can't generate tests for this API."));

    let report = Orchestrator::new(client, users_spec())
        .with_output_dir(dir.path())
        .run(&types(&["e2e"]))
        .await;

    // Prose without a fence is treated as code; it is not valid python
    let result = report.get(Category::EndToEnd).unwrap();
    assert!(result.generation_error.is_none());
    assert!(result.syntax_errors.is_some());
}

#[tokio::test]
async fn test_registry_templates_drive_prompts() {
    let templates = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cat_dir = templates.path().join("functional");
    fs::create_dir_all(&cat_dir).unwrap();
    fs::write(cat_dir.join("smoke_v1.jinja"), "v1 {{ spec.title }}").unwrap();
    fs::write(
        cat_dir.join("smoke_v2.jinja"),
        "Write functional tests for {{ spec.title }} covering {% for e in spec.endpoints %}{{ e.method }} {{ e.path }}; {% endfor %}",
    )
    .unwrap();
    let registry = Arc::new(TemplateRegistry::load(templates.path()).unwrap());

    let client = Arc::new(ScriptedClient::new("def test_a():\n    assert True\n"));
    Orchestrator::new(client.clone(), users_spec())
        .with_output_dir(out.path())
        .with_registry(registry, "smoke")
        .run(&types(&["functional", "performance"]))
        .await;

    let prompts = client.prompts.lock().unwrap();
    assert_eq!(
        prompts[0],
        "Write functional tests for User API covering POST /login; POST /logout; GET /users/{id}; "
    );
    // No performance template named "smoke": the bundled prompt is used
    assert!(prompts[1].contains("performance tests"));
}

#[tokio::test]
async fn test_provider_http_error_recorded() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let client =
        OpenAIClient::with_base_url("k".into(), "gpt-4o".to_string(), server.url(), 30).unwrap();
    let dir = TempDir::new().unwrap();

    let report = Orchestrator::new(Arc::new(client), users_spec())
        .with_output_dir(dir.path())
        .with_parallel(true)
        .run(&types(&["functional", "security"]))
        .await;

    assert_eq!(report.failed().count(), 2);
    for result in report.results.values() {
        let error = result.generation_error.as_deref().unwrap();
        assert!(error.contains("500"), "{}", error);
    }
    assert!(report.files.is_empty());
}

#[tokio::test]
async fn test_mock_client_full_run_is_clean() {
    let dir = TempDir::new().unwrap();
    let report = Orchestrator::new(Arc::new(MockLlmClient::new()), users_spec())
        .with_output_dir(dir.path())
        .with_parallel(true)
        .run(&types(&["functional", "security", "performance", "e2e"]))
        .await;

    for result in report.results.values() {
        assert!(!result.has_annotations(), "{:?}", result);
        assert!(result.category.is_well_formed(result));
        assert_eq!(result.spec_summary.endpoint_count, 3);
    }
}
