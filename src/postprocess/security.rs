use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// One advisory hit in generated test code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityFinding {
    pub rule: &'static str,
    pub line: usize,
    pub snippet: String,
    pub message: &'static str,
}

struct Rule {
    id: &'static str,
    pattern: Regex,
    // Lines containing this marker are not flagged
    unless: Option<&'static str>,
    message: &'static str,
}

impl Rule {
    fn new(id: &'static str, pattern: &str, message: &'static str) -> Self {
        Self {
            id,
            pattern: Regex::new(pattern).expect("valid regex"),
            unless: None,
            message,
        }
    }

    fn unless(mut self, marker: &'static str) -> Self {
        self.unless = Some(marker);
        self
    }

    fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line) && self.unless.is_none_or(|m| !line.contains(m))
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(
            "eval",
            r"(?:^|[^\w.])eval\s*\(",
            "Usage of eval() detected, which is a potential security risk.",
        ),
        Rule::new(
            "exec",
            r"(?:^|[^\w.])exec\s*\(",
            "Usage of exec() detected, which runs arbitrary code.",
        ),
        Rule::new(
            "dynamic-import",
            r"(?:^|[^\w.])__import__\s*\(",
            "Dynamic __import__() detected.",
        ),
        Rule::new(
            "shell-command",
            r"\bos\.(?:system|popen)\s*\(",
            "Shell command execution via the os module detected.",
        ),
        Rule::new(
            "subprocess-shell",
            r"\bsubprocess\.\w+\s*\(.*\bshell\s*=\s*True",
            "subprocess call with shell=True detected.",
        ),
        Rule::new(
            "pickle",
            r"\bpickle\.loads?\s*\(",
            "Unpickling data can execute arbitrary code.",
        ),
        Rule::new(
            "yaml-load",
            r"\byaml\.load\s*\(",
            "yaml.load() without SafeLoader can construct arbitrary objects.",
        )
        .unless("SafeLoader"),
        Rule::new(
            "tls-verify-disabled",
            r"\bverify\s*=\s*False\b",
            "TLS certificate verification is disabled.",
        ),
    ]
});

/// Scan code line by line against the denylist. Findings are advisory and
/// ordered by line, then by rule.
pub fn scan(code: &str) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            continue;
        }
        for rule in RULES.iter() {
            if rule.matches(line) {
                findings.push(SecurityFinding {
                    rule: rule.id,
                    line: idx + 1,
                    snippet: trimmed.to_string(),
                    message: rule.message,
                });
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_has_no_findings() {
        let code = "import requests\n\ndef test_ok(base_url):\n    assert requests.get(base_url).ok\n";
        assert!(scan(code).is_empty());
    }

    #[test]
    fn test_eval_flagged_with_line() {
        let code = "def test_x():\n    value = eval(\"1 + 1\")\n    assert value == 2\n";
        let findings = scan(code);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "eval");
        assert_eq!(findings[0].line, 2);
        assert_eq!(findings[0].snippet, "value = eval(\"1 + 1\")");
        assert!(findings[0].message.contains("eval()"));
    }

    #[test]
    fn test_method_named_eval_not_flagged() {
        assert!(scan("model.eval()\nliteral_eval(x)\n").is_empty());
    }

    #[test]
    fn test_commented_lines_skipped() {
        assert!(scan("# never use eval(x)\n    # os.system('ls')\n").is_empty());
    }

    #[test]
    fn test_denylist_rules() {
        let cases = [
            ("exec(code)", "exec"),
            ("mod = __import__('os')", "dynamic-import"),
            ("os.system('rm -rf /tmp/x')", "shell-command"),
            ("subprocess.run(cmd, shell=True)", "subprocess-shell"),
            ("obj = pickle.loads(blob)", "pickle"),
            ("data = yaml.load(stream)", "yaml-load"),
            ("requests.get(url, verify=False)", "tls-verify-disabled"),
        ];
        for (line, rule) in cases {
            let findings = scan(line);
            assert_eq!(findings.len(), 1, "line {:?}", line);
            assert_eq!(findings[0].rule, rule);
        }
    }

    #[test]
    fn test_safe_yaml_and_subprocess_not_flagged() {
        let code = "yaml.load(stream, Loader=yaml.SafeLoader)\nsubprocess.run(['ls'])\n";
        assert!(scan(code).is_empty());
    }

    #[test]
    fn test_multiple_findings_ordered_by_line() {
        let findings = scan("x = 1\nrequests.get(u, verify=False)\neval(y)\n");
        let lines: Vec<usize> = findings.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![2, 3]);
    }
}
