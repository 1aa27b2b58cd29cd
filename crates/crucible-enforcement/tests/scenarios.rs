//! End-to-end checks across loading, evaluation and aggregation

use crucible_enforcement::{summarize, AssertionCatalog, PatternEngine};
use crucible_skills::CascadeRoots;
use crucible_types::{Domain, DomainContext, Severity};
use std::fs;
use tempfile::TempDir;

const NO_EVAL: &str = r#"version: "1.0"
name: python-safety
assertions:
  - id: no-eval
    type: pattern
    pattern: '\beval\s*\('
    message: Avoid eval() on untrusted input
    severity: critical
    languages: [python]
"#;

fn roots(tmp: &TempDir) -> CascadeRoots {
    let roots = CascadeRoots::new(
        tmp.path().join("project"),
        tmp.path().join("user"),
        tmp.path().join("bundled"),
    );
    for (_, root) in roots.iter() {
        fs::create_dir_all(root.join("assertions")).unwrap();
    }
    roots
}

fn engine_for(roots: &CascadeRoots) -> PatternEngine {
    let catalog = AssertionCatalog::load(roots).unwrap();
    assert!(catalog.degraded.is_empty(), "{:?}", catalog.degraded);
    let context = DomainContext::new(Domain::Backend, ["python"]);
    let (engine, degraded) = PatternEngine::new(&catalog.applicable(&context));
    assert!(degraded.is_empty());
    engine
}

#[test]
fn eval_call_is_reported_on_its_line() {
    let tmp = TempDir::new().unwrap();
    let roots = roots(&tmp);
    fs::write(roots.bundled.join("assertions/python.yaml"), NO_EVAL).unwrap();

    let findings = engine_for(&roots).evaluate("x = 1\ny = eval(s)\n", "app.py", "python");

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].location.line, 2);
    assert_eq!(findings[0].severity, Severity::Critical);
    assert!(!findings[0].suppressed);
    assert!(!summarize(&findings, Severity::High).1);
}

#[test]
fn suppressed_eval_passes_threshold() {
    let tmp = TempDir::new().unwrap();
    let roots = roots(&tmp);
    fs::write(roots.bundled.join("assertions/python.yaml"), NO_EVAL).unwrap();

    let findings = engine_for(&roots).evaluate(
        "x = 1\ny = eval(s)  # crucible-ignore\n",
        "app.py",
        "python",
    );

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].location.line, 2);
    assert!(findings[0].suppressed);
    let (summary, pass) = summarize(&findings, Severity::High);
    assert!(pass);
    assert_eq!(summary.suppressed, 1);
}

#[test]
fn project_definition_replaces_bundled_pattern() {
    let tmp = TempDir::new().unwrap();
    let roots = roots(&tmp);
    fs::write(roots.bundled.join("assertions/python.yaml"), NO_EVAL).unwrap();
    fs::write(
        roots.project.join("assertions/python.yaml"),
        "assertions:\n  - id: no-eval\n    pattern: 'exec\\('\n    severity: high\n",
    )
    .unwrap();

    let engine = engine_for(&roots);
    assert_eq!(engine.len(), 1);

    // Bundled pattern would match here; project pattern does not
    assert!(engine.evaluate("y = eval(s)\n", "app.py", "python").is_empty());

    let findings = engine.evaluate("exec(code)\n", "app.py", "python");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::High);
}
