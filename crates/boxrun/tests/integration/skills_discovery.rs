use boxrun::skills::{SkillError, discover};

use super::fixture;

#[test]
fn test_discover_fixture_skills() {
    let catalog = discover(&fixture("skills")).expect("Failed to discover skills");

    let names: Vec<&str> = catalog.reports().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["blank", "broken", "math", "text"]);

    let tools: Vec<&str> = catalog.tools().map(|t| t.name.as_str()).collect();
    assert_eq!(tools, vec!["add", "word_count"]);
}

#[test]
fn test_broken_manifest_keeps_docs() {
    let catalog = discover(&fixture("skills")).unwrap();
    let broken = catalog
        .reports()
        .iter()
        .find(|r| r.name == "broken")
        .unwrap();

    assert!(broken.tools.is_empty());
    assert!(broken.docs_loaded);
    assert!(matches!(broken.errors[..], [SkillError::Manifest { .. }]));
}

#[test]
fn test_invalid_tool_name_skips_only_that_tool() {
    let catalog = discover(&fixture("skills")).unwrap();
    let math = catalog.reports().iter().find(|r| r.name == "math").unwrap();

    assert_eq!(math.tools, vec!["add"]);
    assert!(matches!(
        math.errors[..],
        [SkillError::InvalidToolName(ref name)] if name == "Bad-Name"
    ));
}

#[test]
fn test_aggregated_docs() {
    let catalog = discover(&fixture("skills")).unwrap();
    let docs = catalog.docs();

    assert!(docs.starts_with("\n--- SKILL: broken ---\nBroken tools, working docs."));
    assert!(docs.contains("\n\n--- SKILL: text ---\n# Text utilities"));
    assert!(!docs.contains("blank"));
    assert!(!docs.contains("Work in progress"));
    assert!(!docs.ends_with('\n'));
}

#[test]
fn test_tool_metadata() {
    let catalog = discover(&fixture("skills")).unwrap();
    let tool = catalog.tool("word_count").unwrap();

    assert_eq!(tool.skill, "text");
    assert_eq!(tool.description, "Count the words in a text");
    assert!(tool.script_path.ends_with("text/word_count.py"));
    assert!(tool.source.contains("{args}"));
}

#[test]
fn test_render_substitutes_json() {
    let catalog = discover(&fixture("skills")).unwrap();
    let code = catalog
        .tool("add")
        .unwrap()
        .render(&serde_json::json!({"a": 2, "b": 3}))
        .unwrap();

    assert!(code.contains(r#"json.loads('{"a":2,"b":3}')"#));
    assert!(!code.contains("{args}"));
}
