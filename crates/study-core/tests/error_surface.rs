use study_core::errors::{ErrorInfo, StudyError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("variant", "3")
        .with_context("reason", "example")
}

#[test]
fn config_errors_fail_fast() {
    let err = StudyError::Config(sample_info("CF001", "dt must be positive"));
    assert_eq!(err.info().code, "CF001");
    assert!(err.is_fail_fast());
}

#[test]
fn modification_errors_are_per_variant() {
    let err = StudyError::Modification(sample_info("M001", "unknown target"));
    assert!(err.info().context.contains_key("variant"));
    assert!(!err.is_fail_fast());
}

#[test]
fn display_includes_context_and_hint() {
    let err = StudyError::Artifact(
        ErrorInfo::new("A001", "compile failed")
            .with_context("key", "abc")
            .with_hint("check equations"),
    );
    let rendered = err.to_string();
    assert!(rendered.starts_with("artifact error: compile failed (code: A001)"));
    assert!(rendered.contains("key=abc"));
    assert!(rendered.ends_with("hint: check equations"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = StudyError::Execution(ErrorInfo::new("E001", "diverged"));
    let value = serde_json::to_value(&err).expect("json");
    assert_eq!(value["family"], "Execution");
    assert_eq!(value["detail"]["code"], "E001");
}
