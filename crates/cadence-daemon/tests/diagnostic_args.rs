use cadence_daemon::diagnostic::task_arguments;

#[test]
fn json_array_becomes_argv() {
    let argv = task_arguments(Some(r#"["-la", "/tmp"]"#), false).unwrap();
    assert_eq!(argv, vec!["-la".to_string(), "/tmp".to_string()]);
}

#[test]
fn scalars_are_stringified() {
    let argv = task_arguments(Some(r#"["-n", 5, true]"#), false).unwrap();
    assert_eq!(argv, vec!["-n", "5", "true"]);
}

#[test]
fn raw_passes_text_through_as_one_argument() {
    let argv = task_arguments(Some("-c 'select 1'"), true).unwrap();
    assert_eq!(argv, vec!["-c 'select 1'"]);
}

#[test]
fn missing_or_blank_means_no_arguments() {
    assert!(task_arguments(None, false).unwrap().is_empty());
    assert!(task_arguments(Some("   "), false).unwrap().is_empty());
}

#[test]
fn non_array_is_rejected() {
    let err = task_arguments(Some("-la"), false).unwrap_err();
    assert!(err.to_string().contains("JSON array"));
    assert!(task_arguments(Some(r#"[["nested"]]"#), false).is_err());
}
