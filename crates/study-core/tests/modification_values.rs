use study_core::{
    Equation, Expr, ModValue, Modification, ModificationSet, StudyDescriptor, VariantRecord,
    VariantStatus,
};

#[test]
fn untagged_values_pick_the_right_kind() {
    let number: ModValue = serde_json::from_str("120").expect("number");
    assert_eq!(number, ModValue::Number(120.0));

    let names: ModValue = serde_json::from_str(r#"["na", "k"]"#).expect("names");
    assert_eq!(names, ModValue::Names(vec!["na".into(), "k".into()]));

    let equations: ModValue =
        serde_json::from_str(r#"[{"variable": "v", "rhs": {"param": "I"}}]"#).expect("equations");
    assert_eq!(
        equations,
        ModValue::Equations(vec![Equation::new("v", Expr::param("I"))])
    );
}

#[test]
fn structural_detection_covers_mechanisms_and_equations() {
    let params: ModificationSet = vec![Modification::new("E", "gNa", 100.0)]
        .into_iter()
        .collect();
    assert!(!params.is_structural());

    let mechanisms = params.chain(
        &vec![Modification::new(
            "E",
            "mechanisms",
            ModValue::Names(vec!["iNa".into()]),
        )]
        .into_iter()
        .collect(),
    );
    assert!(mechanisms.is_structural());
    assert_eq!(mechanisms.len(), 2);

    let equations = Modification::new("E", "equations", ModValue::Equations(vec![]));
    assert!(equations.is_structural());
    assert!(!ModValue::Number(f64::NAN).is_finite());
}

#[test]
fn descriptor_marks_failures_and_clears_them() {
    let mut descriptor = StudyDescriptor {
        schema_version: Default::default(),
        study_dir: None,
        plan_hash: "hash".into(),
        base_model: Default::default(),
        solver: Default::default(),
        variants: vec![
            VariantRecord::pending(1, ModificationSet::empty(), "a.json".into()),
            VariantRecord::pending(2, ModificationSet::empty(), "b.json".into()),
        ],
        state: Default::default(),
        created_at: String::new(),
        updated_at: String::new(),
        submission: None,
    };
    assert!(descriptor.mark_failed(2, "boom"));
    assert_eq!(descriptor.ids_with_status(VariantStatus::Failed), vec![2]);
    assert!(descriptor.mark(2, VariantStatus::Finished));
    assert!(descriptor.variant(2).and_then(|v| v.error.clone()).is_none());
    assert!(!descriptor.mark(9, VariantStatus::Started));
}
