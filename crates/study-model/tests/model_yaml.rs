use study_core::{Expr, ModelModifier, ModelNormalizer, Modification, ModificationSet};
use study_model::{from_yaml_slice, stable_hash_string, StandardModeler};

const MODEL: &str = r#"
name: hh
state_variables:
  - name: v
    initial: -65.0
    equation:
      sum:
        - param: I
        - neg:
            product:
              - param: gL
              - sub: [{ state: v }, { param: EL }]
parameters:
  I: 10.0
  gL: 0.3
  EL: -54.4
components:
  E:
    parameters:
      gNa: 120.0
    mechanisms: [iNa]
mechanisms:
  iNa:
    equations:
      - variable: v
        rhs:
          neg:
            product:
              - param: gNa
              - const: 0.001
monitors:
  - name: drive
    expr: { param: I }
"#;

#[test]
fn yaml_model_normalizes_and_modifies() {
    let raw = from_yaml_slice(MODEL.as_bytes()).expect("parse");
    let model = StandardModeler.normalize(&raw).expect("normalize");
    assert_eq!(model.state_names(), vec!["v"]);
    assert_eq!(model.output_labels(), vec!["time", "v", "drive"]);
    assert!(matches!(model.monitors[0].expr, Expr::Param(_)));

    let set: ModificationSet = vec![Modification::new("E", "gNa", 100.0)]
        .into_iter()
        .collect();
    let derived = StandardModeler.apply(&model, &set).expect("apply");
    assert_eq!(derived.components["E"].parameters["gNa"], 100.0);
    assert_ne!(
        stable_hash_string(&model).expect("hash"),
        stable_hash_string(&derived).expect("hash")
    );
    assert!(StandardModeler.check_target(&model, "E", "mechanisms").is_ok());
    assert!(StandardModeler.check_target(&model, "", "mechanisms").is_err());
    assert!(StandardModeler.check_target(&model, "", "v.noise").is_ok());
}
