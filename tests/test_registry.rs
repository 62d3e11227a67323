//! Integration tests for the model registry

use surrogate_bench::emulators::{Estimator, SecondOrderPolynomial};
use surrogate_bench::registry::{default_registry, short_name, ModelRegistry};
use surrogate_bench::SurrogateError;

fn names(models: &[Box<dyn Estimator>]) -> Vec<String> {
    models.iter().map(|m| m.name().to_string()).collect()
}

#[test]
fn test_default_subset_is_core_models() {
    let registry = default_registry();
    let first = registry.resolve::<String>(None).unwrap();
    let second = registry.resolve::<String>(None).unwrap();

    assert_eq!(names(&first), names(&second));
    assert_eq!(
        names(&first),
        vec![
            "SecondOrderPolynomial",
            "RandomForest",
            "SupportVectorMachines",
            "GradientBoosting",
            "NeuralNet",
            "GaussianProcess",
        ]
    );
    assert_eq!(registry.is_core("RadialBasisFunctions"), Some(false));
}

#[test]
fn test_short_and_long_names_select_one_estimator() {
    let registry = default_registry();
    let by_short = registry.resolve(Some(&["svm"][..])).unwrap();
    let by_long = registry.resolve(Some(&["SupportVectorMachines"][..])).unwrap();
    let both = registry.resolve(Some(&["svm", "SupportVectorMachines"][..])).unwrap();

    assert_eq!(names(&by_short), vec!["SupportVectorMachines"]);
    assert_eq!(names(&by_long), names(&by_short));
    assert_eq!(both.len(), 1);
}

#[test]
fn test_subset_follows_registry_order() {
    let registry = default_registry();
    let models = registry.resolve(Some(&["gp", "rbf", "sop"][..])).unwrap();
    assert_eq!(
        names(&models),
        vec!["SecondOrderPolynomial", "GaussianProcess", "RadialBasisFunctions"]
    );
}

#[test]
fn test_unknown_name_lists_valid_names() {
    let registry = default_registry();
    let err = registry.resolve(Some(&["kriging"][..])).unwrap_err();
    match &err {
        SurrogateError::UnknownModel {
            name,
            available,
            short_names,
        } => {
            assert_eq!(name, "kriging");
            assert!(available.contains(&"GaussianProcess".to_string()));
            assert!(short_names.contains(&"gp".to_string()));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("kriging"));
}

#[test]
fn test_registering_existing_name_replaces_entry() {
    let mut registry = ModelRegistry::new();
    registry.register("SecondOrderPolynomial", || Box::new(SecondOrderPolynomial::new()), false);
    registry.register(
        "SecondOrderPolynomial",
        || Box::new(SecondOrderPolynomial::new().with_alpha(0.5)),
        true,
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.is_core("SecondOrderPolynomial"), Some(true));
    assert_eq!(registry.core_models().len(), 1);
}

#[test]
fn test_short_name_takes_capitals() {
    assert_eq!(short_name("RandomForest"), "rf");
    assert_eq!(short_name("SecondOrderPolynomial"), "sop");
    assert_eq!(short_name("RadialBasisFunctions"), "rbf");
}
