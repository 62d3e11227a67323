//! Model registry
//!
//! Maps display names to constructors for the emulator families. The
//! registry is an ordinary value: build one with [`default_registry`] or
//! [`ModelRegistry::new`] and pass it to the engine.

use crate::emulators::{
    Estimator, GaussianProcess, GradientBoosting, NeuralNet, RadialBasisFunctions, RandomForest,
    SecondOrderPolynomial, SupportVectorMachines,
};
use crate::error::{Result, SurrogateError};
use std::fmt;
use std::sync::Arc;

/// Constructor for a fresh estimator with default hyperparameters
pub type Constructor = Arc<dyn Fn() -> Box<dyn Estimator> + Send + Sync>;

/// Short alias of a model: the lower-cased capitals of its name.
///
/// `RandomForest` becomes `rf`, `SupportVectorMachines` becomes `svm`.
pub fn short_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_uppercase())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Clone)]
struct Entry {
    name: String,
    constructor: Constructor,
    is_core: bool,
}

/// Ordered collection of model families
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<Entry>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, e.is_core)))
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a family; registering an existing name replaces it in place
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F, is_core: bool)
    where
        F: Fn() -> Box<dyn Estimator> + Send + Sync + 'static,
    {
        let entry = Entry {
            name: name.into(),
            constructor: Arc::new(constructor),
            is_core,
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_core(&self, name: &str) -> Option<bool> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.is_core)
    }

    fn unknown(&self, name: &str) -> SurrogateError {
        SurrogateError::UnknownModel {
            name: name.to_string(),
            available: self.entries.iter().map(|e| e.name.clone()).collect(),
            short_names: self.entries.iter().map(|e| short_name(&e.name)).collect(),
        }
    }

    /// Entries selected by a subset of long or short names, in registry order.
    ///
    /// `None` selects the core models. Repeated names select an entry once.
    fn select<S: AsRef<str>>(&self, subset: Option<&[S]>) -> Result<Vec<&Entry>> {
        let Some(subset) = subset else {
            return Ok(self.entries.iter().filter(|e| e.is_core).collect());
        };

        let mut wanted = vec![false; self.entries.len()];
        for name in subset {
            let name = name.as_ref();
            let idx = self
                .entries
                .iter()
                .position(|e| e.name == name || short_name(&e.name) == name)
                .ok_or_else(|| self.unknown(name))?;
            wanted[idx] = true;
        }
        Ok(self
            .entries
            .iter()
            .zip(wanted)
            .filter_map(|(e, w)| w.then_some(e))
            .collect())
    }

    /// `(long, short)` name pairs for a subset, or for the core models
    pub fn model_names<S: AsRef<str>>(&self, subset: Option<&[S]>) -> Result<Vec<(String, String)>> {
        Ok(self
            .select(subset)?
            .into_iter()
            .map(|e| (e.name.clone(), short_name(&e.name)))
            .collect())
    }

    /// Fresh instances of the core models
    pub fn core_models(&self) -> Vec<Box<dyn Estimator>> {
        self.entries
            .iter()
            .filter(|e| e.is_core)
            .map(|e| (e.constructor)())
            .collect()
    }

    /// Fresh instances of every registered model
    pub fn all_models(&self) -> Vec<Box<dyn Estimator>> {
        self.entries.iter().map(|e| (e.constructor)()).collect()
    }

    /// Fresh instances for a subset of long or short names, or the core models for `None`
    pub fn resolve<S: AsRef<str>>(&self, subset: Option<&[S]>) -> Result<Vec<Box<dyn Estimator>>> {
        Ok(self
            .select(subset)?
            .into_iter()
            .map(|e| (e.constructor)())
            .collect())
    }

    /// Listing for display: `(long, short, is_core)`
    pub fn listing(&self) -> Vec<(String, String, bool)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), short_name(&e.name), e.is_core))
            .collect()
    }
}

/// Registry holding the built-in emulator families
pub fn default_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register("SecondOrderPolynomial", || Box::new(SecondOrderPolynomial::new()), true);
    registry.register("RandomForest", || Box::new(RandomForest::new()), true);
    registry.register("SupportVectorMachines", || Box::new(SupportVectorMachines::new()), true);
    registry.register("GradientBoosting", || Box::new(GradientBoosting::new()), true);
    registry.register("NeuralNet", || Box::new(NeuralNet::new()), true);
    registry.register("GaussianProcess", || Box::new(GaussianProcess::new()), true);
    registry.register("RadialBasisFunctions", || Box::new(RadialBasisFunctions::new()), false);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("RandomForest"), "rf");
        assert_eq!(short_name("SupportVectorMachines"), "svm");
        assert_eq!(short_name("GaussianProcess"), "gp");
        assert_eq!(short_name("SecondOrderPolynomial"), "sop");
        assert_eq!(short_name("RadialBasisFunctions"), "rbf");
    }

    #[test]
    fn test_default_registry_names_match_estimators() {
        let registry = default_registry();
        for (name, model) in registry.listing().iter().zip(registry.all_models()) {
            assert_eq!(name.0, model.name());
        }
        assert_eq!(registry.is_core("RadialBasisFunctions"), Some(false));
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = default_registry();
        let before = registry.len();
        registry.register("RandomForest", || Box::new(RandomForest::new().with_n_estimators(5)), false);
        assert_eq!(registry.len(), before);
        assert_eq!(registry.listing()[1].0, "RandomForest");
        assert_eq!(registry.is_core("RandomForest"), Some(false));
    }

    #[test]
    fn test_duplicate_subset_entries_select_once() {
        let registry = default_registry();
        let names = registry.model_names(Some(&["rf", "RandomForest", "gp"])).unwrap();
        assert_eq!(
            names,
            vec![
                ("RandomForest".to_string(), "rf".to_string()),
                ("GaussianProcess".to_string(), "gp".to_string()),
            ]
        );
    }
}
