//! Scenario-tag to entity-constructor registry.

use super::{HarnessError, HarnessResult};
use crate::model::rect::{Rect, RectVariant};
use std::collections::BTreeMap;

type RectConstructor = Box<dyn Fn() -> Rect>;

/// Produces fresh transient rects for each registered variant.
pub struct RectFactoryRegistry {
    constructors: BTreeMap<RectVariant, RectConstructor>,
}

impl RectFactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Creates a registry with a plain constructor for every variant.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for variant in RectVariant::ALL {
            registry.register(variant, move || Rect::new(variant));
        }
        registry
    }

    /// Registers (or replaces) the constructor for `variant`.
    pub fn register(&mut self, variant: RectVariant, constructor: impl Fn() -> Rect + 'static) {
        self.constructors.insert(variant, Box::new(constructor));
    }

    pub fn create(&self, variant: RectVariant) -> HarnessResult<Rect> {
        let constructor = self
            .constructors
            .get(&variant)
            .ok_or(HarnessError::UnregisteredVariant(variant))?;
        Ok(constructor())
    }

    /// Registered variants in stable order.
    pub fn variants(&self) -> Vec<RectVariant> {
        self.constructors.keys().copied().collect()
    }
}

impl Default for RectFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::RectFactoryRegistry;
    use crate::harness::HarnessError;
    use crate::model::rect::RectVariant;

    #[test]
    fn defaults_cover_every_variant() {
        let registry = RectFactoryRegistry::with_defaults();
        assert_eq!(registry.variants(), RectVariant::ALL.to_vec());

        let rect = registry
            .create(RectVariant::TypeConverted)
            .expect("registered variant");
        assert_eq!(rect.variant(), RectVariant::TypeConverted);
        assert!(!rect.is_persistent());
    }

    #[test]
    fn each_create_returns_a_fresh_instance() {
        let registry = RectFactoryRegistry::with_defaults();
        let first = registry.create(RectVariant::FieldConverted).expect("create");
        let second = registry.create(RectVariant::FieldConverted).expect("create");
        assert!(!first.same_instance(&second));
    }

    #[test]
    fn unregistered_variant_is_reported() {
        let registry = RectFactoryRegistry::new();
        let err = match registry.create(RectVariant::FieldConverted) {
            Ok(_) => panic!("empty registry must not create rects"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            HarnessError::UnregisteredVariant(RectVariant::FieldConverted)
        ));
    }
}
