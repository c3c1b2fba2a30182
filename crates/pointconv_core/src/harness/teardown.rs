//! Entity variants whose instances are deleted after a scenario.

use crate::model::rect::RectVariant;
use std::collections::BTreeSet;

/// Variants accumulated by `set_up` until the next teardown clears them.
#[derive(Debug, Clone, Default)]
pub struct TeardownRegistry {
    variants: BTreeSet<RectVariant>,
}

impl TeardownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, variant: RectVariant) {
        self.variants.insert(variant);
    }

    pub fn variants(&self) -> Vec<RectVariant> {
        self.variants.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn clear(&mut self) {
        self.variants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::TeardownRegistry;
    use crate::model::rect::RectVariant;

    #[test]
    fn registering_twice_keeps_one_entry() {
        let mut registry = TeardownRegistry::new();
        registry.register(RectVariant::TypeConverted);
        registry.register(RectVariant::TypeConverted);
        registry.register(RectVariant::FieldConverted);

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.variants(),
            vec![RectVariant::FieldConverted, RectVariant::TypeConverted]
        );

        registry.clear();
        assert!(registry.is_empty());
    }
}
