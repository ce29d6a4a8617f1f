//! # Anti-Arbitrage
//!
//! Crafted infrastructure (hoppers, rails, pistons) must never sell for more
//! than its ingredients are worth, or players could buy raw materials, craft,
//! and sell the product at a profit. The resolver values every recipe that
//! produces the target and caps the candidate price below the best one.
//!
//! Ingredient prices come from the caller, so the same resolver serves both
//! live pricing and speculative previews.

use std::sync::Arc;

use crate::key::ItemKey;
use crate::recipes::{Recipe, RecipeIndex};

/// Share of the best recipe value an infrastructure item may sell for.
pub const CRAFT_VALUE_RATIO: f64 = 0.85;

/// Derives ingredient-value ceilings from the recipe index.
#[derive(Clone, Debug)]
pub struct AntiArbitrageResolver {
    recipes: Arc<RecipeIndex>,
}

impl AntiArbitrageResolver {
    /// Creates a resolver over `recipes`.
    #[must_use]
    pub const fn new(recipes: Arc<RecipeIndex>) -> Self {
        Self { recipes }
    }

    /// The recipe index being walked.
    #[must_use]
    pub fn recipes(&self) -> &RecipeIndex {
        &self.recipes
    }

    /// Value of one recipe: `Σ price × count`.
    ///
    /// Zero when the recipe consumes the target itself or any ingredient is
    /// worthless.
    pub fn recipe_value(
        &self,
        target: &ItemKey,
        recipe: &Recipe,
        price_of: &mut impl FnMut(&ItemKey) -> f64,
    ) -> f64 {
        if recipe.ingredients.iter().any(|item| &item.key == target) {
            return 0.0;
        }
        let mut total = 0.0;
        for ingredient in &recipe.ingredients {
            let price = price_of(&ingredient.key);
            if price.is_nan() || price <= 0.0 {
                return 0.0;
            }
            total += price * f64::from(ingredient.quantity);
        }
        total
    }

    /// Highest recipe value across every recipe producing `target`, or
    /// `None` when no recipe is worth anything.
    pub fn best_recipe_value(
        &self,
        target: &ItemKey,
        price_of: &mut impl FnMut(&ItemKey) -> f64,
    ) -> Option<f64> {
        let mut best: Option<f64> = None;
        for recipe in self.recipes.recipes_for(target) {
            let value = self.recipe_value(target, recipe, &mut *price_of);
            if value > 0.0 {
                best = Some(best.map_or(value, |b| b.max(value)));
            }
        }
        best
    }

    /// Caps `candidate` at `CRAFT_VALUE_RATIO × best_recipe_value`. Never raises it.
    pub fn cap(
        &self,
        target: &ItemKey,
        candidate: f64,
        mut price_of: impl FnMut(&ItemKey) -> f64,
    ) -> f64 {
        match self.best_recipe_value(target, &mut price_of) {
            Some(best) => candidate.min(CRAFT_VALUE_RATIO * best),
            None => candidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::RecipeItem;
    use std::collections::HashMap;

    fn key(raw: &str) -> ItemKey {
        ItemKey::parse(raw).unwrap()
    }

    fn resolver(recipes: Vec<Recipe>) -> AntiArbitrageResolver {
        let mut index = RecipeIndex::new();
        for recipe in recipes {
            index.add_recipe(recipe).unwrap();
        }
        AntiArbitrageResolver::new(Arc::new(index))
    }

    fn recipe(id: u32, output: &str, ingredients: &[(&str, u32)]) -> Recipe {
        Recipe::new(
            id,
            output.to_string(),
            ingredients.iter().map(|(k, q)| RecipeItem::new(key(k), *q)).collect(),
            RecipeItem::new(key(output), 1),
        )
        .unwrap()
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<ItemKey, f64> {
        pairs.iter().map(|(k, p)| (key(k), *p)).collect()
    }

    #[test]
    fn test_caps_at_ratio_of_ingredients() {
        let resolver = resolver(vec![recipe(1, "HOPPER", &[("IRON_INGOT", 5), ("CHEST", 1)])]);
        let table = prices(&[("IRON_INGOT", 10.0), ("CHEST", 20.0)]);
        let capped = resolver.cap(&key("HOPPER"), 500.0, |k| table.get(k).copied().unwrap_or(0.0));
        assert!((capped - 0.85 * 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_raises_price() {
        let resolver = resolver(vec![recipe(1, "HOPPER", &[("IRON_INGOT", 5)])]);
        let table = prices(&[("IRON_INGOT", 100.0)]);
        let capped = resolver.cap(&key("HOPPER"), 12.0, |k| table.get(k).copied().unwrap_or(0.0));
        assert!((capped - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uses_best_recipe() {
        let resolver = resolver(vec![
            recipe(1, "RAIL", &[("IRON_INGOT", 1)]),
            recipe(2, "RAIL", &[("GOLD_INGOT", 1)]),
        ]);
        let table = prices(&[("IRON_INGOT", 10.0), ("GOLD_INGOT", 40.0)]);
        let capped = resolver.cap(&key("RAIL"), 1_000.0, |k| table.get(k).copied().unwrap_or(0.0));
        assert!((capped - 0.85 * 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_worthless_or_self_referencing_recipes_do_not_cap() {
        let resolver = resolver(vec![
            recipe(1, "PISTON", &[("PISTON", 1), ("IRON_INGOT", 1)]),
            recipe(2, "PISTON", &[("IRON_INGOT", 1), ("UNOBTAINIUM", 1)]),
        ]);
        let table = prices(&[("IRON_INGOT", 10.0)]);
        let capped = resolver.cap(&key("PISTON"), 77.0, |k| table.get(k).copied().unwrap_or(0.0));
        assert!((capped - 77.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_recipe_means_no_cap() {
        let resolver = resolver(Vec::new());
        assert!((resolver.cap(&key("HOPPER"), 9.0, |_| 1.0) - 9.0).abs() < f64::EPSILON);
    }
}
