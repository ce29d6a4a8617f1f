//! # Recipe Index
//!
//! Read-only view of the server's crafting recipes, used to value crafted
//! infrastructure by its ingredients.
//!
//! Recipes form a directed graph: an item feeds every recipe that consumes
//! it, and each recipe produces one output item. The index keeps both
//! directions so the resolver can ask "what produces X" in one lookup, and
//! load-time diagnostics can walk the graph to report cycles.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut index = RecipeIndex::new();
//! index.add_recipe(Recipe::new(
//!     1,
//!     "Hopper".to_string(),
//!     vec![RecipeItem::new(iron_ingot, 5), RecipeItem::new(chest, 1)],
//!     RecipeItem::new(hopper, 1),
//! )?)?;
//!
//! index.validate()?;
//! for recipe in index.recipes_for(&hopper) { /* ... */ }
//! ```

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{MarketError, MarketResult};
use crate::key::{ItemKey, KeyNormalizer};

/// Unique identifier for a recipe.
pub type RecipeId = u32;

/// Ingredient or output of a recipe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipeItem {
    /// The item.
    pub key: ItemKey,
    /// Quantity consumed or produced.
    pub quantity: u32,
}

impl RecipeItem {
    /// Creates a new recipe item.
    #[inline]
    #[must_use]
    pub const fn new(key: ItemKey, quantity: u32) -> Self {
        Self { key, quantity }
    }
}

/// A crafting recipe.
#[derive(Clone, Debug)]
pub struct Recipe {
    /// Unique recipe identifier.
    pub id: RecipeId,
    /// Human-readable name.
    pub name: String,
    /// Items consumed.
    pub ingredients: Vec<RecipeItem>,
    /// Item produced.
    pub output: RecipeItem,
}

impl Recipe {
    /// Creates a new recipe with basic validation.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::EmptyRecipe` if there are no ingredients or any
    /// quantity is zero.
    pub fn new(
        id: RecipeId,
        name: String,
        ingredients: Vec<RecipeItem>,
        output: RecipeItem,
    ) -> MarketResult<Self> {
        if ingredients.is_empty()
            || output.quantity == 0
            || ingredients.iter().any(|item| item.quantity == 0)
        {
            return Err(MarketError::EmptyRecipe(name));
        }
        Ok(Self {
            id,
            name,
            ingredients,
            output,
        })
    }

    /// True if the recipe consumes its own output.
    #[must_use]
    pub fn consumes_own_output(&self) -> bool {
        self.ingredients.iter().any(|item| item.key == self.output.key)
    }
}

#[derive(Deserialize)]
struct RecipeDocument {
    #[serde(default)]
    recipes: Vec<RecipeSpec>,
}

#[derive(Deserialize)]
struct RecipeSpec {
    id: RecipeId,
    #[serde(default)]
    name: Option<String>,
    output: String,
    #[serde(default = "one")]
    output_quantity: u32,
    #[serde(default)]
    ingredients: Vec<IngredientSpec>,
}

#[derive(Deserialize)]
struct IngredientSpec {
    key: String,
    #[serde(default = "one")]
    quantity: u32,
}

const fn one() -> u32 {
    1
}

/// Recipes indexed by id, by output and by ingredient.
#[derive(Debug, Default)]
pub struct RecipeIndex {
    /// All recipes indexed by ID.
    recipes: HashMap<RecipeId, Recipe>,
    /// Output item -> recipes that produce it.
    producers: HashMap<ItemKey, Vec<RecipeId>>,
    /// Ingredient item -> recipes that consume it.
    consumers: HashMap<ItemKey, Vec<RecipeId>>,
}

impl RecipeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a recipe.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::DuplicateRecipe` if the ID is already present.
    pub fn add_recipe(&mut self, recipe: Recipe) -> MarketResult<()> {
        if self.recipes.contains_key(&recipe.id) {
            return Err(MarketError::DuplicateRecipe(recipe.id));
        }

        for ingredient in &recipe.ingredients {
            let consumers = self.consumers.entry(ingredient.key.clone()).or_default();
            if !consumers.contains(&recipe.id) {
                consumers.push(recipe.id);
            }
        }
        self.producers
            .entry(recipe.output.key.clone())
            .or_default()
            .push(recipe.id);

        self.recipes.insert(recipe.id, recipe);
        Ok(())
    }

    /// Parses a `[[recipes]]` TOML document.
    ///
    /// Cycles are reported with a warning but do not fail the load; the
    /// resolver treats a cyclic path as worthless.
    ///
    /// # Errors
    ///
    /// Returns error on malformed TOML, blank keys, empty recipes or
    /// duplicate IDs.
    pub fn from_toml_str(source: &str, normalizer: &dyn KeyNormalizer) -> MarketResult<Self> {
        let document: RecipeDocument = toml::from_str(source)?;
        let mut index = Self::new();

        for spec in document.recipes {
            let name = spec.name.unwrap_or_else(|| spec.output.clone());
            let output = normalize(normalizer, &spec.output, &name)?;
            let ingredients = spec
                .ingredients
                .iter()
                .map(|ingredient| {
                    normalize(normalizer, &ingredient.key, &name)
                        .map(|key| RecipeItem::new(key, ingredient.quantity))
                })
                .collect::<MarketResult<Vec<_>>>()?;
            index.add_recipe(Recipe::new(
                spec.id,
                name,
                ingredients,
                RecipeItem::new(output, spec.output_quantity),
            )?)?;
        }

        for recipe in index.recipes.values().filter(|recipe| recipe.consumes_own_output()) {
            warn!(recipe = %recipe.name, item = %recipe.output.key, "recipe consumes its own output; valued at 0");
        }
        if let Err(err) = index.validate() {
            warn!(error = %err, "recipe index contains a cycle");
        }
        info!(recipes = index.len(), "recipe index loaded");
        Ok(index)
    }

    /// Reads and parses a recipe file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_toml_file(
        path: impl AsRef<Path>,
        normalizer: &dyn KeyNormalizer,
    ) -> MarketResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source, normalizer)
    }

    /// Gets a recipe by ID.
    #[must_use]
    pub fn get(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(&id)
    }

    /// Recipes whose output is `key`.
    pub fn recipes_for<'a>(&'a self, key: &ItemKey) -> impl Iterator<Item = &'a Recipe> + 'a {
        self.producers
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.recipes.get(id))
    }

    /// Number of recipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// True when no recipes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Finds one cycle of recipes, if any.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<RecipeId>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        let mut ids: Vec<RecipeId> = self.recipes.keys().copied().collect();
        ids.sort_unstable();
        for start_id in ids {
            if !visited.contains(&start_id) {
                if let Some(cycle) =
                    self.dfs_find_cycle(start_id, &mut visited, &mut rec_stack, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Like [`find_cycle`](Self::find_cycle) but as an error listing the
    /// output items along the cycle.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::CycleDetected` when a cycle exists.
    pub fn validate(&self) -> MarketResult<()> {
        match self.find_cycle() {
            None => Ok(()),
            Some(cycle) => Err(MarketError::CycleDetected(
                cycle
                    .iter()
                    .filter_map(|id| self.recipes.get(id))
                    .map(|recipe| recipe.output.key.to_string())
                    .collect(),
            )),
        }
    }

    fn dfs_find_cycle(
        &self,
        recipe_id: RecipeId,
        visited: &mut HashSet<RecipeId>,
        rec_stack: &mut HashSet<RecipeId>,
        path: &mut Vec<RecipeId>,
    ) -> Option<Vec<RecipeId>> {
        visited.insert(recipe_id);
        rec_stack.insert(recipe_id);
        path.push(recipe_id);

        if let Some(recipe) = self.recipes.get(&recipe_id) {
            for &consumer_id in self.consumers.get(&recipe.output.key).into_iter().flatten() {
                if consumer_id == recipe_id {
                    continue;
                }
                if !visited.contains(&consumer_id) {
                    if let Some(cycle) = self.dfs_find_cycle(consumer_id, visited, rec_stack, path)
                    {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(&consumer_id) {
                    let start = path.iter().position(|&id| id == consumer_id).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(consumer_id);
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(&recipe_id);
        None
    }
}

fn normalize(normalizer: &dyn KeyNormalizer, raw: &str, recipe: &str) -> MarketResult<ItemKey> {
    normalizer.normalize(raw).ok_or_else(|| MarketError::InvalidEntry {
        key: raw.to_string(),
        reason: format!("blank item key in recipe {recipe}"),
    })
}
