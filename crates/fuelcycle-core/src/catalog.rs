use crate::id::{CommodityId, RecipeId};
use std::collections::HashMap;

/// A tradeable commodity definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommodityDef {
    pub name: String,
    /// Unit label used for generic (bulk) resources of this commodity.
    pub units: String,
}

/// A recipe definition. The composition itself is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDef {
    pub name: String,
}

/// Builder for constructing an immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    commodities: Vec<CommodityDef>,
    commodity_name_to_id: HashMap<String, CommodityId>,
    recipes: Vec<RecipeDef>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a commodity measured in kilograms.
    pub fn register_commodity(&mut self, name: &str) -> Result<CommodityId, CatalogError> {
        self.register_commodity_in(name, "kg")
    }

    /// Register a commodity with an explicit unit label.
    pub fn register_commodity_in(
        &mut self,
        name: &str,
        units: &str,
    ) -> Result<CommodityId, CatalogError> {
        if self.commodity_name_to_id.contains_key(name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let id = CommodityId(self.commodities.len() as u32);
        self.commodities.push(CommodityDef {
            name: name.to_string(),
            units: units.to_string(),
        });
        self.commodity_name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a recipe. Returns its ID.
    pub fn register_recipe(&mut self, name: &str) -> Result<RecipeId, CatalogError> {
        if self.recipe_name_to_id.contains_key(name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(RecipeDef {
            name: name.to_string(),
        });
        self.recipe_name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn commodity_id(&self, name: &str) -> Option<CommodityId> {
        self.commodity_name_to_id.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    /// Freeze the catalog.
    pub fn build(self) -> Catalog {
        Catalog {
            commodities: self.commodities,
            commodity_name_to_id: self.commodity_name_to_id,
            recipes: self.recipes,
            recipe_name_to_id: self.recipe_name_to_id,
        }
    }
}

/// Immutable commodity and recipe catalog, frozen at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    commodities: Vec<CommodityDef>,
    commodity_name_to_id: HashMap<String, CommodityId>,
    recipes: Vec<RecipeDef>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl Catalog {
    pub fn get_commodity(&self, id: CommodityId) -> Option<&CommodityDef> {
        self.commodities.get(id.0 as usize)
    }

    pub fn get_recipe(&self, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes.get(id.0 as usize)
    }

    pub fn commodity_id(&self, name: &str) -> Option<CommodityId> {
        self.commodity_name_to_id.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    /// Resolve a commodity name or fail with [`CatalogError::UnknownCommodity`].
    pub fn require_commodity(&self, name: &str) -> Result<CommodityId, CatalogError> {
        self.commodity_id(name)
            .ok_or_else(|| CatalogError::UnknownCommodity(name.to_string()))
    }

    /// Resolve a recipe name or fail with [`CatalogError::UnknownRecipe`].
    pub fn require_recipe(&self, name: &str) -> Result<RecipeId, CatalogError> {
        self.recipe_id(name)
            .ok_or_else(|| CatalogError::UnknownRecipe(name.to_string()))
    }

    /// Display name of a commodity, or `"?"` for an unknown id.
    pub fn commodity_name(&self, id: CommodityId) -> &str {
        self.get_commodity(id).map(|c| c.name.as_str()).unwrap_or("?")
    }

    /// Unit label of a commodity, defaulting to kilograms.
    pub fn commodity_units(&self, id: CommodityId) -> &str {
        self.get_commodity(id).map(|c| c.units.as_str()).unwrap_or("kg")
    }

    pub fn recipe_name(&self, id: RecipeId) -> &str {
        self.get_recipe(id).map(|r| r.name.as_str()).unwrap_or("?")
    }

    pub fn commodity_count(&self) -> usize {
        self.commodities.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate catalog name: {0}")]
    Duplicate(String),
    #[error("unknown commodity: {0}")]
    UnknownCommodity(String),
    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_builder() -> CatalogBuilder {
        let mut b = CatalogBuilder::new();
        b.register_commodity("fresh_fuel").unwrap();
        b.register_commodity("spent_fuel").unwrap();
        b.register_recipe("uox").unwrap();
        b.register_recipe("spent_uox").unwrap();
        b
    }

    #[test]
    fn register_and_build() {
        let catalog = setup_builder().build();
        assert_eq!(catalog.commodity_count(), 2);
        assert_eq!(catalog.recipe_count(), 2);
    }

    #[test]
    fn lookup_by_name() {
        let catalog = setup_builder().build();
        let fresh = catalog.commodity_id("fresh_fuel").unwrap();
        assert_eq!(catalog.commodity_name(fresh), "fresh_fuel");
        assert_eq!(catalog.commodity_units(fresh), "kg");
        assert!(catalog.commodity_id("nonexistent").is_none());
    }

    #[test]
    fn duplicate_commodity_rejected() {
        let mut b = setup_builder();
        let err = b.register_commodity("fresh_fuel").unwrap_err();
        assert_eq!(err, CatalogError::Duplicate("fresh_fuel".to_string()));
    }

    #[test]
    fn duplicate_recipe_rejected() {
        let mut b = setup_builder();
        assert!(b.register_recipe("uox").is_err());
    }

    #[test]
    fn require_reports_unknown_names() {
        let catalog = setup_builder().build();
        match catalog.require_recipe("mox") {
            Err(CatalogError::UnknownRecipe(name)) => assert_eq!(name, "mox"),
            other => panic!("expected UnknownRecipe, got: {other:?}"),
        }
        let msg = format!("{}", catalog.require_commodity("water").unwrap_err());
        assert!(msg.contains("unknown commodity"), "got: {msg}");
    }

    #[test]
    fn custom_units() {
        let mut b = CatalogBuilder::new();
        let power = b.register_commodity_in("power", "MWh").unwrap();
        let catalog = b.build();
        assert_eq!(catalog.commodity_units(power), "MWh");
    }

    #[test]
    fn unknown_ids_display_placeholder() {
        let catalog = CatalogBuilder::new().build();
        assert_eq!(catalog.commodity_name(CommodityId(9)), "?");
        assert_eq!(catalog.recipe_name(RecipeId(9)), "?");
    }
}
