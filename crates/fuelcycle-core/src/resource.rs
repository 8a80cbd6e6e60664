//! Quantified resources: the units that buffers hold and agents trade.
//!
//! Every resource is divisible. [`Resource::extract`] splits a quantity off a
//! unit, leaving the remainder in place, which is what lets a buffer satisfy
//! a withdrawal that falls inside a single unit.

use crate::fixed::{Fixed64, Quantity};
use crate::id::{CommodityId, RecipeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Behaviour shared by every resource kind.
pub trait Resource: Clone + fmt::Debug {
    /// Short label for the resource kind, used in diagnostics.
    const KIND: &'static str;

    fn quantity(&self) -> Quantity;

    /// Split `amount` off this unit and return it. The caller guarantees
    /// `0 < amount < self.quantity()`.
    fn extract(&mut self, amount: Quantity) -> Self;
}

/// A quantity of material with a given composition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Material {
    pub recipe: RecipeId,
    pub quantity: Quantity,
}

impl Material {
    pub fn new(recipe: RecipeId, quantity: Quantity) -> Self {
        Self { recipe, quantity }
    }

    /// The same mass with a different composition.
    pub fn transmute(self, recipe: RecipeId) -> Self {
        Self { recipe, ..self }
    }
}

impl Resource for Material {
    const KIND: &'static str = "material";

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn extract(&mut self, amount: Quantity) -> Self {
        self.quantity -= amount;
        Self {
            recipe: self.recipe,
            quantity: amount,
        }
    }
}

/// A bulk quantity of a commodity with no tracked composition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenericResource {
    pub commodity: CommodityId,
    pub units: String,
    pub quantity: Quantity,
}

impl GenericResource {
    pub fn new(commodity: CommodityId, units: &str, quantity: Quantity) -> Self {
        Self {
            commodity,
            units: units.to_string(),
            quantity,
        }
    }
}

impl Resource for GenericResource {
    const KIND: &'static str = "generic";

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn extract(&mut self, amount: Quantity) -> Self {
        self.quantity -= amount;
        Self {
            commodity: self.commodity,
            units: self.units.clone(),
            quantity: amount,
        }
    }
}

/// Material physically moved from a supplier to a requester.
pub type Manifest = Vec<Material>;

/// Total quantity of a sequence of resources.
pub fn total_quantity<'a, R: Resource + 'a>(resources: impl IntoIterator<Item = &'a R>) -> Quantity {
    resources
        .into_iter()
        .fold(Fixed64::ZERO, |acc, r| acc + r.quantity())
}
