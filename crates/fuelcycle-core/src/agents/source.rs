//! Unlimited supplier of one commodity, throttled per step.

use crate::agent::{AgentContext, Communicator, Model, TimeAgent};
use crate::catalog::Catalog;
use crate::config::{ConfigError, ModelConfig, SourceConfig};
use crate::error::{FacilityError, SimError};
use crate::fixed::{Fixed64, Quantity, exceeds, is_positive};
use crate::id::{CommodityId, RecipeId};
use crate::message::{Message, Payload, ProtocolError, Transaction};
use crate::resource::Material;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SourceFacility {
    commodity: CommodityId,
    recipe: RecipeId,
    /// Offered and shippable per step.
    capacity: Quantity,
    orders: VecDeque<Message>,
    shipped_total: Quantity,
}

impl SourceFacility {
    pub fn new(commodity: CommodityId, recipe: RecipeId, capacity: Quantity) -> Self {
        Self {
            commodity,
            recipe,
            capacity,
            orders: VecDeque::new(),
            shipped_total: Fixed64::ZERO,
        }
    }

    pub fn from_config(config: &SourceConfig, catalog: &Catalog) -> Result<Self, ConfigError> {
        Ok(Self::new(
            catalog.require_commodity(&config.commodity)?,
            catalog.require_recipe(&config.recipe)?,
            crate::config::quantity("Source", "capacity", config.capacity)?,
        ))
    }

    pub fn construct(config: &ModelConfig, catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        match config {
            ModelConfig::Source(cfg) => Ok(Box::new(Self::from_config(cfg, catalog)?)),
            other => Err(ConfigError::WrongModelType {
                expected: "Source",
                found: other.model_type(),
            }),
        }
    }

    pub fn commodity(&self) -> CommodityId {
        self.commodity
    }

    pub fn capacity(&self) -> Quantity {
        self.capacity
    }

    pub fn shipped_total(&self) -> Quantity {
        self.shipped_total
    }

    pub fn pending_orders(&self) -> usize {
        self.orders.len()
    }
}

impl TimeAgent for SourceFacility {
    fn tick(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        if is_positive(self.capacity) {
            let offer = Material::new(self.recipe, self.capacity);
            ctx.issue(Transaction::offer(self.commodity, Payload::Material(offer)))?;
        }
        Ok(())
    }

    /// Ship filed orders, newest first, within this step's capacity.
    fn tock(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let mut available = self.capacity;
        while let Some(msg) = self.orders.pop_front() {
            let requester = msg.requester().ok_or_else(|| ProtocolError::ProtocolViolation {
                agent: ctx.id,
                message: msg.id(),
                reason: "order names no requester".to_string(),
            })?;
            let trans = msg.into_transaction();
            let ordered = trans.quantity();
            if exceeds(ordered, available) {
                return Err(FacilityError::OverCommitted { ordered, available }.into());
            }
            self.shipped_total = self.shipped_total.checked_add(ordered).ok_or(
                FacilityError::TotalOverflow {
                    total: self.shipped_total,
                    added: ordered,
                },
            )?;
            available = (available - ordered).max(Fixed64::ZERO);
            let manifest = vec![Material::new(self.recipe, ordered)];
            ctx.ship(requester, trans, manifest);
        }
        Ok(())
    }
}

impl Communicator for SourceFacility {
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        if msg.trans().commodity != self.commodity {
            return Err(ProtocolError::ProtocolViolation {
                agent: ctx.id,
                message: msg.id(),
                reason: format!(
                    "order for {} at a source of {}",
                    ctx.catalog.commodity_name(msg.trans().commodity),
                    ctx.catalog.commodity_name(self.commodity),
                ),
            }
            .into());
        }
        ctx.accept_order(&msg)?;
        self.orders.push_front(msg);
        Ok(())
    }
}

impl Model for SourceFacility {
    fn model_type(&self) -> &'static str {
        "Source"
    }

    fn copy_fresh(&self) -> Box<dyn Model> {
        Box::new(Self::new(self.commodity, self.recipe, self.capacity))
    }

    fn summary(&self, catalog: &Catalog) -> String {
        format!(
            "Source of {} ({}): capacity {} per step, shipped {}",
            catalog.commodity_name(self.commodity),
            catalog.recipe_name(self.recipe),
            self.capacity,
            self.shipped_total,
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Order;
    use crate::test_utils::{Harness, fixed};

    fn order(h: &Harness, supplier: crate::id::AgentId, qty: f64) -> Message {
        Message::order(Order {
            market: h.fresh_market,
            supplier,
            requester: h.reactor,
            transaction: Transaction::request(
                h.ids.fresh,
                Payload::Material(Material::new(h.ids.uox, fixed(qty))),
            ),
        })
    }

    #[test]
    fn offers_capacity_each_tick() {
        let mut h = Harness::new();
        let id = h.agent_id();
        let mut src = SourceFacility::new(h.ids.fresh, h.ids.uox, fixed(50.0));
        src.tick(&mut h.ctx(id)).unwrap();
        let (dest, msg) = h.world.post.pop().unwrap();
        assert_eq!(dest, h.fresh_market);
        assert!(msg.trans().is_offer());
        assert_eq!(msg.trans().quantity(), fixed(50.0));
    }

    #[test]
    fn ships_orders_in_tock() {
        let mut h = Harness::new();
        let id = h.agent_id();
        let mut src = SourceFacility::new(h.ids.fresh, h.ids.uox, fixed(50.0));
        let o = order(&h, id, 30.0);
        src.receive_message(o, &mut h.ctx(id)).unwrap();
        src.tock(&mut h.ctx(id)).unwrap();
        assert_eq!(h.world.shipments.len(), 1);
        assert_eq!(h.world.shipments[0].to, h.reactor);
        assert_eq!(h.world.shipments[0].manifest[0].recipe, h.ids.uox);
        assert_eq!(src.shipped_total(), fixed(30.0));
    }

    #[test]
    fn orders_beyond_capacity_are_fatal() {
        let mut h = Harness::new();
        let id = h.agent_id();
        let mut src = SourceFacility::new(h.ids.fresh, h.ids.uox, fixed(50.0));
        for qty in [30.0, 30.0] {
            let o = order(&h, id, qty);
            src.receive_message(o, &mut h.ctx(id)).unwrap();
        }
        let err = src.tock(&mut h.ctx(id)).unwrap_err();
        assert!(matches!(
            err,
            SimError::Facility(FacilityError::OverCommitted { .. })
        ));
    }

    #[test]
    fn order_without_requester_is_a_protocol_violation() {
        let mut h = Harness::new();
        let id = h.agent_id();
        let mut src = SourceFacility::new(h.ids.fresh, h.ids.uox, fixed(50.0));
        let plain = Message::new(
            h.fresh_market,
            id,
            Transaction::request(
                h.ids.fresh,
                Payload::Material(Material::new(h.ids.uox, fixed(10.0))),
            ),
        );
        src.orders.push_front(plain);
        let err = src.tock(&mut h.ctx(id)).unwrap_err();
        assert!(matches!(
            err,
            SimError::Protocol(ProtocolError::ProtocolViolation { .. })
        ));
        assert!(h.world.shipments.is_empty());
        assert_eq!(src.shipped_total(), Fixed64::ZERO);
    }

    #[test]
    fn shipped_total_overflow_is_an_error() {
        let mut h = Harness::new();
        let id = h.agent_id();
        let mut src = SourceFacility::new(h.ids.fresh, h.ids.uox, fixed(1.5e9));
        let o = order(&h, id, 1.5e9);
        src.receive_message(o, &mut h.ctx(id)).unwrap();
        src.tock(&mut h.ctx(id)).unwrap();

        let o = order(&h, id, 1.5e9);
        src.receive_message(o, &mut h.ctx(id)).unwrap();
        let err = src.tock(&mut h.ctx(id)).unwrap_err();
        assert_eq!(
            err,
            SimError::Facility(FacilityError::TotalOverflow {
                total: fixed(1.5e9),
                added: fixed(1.5e9),
            })
        );
        assert_eq!(h.world.shipments.len(), 1);
        assert_eq!(src.shipped_total(), fixed(1.5e9));
    }

    #[test]
    fn wrong_commodity_rejected() {
        let mut h = Harness::new();
        let id = h.agent_id();
        let mut src = SourceFacility::new(h.ids.spent, h.ids.uox, fixed(50.0));
        let o = order(&h, id, 1.0);
        assert!(src.receive_message(o, &mut h.ctx(id)).is_err());
        assert_eq!(src.pending_orders(), 0);
    }
}
