//! Terminal consumer: requests bulk quantities and stores what it is sent.

use crate::agent::{AgentContext, Communicator, Model, TimeAgent};
use crate::buffer::ResourceBuffer;
use crate::catalog::Catalog;
use crate::config::{ConfigError, ModelConfig, SinkConfig};
use crate::error::SimError;
use crate::fixed::{Fixed64, Quantity, is_positive};
use crate::id::CommodityId;
use crate::message::{Message, Payload, ProtocolError, Transaction};
use crate::resource::{GenericResource, Manifest, Material};

#[derive(Debug, Clone)]
pub struct SinkFacility {
    commodities: Vec<CommodityId>,
    /// Requested per step, per commodity.
    capacity: Quantity,
    inventory: ResourceBuffer<Material>,
}

impl SinkFacility {
    pub fn new(commodities: Vec<CommodityId>, capacity: Quantity, limit: Option<Quantity>) -> Self {
        let inventory = match limit {
            Some(limit) => ResourceBuffer::with_capacity(limit),
            None => ResourceBuffer::new(),
        };
        Self {
            commodities,
            capacity,
            inventory,
        }
    }

    pub fn from_config(config: &SinkConfig, catalog: &Catalog) -> Result<Self, ConfigError> {
        let commodities = config
            .commodities
            .iter()
            .map(|name| catalog.require_commodity(name))
            .collect::<Result<Vec<_>, _>>()?;
        let capacity = crate::config::quantity("Sink", "capacity", config.capacity)?;
        let limit = config
            .inventory_limit
            .map(|l| crate::config::quantity("Sink", "inventory_limit", l))
            .transpose()?;
        Ok(Self::new(commodities, capacity, limit))
    }

    pub fn construct(config: &ModelConfig, catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        match config {
            ModelConfig::Sink(cfg) => Ok(Box::new(Self::from_config(cfg, catalog)?)),
            other => Err(ConfigError::WrongModelType {
                expected: "Sink",
                found: other.model_type(),
            }),
        }
    }

    pub fn inventory(&self) -> &ResourceBuffer<Material> {
        &self.inventory
    }

    /// What the sink asks for this step, per commodity. Free space is split
    /// evenly between the commodities, so the requests together never ask
    /// for more than fits.
    pub fn request_size(&self) -> Quantity {
        match self.inventory.space() {
            Some(space) => {
                let ways = Fixed64::from_num(self.commodities.len().max(1));
                self.capacity.min(space / ways)
            }
            None => self.capacity,
        }
    }
}

impl TimeAgent for SinkFacility {
    fn tick(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let amount = self.request_size();
        if !is_positive(amount) {
            return Ok(());
        }
        for &commodity in &self.commodities {
            let units = ctx.catalog.commodity_units(commodity);
            let bulk = GenericResource::new(commodity, units, amount);
            ctx.issue(Transaction::request(commodity, Payload::Generic(bulk)))?;
        }
        Ok(())
    }
}

impl Communicator for SinkFacility {
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        Err(ProtocolError::ProtocolViolation {
            agent: ctx.id,
            message: msg.id(),
            reason: "sinks supply nothing".to_string(),
        }
        .into())
    }

    fn accept_resources(
        &mut self,
        _transaction: Transaction,
        manifest: Manifest,
        _ctx: &mut AgentContext<'_>,
    ) -> Result<(), SimError> {
        self.inventory.push_all(manifest)?;
        Ok(())
    }
}

impl Model for SinkFacility {
    fn model_type(&self) -> &'static str {
        "Sink"
    }

    fn copy_fresh(&self) -> Box<dyn Model> {
        Box::new(Self::new(
            self.commodities.clone(),
            self.capacity,
            self.inventory.capacity(),
        ))
    }

    fn summary(&self, catalog: &Catalog) -> String {
        let names: Vec<&str> = self
            .commodities
            .iter()
            .map(|&c| catalog.commodity_name(c))
            .collect();
        format!(
            "Sink of [{}]: holding {} in {} units",
            names.join(", "),
            self.inventory.total_quantity(),
            self.inventory.count(),
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
