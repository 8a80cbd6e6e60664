//! Per-commodity market: collects the step's requests and offers and
//! presents them to the exchange as portfolios.

use crate::agent::{AgentContext, Communicator, Model, TimeAgent};
use crate::catalog::Catalog;
use crate::config::{ConfigError, MarketConfig, ModelConfig};
use crate::error::SimError;
use crate::exchange::{
    Bid, BidPortfolio, Request, RequestPortfolio, ResourceExchange, Trader, TraderError,
};
use crate::id::{AgentId, CommodityId};
use crate::message::{Message, Payload, ProtocolError, Side, Transaction};
use crate::resource::{GenericResource, Material};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Market {
    commodity: CommodityId,
    /// `(sender, transaction)` in arrival order. Cleared every tock.
    filings: Vec<(AgentId, Transaction)>,
    filed_total: u64,
}

impl Market {
    pub fn new(commodity: CommodityId) -> Self {
        Self {
            commodity,
            filings: Vec::new(),
            filed_total: 0,
        }
    }

    pub fn from_config(config: &MarketConfig, catalog: &Catalog) -> Result<Self, ConfigError> {
        Ok(Self::new(catalog.require_commodity(&config.commodity)?))
    }

    pub fn construct(config: &ModelConfig, catalog: &Catalog) -> Result<Box<dyn Model>, ConfigError> {
        match config {
            ModelConfig::Market(cfg) => Ok(Box::new(Self::from_config(cfg, catalog)?)),
            other => Err(ConfigError::WrongModelType {
                expected: "Market",
                found: other.model_type(),
            }),
        }
    }

    pub fn commodity(&self) -> CommodityId {
        self.commodity
    }

    pub fn filings(&self) -> &[(AgentId, Transaction)] {
        &self.filings
    }

    /// Filed transactions on `side` whose payload `pick` accepts, grouped
    /// per sender.
    fn grouped<'a, R: Clone + 'a>(
        &'a self,
        side: Side,
        pick: impl Fn(&'a Payload) -> Option<&'a R>,
    ) -> BTreeMap<AgentId, Vec<(&'a Transaction, R)>> {
        let mut groups: BTreeMap<AgentId, Vec<(&Transaction, R)>> = BTreeMap::new();
        for (sender, trans) in &self.filings {
            if trans.side != side {
                continue;
            }
            if let Some(resource) = pick(&trans.payload) {
                groups
                    .entry(*sender)
                    .or_default()
                    .push((trans, resource.clone()));
            }
        }
        groups
    }

    fn request_portfolios<'a, R: Clone + 'a>(
        &'a self,
        pick: impl Fn(&'a Payload) -> Option<&'a R>,
    ) -> Vec<RequestPortfolio<R>> {
        self.grouped(Side::Request, pick)
            .into_iter()
            .map(|(requester, items)| RequestPortfolio {
                requester,
                requests: items
                    .into_iter()
                    .map(|(trans, target)| Request {
                        commodity: trans.commodity,
                        target,
                        price: trans.price,
                        min_fraction: trans.min_fraction,
                    })
                    .collect(),
            })
            .collect()
    }

    fn bid_portfolios<'a, R: Clone + 'a>(
        &'a self,
        pick: impl Fn(&'a Payload) -> Option<&'a R>,
    ) -> Vec<BidPortfolio<R>> {
        self.grouped(Side::Offer, pick)
            .into_iter()
            .map(|(bidder, items)| BidPortfolio {
                bidder,
                bids: items
                    .into_iter()
                    .map(|(trans, offer)| Bid {
                        commodity: trans.commodity,
                        offer,
                        price: trans.price,
                    })
                    .collect(),
            })
            .collect()
    }
}

fn material(p: &Payload) -> Option<&Material> {
    match p {
        Payload::Material(m) => Some(m),
        Payload::Generic(_) => None,
    }
}

fn generic(p: &Payload) -> Option<&GenericResource> {
    match p {
        Payload::Generic(g) => Some(g),
        Payload::Material(_) => None,
    }
}

impl Trader for Market {
    fn material_requests(&self) -> Result<Vec<RequestPortfolio<Material>>, TraderError> {
        Ok(self.request_portfolios(material))
    }

    fn generic_requests(&self) -> Result<Vec<RequestPortfolio<GenericResource>>, TraderError> {
        Ok(self.request_portfolios(generic))
    }

    fn material_bids(
        &self,
        _exchange: &ResourceExchange<Material>,
    ) -> Result<Vec<BidPortfolio<Material>>, TraderError> {
        Ok(self.bid_portfolios(material))
    }

    fn generic_bids(
        &self,
        _exchange: &ResourceExchange<GenericResource>,
    ) -> Result<Vec<BidPortfolio<GenericResource>>, TraderError> {
        Ok(self.bid_portfolios(generic))
    }
}

impl TimeAgent for Market {
    fn tock(&mut self, _ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        self.filings.clear();
        Ok(())
    }
}

impl Communicator for Market {
    fn receive_message(&mut self, msg: Message, ctx: &mut AgentContext<'_>) -> Result<(), SimError> {
        let commodity = msg.trans().commodity;
        if msg.recipient() != ctx.id || commodity != self.commodity {
            return Err(ProtocolError::ProtocolViolation {
                agent: ctx.id,
                message: msg.id(),
                reason: format!(
                    "{} filing at the {} market",
                    ctx.catalog.commodity_name(commodity),
                    ctx.catalog.commodity_name(self.commodity),
                ),
            }
            .into());
        }
        self.filed_total += 1;
        self.filings.push((msg.sender(), msg.into_transaction()));
        Ok(())
    }
}

impl Model for Market {
    fn model_type(&self) -> &'static str {
        "Market"
    }

    fn copy_fresh(&self) -> Box<dyn Model> {
        Box::new(Self::new(self.commodity))
    }

    fn summary(&self, catalog: &Catalog) -> String {
        format!(
            "Market for {}: {} filings pending, {} filed in total",
            catalog.commodity_name(self.commodity),
            self.filings.len(),
            self.filed_total,
        )
    }

    fn as_trader(&self) -> Option<&dyn Trader> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
