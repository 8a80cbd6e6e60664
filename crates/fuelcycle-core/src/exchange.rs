//! Per-round collection of request and bid portfolios.
//!
//! A [`ResourceExchange`] is generic over a resource kind. It asks every
//! registered [`Trader`] for its portfolios of that kind and unions the
//! answers into value-deduplicated sets. The per-kind dispatch lives in the
//! [`Exchangeable`] trait, so `ResourceExchange` itself is untouched by a new
//! kind. The kinds are still a closed set: adding one means a request and a
//! bid hook on [`Trader`], an `Exchangeable` impl routing to them, and a
//! field on [`ExchangeRound`] collected in [`ExchangeRound::collect`].
//!
//! Matching requests to bids is not done here. A [`Clearing`] stage installed
//! on the engine consumes the collected [`ExchangeRound`] and returns
//! [`Order`]s.

use crate::fixed::{Fixed64, Quantity};
use crate::id::{AgentId, CommodityId};
use crate::message::Order;
use crate::resource::{GenericResource, Material, Resource};
use std::collections::{BTreeMap, BTreeSet};

/// Commodity to clearing market. The resolver agents use to address trades.
pub type MarketDirectory = BTreeMap<CommodityId, AgentId>;

// ---------------------------------------------------------------------------
// Portfolios
// ---------------------------------------------------------------------------

/// Demand for one resource of kind `R`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request<R> {
    pub commodity: CommodityId,
    pub target: R,
    pub price: Fixed64,
    pub min_fraction: Fixed64,
}

/// Requests posted together by one agent in one round.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestPortfolio<R> {
    pub requester: AgentId,
    pub requests: Vec<Request<R>>,
}

/// Supply of one resource of kind `R`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bid<R> {
    pub commodity: CommodityId,
    pub offer: R,
    pub price: Fixed64,
}

/// Bids posted together by one agent in one round.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BidPortfolio<R> {
    pub bidder: AgentId,
    pub bids: Vec<Bid<R>>,
}

impl<R: Resource> RequestPortfolio<R> {
    pub fn total_quantity(&self) -> Quantity {
        self.requests
            .iter()
            .fold(Fixed64::ZERO, |acc, r| acc + r.target.quantity())
    }
}

impl<R: Resource> BidPortfolio<R> {
    pub fn total_quantity(&self) -> Quantity {
        self.bids
            .iter()
            .fold(Fixed64::ZERO, |acc, b| acc + b.offer.quantity())
    }
}

// ---------------------------------------------------------------------------
// Trader capability
// ---------------------------------------------------------------------------

/// Failure reported by a trader while producing portfolios.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TraderError(pub String);

/// An agent that can be asked for its current portfolios.
///
/// Every hook defaults to "nothing to trade", so a trader implements only
/// the kinds it deals in.
pub trait Trader {
    fn material_requests(&self) -> Result<Vec<RequestPortfolio<Material>>, TraderError> {
        Ok(Vec::new())
    }

    fn generic_requests(&self) -> Result<Vec<RequestPortfolio<GenericResource>>, TraderError> {
        Ok(Vec::new())
    }

    /// `exchange` holds the requests already collected this round.
    fn material_bids(
        &self,
        exchange: &ResourceExchange<Material>,
    ) -> Result<Vec<BidPortfolio<Material>>, TraderError> {
        let _ = exchange;
        Ok(Vec::new())
    }

    fn generic_bids(
        &self,
        exchange: &ResourceExchange<GenericResource>,
    ) -> Result<Vec<BidPortfolio<GenericResource>>, TraderError> {
        let _ = exchange;
        Ok(Vec::new())
    }
}

/// Routes the exchange's per-kind questions to the matching trader hook.
pub trait Exchangeable: Resource + Ord {
    fn query_requests(trader: &dyn Trader) -> Result<Vec<RequestPortfolio<Self>>, TraderError>;

    fn query_bids(
        trader: &dyn Trader,
        exchange: &ResourceExchange<Self>,
    ) -> Result<Vec<BidPortfolio<Self>>, TraderError>;
}

impl Exchangeable for Material {
    fn query_requests(trader: &dyn Trader) -> Result<Vec<RequestPortfolio<Self>>, TraderError> {
        trader.material_requests()
    }

    fn query_bids(
        trader: &dyn Trader,
        exchange: &ResourceExchange<Self>,
    ) -> Result<Vec<BidPortfolio<Self>>, TraderError> {
        trader.material_bids(exchange)
    }
}

impl Exchangeable for GenericResource {
    fn query_requests(trader: &dyn Trader) -> Result<Vec<RequestPortfolio<Self>>, TraderError> {
        trader.generic_requests()
    }

    fn query_bids(
        trader: &dyn Trader,
        exchange: &ResourceExchange<Self>,
    ) -> Result<Vec<BidPortfolio<Self>>, TraderError> {
        trader.generic_bids(exchange)
    }
}

// ---------------------------------------------------------------------------
// ResourceExchange
// ---------------------------------------------------------------------------

/// Collected portfolios of one resource kind for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceExchange<R: Ord> {
    requests: BTreeSet<RequestPortfolio<R>>,
    bids: BTreeSet<BidPortfolio<R>>,
}

impl<R: Ord> Default for ResourceExchange<R> {
    fn default() -> Self {
        Self {
            requests: BTreeSet::new(),
            bids: BTreeSet::new(),
        }
    }
}

impl<R: Exchangeable> ResourceExchange<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every trader for its request portfolios and union the answers.
    ///
    /// A failing trader aborts the collection and the exchange keeps the
    /// requests it held before the call. Returns the number of distinct
    /// portfolios held afterwards.
    pub fn collect_requests<'a>(
        &mut self,
        traders: impl IntoIterator<Item = (AgentId, &'a dyn Trader)>,
    ) -> Result<usize, ExchangeError> {
        let mut collected = BTreeSet::new();
        for (id, trader) in traders {
            let portfolios = R::query_requests(trader).map_err(|source| {
                ExchangeError::TraderCapabilityFailure {
                    trader: id,
                    kind: R::KIND,
                    source,
                }
            })?;
            collected.extend(portfolios);
        }
        self.requests.extend(collected);
        Ok(self.requests.len())
    }

    /// Ask every trader for its bid portfolios. Traders see the requests
    /// collected so far.
    pub fn collect_bids<'a>(
        &mut self,
        traders: impl IntoIterator<Item = (AgentId, &'a dyn Trader)>,
    ) -> Result<usize, ExchangeError> {
        let mut collected = BTreeSet::new();
        for (id, trader) in traders {
            let portfolios = R::query_bids(trader, self).map_err(|source| {
                ExchangeError::TraderCapabilityFailure {
                    trader: id,
                    kind: R::KIND,
                    source,
                }
            })?;
            collected.extend(portfolios);
        }
        self.bids.extend(collected);
        Ok(self.bids.len())
    }

    pub fn requests(&self) -> &BTreeSet<RequestPortfolio<R>> {
        &self.requests
    }

    pub fn bids(&self) -> &BTreeSet<BidPortfolio<R>> {
        &self.bids
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.bids.is_empty()
    }
}

/// Both resource kinds' exchanges for one round. One field per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeRound {
    pub material: ResourceExchange<Material>,
    pub generic: ResourceExchange<GenericResource>,
}

impl ExchangeRound {
    /// Collect requests then bids for every kind from the same traders.
    pub fn collect<'a>(
        traders: &[(AgentId, &'a dyn Trader)],
    ) -> Result<Self, ExchangeError> {
        let mut round = Self::default();
        round.material.collect_requests(traders.iter().copied())?;
        round.generic.collect_requests(traders.iter().copied())?;
        round.material.collect_bids(traders.iter().copied())?;
        round.generic.collect_bids(traders.iter().copied())?;
        Ok(round)
    }
}

// ---------------------------------------------------------------------------
// Clearing
// ---------------------------------------------------------------------------

/// Turns a collected round into settled orders.
pub trait Clearing {
    fn clear(
        &mut self,
        round: &ExchangeRound,
        markets: &MarketDirectory,
    ) -> Result<Vec<Order>, ExchangeError>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("trader {trader:?} failed to produce {kind} portfolios: {source}")]
    TraderCapabilityFailure {
        trader: AgentId,
        kind: &'static str,
        #[source]
        source: TraderError,
    },
    #[error("clearing failed: {0}")]
    Clearing(String),
}
