//! Quantity-tracked resource buffers.
//!
//! A [`ResourceBuffer`] owns a FIFO sequence of resource units. Withdrawals
//! take whole units from the front and split the last unit when the requested
//! amount falls inside it. Every comparison uses [`EPSILON`](crate::fixed::EPSILON), so float-born
//! drift never turns a legal withdrawal into an accounting error.

use crate::fixed::{Fixed64, Quantity, exceeds, is_positive};
use crate::resource::Resource;
use std::collections::VecDeque;

/// Errors raised by buffer accounting. All of them are fatal for the owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        requested: Quantity,
        available: Quantity,
    },
    #[error("over capacity: pushing {pushed} onto {held} exceeds capacity {capacity}")]
    OverCapacity {
        pushed: Quantity,
        held: Quantity,
        capacity: Quantity,
    },
    #[error("withdrawal amount must be non-negative, got {0}")]
    NegativeAmount(Quantity),
    #[error("overflow: pushing {pushed} onto {held} exceeds the representable total")]
    Overflow { pushed: Quantity, held: Quantity },
}

/// Bounded, exclusively-owned container of resource units.
#[derive(Debug, Clone)]
pub struct ResourceBuffer<R: Resource> {
    resources: VecDeque<R>,
    /// Cached sum of the held units.
    total: Quantity,
    /// `None` = unbounded.
    capacity: Option<Quantity>,
}

impl<R: Resource> Default for ResourceBuffer<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> ResourceBuffer<R> {
    /// An unbounded buffer.
    pub fn new() -> Self {
        Self {
            resources: VecDeque::new(),
            total: Fixed64::ZERO,
            capacity: None,
        }
    }

    /// A buffer that rejects pushes beyond `capacity`.
    pub fn with_capacity(capacity: Quantity) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    pub fn capacity(&self) -> Option<Quantity> {
        self.capacity
    }

    /// Remaining room, or `None` when unbounded.
    pub fn space(&self) -> Option<Quantity> {
        self.capacity
            .map(|cap| (cap - self.total).max(Fixed64::ZERO))
    }

    /// Add a resource unit. Zero-quantity units are dropped.
    pub fn push(&mut self, resource: R) -> Result<(), BufferError> {
        let qty = resource.quantity();
        if qty <= Fixed64::ZERO {
            return Ok(());
        }
        self.total = self.grown_by(qty)?;
        self.resources.push_back(resource);
        Ok(())
    }

    /// Add every unit of `resources`. Capacity is checked up front, so a
    /// failure leaves the buffer unchanged.
    pub fn push_all(&mut self, resources: impl IntoIterator<Item = R>) -> Result<(), BufferError> {
        let incoming: Vec<R> = resources
            .into_iter()
            .filter(|r| r.quantity() > Fixed64::ZERO)
            .collect();
        let qty = incoming.iter().try_fold(Fixed64::ZERO, |acc, r| {
            acc.checked_add(r.quantity()).ok_or(BufferError::Overflow {
                pushed: r.quantity(),
                held: self.total,
            })
        })?;
        self.total = self.grown_by(qty)?;
        self.resources.extend(incoming);
        Ok(())
    }

    /// The total after adding `qty`, checked against capacity and the
    /// representable range.
    fn grown_by(&self, qty: Quantity) -> Result<Quantity, BufferError> {
        let total = self.total.checked_add(qty).ok_or(BufferError::Overflow {
            pushed: qty,
            held: self.total,
        })?;
        if let Some(capacity) = self.capacity
            && exceeds(total, capacity)
        {
            return Err(BufferError::OverCapacity {
                pushed: qty,
                held: self.total,
                capacity,
            });
        }
        Ok(total)
    }

    /// Remove resources totalling exactly `amount`, splitting a unit if
    /// needed. Fails without touching the buffer if the total falls short by
    /// more than [`EPSILON`](crate::fixed::EPSILON).
    pub fn pop_quantity(&mut self, amount: Quantity) -> Result<Vec<R>, BufferError> {
        self.pop_matching(amount, |_| true)
    }

    /// Like [`pop_quantity`](Self::pop_quantity), drawing only on units that
    /// satisfy `pred`, oldest first. Other units keep their position.
    pub fn pop_matching(
        &mut self,
        amount: Quantity,
        mut pred: impl FnMut(&R) -> bool,
    ) -> Result<Vec<R>, BufferError> {
        if amount < Fixed64::ZERO {
            return Err(BufferError::NegativeAmount(amount));
        }
        let available = self
            .resources
            .iter()
            .filter(|r| pred(*r))
            .fold(Fixed64::ZERO, |acc, r| acc + r.quantity());
        if exceeds(amount, available) {
            return Err(BufferError::InsufficientInventory {
                requested: amount,
                available,
            });
        }

        let mut popped = Vec::new();
        let mut remaining = amount;
        let mut i = 0;
        while is_positive(remaining) && i < self.resources.len() {
            if !pred(&self.resources[i]) {
                i += 1;
                continue;
            }
            let qty = self.resources[i].quantity();
            if exceeds(qty, remaining) {
                let part = self.resources[i].extract(remaining);
                self.total -= remaining;
                popped.push(part);
                remaining = Fixed64::ZERO;
            } else if let Some(unit) = self.resources.remove(i) {
                // Within epsilon of the remainder (or below it): take the
                // whole unit.
                self.total -= qty;
                remaining -= qty.min(remaining);
                popped.push(unit);
            }
        }

        if self.resources.is_empty() {
            self.total = Fixed64::ZERO;
        }
        Ok(popped)
    }

    /// Remove and return every unit.
    pub fn pop_all(&mut self) -> Vec<R> {
        self.total = Fixed64::ZERO;
        self.resources.drain(..).collect()
    }

    /// No quantity above [`EPSILON`](crate::fixed::EPSILON) is held.
    pub fn is_empty(&self) -> bool {
        !is_positive(self.total)
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total
    }

    /// Number of distinct units held.
    pub fn count(&self) -> usize {
        self.resources.len()
    }

    /// Iterate units from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.resources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{f64_to_fixed64, fixed64_to_f64};
    use crate::id::RecipeId;
    use crate::resource::{Material, total_quantity};

    fn fixed(v: f64) -> Fixed64 {
        f64_to_fixed64(v)
    }

    fn mat(q: f64) -> Material {
        Material::new(RecipeId(0), fixed(q))
    }

    #[test]
    fn push_increases_total() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(10.0)).unwrap();
        buf.push(mat(5.0)).unwrap();
        assert_eq!(buf.total_quantity(), fixed(15.0));
        assert_eq!(buf.count(), 2);
        assert!(!buf.is_empty());
    }

    #[test]
    fn pop_whole_units() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(10.0)).unwrap();
        buf.push(mat(5.0)).unwrap();
        let popped = buf.pop_quantity(fixed(15.0)).unwrap();
        assert_eq!(popped.len(), 2);
        assert!(buf.is_empty());
        assert_eq!(buf.total_quantity(), Fixed64::ZERO);
    }

    #[test]
    fn pop_splits_a_unit() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(100.0)).unwrap();
        let popped = buf.pop_quantity(fixed(20.0)).unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(total_quantity(&popped), fixed(20.0));
        assert_eq!(buf.total_quantity(), fixed(80.0));
        assert_eq!(buf.count(), 1);
    }

    #[test]
    fn pop_spanning_units_splits_the_last() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(10.0)).unwrap();
        buf.push(mat(10.0)).unwrap();
        let popped = buf.pop_quantity(fixed(15.0)).unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(total_quantity(&popped), fixed(15.0));
        assert_eq!(buf.total_quantity(), fixed(5.0));
    }

    #[test]
    fn insufficient_inventory_leaves_buffer_unchanged() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(10.0)).unwrap();
        let err = buf.pop_quantity(fixed(10.5)).unwrap_err();
        match err {
            BufferError::InsufficientInventory {
                requested,
                available,
            } => {
                assert_eq!(requested, fixed(10.5));
                assert_eq!(available, fixed(10.0));
            }
            other => panic!("expected InsufficientInventory, got: {other:?}"),
        }
        assert_eq!(buf.total_quantity(), fixed(10.0));
        assert_eq!(buf.count(), 1);
    }

    #[test]
    fn withdrawal_within_epsilon_succeeds() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(10.0)).unwrap();
        let slightly_more = fixed(10.0) + Fixed64::from_bits(100);
        let popped = buf.pop_quantity(slightly_more).unwrap();
        assert_eq!(total_quantity(&popped), fixed(10.0));
        assert!(buf.is_empty());
    }

    #[test]
    fn pop_zero_returns_nothing() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(3.0)).unwrap();
        assert!(buf.pop_quantity(Fixed64::ZERO).unwrap().is_empty());
        assert_eq!(buf.total_quantity(), fixed(3.0));
    }

    #[test]
    fn negative_withdrawal_rejected() {
        let mut buf: ResourceBuffer<Material> = ResourceBuffer::new();
        assert!(matches!(
            buf.pop_quantity(fixed(-1.0)),
            Err(BufferError::NegativeAmount(_))
        ));
    }

    #[test]
    fn capacity_enforced() {
        let mut buf = ResourceBuffer::with_capacity(fixed(10.0));
        buf.push(mat(8.0)).unwrap();
        let err = buf.push(mat(3.0)).unwrap_err();
        assert!(matches!(err, BufferError::OverCapacity { .. }));
        assert_eq!(buf.total_quantity(), fixed(8.0));
        assert_eq!(buf.space(), Some(fixed(2.0)));
    }

    #[test]
    fn push_all_is_all_or_nothing() {
        let mut buf = ResourceBuffer::with_capacity(fixed(10.0));
        let result = buf.push_all(vec![mat(6.0), mat(6.0)]);
        assert!(result.is_err());
        assert!(buf.is_empty());
        buf.push_all(vec![mat(4.0), mat(6.0)]).unwrap();
        assert_eq!(buf.total_quantity(), fixed(10.0));
    }

    #[test]
    fn running_total_overflow_is_an_error() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(1.5e9)).unwrap();
        let err = buf.push(mat(1.5e9)).unwrap_err();
        assert_eq!(
            err,
            BufferError::Overflow {
                pushed: fixed(1.5e9),
                held: fixed(1.5e9),
            }
        );
        assert!(matches!(
            buf.push_all(vec![mat(1.0e9), mat(1.0e9)]),
            Err(BufferError::Overflow { .. })
        ));
        assert_eq!(buf.total_quantity(), fixed(1.5e9));
        assert_eq!(buf.count(), 1);
    }

    #[test]
    fn pop_all_drains() {
        let mut buf = ResourceBuffer::new();
        buf.push(mat(1.0)).unwrap();
        buf.push(mat(2.0)).unwrap();
        let all = buf.pop_all();
        assert_eq!(all.len(), 2);
        assert!(buf.is_empty());
        assert_eq!(buf.count(), 0);
    }

    #[test]
    fn pop_matching_skips_other_units() {
        let mut buf = ResourceBuffer::new();
        buf.push(Material::new(RecipeId(1), fixed(4.0))).unwrap();
        buf.push(Material::new(RecipeId(2), fixed(6.0))).unwrap();
        buf.push(Material::new(RecipeId(1), fixed(4.0))).unwrap();
        let popped = buf.pop_matching(fixed(6.0), |m| m.recipe == RecipeId(1)).unwrap();
        assert!(popped.iter().all(|m| m.recipe == RecipeId(1)));
        assert_eq!(total_quantity(&popped), fixed(6.0));
        assert_eq!(buf.total_quantity(), fixed(8.0));
        // The untouched unit is now at the front.
        assert_eq!(buf.iter().next().unwrap().recipe, RecipeId(2));
    }

    #[test]
    fn pop_matching_checks_only_matching_inventory() {
        let mut buf = ResourceBuffer::new();
        buf.push(Material::new(RecipeId(1), fixed(4.0))).unwrap();
        buf.push(Material::new(RecipeId(2), fixed(6.0))).unwrap();
        let err = buf
            .pop_matching(fixed(5.0), |m| m.recipe == RecipeId(1))
            .unwrap_err();
        assert_eq!(
            err,
            BufferError::InsufficientInventory {
                requested: fixed(5.0),
                available: fixed(4.0),
            }
        );
        assert_eq!(buf.count(), 2);
    }

    #[test]
    fn fifo_order_preserved() {
        let mut buf = ResourceBuffer::new();
        buf.push(Material::new(RecipeId(1), fixed(1.0))).unwrap();
        buf.push(Material::new(RecipeId(2), fixed(1.0))).unwrap();
        let popped = buf.pop_quantity(fixed(1.0)).unwrap();
        assert_eq!(popped[0].recipe, RecipeId(1));
        assert_eq!(fixed64_to_f64(buf.total_quantity()), 1.0);
    }
}
