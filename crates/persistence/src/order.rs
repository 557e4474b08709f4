//! Order sequencing within a scheme or an extension.
//!
//! Orders are unique per scope and handed out from a watermark that only ever
//! increases. Requesting an order held by another item moves that item to a
//! freshly minted order instead of failing.
//!
//! Requested orders must lie in `1..=MAX_ORDER`.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::ValidationError;
use crate::model::{Code, CodeScheme};

/// Highest order a caller may request.
pub const MAX_ORDER: i32 = 1_000_000_000;

/// Fails with [`ValidationError::OrderOutOfRange`] unless `order` is in `1..=MAX_ORDER`.
pub fn validate_order(order: i32) -> Result<(), ValidationError> {
    if (1..=MAX_ORDER).contains(&order) {
        Ok(())
    } else {
        Err(ValidationError::OrderOutOfRange {
            order: i64::from(order),
            max: MAX_ORDER,
        })
    }
}

/// Result of [`OrderSequencer::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAssignment<K> {
    /// The order now held by the assigned item.
    pub order: i32,
    /// The item displaced from `order`, with its new order.
    pub shifted: Option<(K, i32)>,
}

/// Hands out unique orders within one scope.
#[derive(Debug, Clone)]
pub struct OrderSequencer<K> {
    holders: HashMap<i32, K>,
    orders: HashMap<K, i32>,
    watermark: i32,
}

impl<K: Eq + Hash + Clone> Default for OrderSequencer<K> {
    fn default() -> Self {
        Self {
            holders: HashMap::new(),
            orders: HashMap::new(),
            watermark: 1,
        }
    }
}

impl<K: Eq + Hash + Clone> OrderSequencer<K> {
    /// Creates an empty sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the sequencer with the persisted orders of a scope.
    pub fn from_existing(existing: impl IntoIterator<Item = (K, i32)>) -> Self {
        let mut sequencer = Self::new();
        for (key, order) in existing {
            sequencer.holders.insert(order, key.clone());
            sequencer.orders.insert(key, order);
            sequencer.watermark = sequencer.watermark.max(order.saturating_add(1));
        }
        sequencer
    }

    /// Reserves and returns `max(orders) + 1`, or 1 for an empty scope.
    ///
    /// Fails once the order space of the scope is exhausted.
    pub fn next_order(&mut self) -> Result<i32, ValidationError> {
        let order = self.watermark;
        self.watermark = order
            .checked_add(1)
            .ok_or(ValidationError::OrderOutOfRange {
                order: i64::from(order) + 1,
                max: i32::MAX,
            })?;
        Ok(order)
    }

    /// Returns the order currently held by an item.
    pub fn order_of(&self, key: &K) -> Option<i32> {
        self.orders.get(key).copied()
    }

    /// Assigns an order to an item.
    ///
    /// Without a requested order an item keeps its current order or receives
    /// a fresh one. With a requested order held by another item, that item is
    /// moved to a fresh order and reported in [`OrderAssignment::shifted`].
    ///
    /// A requested order outside `1..=MAX_ORDER` is rejected and leaves the
    /// sequencer unchanged.
    pub fn assign(
        &mut self,
        key: K,
        requested: Option<i32>,
    ) -> Result<OrderAssignment<K>, ValidationError> {
        let Some(order) = requested else {
            if let Some(order) = self.order_of(&key) {
                return Ok(OrderAssignment {
                    order,
                    shifted: None,
                });
            }
            let order = self.next_order()?;
            self.hold(key, order);
            return Ok(OrderAssignment {
                order,
                shifted: None,
            });
        };

        validate_order(order)?;
        if order >= self.watermark {
            self.watermark = order + 1;
        }

        let shifted = match self.holders.get(&order) {
            Some(holder) if *holder == key => {
                return Ok(OrderAssignment {
                    order,
                    shifted: None,
                });
            }
            Some(holder) => {
                let holder = holder.clone();
                let fresh = self.next_order()?;
                self.hold(holder.clone(), fresh);
                Some((holder, fresh))
            }
            None => None,
        };

        self.hold(key, order);
        Ok(OrderAssignment { order, shifted })
    }

    /// Removes an item from the scope. Its order is not reused.
    pub fn release(&mut self, key: &K) {
        if let Some(order) = self.orders.remove(key) {
            self.holders.remove(&order);
        }
    }

    fn hold(&mut self, key: K, order: i32) {
        if let Some(previous) = self.orders.insert(key.clone(), order) {
            if self.holders.get(&previous) == Some(&key) {
                self.holders.remove(&previous);
            }
        }
        self.holders.insert(order, key);
    }
}

/// Fails with [`ValidationError::DuplicateOrder`] if any order repeats.
pub fn ensure_unique(
    scope: &str,
    orders: impl IntoIterator<Item = i32>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for order in orders {
        if !seen.insert(order) {
            return Err(ValidationError::DuplicateOrder {
                scope: scope.to_string(),
                order,
            });
        }
    }
    Ok(())
}

/// Orders codes for auto-generated extension members.
///
/// Parent-scheme codes come first in their own order. Linked schemes follow
/// alphabetically by code value, each contributing its codes in order.
pub fn auto_member_codes<'a>(
    parent_codes: &'a [Code],
    linked: &'a [(CodeScheme, Vec<Code>)],
) -> Vec<&'a Code> {
    let mut ordered: Vec<&Code> = parent_codes.iter().collect();
    ordered.sort_by_key(|code| code.order);

    let mut schemes: Vec<&(CodeScheme, Vec<Code>)> = linked.iter().collect();
    schemes.sort_by_key(|(scheme, _)| scheme.code_value.to_lowercase());

    for (_, codes) in schemes {
        let mut scheme_codes: Vec<&Code> = codes.iter().collect();
        scheme_codes.sort_by_key(|code| code.order);
        ordered.extend(scheme_codes);
    }
    ordered
}
