//! Resources and player balances.
//!
//! Income comes only from the collect phase: a unit standing on a resource
//! node credits its `collect_amount` of that node's resource. There is no
//! flat per-round increment.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Harvested from forest cells.
    Wood,
    /// Harvested from ore cells.
    Metal,
}

impl Resource {
    /// All resource kinds, in balance order.
    pub const ALL: [Resource; 2] = [Resource::Wood, Resource::Metal];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Wood => write!(f, "wood"),
            Resource::Metal => write!(f, "metal"),
        }
    }
}

/// Quantity of each resource. Used both for player balances and unit costs.
///
/// Quantities are unsigned, so a balance can never go negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Balance {
    /// Wood on hand.
    pub wood: u32,
    /// Metal on hand.
    pub metal: u32,
}

impl Balance {
    /// Create a balance.
    #[must_use]
    pub const fn new(wood: u32, metal: u32) -> Self {
        Self { wood, metal }
    }

    /// Amount of one resource.
    #[must_use]
    pub const fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Wood => self.wood,
            Resource::Metal => self.metal,
        }
    }

    fn slot(&mut self, resource: Resource) -> &mut u32 {
        match resource {
            Resource::Wood => &mut self.wood,
            Resource::Metal => &mut self.metal,
        }
    }

    /// Add income.
    pub fn credit(&mut self, resource: Resource, amount: u32) {
        let slot = self.slot(resource);
        *slot = slot.saturating_add(amount);
    }

    /// First resource line `cost` asks for that this balance does not cover.
    #[must_use]
    pub fn shortfall(&self, cost: &Balance) -> Option<Resource> {
        Resource::ALL
            .into_iter()
            .find(|&resource| self.get(resource) < cost.get(resource))
    }

    /// Whether every resource line of `cost` is covered.
    #[must_use]
    pub fn covers(&self, cost: &Balance) -> bool {
        self.shortfall(cost).is_none()
    }

    /// Subtract `cost` if it is fully covered; otherwise leave the balance
    /// untouched and report the first short resource.
    ///
    /// # Errors
    ///
    /// Returns the first resource that is not covered.
    pub fn try_deduct(&mut self, cost: &Balance) -> Result<(), Resource> {
        if let Some(short) = self.shortfall(cost) {
            return Err(short);
        }
        for resource in Resource::ALL {
            *self.slot(resource) -= cost.get(resource);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit() {
        let mut balance = Balance::new(1, 2);
        balance.credit(Resource::Metal, 3);
        assert_eq!(balance, Balance::new(1, 5));
        balance.credit(Resource::Wood, u32::MAX);
        assert_eq!(balance.wood, u32::MAX);
    }

    #[test]
    fn test_deduct_exact() {
        let mut balance = Balance::new(15, 15);
        assert!(balance.try_deduct(&Balance::new(10, 10)).is_ok());
        assert_eq!(balance, Balance::new(5, 5));
    }

    #[test]
    fn test_deduct_short_leaves_balance() {
        let mut balance = Balance::new(20, 9);
        assert_eq!(balance.try_deduct(&Balance::new(10, 10)), Err(Resource::Metal));
        assert_eq!(balance, Balance::new(20, 9));
    }

    #[test]
    fn test_balance_json_shape() {
        let json = serde_json::to_string(&Balance::new(15, 3)).unwrap();
        assert_eq!(json, r#"{"wood":15,"metal":3}"#);
        let partial: Balance = serde_json::from_str(r#"{"metal":4}"#).unwrap();
        assert_eq!(partial, Balance::new(0, 4));
    }
}
