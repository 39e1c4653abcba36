use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ProductId, Quantity, UserId};

/// Unit a product's stock is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Kg,
    G,
    Lb,
    Oz,
}

impl Unit {
    pub const ALL: [Unit; 4] = [Unit::Kg, Unit::G, Unit::Lb, Unit::Oz];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kg => "kg",
            Unit::G => "g",
            Unit::Lb => "lb",
            Unit::Oz => "oz",
        }
    }

    /// Human-readable label, e.g. "Kilograms (kg)".
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Kg => "Kilograms (kg)",
            Unit::G => "Grams (g)",
            Unit::Lb => "Pounds (lb)",
            Unit::Oz => "Ounces (oz)",
        }
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Unit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" => Ok(Unit::Kg),
            "g" => Ok(Unit::G),
            "lb" => Ok(Unit::Lb),
            "oz" => Ok(Unit::Oz),
            other => Err(DomainError::validation(format!(
                "unit must be one of: kg, g, lb, oz (got '{other}')"
            ))),
        }
    }
}

/// Inventory product record.
///
/// `current_stock` is only ever changed through the stock ledger (manual
/// adjustments and order completion), never through a plain update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub current_stock: Quantity,
    pub unit: Unit,
    pub min_stock_alert: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Stock is at or below the alert threshold.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock_alert
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub current_stock: Quantity,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub min_stock_alert: Quantity,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, unit: Unit) -> Self {
        Self {
            name: name.into(),
            description: None,
            current_stock: Quantity::ZERO,
            unit,
            min_stock_alert: Quantity::ZERO,
        }
    }

    pub fn with_stock(mut self, stock: Quantity) -> Self {
        self.current_stock = stock;
        self
    }

    pub fn with_min_stock_alert(mut self, alert: Quantity) -> Self {
        self.min_stock_alert = alert;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Normalize and validate form input.
    pub fn validate(mut self) -> DomainResult<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(DomainError::validation("product name is required"));
        }
        self.description = normalize_optional(self.description);
        Ok(self)
    }

    /// Build the stored record.
    pub fn into_product(self, id: ProductId, owner_id: UserId, now: DateTime<Utc>) -> Product {
        Product {
            id,
            owner_id,
            name: self.name,
            description: self.description,
            current_stock: self.current_stock,
            unit: self.unit,
            min_stock_alert: self.min_stock_alert,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of descriptive product fields.
///
/// Stock is deliberately absent: it changes only through the ledger.
/// `description: Some("")` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<Unit>,
    #[serde(default)]
    pub min_stock_alert: Option<Quantity>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.unit.is_none()
            && self.min_stock_alert.is_none()
    }

    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("product name cannot be empty"));
            }
            product.name = name.to_string();
        }
        if let Some(description) = &self.description {
            product.description = normalize_optional(Some(description.clone()));
        }
        if let Some(unit) = self.unit {
            product.unit = unit;
        }
        if let Some(alert) = self.min_stock_alert {
            product.min_stock_alert = alert;
        }
        product.updated_at = now;
        Ok(())
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
