//! Product creation and edit inputs.

use ledger_store::ProductDetails;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Fields for a new product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_stock: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn min_stock(mut self, min_stock: i64) -> Self {
        self.min_stock = min_stock;
        self
    }

    /// Validates and normalizes the input into stored details plus the
    /// initial stock level.
    pub fn validate(self) -> Result<(ProductDetails, i64)> {
        let details = ProductDetails {
            name: validate_name(&self.name)?,
            price: validate_price(self.price)?,
            supplier: normalize_text(self.supplier),
            category: normalize_text(self.category),
            min_stock: validate_non_negative("min_stock", self.min_stock)?,
        };
        let quantity = validate_non_negative("quantity", self.quantity)?;
        Ok((details, quantity))
    }
}

/// A partial edit of a product's descriptive fields.
///
/// Absent fields are left unchanged. An empty `supplier` or `category`
/// clears the field. `quantity` is accepted by the deserializer only so
/// that it can be rejected: stock changes go through movements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
}

impl ProductPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn min_stock(mut self, min_stock: i64) -> Self {
        self.min_stock = Some(min_stock);
        self
    }

    /// Checks the patch on its own, before the current record is read.
    pub fn validate(&self) -> Result<()> {
        if self.quantity.is_some() {
            return Err(InventoryError::invalid(
                "quantity cannot be edited directly; register a movement instead",
            ));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(min_stock) = self.min_stock {
            validate_non_negative("min_stock", min_stock)?;
        }
        Ok(())
    }

    /// Merges the patch onto the current details.
    pub fn apply(self, current: &ProductDetails) -> Result<ProductDetails> {
        self.validate()?;

        let mut details = current.clone();
        if let Some(name) = self.name {
            details.name = validate_name(&name)?;
        }
        if let Some(price) = self.price {
            details.price = price;
        }
        if self.supplier.is_some() {
            details.supplier = normalize_text(self.supplier);
        }
        if self.category.is_some() {
            details.category = normalize_text(self.category);
        }
        if let Some(min_stock) = self.min_stock {
            details.min_stock = min_stock;
        }
        Ok(details)
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InventoryError::invalid("name must not be empty"));
    }
    Ok(name.to_string())
}

fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(InventoryError::invalid(format!(
            "price must be a non-negative number, got {price}"
        )));
    }
    Ok(price)
}

fn validate_non_negative(field: &str, value: i64) -> Result<i64> {
    if value < 0 {
        return Err(InventoryError::invalid(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    Ok(value)
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulb() -> ProductDetails {
        ProductDetails {
            name: "Bulb A".to_string(),
            price: 3.5,
            supplier: Some("Acme".to_string()),
            category: Some("Lighting".to_string()),
            min_stock: 5,
        }
    }

    #[test]
    fn test_new_product_is_trimmed() {
        let (details, quantity) = NewProduct::new("  Bulb A ")
            .quantity(20)
            .price(3.5)
            .supplier(" Acme ")
            .category("   ")
            .min_stock(5)
            .validate()
            .unwrap();

        assert_eq!(details.name, "Bulb A");
        assert_eq!(details.supplier.as_deref(), Some("Acme"));
        assert_eq!(details.category, None);
        assert_eq!(quantity, 20);
    }

    #[test]
    fn test_new_product_rejects_bad_fields() {
        let cases = [
            NewProduct::new(" "),
            NewProduct::new("A").quantity(-1),
            NewProduct::new("A").price(-0.5),
            NewProduct::new("A").price(f64::NAN),
            NewProduct::new("A").min_stock(-2),
        ];
        for case in cases {
            let result = case.clone().validate();
            assert!(
                matches!(result, Err(InventoryError::InvalidInput(_))),
                "expected rejection for {case:?}"
            );
        }
    }

    #[test]
    fn test_new_product_defaults_from_json() {
        let input: NewProduct = serde_json::from_str(r#"{"name":"Fuse"}"#).unwrap();
        let (details, quantity) = input.validate().unwrap();
        assert_eq!(quantity, 0);
        assert_eq!(details.price, 0.0);
        assert_eq!(details.min_stock, 0);
    }

    #[test]
    fn test_patch_merges_present_fields() {
        let updated = ProductPatch::new()
            .price(4.0)
            .min_stock(2)
            .apply(&bulb())
            .unwrap();

        assert_eq!(updated.name, "Bulb A");
        assert_eq!(updated.price, 4.0);
        assert_eq!(updated.min_stock, 2);
        assert_eq!(updated.supplier.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_patch_empty_text_clears_field() {
        let updated = ProductPatch::new().supplier("").apply(&bulb()).unwrap();
        assert_eq!(updated.supplier, None);
        assert_eq!(updated.category.as_deref(), Some("Lighting"));
    }

    #[test]
    fn test_patch_rejects_quantity() {
        let patch: ProductPatch = serde_json::from_str(r#"{"quantity": 99}"#).unwrap();
        assert!(matches!(
            patch.apply(&bulb()),
            Err(InventoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_patch_rejects_blank_name() {
        let result = ProductPatch::new().name("  ").apply(&bulb());
        assert!(matches!(result, Err(InventoryError::InvalidInput(_))));
    }
}
