use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::storemodels::{NewProduct, ProductUpdate};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductDto {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    /// Minor currency units.
    #[validate(range(min = 1, max = 10_000_000_000, message = "Price must be between 0.01 and 100000000.00"))]
    pub price: i64,

    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,

    #[validate(url(message = "Invalid image URL"))]
    pub image_url: Option<String>,

    pub active: Option<bool>,
}

impl From<CreateProductDto> for NewProduct {
    fn from(dto: CreateProductDto) -> Self {
        NewProduct {
            title: dto.title.trim().to_string(),
            description: dto.description,
            price: dto.price,
            stock: dto.stock,
            image_url: dto.image_url,
            active: dto.active.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductDto {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 1, max = 10_000_000_000, message = "Price must be between 0.01 and 100000000.00"))]
    pub price: Option<i64>,

    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,

    pub active: Option<bool>,
}

impl From<UpdateProductDto> for ProductUpdate {
    fn from(dto: UpdateProductDto) -> Self {
        ProductUpdate {
            title: dto.title.map(|t| t.trim().to_string()),
            description: dto.description,
            price: dto.price,
            stock: dto.stock,
            image_url: None,
            active: dto.active,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProductQueryDto {
    pub mechanic_id: Option<Uuid>,
    #[validate(range(min = 1, max = 100_000))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckoutItemDto {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 99, message = "Quantity must be between 1 and 99"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutDto {
    #[validate(length(min = 1, message = "Cart is empty"), custom = "validate_quantities")]
    pub items: Vec<CheckoutItemDto>,
}

fn validate_quantities(items: &[CheckoutItemDto]) -> Result<(), ValidationError> {
    if items.iter().all(|item| item.validate().is_ok()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_quantity"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_price_must_be_positive() {
        let dto = CreateProductDto {
            title: "Brake pads".to_string(),
            description: None,
            price: 0,
            stock: 3,
            image_url: None,
            active: None,
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_product_price_is_capped() {
        let dto = CreateProductDto {
            title: "Brake pads".to_string(),
            description: None,
            price: 100_000_000_000_000_000,
            stock: 3,
            image_url: None,
            active: None,
        };
        assert!(dto.validate().is_err());

        let update = UpdateProductDto { price: Some(10_000_000_001), ..Default::default() };
        assert!(update.validate().is_err());
        let update = UpdateProductDto { price: Some(10_000_000_000), ..Default::default() };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_checkout_validates_nested_quantities() {
        let empty = CheckoutDto { items: vec![] };
        assert!(empty.validate().is_err());

        let zero = CheckoutDto {
            items: vec![CheckoutItemDto { product_id: Uuid::new_v4(), quantity: 0 }],
        };
        assert!(zero.validate().is_err());

        let ok = CheckoutDto {
            items: vec![CheckoutItemDto { product_id: Uuid::new_v4(), quantity: 2 }],
        };
        assert!(ok.validate().is_ok());
    }
}
