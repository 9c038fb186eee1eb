// service/cart.rs
//! Client-local shopping cart. Lines are keyed by product id and carry a
//! snapshot of price, title and image so the cart renders offline. The cart is
//! persisted through a [`CartStore`] and never synced to the server; checkout
//! sends only product ids and quantities.
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dtos::storedtos::{CheckoutDto, CheckoutItemDto},
    models::storemodels::{OrderItem, Product},
    utils::currency::apply_basis_points,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Flat fee in minor units, charged once per non-empty cart.
    pub shipping_fee: i64,
    pub tax_rate_bps: i64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_fee: 1_000,
            tax_rate_bps: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: i64,
    pub tax: i64,
    pub shipping: i64,
    pub total: i64,
}

impl CartTotals {
    /// `None` when any part of the total overflows `i64`.
    pub fn compute(subtotal: i64, policy: &PricingPolicy) -> Option<Self> {
        if subtotal <= 0 {
            return Some(Self { subtotal: 0, tax: 0, shipping: 0, total: 0 });
        }
        let tax = apply_basis_points(subtotal, policy.tax_rate_bps)?;
        let shipping = policy.shipping_fee;
        Some(Self {
            subtotal,
            tax,
            shipping,
            total: subtotal.checked_add(tax)?.checked_add(shipping)?,
        })
    }

    pub fn for_items(items: &[OrderItem], policy: &PricingPolicy) -> Option<Self> {
        let subtotal = checked_sum(items.iter().map(OrderItem::line_total))?;
        Self::compute(subtotal, policy)
    }
}

fn checked_sum(mut lines: impl Iterator<Item = Option<i64>>) -> Option<i64> {
    lines.try_fold(0i64, |acc, line| acc.checked_add(line?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: i64,
    pub title: String,
    pub image_url: Option<String>,
}

impl CartLine {
    pub fn line_total(&self) -> Option<i64> {
        self.price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: BTreeMap<Uuid, CartLine>,
}

impl Cart {
    pub const MAX_QUANTITY: i32 = 99;

    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of a product, refreshing the price/title/image snapshot.
    pub fn add(&mut self, product: &Product, quantity: i32) {
        if quantity <= 0 {
            return;
        }
        let line = self.lines.entry(product.id).or_insert_with(|| CartLine {
            product_id: product.id,
            quantity: 0,
            price: product.price,
            title: product.title.clone(),
            image_url: product.image_url.clone(),
        });
        line.quantity = (line.quantity + quantity).min(Self::MAX_QUANTITY);
        line.price = product.price;
        line.title = product.title.clone();
        line.image_url = product.image_url.clone();
    }

    /// Sets a line's quantity; zero or less removes it.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: i32) {
        if quantity <= 0 {
            self.lines.remove(&product_id);
        } else if let Some(line) = self.lines.get_mut(&product_id) {
            line.quantity = quantity.min(Self::MAX_QUANTITY);
        }
    }

    pub fn remove(&mut self, product_id: Uuid) -> Option<CartLine> {
        self.lines.remove(&product_id)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn item_count(&self) -> i32 {
        self.lines.values().map(|l| l.quantity).sum()
    }

    pub fn subtotal(&self) -> Option<i64> {
        checked_sum(self.lines.values().map(CartLine::line_total))
    }

    pub fn totals(&self, policy: &PricingPolicy) -> Option<CartTotals> {
        CartTotals::compute(self.subtotal()?, policy)
    }

    pub fn to_checkout(&self) -> CheckoutDto {
        CheckoutDto {
            items: self
                .lines
                .values()
                .map(|line| CheckoutItemDto {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
        }
    }
}

/// On-device persistence for the cart.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self) -> io::Result<Cart>;

    async fn save(&self, cart: &Cart) -> io::Result<()>;
}

/// Stores the cart as a JSON file. A missing or unreadable file loads as an empty cart.
#[derive(Debug, Clone)]
pub struct FileCartStore {
    path: PathBuf,
}

impl FileCartStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CartStore for FileCartStore {
    async fn load(&self) -> io::Result<Cart> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable cart file {:?}: {}", self.path, e);
                Cart::default()
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Cart::default()),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, cart: &Cart) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(cart).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&self.path, bytes).await
    }
}
