use async_trait::async_trait;
use sqlx::{types::Json, Error};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::storemodels::*;

const PRODUCT_COLUMNS: &str = r#"
    id, mechanic_id, title, description, price, stock, image_url, active,
    created_at, updated_at
"#;

const ORDER_COLUMNS: &str = r#"
    id, user_id, items, subtotal, tax, shipping, total_amount,
    payment_reference, status, created_at
"#;

#[async_trait]
pub trait ProductExt {
    async fn create_product(&self, mechanic_id: Uuid, product: NewProduct) -> Result<Product, Error>;

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, Error>;

    async fn get_products_by_ids(&self, product_ids: &[Uuid]) -> Result<Vec<Product>, Error>;

    async fn get_active_products(
        &self,
        mechanic_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, Error>;

    async fn get_mechanic_products(&self, mechanic_id: Uuid) -> Result<Vec<Product>, Error>;

    /// Only the owning mechanic's row is touched; `None` otherwise.
    async fn update_product(
        &self,
        product_id: Uuid,
        mechanic_id: Uuid,
        update: ProductUpdate,
    ) -> Result<Option<Product>, Error>;
}

#[async_trait]
pub trait OrderExt {
    async fn create_order(&self, user_id: Uuid, order: NewOrder) -> Result<Order, Error>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, Error>;

    async fn get_user_orders(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Order>, Error>;
}

#[async_trait]
impl ProductExt for DBClient {
    async fn create_product(&self, mechanic_id: Uuid, product: NewProduct) -> Result<Product, Error> {
        let sql = format!(
            r#"
            INSERT INTO products (mechanic_id, title, description, price, stock, image_url, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Product>(&sql)
                .bind(mechanic_id)
                .bind(product.title)
                .bind(product.description)
                .bind(product.price)
                .bind(product.stock)
                .bind(product.image_url)
                .bind(product.active)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, Error> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Product>(&sql)
                .bind(product_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_products_by_ids(&self, product_ids: &[Uuid]) -> Result<Vec<Product>, Error> {
        let sql = format!("SELECT {} FROM products WHERE id = ANY($1)", PRODUCT_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Product>(&sql)
                .bind(product_ids.to_vec())
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_active_products(
        &self,
        mechanic_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE active = true
              AND ($1::uuid IS NULL OR mechanic_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            PRODUCT_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Product>(&sql)
                .bind(mechanic_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn get_mechanic_products(&self, mechanic_id: Uuid) -> Result<Vec<Product>, Error> {
        let sql = format!(
            "SELECT {} FROM products WHERE mechanic_id = $1 ORDER BY created_at DESC",
            PRODUCT_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Product>(&sql)
                .bind(mechanic_id)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn update_product(
        &self,
        product_id: Uuid,
        mechanic_id: Uuid,
        update: ProductUpdate,
    ) -> Result<Option<Product>, Error> {
        let sql = format!(
            r#"
            UPDATE products
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                stock = COALESCE($6, stock),
                image_url = COALESCE($7, image_url),
                active = COALESCE($8, active),
                updated_at = NOW()
            WHERE id = $1 AND mechanic_id = $2
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Product>(&sql)
                .bind(product_id)
                .bind(mechanic_id)
                .bind(update.title)
                .bind(update.description)
                .bind(update.price)
                .bind(update.stock)
                .bind(update.image_url)
                .bind(update.active)
                .fetch_optional(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl OrderExt for DBClient {
    async fn create_order(&self, user_id: Uuid, order: NewOrder) -> Result<Order, Error> {
        let sql = format!(
            r#"
            INSERT INTO orders
                (user_id, items, subtotal, tax, shipping, total_amount, payment_reference, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'paid'::order_status)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Order>(&sql)
                .bind(user_id)
                .bind(Json(order.items))
                .bind(order.subtotal)
                .bind(order.tax)
                .bind(order.shipping)
                .bind(order.total_amount)
                .bind(order.payment_reference)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, Error> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        self.timed(
            sqlx::query_as::<_, Order>(&sql)
                .bind(order_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn get_user_orders(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Order>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            ORDER_COLUMNS
        );
        self.timed(
            sqlx::query_as::<_, Order>(&sql)
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
    }
}
