use crate::db::models::{
    CartLine, NewProduct, Order, OrderItem, OrderStatus, OrderWithItems, Product, ProductPatch,
};
use crate::db::sqlite::{Storage, check_opt, now, require_non_empty, require_non_negative};
use crate::error::VetdeskError;
use std::collections::BTreeMap;
use tracing::{info, warn};

impl Storage {
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, VetdeskError> {
        require_non_empty("name", &new.name)?;
        require_non_empty("sku", &new.sku)?;
        require_non_negative("price_cents", new.price_cents)?;
        require_non_negative("stock", new.stock)?;
        let ts = now();
        let product = sqlx::query_as::<_, Product>(
            r#"INSERT INTO products (name, sku, price_cents, stock, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(new.name)
        .bind(new.sku)
        .bind(new.price_cents)
        .bind(new.stock)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(product)
    }

    pub async fn get_product(&self, id: i64) -> Result<Product, VetdeskError> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("product", id))
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, VetdeskError> {
        let rows = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name, id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    pub async fn update_product(
        &self,
        id: i64,
        patch: ProductPatch,
    ) -> Result<Product, VetdeskError> {
        check_opt(patch.name.as_deref(), |n| require_non_empty("name", n))?;
        check_opt(patch.price_cents, |p| require_non_negative("price_cents", p))?;
        check_opt(patch.stock, |s| require_non_negative("stock", s))?;
        sqlx::query_as::<_, Product>(
            r#"UPDATE products SET
                name = COALESCE(?, name),
                price_cents = COALESCE(?, price_cents),
                stock = COALESCE(?, stock),
                updated_at = ?
              WHERE id = ?
              RETURNING *"#,
        )
        .bind(patch.name)
        .bind(patch.price_cents)
        .bind(patch.stock)
        .bind(now())
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| VetdeskError::not_found("product", id))
    }

    /// Products referenced by an order cannot be deleted; set stock to 0 instead.
    pub async fn delete_product(&self, id: i64) -> Result<(), VetdeskError> {
        let (ordered,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM order_items WHERE product_id = ?")
                .bind(id)
                .fetch_one(self.pool())
                .await?;
        if ordered > 0 {
            return Err(VetdeskError::validation(format!(
                "product {id} is referenced by {ordered} order line(s)"
            )));
        }
        let removed = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("product", id));
        }
        Ok(())
    }

    /// Turn cart lines into a pending order.
    ///
    /// Lines for the same product are merged. Stock is reserved and unit prices
    /// are captured inside one transaction; any invalid line rolls back the whole
    /// checkout.
    pub async fn checkout(
        &self,
        customer_email: &str,
        lines: &[CartLine],
    ) -> Result<OrderWithItems, VetdeskError> {
        require_non_empty("customer_email", customer_email)?;
        if lines.is_empty() {
            return Err(VetdeskError::validation("cart is empty"));
        }

        let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
        for line in lines {
            if line.quantity <= 0 {
                return Err(VetdeskError::validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            let slot = merged.entry(line.product_id).or_default();
            *slot = slot.checked_add(line.quantity).ok_or_else(|| {
                VetdeskError::validation(format!(
                    "quantity for product {} is too large",
                    line.product_id
                ))
            })?;
        }

        let ts = now();
        let mut tx = self.pool().begin().await?;

        let mut priced = Vec::with_capacity(merged.len());
        let mut total_cents: i64 = 0;
        for (product_id, quantity) in merged {
            let row: Option<(i64, i64)> =
                sqlx::query_as("SELECT price_cents, stock FROM products WHERE id = ?")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let (price_cents, stock) =
                row.ok_or_else(|| VetdeskError::not_found("product", product_id))?;
            if stock < quantity {
                return Err(VetdeskError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: stock,
                });
            }
            total_cents = price_cents
                .checked_mul(quantity)
                .and_then(|line_cents| total_cents.checked_add(line_cents))
                .ok_or_else(|| VetdeskError::validation("order total is too large"))?;
            sqlx::query("UPDATE products SET stock = stock - ?, updated_at = ? WHERE id = ?")
                .bind(quantity)
                .bind(ts)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            priced.push((product_id, quantity, price_cents));
        }

        let order = sqlx::query_as::<_, Order>(
            r#"INSERT INTO orders (customer_email, status, total_cents, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(customer_email.trim())
        .bind(OrderStatus::Pending)
        .bind(total_cents)
        .bind(ts)
        .bind(ts)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for (product_id, quantity, unit_price_cents) in priced {
            let item = sqlx::query_as::<_, OrderItem>(
                r#"INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                   VALUES (?, ?, ?, ?)
                   RETURNING *"#,
            )
            .bind(order.id)
            .bind(product_id)
            .bind(quantity)
            .bind(unit_price_cents)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        tx.commit().await?;
        info!(
            order_id = order.id,
            total_cents,
            items = items.len(),
            "checkout completed"
        );
        Ok(OrderWithItems { order, items })
    }

    pub async fn get_order(&self, id: i64) -> Result<OrderWithItems, VetdeskError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("order", id))?;
        let items =
            sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(self.pool())
                .await?;
        Ok(OrderWithItems { order, items })
    }

    pub async fn list_orders(&self, customer_email: Option<&str>) -> Result<Vec<Order>, VetdeskError> {
        let rows = match customer_email {
            Some(email) => {
                sqlx::query_as::<_, Order>(
                    "SELECT * FROM orders WHERE customer_email = ? ORDER BY created_at DESC, id DESC",
                )
                .bind(email)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC, id DESC")
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows)
    }

    /// Move a pending order to `paid` or `cancelled`. Cancelling puts the
    /// reserved stock back. Setting the current status again is a no-op.
    pub async fn set_order_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<OrderWithItems, VetdeskError> {
        let current = self.get_order(id).await?;
        if current.order.status == status {
            return Ok(current);
        }
        if current.order.status != OrderStatus::Pending {
            warn!(order_id = id, from = %current.order.status, to = %status, "rejected order transition");
            return Err(VetdeskError::validation(format!(
                "order {id} is already {}",
                current.order.status
            )));
        }

        let ts = now();
        let mut tx = self.pool().begin().await?;
        if status == OrderStatus::Cancelled {
            for item in &current.items {
                sqlx::query("UPDATE products SET stock = stock + ?, updated_at = ? WHERE id = ?")
                    .bind(item.quantity)
                    .bind(ts)
                    .bind(item.product_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ? RETURNING *",
        )
        .bind(status)
        .bind(ts)
        .bind(id)
        .bind(OrderStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| VetdeskError::validation(format!("order {id} changed concurrently")))?;
        tx.commit().await?;

        Ok(OrderWithItems {
            order,
            items: current.items,
        })
    }
}
