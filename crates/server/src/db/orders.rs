//! `PostgreSQL` order repository.
//!
//! Queries are built at runtime with `sqlx::query` / `sqlx::query_as` so the
//! crate compiles without a reachable database or offline query cache.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use orderbox_core::{Delivery, Item, Order, OrderUid, Payment};

use super::{OrderStore, OrderSummary, RepositoryError, SaveOutcome};

const SUMMARY_COLUMNS: &str = "order_uid, track_number, entry, locale, internal_signature, \
     customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard";

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: Option<String>,
    email: Option<String>,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    transaction: String,
    request_id: Option<String>,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: Option<String>,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: Option<i64>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    chrt_id: i64,
    track_number: Option<String>,
    price: i64,
    rid: Option<String>,
    name: String,
    sale: Option<i32>,
    size: Option<String>,
    total_price: Option<i64>,
    nm_id: Option<i64>,
    brand: Option<String>,
    status: Option<i32>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

/// Order store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_delivery(&self, uid: &str) -> Result<Option<Delivery>, RepositoryError> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            r"
            SELECT name, phone, zip, city, address, region, email
            FROM delivery
            WHERE order_uid = $1
            ",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Delivery::from))
    }

    async fn fetch_payment(&self, uid: &str) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r"
            SELECT transaction, request_id, currency, provider, amount, payment_dt,
                   bank, delivery_cost, goods_total, custom_fee
            FROM payment
            WHERE order_uid = $1
            ",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Payment::from))
    }

    async fn fetch_items(&self, uid: &str) -> Result<Vec<Item>, RepositoryError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY position
            ",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }
}

/// Map write errors, surfacing unique violations as conflicts.
fn write_error(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

async fn insert_root(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r"
        INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                            customer_id, delivery_service, shardkey, sm_id,
                            date_created, oof_shard)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO NOTHING
        ",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shard_key)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut **tx)
    .await
    .map_err(|e| write_error(e, "order"))?;

    Ok(result.rows_affected())
}

async fn insert_delivery(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    delivery: &Delivery,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut **tx)
    .await
    .map_err(|e| write_error(e, "delivery"))?;

    Ok(())
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    payment: &Payment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO payment (transaction, order_uid, request_id, currency, provider, amount,
                             payment_dt, bank, delivery_cost, goods_total, custom_fee)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(&payment.transaction)
    .bind(order_uid)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut **tx)
    .await
    .map_err(|e| write_error(e, "payment transaction"))?;

    Ok(())
}

async fn insert_item(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    position: i32,
    item: &Item,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO items (order_uid, position, chrt_id, track_number, price, rid, name,
                           sale, size, total_price, nm_id, brand, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ",
    )
    .bind(order_uid)
    .bind(position)
    .bind(item.chrt_id)
    .bind(&item.track_number)
    .bind(item.price)
    .bind(&item.rid)
    .bind(&item.name)
    .bind(item.sale)
    .bind(&item.size)
    .bind(item.total_price)
    .bind(item.nm_id)
    .bind(&item.brand)
    .bind(item.status)
    .execute(&mut **tx)
    .await
    .map_err(|e| write_error(e, "item"))?;

    Ok(())
}

#[async_trait]
impl OrderStore for PgOrderStore {
    /// Any failing statement drops the transaction, which rolls back every
    /// row written before it.
    #[instrument(skip_all, fields(order_uid = %order.order_uid, items = order.items.len()))]
    async fn save_order(&self, order: &Order) -> Result<SaveOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if insert_root(&mut tx, order).await? == 0 {
            tx.rollback().await?;
            tracing::debug!("order already stored");
            return Ok(SaveOutcome::AlreadyStored);
        }

        insert_delivery(&mut tx, &order.order_uid, &order.delivery).await?;
        insert_payment(&mut tx, &order.order_uid, &order.payment).await?;

        for (index, item) in order.items.iter().enumerate() {
            let position = i32::try_from(index).map_err(|_| {
                RepositoryError::Conflict(format!("too many items in order {}", order.order_uid))
            })?;
            insert_item(&mut tx, &order.order_uid, position, item).await?;
        }

        tx.commit().await?;
        Ok(SaveOutcome::Inserted)
    }

    #[instrument(skip_all, fields(order_uid = %uid))]
    async fn get_order_by_id(&self, uid: &OrderUid) -> Result<Order, RepositoryError> {
        let summary = sqlx::query_as::<_, OrderSummary>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM orders WHERE order_uid = $1"
        ))
        .bind(uid.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let delivery = self.fetch_delivery(uid.as_str()).await?.ok_or_else(|| {
            RepositoryError::DataCorruption(format!("order {uid} has no delivery row"))
        })?;
        let payment = self.fetch_payment(uid.as_str()).await?.ok_or_else(|| {
            RepositoryError::DataCorruption(format!("order {uid} has no payment row"))
        })?;
        let items = self.fetch_items(uid.as_str()).await?;
        if items.is_empty() {
            return Err(RepositoryError::DataCorruption(format!(
                "order {uid} has no items"
            )));
        }

        Ok(Order {
            delivery,
            payment,
            items,
            ..summary.into_order()
        })
    }

    #[instrument(skip(self))]
    async fn list_order_summaries(
        &self,
        offset: usize,
        limit: NonZeroUsize,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderSummary>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM orders \
             ORDER BY created_at DESC, order_uid DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(i64::try_from(limit.get()).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[instrument(skip_all, fields(order_uid = %summary.order_uid))]
    async fn load_summary(&self, summary: OrderSummary) -> Result<Order, RepositoryError> {
        let uid = summary.order_uid.clone();

        let delivery = self.fetch_delivery(&uid).await?.unwrap_or_else(|| {
            tracing::warn!("stored order has no delivery row");
            Delivery::default()
        });
        let payment = self.fetch_payment(&uid).await?.unwrap_or_else(|| {
            tracing::warn!("stored order has no payment row");
            Payment::default()
        });
        let items = self.fetch_items(&uid).await?;

        Ok(Order {
            delivery,
            payment,
            items,
            ..summary.into_order()
        })
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
