//! Demo traffic producer.
//!
//! Publishes into the in-process stream so a fresh deployment has something
//! to ingest. Odd ticks publish a random valid order, even ticks publish a
//! payload the pipeline must reject.

use std::time::Duration;

use chrono::{DurationRound, TimeDelta, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use orderbox_core::{Delivery, Item, Order, Payment};

use crate::ingest::ChannelPublisher;

const CITIES: &[&str] = &["Kiryat Mozkin", "Haifa", "Moscow", "Tbilisi", "Almaty"];
const BRANDS: &[&str] = &["Vivienne Sabo", "Nivea", "Maybelline", "Essence"];
const PRODUCTS: &[&str] = &["Mascaras", "Lipstick", "Eyeliner", "Hand cream"];
const CURRENCIES: &[&str] = &["USD", "EUR", "RUB"];

/// Publish demo payloads every `interval` until `shutdown` fires or the
/// stream goes away. Returns the number of payloads published.
pub async fn run_demo_producer(
    publisher: ChannelPublisher,
    interval: Duration,
    shutdown: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    let mut published = 0_u64;
    tracing::info!(interval_secs = interval.as_secs(), "Demo producer started");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let payload = if published % 2 == 0 {
            serde_json::to_vec(&sample_order()).unwrap_or_default()
        } else {
            malformed_payload()
        };

        let sent = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            sent = publisher.publish(payload) => sent,
        };

        match sent {
            Ok(offset) => {
                tracing::debug!(offset, "Demo payload published");
                published += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Demo producer stopping");
                break;
            }
        }
    }

    tracing::info!(published, "Demo producer stopped");
    published
}

/// A random order that passes validation.
#[must_use]
pub fn sample_order() -> Order {
    let mut rng = rand::rng();
    let order_uid = Uuid::new_v4().simple().to_string();
    let track_number = format!("WBIL{:010}", rng.random_range(0..10_000_000_000_u64));

    let item_count = rng.random_range(1..=3);
    let items: Vec<Item> = (0..item_count)
        .map(|_| {
            let price = rng.random_range(100..5_000);
            let sale = rng.random_range(0..=50);
            Item {
                chrt_id: rng.random_range(1_000_000..10_000_000),
                track_number: Some(track_number.clone()),
                price,
                rid: Some(Uuid::new_v4().simple().to_string()),
                name: pick(&mut rng, PRODUCTS),
                sale: Some(sale),
                size: Some("0".to_string()),
                total_price: Some(price * i64::from(100 - sale) / 100),
                nm_id: Some(rng.random_range(1_000_000..3_000_000)),
                brand: Some(pick(&mut rng, BRANDS)),
                status: Some(202),
            }
        })
        .collect();

    let goods_total: i64 = items.iter().filter_map(|item| item.total_price).sum();
    let delivery_cost = rng.random_range(0..2_000);
    let now = Utc::now();

    Order {
        order_uid: order_uid.clone(),
        track_number,
        entry: Some("WBIL".to_string()),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: format!("+972{:07}", rng.random_range(0..10_000_000)),
            zip: format!("{}", rng.random_range(1_000_000..9_999_999)),
            city: pick(&mut rng, CITIES),
            address: format!("Ploshad Mira {}", rng.random_range(1..200)),
            region: Some("Kraiot".to_string()),
            email: Some("test@gmail.com".to_string()),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: None,
            currency: pick(&mut rng, CURRENCIES),
            provider: "wbpay".to_string(),
            amount: goods_total + delivery_cost,
            payment_dt: now.timestamp(),
            bank: Some("alpha".to_string()),
            delivery_cost,
            goods_total,
            custom_fee: Some(0),
        },
        items,
        locale: Some("en".to_string()),
        internal_signature: None,
        customer_id: Some("test".to_string()),
        delivery_service: Some("meest".to_string()),
        shard_key: Some(rng.random_range(0..10).to_string()),
        sm_id: Some(rng.random_range(0..100)),
        date_created: Some(
            now.duration_trunc(TimeDelta::seconds(1))
                .unwrap_or(now),
        ),
        oof_shard: Some("1".to_string()),
    }
}

/// A payload that fails decoding or validation.
fn malformed_payload() -> Vec<u8> {
    if rand::rng().random_bool(0.5) {
        b"{\"order_uid\": \"broken\", \"items\": [".to_vec()
    } else {
        let order = Order {
            items: Vec::new(),
            ..sample_order()
        };
        serde_json::to_vec(&order).unwrap_or_default()
    }
}

fn pick(rng: &mut impl Rng, values: &[&str]) -> String {
    values.choose(rng).copied().unwrap_or_default().to_string()
}
