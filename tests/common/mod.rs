// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::db::{self, DbPool};
use storefront_api::entities::discount::DiscountType;
use storefront_api::entities::flash_sale::FlashSaleStatus;
use storefront_api::entities::voucher::VoucherStatus;
use storefront_api::entities::{
    customer_address, discount, flash_sale, payment_method, product, product_variant,
    shipping_method, voucher,
};
use storefront_api::events::{process_events, EventSender};
use storefront_api::handlers::AppServices;

/// Test harness around an in-memory SQLite database with migrations applied.
///
/// The pool is pinned to a single connection; each SQLite `:memory:`
/// connection is its own database, so a larger pool would scatter state.
pub struct TestCtx {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub event_sender: EventSender,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestCtx {
    pub async fn new() -> Self {
        let pool = db::establish_connection("sqlite::memory:", 1)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool).await.expect("migrations failed");
        let db = Arc::new(pool);

        let (tx, rx) = mpsc::channel(100);
        let event_sender = EventSender::new(tx);
        let event_task = tokio::spawn(process_events(rx));

        let services = AppServices::new(db.clone(), event_sender.clone());
        Self {
            db,
            services,
            event_sender,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(&self, name: &str, base_price: Decimal) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            base_price: Set(base_price),
            sold_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed product");
        id
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        price_override: Option<Decimal>,
        stock: i32,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product_variant::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            sku: Set(sku.to_string()),
            name: Set(format!("{} default", sku)),
            price_override: Set(price_override),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant");

        self.services
            .inventory
            .set_level(&*self.db, id, stock)
            .await
            .expect("seed stock");
        id
    }

    pub async fn seed_shipping_method(&self, name: &str, fee: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        shipping_method::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            fee: Set(fee),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed shipping method");
        id
    }

    pub async fn seed_payment_method(&self, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        payment_method::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            name: Set(code.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed payment method");
        id
    }

    pub async fn seed_address(&self, user_id: Uuid, is_default: bool) -> Uuid {
        let id = Uuid::new_v4();
        customer_address::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            recipient: Set("Test Recipient".to_string()),
            phone: Set("555-0100".to_string()),
            line1: Set("1 Test Street".to_string()),
            city: Set("Testville".to_string()),
            region: Set("TS".to_string()),
            is_default: Set(is_default),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed address");
        id
    }

    pub async fn seed_voucher(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        max_discount: Option<Decimal>,
        min_order_value: Option<Decimal>,
        usage_limit: Option<i32>,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        voucher::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(value),
            max_discount: Set(max_discount),
            min_order_value: Set(min_order_value),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            starts_at: Set(now - Duration::days(1)),
            ends_at: Set(now + Duration::days(30)),
            status: Set(VoucherStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed voucher");
        id
    }

    pub async fn seed_discount(
        &self,
        product_id: Uuid,
        discount_type: DiscountType,
        value: Decimal,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        discount::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            discount_type: Set(discount_type),
            value: Set(value),
            starts_at: Set(now - Duration::hours(1)),
            ends_at: Set(now + Duration::days(7)),
            is_active: Set(true),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed discount");
        id
    }

    pub async fn seed_flash_sale(&self, product_id: Uuid, max_purchase_quantity: i32) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        flash_sale::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            discount_type: Set(DiscountType::Percentage),
            discount_value: Set(Decimal::ZERO),
            quantity: Set(100),
            sold: Set(0),
            starts_at: Set(now - Duration::hours(1)),
            ends_at: Set(now + Duration::hours(1)),
            status: Set(FlashSaleStatus::Active),
            max_purchase_quantity: Set(max_purchase_quantity),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed flash sale");
        id
    }
}
