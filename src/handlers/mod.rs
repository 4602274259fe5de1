pub mod checkout;
pub mod orders;
pub mod vouchers;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<crate::services::inventory::InventoryService>,
    pub discounts: Arc<crate::services::discounts::DiscountService>,
    pub vouchers: Arc<crate::services::vouchers::VoucherService>,
    pub flash_sales: Arc<crate::services::flash_sales::FlashSaleService>,
    pub carts: Arc<crate::services::carts::CartService>,
    pub checkout: Arc<crate::services::checkout::CheckoutService>,
    pub orders: Arc<crate::services::orders::OrderService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        let inventory = Arc::new(crate::services::inventory::InventoryService::new(
            db_pool.clone(),
        ));
        let discounts = Arc::new(crate::services::discounts::DiscountService::new(
            db_pool.clone(),
        ));
        let vouchers = Arc::new(crate::services::vouchers::VoucherService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let flash_sales = Arc::new(crate::services::flash_sales::FlashSaleService::new(
            db_pool.clone(),
        ));
        let carts = Arc::new(crate::services::carts::CartService::new(db_pool.clone()));
        let checkout = Arc::new(crate::services::checkout::CheckoutService::new(
            db_pool.clone(),
            inventory.clone(),
            discounts.clone(),
            vouchers.clone(),
        ));
        let orders = Arc::new(crate::services::orders::OrderService::new(
            db_pool,
            checkout.clone(),
            inventory.clone(),
            vouchers.clone(),
            flash_sales.clone(),
            carts.clone(),
            event_sender,
        ));

        Self {
            inventory,
            discounts,
            vouchers,
            flash_sales,
            carts,
            checkout,
            orders,
        }
    }
}
