pub mod cart_item;
pub mod customer_address;
pub mod discount;
pub mod flash_sale;
pub mod flash_sale_purchase;
pub mod inventory_level;
pub mod order;
pub mod order_item;
pub mod payment_method;
pub mod product;
pub mod product_variant;
pub mod shipping_method;
pub mod user_voucher;
pub mod voucher;

pub use cart_item::Entity as CartItem;
pub use customer_address::Entity as CustomerAddress;
pub use discount::Entity as Discount;
pub use flash_sale::Entity as FlashSale;
pub use flash_sale_purchase::Entity as FlashSalePurchase;
pub use inventory_level::Entity as InventoryLevel;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment_method::Entity as PaymentMethod;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
pub use shipping_method::Entity as ShippingMethod;
pub use user_voucher::Entity as UserVoucher;
pub use voucher::Entity as Voucher;
