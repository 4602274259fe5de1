pub mod carts;
pub mod checkout;
pub mod discounts;
pub mod flash_sales;
pub mod inventory;
pub mod orders;
pub mod vouchers;
