pub mod antifraud;
pub mod code_pool;
pub mod company_directory;
pub mod promo_service;

pub use promo_service::PromoService;
