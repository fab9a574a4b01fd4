pub mod promo_repo;
pub use promo_repo::{PgPromoRepository, PromoStore};
pub mod promo_cache;
pub use promo_cache::{PromoCache, RedisPromoCache};

#[cfg(test)]
pub mod memory;
