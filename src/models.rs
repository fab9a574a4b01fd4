pub mod promo;
pub mod promo_payload;
