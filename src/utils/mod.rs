pub mod card_cache;
pub mod card_filter;
