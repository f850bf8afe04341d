pub mod http_provider;
pub mod price_provider;

pub use http_provider::HttpPriceProvider;
pub use price_provider::PriceProvider;
