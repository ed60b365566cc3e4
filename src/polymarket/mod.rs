pub mod classifier;
pub mod client;
pub mod prices;
pub mod provider;

pub use classifier::{build_bundles, split_teams};
pub use client::{EventQuery, PolymarketClient};
pub use prices::PriceResolver;
pub use provider::MarketDataProvider;
