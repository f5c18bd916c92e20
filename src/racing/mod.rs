pub mod api;
pub mod fixture;
pub mod provider;

pub use api::RacingApi;
pub use fixture::FixtureProvider;
pub use provider::RaceDataProvider;
