pub mod block_reward;
pub mod db;
pub mod env;
pub mod explorer_api;
pub mod log;
pub mod telemetry;

pub use block_reward::resolve_reward;
pub use telemetry::backfill_emissions;
pub use telemetry::track_emissions;
