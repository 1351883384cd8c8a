pub mod api_server;
pub mod chain_logs;
pub mod postgres;

pub use api_server::start_api_server;
pub use chain_logs::{LogPoller, PollerSettings};
pub use postgres::PostgresStore;
