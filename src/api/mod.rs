pub mod handlers;
pub mod read;
pub mod routes;
pub mod state;
pub mod types;

pub use read::ReadApi;
pub use routes::create_router;
pub use state::AppState;
