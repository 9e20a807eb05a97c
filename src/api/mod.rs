pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use server::ApiServer;
