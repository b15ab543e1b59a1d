pub mod handlers;
pub mod manager;
pub mod server;
pub mod state;
pub mod sweeper;

pub use manager::Manager;
pub use server::{build_router, run_server};
pub use state::{AppState, RespondRequest, RespondResponse};
pub use sweeper::spawn_sweeper;
