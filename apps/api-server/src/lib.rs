pub mod ai;
pub mod config;
pub mod error;
pub mod router;
mod routes;
mod state;

pub use state::AppState;

pub mod exports {
    pub mod standalone {
        pub use crate::standalone::*;
    }
}

mod standalone;
