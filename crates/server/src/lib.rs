//! locmap coordinator library.
//!
//! The binary (`locmapd`) wires these pieces together: the axum router
//! (scanner / admin / public endpoints), the feeder, the reaper, and
//! the metrics updater, all over one shared [`state::AppState`].

pub mod auth;
pub mod error;
pub mod feeder;
pub mod handlers;
pub mod metrics;
pub mod reaper;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
