pub mod api;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod fallback;
pub mod gateway;
pub mod logging;
pub mod observer;
pub mod prompt;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod ui;
pub mod ws;

pub use coordinator::{ScreeningCoordinator, ScreeningOutcome, ScreeningRequest};
pub use fallback::{DualReviewer, FallbackChain};
pub use observer::{ScreeningEvent, ScreeningObserver};
pub use store::ScreeningStore;
