//! Rate limiting logic and state management.

mod backend;
mod counter;
mod key;
mod limiter;
mod reaper;
mod store;

pub use backend::AdmissionControl;
pub use counter::WindowCounter;
pub use key::client_key;
pub use limiter::RateLimiter;
pub use reaper::Reaper;
pub use store::LimiterStore;
