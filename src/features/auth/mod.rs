pub mod model;
pub mod service;

pub use model::AuthOutcome;
pub use service::AuthService;
