pub mod artifact;
pub mod bootstrap;
pub mod deferred;
pub mod error;
pub mod id;
pub mod image;
pub mod interceptor;
pub mod plot;

pub use bootstrap::Installation;
pub use interceptor::{BindingSummary, Interceptor};
