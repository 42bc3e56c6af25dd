mod ids;
mod secret;

pub use ids::*;
pub use secret::Secret;
