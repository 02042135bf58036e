pub mod middleware;
pub mod store;

pub use middleware::{AuthUser, InternalAuth};
pub use store::{MemoryTokens, TokenStore};
