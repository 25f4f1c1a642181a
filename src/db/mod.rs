pub mod pool;
pub mod schema;
pub mod user;

pub use pool::create_pool;
pub use schema::ensure_schema;
pub use user::{UserContext, DEFAULT_USER_ID};
