pub mod error;
pub mod fallback;
pub mod history;
pub mod quote;

pub use error::GatewayError;
pub use history::fetch_history;
pub use quote::fetch_stock_snapshot;
