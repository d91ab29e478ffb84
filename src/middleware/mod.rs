pub mod metrics;
pub mod session;

pub use self::metrics::*;
pub use self::session::*;
