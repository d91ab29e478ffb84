pub mod generation;
pub mod intake;
pub mod quota;
pub mod upload;

pub use generation::*;
pub use intake::*;
pub use quota::*;
pub use upload::*;
