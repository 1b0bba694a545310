pub mod scenarios;
pub mod sut_stub;

pub use scenarios::*;
pub use sut_stub::*;
