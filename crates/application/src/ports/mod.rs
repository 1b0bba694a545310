mod fake_clock;
mod query_flooder;
mod sut_transport;

pub use fake_clock::FakeClock;
pub use query_flooder::{QueryFlooder, ReplayReport, ReplayRequest};
pub use sut_transport::{SutRequest, SutTransport};
