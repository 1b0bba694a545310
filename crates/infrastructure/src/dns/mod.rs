pub mod replay;
pub mod server;
pub mod transport;

pub use replay::UdpQueryFlooder;
pub use server::{TestServer, UpstreamHandler};
pub use transport::SocketSutTransport;
