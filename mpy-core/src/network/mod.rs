pub mod demux;
pub mod session;
pub mod transport;

pub use demux::{Demux, ReadUntil};
pub use session::Session;
pub use transport::{
    BoxReader, BoxWriter, DeviceFileTransport, StreamTransport, TcpTransport, Transport,
    TransportHandle,
};
