pub mod codec;
pub mod dispatch;
pub mod frame;
pub mod socket;

pub use codec::{decode_value, encode_value, kind_wire_tag, type_signature};
pub use dispatch::Dispatcher;
pub use frame::{Frame, MessageType, HEADER_LEN, MAGIC};
pub use socket::Socket;
