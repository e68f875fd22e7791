pub mod buffer;
pub mod codec;
pub mod frame;
pub mod msgtype;

pub use buffer::Buffer;
pub use codec::{Codec, CodecError, JsonCodec, MsgPackCodec};
pub use frame::{Frame, FrameError, HEADER_SIZE, MAX_PAYLOAD_SIZE};
