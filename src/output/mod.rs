pub mod block;
pub mod buffer;
pub mod dispatcher;

pub use block::{extract_last_block, strip_ansi};
pub use buffer::{OutputBuffer, OutputBuffers};
pub use dispatcher::{OutputCallback, OutputDispatcher};
