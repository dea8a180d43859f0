pub mod input;

pub use input::{ExitCommandDetector, InputSignal};
