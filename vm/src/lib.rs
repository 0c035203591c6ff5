mod bitblt;
pub mod bootstrap;
mod bytecodes;
mod dispatch;
mod hal;
mod host;
mod interpreter;
mod process;
mod primitives;

pub use hal::Hal;
pub use host::HeadlessHal;
pub use interpreter::Interpreter;
pub use process::{SignalBuffer, SIGNAL_BUFFER_CAPACITY};
