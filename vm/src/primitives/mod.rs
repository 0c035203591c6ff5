//! The numbered primitives.
//!
//! A primitive either completes a send on the spot, leaving its result
//! on the stack with the arguments consumed, or fails and lets the send
//! fall through to the method body. Families are dispatched by index
//! range, one module each.

mod arithmetic;
mod array_stream;
mod control;
mod float;
mod io;
mod posix;
mod storage;
mod system;

use memory::FileSystem;

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_primitives(&mut self) {
        match self.primitive_index {
            1..=19 => self.dispatch_arithmetic_primitives(),
            // large-integer arithmetic is deliberately left to the
            // image; the methods carry full fallback code
            20..=39 => {
                self.primitive_fail();
            }
            40..=59 => self.dispatch_float_primitives(),
            60..=67 => self.dispatch_subscript_and_stream_primitives(),
            68..=79 => self.dispatch_storage_management_primitives(),
            80..=89 => self.dispatch_control_primitives(),
            90..=109 => self.dispatch_input_output_primitives(),
            110..=127 => self.dispatch_system_primitives(),
            _ => self.dispatch_private_primitives(),
        }
    }
}
