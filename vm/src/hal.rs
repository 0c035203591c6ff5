//! The hardware abstraction layer.
//!
//! Everything the interpreter wants from the outside world goes through
//! this trait: clocks, cursor and display notifications, the input word
//! queue, timer scheduling and process lifetime. Hosts stay free to be a
//! window, a terminal, or nothing at all.

use object::Oop;

pub trait Hal {
    /// Seconds since 00:00 on 1 January 1901 UTC.
    fn smalltalk_epoch_time(&mut self) -> u32;

    /// Milliseconds since an arbitrary epoch, wrapping at 32 bits.
    fn msclock(&mut self) -> u32;

    /// Schedule an asynchronous signal of `semaphore` once the
    /// millisecond clock passes `msclock_time`. A new request replaces
    /// any outstanding one; semaphore 0 cancels.
    fn signal_at(&mut self, semaphore: Oop, msclock_time: u32);

    /// The cursor form, one word per row.
    fn set_cursor_image(&mut self, image: &[u16; 16]);

    fn set_cursor_location(&mut self, x: i32, y: i32);

    fn cursor_location(&mut self) -> (i32, i32);

    /// Whether the cursor follows the pointing device.
    fn set_link_cursor(&mut self, link: bool);

    /// Answers whether the size actually changed.
    fn set_display_size(&mut self, width: u16, height: u16) -> bool;

    /// A rectangle of the display form was redrawn.
    fn display_changed(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// The semaphore to signal for every queued input word.
    fn set_input_semaphore(&mut self, semaphore: Oop);

    /// Pop the next 16-bit event word, if any.
    fn next_input_word(&mut self) -> Option<u16>;

    /// Ask the host to leave its run loop after the current cycle.
    fn signal_quit(&mut self);

    /// Hard stop for `exitToDebugger`.
    fn exit_to_debugger(&mut self) -> !;

    /// Fatal VM error; does not return.
    fn error(&mut self, message: &str) -> !;

    fn image_name(&self) -> &str;

    fn set_image_name(&mut self, name: &str);
}
