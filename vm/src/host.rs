//! A windowless host.
//!
//! Gives the interpreter real clocks, a scripted input queue and a
//! record of display damage, with no window system behind it. The CLI
//! runs against it, and the integration tests inspect it directly.

use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use object::{pack_event, EventType, Oop};
use tracing::debug;

use crate::hal::Hal;
use crate::process::SignalBuffer;

/// Seconds between 1901-01-01 and the Unix epoch.
const SMALLTALK_EPOCH_OFFSET: u32 = 2_177_452_800;

pub struct HeadlessHal {
    started: Instant,
    image_name: String,
    signals: Option<SignalBuffer>,

    input_queue: VecDeque<u16>,
    input_semaphore: Oop,
    event_count: u32,
    last_event_time: u32,

    scheduled_semaphore: Oop,
    scheduled_time: u32,

    pub quit_signalled: bool,
    pub display_width: u16,
    pub display_height: u16,
    /// Rectangles reported through `display_changed`.
    pub damage: Vec<(i32, i32, i32, i32)>,
    pub cursor_image: [u16; 16],
    pub cursor_location: (i32, i32),
}

impl HeadlessHal {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            image_name: image_name.into(),
            signals: None,
            input_queue: VecDeque::new(),
            input_semaphore: 0,
            event_count: 0,
            last_event_time: 0,
            scheduled_semaphore: 0,
            scheduled_time: 0,
            quit_signalled: false,
            display_width: 0,
            display_height: 0,
            damage: Vec::new(),
            cursor_image: [0; 16],
            cursor_location: (0, 0),
        }
    }

    /// Wire up the interpreter's signal buffer; events queued before
    /// this are lost.
    pub fn attach_signals(&mut self, signals: SignalBuffer) {
        self.signals = Some(signals);
    }

    fn asynchronous_signal(&self, semaphore: Oop) {
        if semaphore != 0 {
            if let Some(signals) = &self.signals {
                signals.asynchronous_signal(semaphore);
            }
        }
    }

    /// Fire the scheduled timer semaphore if its time has come; hosts
    /// call this between cycle batches.
    pub fn check_scheduled_semaphore(&mut self) {
        if self.scheduled_semaphore != 0 {
            let now = self.started.elapsed().as_millis() as u32;
            if now >= self.scheduled_time {
                let semaphore = self.scheduled_semaphore;
                self.scheduled_semaphore = 0;
                self.asynchronous_signal(semaphore);
            }
        }
    }

    /// Queue one raw event word and signal the input semaphore.
    pub fn queue_input_word(&mut self, word: u16) {
        self.input_queue.push_back(word);
        self.asynchronous_signal(self.input_semaphore);
    }

    pub fn queue_event(&mut self, event_type: EventType, parameter: u16) {
        self.queue_input_word(pack_event(event_type, parameter));
    }

    /// The time words every event group starts with: a small delta, or
    /// an absolute timestamp when the gap is too wide for twelve bits.
    pub fn queue_time_words(&mut self) {
        let now = self.msclock();
        let delta = if self.event_count == 0 {
            0
        } else {
            now.wrapping_sub(self.last_event_time)
        };
        self.event_count += 1;
        if delta <= 4095 {
            self.queue_event(EventType::DeltaTime, delta as u16);
        } else {
            let absolute = self.smalltalk_epoch_time();
            self.queue_event(EventType::AbsoluteTime, 0);
            self.queue_input_word((absolute >> 16) as u16);
            self.queue_input_word((absolute & 0xFFFF) as u16);
        }
        self.last_event_time = now;
    }

    /// A button or key transition, with its leading time words.
    pub fn queue_bistate_event(&mut self, down: bool, code: u16) {
        self.queue_time_words();
        self.queue_event(
            if down {
                EventType::BistateDown
            } else {
                EventType::BistateUp
            },
            code,
        );
    }

    pub fn queue_pointer_event(&mut self, x: u16, y: u16) {
        self.queue_time_words();
        self.queue_event(EventType::PointerX, x);
        self.queue_time_words();
        self.queue_event(EventType::PointerY, y);
    }
}

impl Hal for HeadlessHal {
    fn smalltalk_epoch_time(&mut self) -> u32 {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0) as u32;
        unix.wrapping_add(SMALLTALK_EPOCH_OFFSET)
    }

    fn msclock(&mut self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    fn signal_at(&mut self, semaphore: Oop, msclock_time: u32) {
        self.scheduled_semaphore = semaphore;
        self.scheduled_time = msclock_time;
        if semaphore != 0 {
            self.check_scheduled_semaphore();
        }
    }

    fn set_cursor_image(&mut self, image: &[u16; 16]) {
        self.cursor_image = *image;
    }

    fn set_cursor_location(&mut self, x: i32, y: i32) {
        self.cursor_location = (x, y);
    }

    fn cursor_location(&mut self) -> (i32, i32) {
        self.cursor_location
    }

    fn set_link_cursor(&mut self, _link: bool) {}

    fn set_display_size(&mut self, width: u16, height: u16) -> bool {
        if self.display_width == width && self.display_height == height {
            return false;
        }
        debug!(width, height, "display size set");
        self.display_width = width;
        self.display_height = height;
        true
    }

    fn display_changed(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.damage.push((x, y, width, height));
    }

    fn set_input_semaphore(&mut self, semaphore: Oop) {
        self.input_semaphore = semaphore;
    }

    fn next_input_word(&mut self) -> Option<u16> {
        self.input_queue.pop_front()
    }

    fn signal_quit(&mut self) {
        self.quit_signalled = true;
    }

    fn exit_to_debugger(&mut self) -> ! {
        panic!("image exited to the debugger");
    }

    fn error(&mut self, message: &str) -> ! {
        panic!("fatal interpreter error: {message}");
    }

    fn image_name(&self) -> &str {
        &self.image_name
    }

    fn set_image_name(&mut self, name: &str) {
        self.image_name = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_first_event_gets_a_zero_delta() {
        let mut hal = HeadlessHal::new("test.im");
        hal.queue_bistate_event(true, object::RED_BUTTON);
        assert_eq!(hal.next_input_word(), Some(0x0000));
        assert_eq!(hal.next_input_word(), Some(0x3082));
        assert_eq!(hal.next_input_word(), None);
    }

    #[test]
    fn pointer_events_carry_both_coordinates() {
        let mut hal = HeadlessHal::new("test.im");
        hal.queue_pointer_event(100, 200);
        assert_eq!(hal.next_input_word(), Some(0x0000));
        assert_eq!(hal.next_input_word(), Some(0x1064));
        let _delta = hal.next_input_word().expect("second time word");
        assert_eq!(hal.next_input_word(), Some(0x20C8));
    }

    #[test]
    fn an_elapsed_timer_fires_once() {
        let mut hal = HeadlessHal::new("test.im");
        let signals = SignalBuffer::new();
        hal.attach_signals(signals.clone());
        hal.signal_at(42, 0);
        assert_eq!(signals.drain(), vec![42]);
        hal.check_scheduled_semaphore();
        assert!(signals.drain().is_empty());
    }

    #[test]
    fn quit_is_observable() {
        let mut hal = HeadlessHal::new("test.im");
        assert!(!hal.quit_signalled);
        hal.signal_quit();
        assert!(hal.quit_signalled);
    }
}
