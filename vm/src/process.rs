//! Processes, semaphores and the asynchronous signal buffer.
//!
//! Smalltalk processes are cooperatively scheduled inside the single
//! interpreter thread. The only state shared with host threads is the
//! bounded buffer of asynchronously signalled semaphores, drained in
//! FIFO order at the top of each interpreter cycle.

use std::collections::VecDeque;
use std::sync::Arc;

use memory::FileSystem;
use object::{
    Oop, ACTIVE_PROCESS_INDEX, EXCESS_SIGNALS_INDEX, FIRST_LINK_INDEX,
    LAST_LINK_INDEX, MY_LIST_INDEX, NEXT_LINK_INDEX, NIL_PTR, PRIORITY_INDEX,
    PROCESS_LISTS_INDEX, SCHEDULER_ASSOCIATION_PTR, SUSPENDED_CONTEXT_INDEX,
    VALUE_INDEX,
};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

/// Buffered asynchronous signals before the interpreter drains them.
pub const SIGNAL_BUFFER_CAPACITY: usize = 4096;

/// Cross-thread handle for delivering semaphore signals into the
/// interpreter. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct SignalBuffer {
    semaphores: Arc<Mutex<VecDeque<Oop>>>,
}

impl SignalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a semaphore signal from any thread. Overflow drops the
    /// signal and answers false; a host that overflows this is broken.
    pub fn asynchronous_signal(&self, semaphore: Oop) -> bool {
        let mut semaphores = self.semaphores.lock();
        if semaphores.len() >= SIGNAL_BUFFER_CAPACITY {
            warn!(semaphore, "asynchronous signal buffer overflow");
            return false;
        }
        semaphores.push_back(semaphore);
        true
    }

    /// Take every pending signal, oldest first.
    pub fn drain(&self) -> Vec<Oop> {
        let mut semaphores = self.semaphores.lock();
        semaphores.drain(..).collect()
    }

    /// Pending signals without draining them; collection roots.
    pub fn pending(&self) -> Vec<Oop> {
        self.semaphores.lock().iter().copied().collect()
    }
}

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    // ── Linked lists of processes ──────────────────────────────────

    pub(crate) fn is_empty_list(&self, linked_list: Oop) -> bool {
        self.memory.fetch_pointer(FIRST_LINK_INDEX, linked_list) == NIL_PTR
    }

    pub(crate) fn add_last_link_to_list(&mut self, link: Oop, linked_list: Oop) {
        if self.is_empty_list(linked_list) {
            self.memory.store_pointer(FIRST_LINK_INDEX, linked_list, link);
        } else {
            let last_link = self.memory.fetch_pointer(LAST_LINK_INDEX, linked_list);
            self.memory.store_pointer(NEXT_LINK_INDEX, last_link, link);
        }
        self.memory.store_pointer(LAST_LINK_INDEX, linked_list, link);
        self.memory.store_pointer(MY_LIST_INDEX, link, linked_list);
    }

    pub(crate) fn remove_first_link_of_list(&mut self, linked_list: Oop) -> Oop {
        let first = self.memory.fetch_pointer(FIRST_LINK_INDEX, linked_list);
        let last = self.memory.fetch_pointer(LAST_LINK_INDEX, linked_list);
        if first == last {
            self.memory.store_pointer(FIRST_LINK_INDEX, linked_list, NIL_PTR);
            self.memory.store_pointer(LAST_LINK_INDEX, linked_list, NIL_PTR);
        } else {
            let next = self.memory.fetch_pointer(NEXT_LINK_INDEX, first);
            self.memory.store_pointer(FIRST_LINK_INDEX, linked_list, next);
        }
        self.memory.store_pointer(NEXT_LINK_INDEX, first, NIL_PTR);
        self.memory.store_pointer(MY_LIST_INDEX, first, NIL_PTR);
        first
    }

    // ── Scheduler access ───────────────────────────────────────────

    pub(crate) fn scheduler_pointer(&self) -> Oop {
        self.memory
            .fetch_pointer(VALUE_INDEX, SCHEDULER_ASSOCIATION_PTR)
    }

    pub(crate) fn active_process(&self) -> Oop {
        if self.new_process_waiting {
            self.new_process
        } else {
            self.memory
                .fetch_pointer(ACTIVE_PROCESS_INDEX, self.scheduler_pointer())
        }
    }

    pub(crate) fn priority_of(&self, process: Oop) -> i16 {
        self.fetch_integer_field(PRIORITY_INDEX, process)
    }

    /// The run list for a priority (1-based, highest priority last).
    fn process_list_at(&self, priority: i16) -> Oop {
        let process_lists = self
            .memory
            .fetch_pointer(PROCESS_LISTS_INDEX, self.scheduler_pointer());
        self.memory
            .fetch_pointer(priority as usize - 1, process_lists)
    }

    fn highest_priority(&self) -> i16 {
        let process_lists = self
            .memory
            .fetch_pointer(PROCESS_LISTS_INDEX, self.scheduler_pointer());
        self.memory.fetch_word_length_of(process_lists) as i16
    }

    // ── Process switching ──────────────────────────────────────────

    /// Remove and answer the runnable process of highest priority.
    pub(crate) fn wake_highest_priority(&mut self) -> Oop {
        let mut priority = self.highest_priority();
        loop {
            if priority < 1 {
                self.error("no runnable process");
            }
            let process_list = self.process_list_at(priority);
            if !self.is_empty_list(process_list) {
                return self.remove_first_link_of_list(process_list);
            }
            priority -= 1;
        }
    }

    /// Put a process back on its priority's run list.
    pub(crate) fn sleep(&mut self, process: Oop) {
        let priority = self.priority_of(process);
        let process_list = self.process_list_at(priority);
        self.add_last_link_to_list(process, process_list);
    }

    /// Park the active process (without queueing it) and run the best
    /// candidate instead.
    pub(crate) fn suspend_active(&mut self) {
        let process = self.wake_highest_priority();
        self.transfer_to(process);
    }

    /// Make `process` runnable; pre-empt only a lower-priority active
    /// process.
    pub(crate) fn resume(&mut self, process: Oop) {
        let active = self.active_process();
        let active_priority = self.priority_of(active);
        let new_priority = self.priority_of(process);
        if new_priority > active_priority {
            self.sleep(active);
            self.transfer_to(process);
        } else {
            self.sleep(process);
        }
    }

    /// Defer the switch to the next safe point between bytecodes.
    pub(crate) fn transfer_to(&mut self, process: Oop) {
        self.new_process_waiting = true;
        self.memory.increase_references_to(process);
        if self.new_process != NIL_PTR {
            self.memory.decrease_references_to(self.new_process);
        }
        self.new_process = process;
        trace!(process, "process switch pending");
    }

    /// Perform a pending switch: save the registers into the active
    /// context, swap the scheduler's active process, reload from the
    /// new process's suspended context.
    pub(crate) fn check_process_switch(&mut self) {
        if !self.new_process_waiting {
            return;
        }
        self.new_process_waiting = false;
        let new_process = self.new_process;
        self.new_process = NIL_PTR;

        let active = self
            .memory
            .fetch_pointer(ACTIVE_PROCESS_INDEX, self.scheduler_pointer());
        self.memory
            .store_pointer(SUSPENDED_CONTEXT_INDEX, active, self.active_context);
        let scheduler = self.scheduler_pointer();
        self.memory
            .store_pointer(ACTIVE_PROCESS_INDEX, scheduler, new_process);
        let context = self
            .memory
            .fetch_pointer(SUSPENDED_CONTEXT_INDEX, new_process);
        self.new_active_context(context);
        self.memory.decrease_references_to(new_process);
    }

    // ── Semaphores ─────────────────────────────────────────────────

    pub(crate) fn synchronous_signal(&mut self, semaphore: Oop) {
        if self.is_empty_list(semaphore) {
            let excess =
                self.fetch_integer_field(EXCESS_SIGNALS_INDEX, semaphore);
            self.store_integer_field(
                EXCESS_SIGNALS_INDEX,
                semaphore,
                (excess + 1).into(),
            );
        } else {
            let process = self.remove_first_link_of_list(semaphore);
            self.resume(process);
        }
    }

    pub(crate) fn wait_on(&mut self, semaphore: Oop) {
        let excess =
            self.fetch_integer_field(EXCESS_SIGNALS_INDEX, semaphore);
        if excess > 0 {
            self.store_integer_field(
                EXCESS_SIGNALS_INDEX,
                semaphore,
                (excess - 1).into(),
            );
        } else {
            let active = self.active_process();
            self.add_last_link_to_list(active, semaphore);
            self.suspend_active();
        }
    }

    /// Process the buffered asynchronous signals, oldest first.
    pub(crate) fn drain_asynchronous_signals(&mut self) {
        for semaphore in self.signals.drain() {
            if semaphore != NIL_PTR && semaphore != 0 {
                self.synchronous_signal(semaphore);
            }
        }
    }
}
