//! System primitives, 110 through 116.

use memory::FileSystem;
use object::{FALSE_PTR, NIL_PTR, TRUE_PTR};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_system_primitives(&mut self) {
        match self.primitive_index {
            110 => self.primitive_equivalent(),
            111 => self.primitive_class(),
            112 => self.primitive_core_left(),
            113 => self.primitive_quit(),
            114 => self.primitive_exit_to_debugger(),
            115 => self.primitive_oops_left(),
            116 => self.primitive_signal_at_oops_left_words_left(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    pub(crate) fn primitive_equivalent(&mut self) {
        let other_object = self.pop_stack();
        let this_object = self.pop_stack();
        self.push(if this_object == other_object {
            TRUE_PTR
        } else {
            FALSE_PTR
        });
    }

    pub(crate) fn primitive_class(&mut self) {
        let this_object = self.pop_stack();
        let class = self.memory.fetch_class_of(this_object);
        self.push(class);
    }

    fn primitive_core_left(&mut self) {
        self.pop_stack();
        let free_words = self.memory.core_left();
        let result = self.positive_32bit_integer_for(free_words);
        self.push(result);
    }

    fn primitive_quit(&mut self) {
        self.hal.signal_quit();
    }

    fn primitive_exit_to_debugger(&mut self) {
        self.hal.exit_to_debugger();
    }

    fn primitive_oops_left(&mut self) {
        self.pop_stack();
        let free_oops = self.memory.oops_left();
        let result = self.positive_16bit_integer_for(free_oops as i32);
        self.push(result);
    }

    /// Install the low-space semaphore and its thresholds; the check
    /// re-arms when the host asks for it.
    fn primitive_signal_at_oops_left_words_left(&mut self) {
        let words_pointer = self.pop_stack();
        let words = self.positive_32bit_value_of(words_pointer);
        let oops_pointer = self.pop_stack();
        let oops = self.positive_32bit_value_of(oops_pointer);
        let semaphore = self.pop_stack();
        self.success(
            semaphore == NIL_PTR
                || self.memory.fetch_class_of(semaphore)
                    == object::CLASS_SEMAPHORE_PTR,
        );
        if self.success_value() {
            if self.low_space_semaphore != NIL_PTR {
                self.memory.decrease_references_to(self.low_space_semaphore);
            }
            self.low_space_semaphore = semaphore;
            if semaphore != NIL_PTR {
                self.memory.increase_references_to(semaphore);
            }
            self.oops_left_limit = oops;
            self.words_left_limit = words;
            self.memory_is_low = false;
        } else {
            self.un_pop(3);
        }
    }
}
