//! Float primitives, 40 through 59.
//!
//! Floats are two-word heap objects holding IEEE single-precision bits,
//! low word first. `exponent` and `timesTwoPower:` are optional in the
//! image and stay unimplemented.

use memory::FileSystem;
use object::{FALSE_PTR, CLASS_FLOAT_PTR, TRUE_PTR};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_float_primitives(&mut self) {
        match self.primitive_index {
            40 => self.primitive_as_float(),
            41 => self.primitive_float_add(),
            42 => self.primitive_float_subtract(),
            43 => self.primitive_float_less_than(),
            44 => self.primitive_float_greater_than(),
            45 => self.primitive_float_less_or_equal(),
            46 => self.primitive_float_greater_or_equal(),
            47 => self.primitive_float_equal(),
            48 => self.primitive_float_not_equal(),
            49 => self.primitive_float_multiply(),
            50 => self.primitive_float_divide(),
            51 => self.primitive_truncated(),
            52 => self.primitive_fractional_part(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    pub(crate) fn extract_float(&self, object_pointer: object::Oop) -> f32 {
        let low = self.memory.fetch_word(0, object_pointer) as u32;
        let high = self.memory.fetch_word(1, object_pointer) as u32;
        f32::from_bits((high << 16) | low)
    }

    pub(crate) fn pop_float(&mut self) -> f32 {
        let pointer = self.pop_stack();
        self.success(self.memory.fetch_class_of(pointer) == CLASS_FLOAT_PTR);
        if self.success_value() {
            self.extract_float(pointer)
        } else {
            0.0
        }
    }

    pub(crate) fn push_float(&mut self, value: f32) {
        let object_pointer = self
            .instantiate_words(CLASS_FLOAT_PTR, 2)
            .unwrap_or_else(|| self.out_of_memory());
        let bits = value.to_bits();
        self.memory.store_word(0, object_pointer, (bits & 0xFFFF) as u16);
        self.memory.store_word(1, object_pointer, (bits >> 16) as u16);
        self.push(object_pointer);
    }

    fn primitive_as_float(&mut self) {
        let receiver = self.pop_integer();
        if self.success_value() {
            self.push_float(receiver as f32);
        } else {
            self.un_pop(1);
        }
    }

    fn pop_two_floats(&mut self) -> (f32, f32) {
        let argument = self.pop_float();
        let receiver = self.pop_float();
        (receiver, argument)
    }

    fn push_float_result(&mut self, result: f32) {
        if self.success_value() {
            self.push_float(result);
        } else {
            self.un_pop(2);
        }
    }

    fn push_float_comparison(&mut self, result: bool) {
        if self.success_value() {
            self.push(if result { TRUE_PTR } else { FALSE_PTR });
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_float_add(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_result(receiver + argument);
    }

    fn primitive_float_subtract(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_result(receiver - argument);
    }

    fn primitive_float_multiply(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_result(receiver * argument);
    }

    fn primitive_float_divide(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.success(argument != 0.0);
        self.push_float_result(receiver / argument);
    }

    fn primitive_float_less_than(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_comparison(receiver < argument);
    }

    fn primitive_float_greater_than(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_comparison(receiver > argument);
    }

    fn primitive_float_less_or_equal(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_comparison(receiver <= argument);
    }

    fn primitive_float_greater_or_equal(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_comparison(receiver >= argument);
    }

    fn primitive_float_equal(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_comparison(receiver == argument);
    }

    fn primitive_float_not_equal(&mut self) {
        let (receiver, argument) = self.pop_two_floats();
        self.push_float_comparison(receiver != argument);
    }

    fn primitive_truncated(&mut self) {
        let receiver = self.pop_float();
        let truncated = receiver.trunc();
        self.success(
            truncated >= object::MIN_SMALL_INT as f32
                && truncated <= object::MAX_SMALL_INT as f32,
        );
        if self.success_value() {
            self.push_integer(truncated as i32);
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_fractional_part(&mut self) {
        let receiver = self.pop_float();
        if self.success_value() {
            self.push_float(receiver.fract());
        } else {
            self.un_pop(1);
        }
    }
}
