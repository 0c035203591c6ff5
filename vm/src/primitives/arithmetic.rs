//! SmallInteger arithmetic, primitives 1 through 19.
//!
//! Everything computes in host integers and fails on any result outside
//! the 15-bit immediate range; the image's fallback code promotes to
//! LargeIntegers. Division by zero and inexact `/` fail the same way.

use memory::FileSystem;
use object::{integer_object_of, is_integer_value, CLASS_POINT_PTR};
use object::{CLASS_POINT_SIZE, X_INDEX, Y_INDEX};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

/// Floored division, the `//` selector.
fn floor_div(dividend: i32, divisor: i32) -> i32 {
    let quotient = dividend / divisor;
    if dividend % divisor != 0 && (dividend < 0) != (divisor < 0) {
        quotient - 1
    } else {
        quotient
    }
}

/// Floored modulus, the `\\` selector; the result takes the divisor's
/// sign.
fn floor_mod(dividend: i32, divisor: i32) -> i32 {
    dividend - floor_div(dividend, divisor) * divisor
}

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_arithmetic_primitives(&mut self) {
        match self.primitive_index {
            1 => self.primitive_add(),
            2 => self.primitive_subtract(),
            3 => self.primitive_less_than(),
            4 => self.primitive_greater_than(),
            5 => self.primitive_less_or_equal(),
            6 => self.primitive_greater_or_equal(),
            7 => self.primitive_equal(),
            8 => self.primitive_not_equal(),
            9 => self.primitive_multiply(),
            10 => self.primitive_divide(),
            11 => self.primitive_mod(),
            12 => self.primitive_div(),
            13 => self.primitive_quo(),
            14 => self.primitive_bit_and(),
            15 => self.primitive_bit_or(),
            16 => self.primitive_bit_xor(),
            17 => self.primitive_bit_shift(),
            18 => self.primitive_make_point(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    fn pop_two_integers(&mut self) -> (i32, i32) {
        let argument = self.pop_integer() as i32;
        let receiver = self.pop_integer() as i32;
        (receiver, argument)
    }

    fn push_arithmetic_result(&mut self, result: i32) {
        self.success(is_integer_value(result));
        if self.success_value() {
            self.push(integer_object_of(result as i16));
        } else {
            self.un_pop(2);
        }
    }

    fn push_comparison_result(&mut self, result: bool) {
        if self.success_value() {
            self.push(if result {
                object::TRUE_PTR
            } else {
                object::FALSE_PTR
            });
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_add(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if self.success_value() {
            self.push_arithmetic_result(receiver + argument);
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_subtract(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if self.success_value() {
            self.push_arithmetic_result(receiver - argument);
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_multiply(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if self.success_value() {
            self.push_arithmetic_result(receiver * argument);
        } else {
            self.un_pop(2);
        }
    }

    /// Exact division: fails unless the divisor divides evenly.
    pub(crate) fn primitive_divide(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.success(argument != 0);
        self.success(self.success_value() && receiver % argument == 0);
        if self.success_value() {
            self.push_arithmetic_result(receiver / argument);
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_mod(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.success(argument != 0);
        if self.success_value() {
            self.push_arithmetic_result(floor_mod(receiver, argument));
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_div(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.success(argument != 0);
        if self.success_value() {
            self.push_arithmetic_result(floor_div(receiver, argument));
        } else {
            self.un_pop(2);
        }
    }

    /// Quotient truncating toward zero.
    pub(crate) fn primitive_quo(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.success(argument != 0);
        if self.success_value() {
            self.push_arithmetic_result(receiver / argument);
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_equal(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.push_comparison_result(receiver == argument);
    }

    pub(crate) fn primitive_not_equal(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.push_comparison_result(receiver != argument);
    }

    pub(crate) fn primitive_less_than(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.push_comparison_result(receiver < argument);
    }

    pub(crate) fn primitive_greater_than(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.push_comparison_result(receiver > argument);
    }

    pub(crate) fn primitive_less_or_equal(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.push_comparison_result(receiver <= argument);
    }

    pub(crate) fn primitive_greater_or_equal(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        self.push_comparison_result(receiver >= argument);
    }

    pub(crate) fn primitive_bit_and(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if self.success_value() {
            self.push_arithmetic_result(receiver & argument);
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_bit_or(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if self.success_value() {
            self.push_arithmetic_result(receiver | argument);
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_bit_xor(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if self.success_value() {
            self.push_arithmetic_result(receiver ^ argument);
        } else {
            self.un_pop(2);
        }
    }

    /// Arithmetic shift in both directions; shifts past the word size
    /// collapse to the sign. Left shifts that lose bits fail like any
    /// other overflow.
    pub(crate) fn primitive_bit_shift(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if !self.success_value() {
            self.un_pop(2);
            return;
        }
        let result: i64 = if argument >= 0 {
            if argument > 30 {
                // any nonzero value shifted this far overflows
                (receiver as i64) << 31
            } else {
                (receiver as i64) << argument
            }
        } else {
            (receiver as i64) >> (-argument).min(31)
        };
        self.success(
            result >= object::MIN_SMALL_INT as i64
                && result <= object::MAX_SMALL_INT as i64,
        );
        if self.success_value() {
            self.push(integer_object_of(result as i16));
        } else {
            self.un_pop(2);
        }
    }

    pub(crate) fn primitive_make_point(&mut self) {
        let (receiver, argument) = self.pop_two_integers();
        if !self.success_value() {
            self.un_pop(2);
            return;
        }
        let point = self
            .instantiate_pointers(CLASS_POINT_PTR, CLASS_POINT_SIZE)
            .unwrap_or_else(|| self.out_of_memory());
        self.store_integer_field(X_INDEX, point, receiver);
        self.store_integer_field(Y_INDEX, point, argument);
        self.push(point);
    }
}
