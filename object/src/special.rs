//! Well-known oops.
//!
//! These objects sit at fixed object-table indices in every interchange
//! image; the interpreter relies on the values without looking them up.

use crate::Oop;

pub const NIL_PTR: Oop = 2;
pub const FALSE_PTR: Oop = 4;
pub const TRUE_PTR: Oop = 6;

/// The `Processor` association in the system dictionary; its value field
/// is the ProcessorScheduler instance.
pub const SCHEDULER_ASSOCIATION_PTR: Oop = 8;

pub const CLASS_SMALL_INTEGER: Oop = 12;
pub const CLASS_STRING_PTR: Oop = 14;
pub const CLASS_ARRAY_PTR: Oop = 16;
pub const CLASS_FLOAT_PTR: Oop = 20;
pub const CLASS_METHOD_CONTEXT_PTR: Oop = 22;
pub const CLASS_BLOCK_CONTEXT_PTR: Oop = 24;
pub const CLASS_POINT_PTR: Oop = 26;
pub const CLASS_LARGE_POSITIVE_INTEGER_PTR: Oop = 28;
pub const CLASS_DISPLAY_BITMAP_PTR: Oop = 30;
pub const CLASS_MESSAGE_PTR: Oop = 32;
pub const CLASS_COMPILED_METHOD_PTR: Oop = 34;
pub const CLASS_SEMAPHORE_PTR: Oop = 38;
pub const CLASS_CHARACTER_PTR: Oop = 40;

pub const DOES_NOT_UNDERSTAND_SEL: Oop = 42;
pub const CANNOT_RETURN_SEL: Oop = 44;

/// Array of 32 (selector, argument count) pairs backing the special
/// selector send bytecodes 176..=207.
pub const SPECIAL_SELECTORS_PTR: Oop = 48;

pub const CHARACTER_TABLE_PTR: Oop = 50;
pub const MUST_BE_BOOLEAN_SEL: Oop = 52;

pub const LAST_SPECIAL_OOP: Oop = 52;

// Immediate small integers the interpreter pushes directly.
pub const MINUS_ONE_PTR: Oop = 65535;
pub const ZERO_PTR: Oop = 1;
pub const ONE_PTR: Oop = 3;
pub const TWO_PTR: Oop = 5;
