//! Bytecode dispatch.
//!
//! The numbering is fixed by the compiled methods in the image: stack
//! bytecodes below 120, returns to 127, the extended and super forms to
//! 134, stack housekeeping to 137, jumps from 144, special-selector
//! sends from 176 and literal-selector sends from 208. Dispatch is one
//! match so the hot path stays a single indexed jump.

use memory::FileSystem;
use object::{
    Oop, FALSE_PTR, MINUS_ONE_PTR, NIL_PTR, ONE_PTR, SPECIAL_SELECTORS_PTR,
    TEMP_FRAME_START, TRUE_PTR, TWO_PTR, VALUE_INDEX, ZERO_PTR,
};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_on_this_bytecode(&mut self) {
        match self.current_bytecode {
            0..=15 => self.push_receiver_variable_bytecode(),
            16..=31 => self.push_temporary_variable_bytecode(),
            32..=63 => self.push_literal_constant_bytecode(),
            64..=95 => self.push_literal_variable_bytecode(),
            96..=103 => self.store_and_pop_receiver_variable_bytecode(),
            104..=111 => self.store_and_pop_temporary_variable_bytecode(),
            112 => self.push_receiver_bytecode(),
            113..=119 => self.push_constant_bytecode(),
            120..=125 => self.return_bytecode(),
            126 | 127 => self.unused_bytecode(),
            128 => self.extended_push_bytecode(),
            129 => self.extended_store_bytecode(),
            130 => self.extended_store_and_pop_bytecode(),
            131 => self.single_extended_send_bytecode(),
            132 => self.double_extended_send_bytecode(),
            133 => self.single_extended_super_bytecode(),
            134 => self.double_extended_super_bytecode(),
            135 => self.pop_stack_bytecode(),
            136 => self.duplicate_top_bytecode(),
            137 => self.push_active_context_bytecode(),
            138..=143 => self.unused_bytecode(),
            144..=151 => self.short_unconditional_jump(),
            152..=159 => self.short_conditional_jump(),
            160..=167 => self.long_unconditional_jump(),
            168..=175 => self.long_conditional_jump(),
            176..=207 => self.send_special_selector_bytecode(),
            208..=255 => self.send_literal_selector_bytecode(),
        }
    }

    fn unused_bytecode(&mut self) {
        let bytecode = self.current_bytecode;
        self.error(&format!("unused bytecode {bytecode}"));
    }

    // ── Stack bytecodes ────────────────────────────────────────────

    fn push_receiver_variable_bytecode(&mut self) {
        let field_index = (self.current_bytecode & 0x0F) as usize;
        self.push_receiver_variable(field_index);
    }

    pub(crate) fn push_receiver_variable(&mut self, field_index: usize) {
        let value = self.memory.fetch_pointer(field_index, self.receiver);
        self.push(value);
    }

    fn push_temporary_variable_bytecode(&mut self) {
        let temporary_index = (self.current_bytecode & 0x0F) as usize;
        self.push_temporary_variable(temporary_index);
    }

    pub(crate) fn push_temporary_variable(&mut self, temporary_index: usize) {
        let value = self.temporary(temporary_index);
        self.push(value);
    }

    fn push_literal_constant_bytecode(&mut self) {
        let literal_index = (self.current_bytecode & 0x1F) as usize;
        self.push_literal_constant(literal_index);
    }

    pub(crate) fn push_literal_constant(&mut self, literal_index: usize) {
        let value = self.literal(literal_index);
        self.push(value);
    }

    fn push_literal_variable_bytecode(&mut self) {
        let literal_index = (self.current_bytecode & 0x1F) as usize;
        self.push_literal_variable(literal_index);
    }

    pub(crate) fn push_literal_variable(&mut self, literal_index: usize) {
        let association = self.literal(literal_index);
        let value = self.memory.fetch_pointer(VALUE_INDEX, association);
        self.push(value);
    }

    fn store_and_pop_receiver_variable_bytecode(&mut self) {
        let field_index = (self.current_bytecode & 0x07) as usize;
        let value = self.pop_stack();
        self.memory.store_pointer(field_index, self.receiver, value);
    }

    fn store_and_pop_temporary_variable_bytecode(&mut self) {
        let temporary_index = (self.current_bytecode & 0x07) as usize;
        let value = self.pop_stack();
        self.memory.store_pointer(
            temporary_index + TEMP_FRAME_START,
            self.home_context,
            value,
        );
    }

    fn push_receiver_bytecode(&mut self) {
        let receiver = self.receiver;
        self.push(receiver);
    }

    fn push_constant_bytecode(&mut self) {
        match self.current_bytecode {
            113 => self.push(TRUE_PTR),
            114 => self.push(FALSE_PTR),
            115 => self.push(NIL_PTR),
            116 => self.push(MINUS_ONE_PTR),
            117 => self.push(ZERO_PTR),
            118 => self.push(ONE_PTR),
            _ => self.push(TWO_PTR),
        }
    }

    fn pop_stack_bytecode(&mut self) {
        self.pop_stack();
    }

    fn duplicate_top_bytecode(&mut self) {
        let top = self.stack_top();
        self.push(top);
    }

    fn push_active_context_bytecode(&mut self) {
        let context = self.active_context;
        self.push(context);
    }

    // ── Extended bytecodes ─────────────────────────────────────────

    fn extended_push_bytecode(&mut self) {
        let descriptor = self.fetch_byte();
        let variable_index = (descriptor & 0x3F) as usize;
        match descriptor >> 6 {
            0 => self.push_receiver_variable(variable_index),
            1 => self.push_temporary_variable(variable_index),
            2 => self.push_literal_constant(variable_index),
            _ => self.push_literal_variable(variable_index),
        }
    }

    fn extended_store(&mut self, descriptor: u8) {
        let variable_index = (descriptor & 0x3F) as usize;
        let value = self.stack_top();
        match descriptor >> 6 {
            0 => {
                self.memory
                    .store_pointer(variable_index, self.receiver, value);
            }
            1 => {
                self.memory.store_pointer(
                    variable_index + TEMP_FRAME_START,
                    self.home_context,
                    value,
                );
            }
            2 => self.error("store into a literal constant"),
            _ => {
                let association = self.literal(variable_index);
                self.memory.store_pointer(VALUE_INDEX, association, value);
            }
        }
    }

    fn extended_store_bytecode(&mut self) {
        let descriptor = self.fetch_byte();
        self.extended_store(descriptor);
    }

    fn extended_store_and_pop_bytecode(&mut self) {
        let descriptor = self.fetch_byte();
        self.extended_store(descriptor);
        self.pop_stack();
    }

    // ── Jump bytecodes ─────────────────────────────────────────────

    pub(crate) fn jump(&mut self, offset: i32) {
        self.instruction_pointer += offset;
    }

    fn jump_if_by(&mut self, condition: Oop, offset: i32) {
        let boolean = self.pop_stack();
        if boolean == condition {
            self.jump(offset);
        } else if boolean != TRUE_PTR && boolean != FALSE_PTR {
            self.un_pop(1);
            self.send_must_be_boolean();
        }
    }

    fn send_must_be_boolean(&mut self) {
        self.send_selector(object::MUST_BE_BOOLEAN_SEL, 0);
    }

    fn short_unconditional_jump(&mut self) {
        let offset = (self.current_bytecode & 0x07) as i32;
        self.jump(offset + 1);
    }

    fn short_conditional_jump(&mut self) {
        let offset = (self.current_bytecode & 0x07) as i32;
        self.jump_if_by(FALSE_PTR, offset + 1);
    }

    fn long_unconditional_jump(&mut self) {
        let offset = (self.current_bytecode & 0x07) as i32;
        let low = self.fetch_byte() as i32;
        self.jump((offset - 4) * 256 + low);
    }

    fn long_conditional_jump(&mut self) {
        let offset = (self.current_bytecode & 0x03) as i32;
        let low = self.fetch_byte() as i32;
        let condition = if self.current_bytecode <= 171 {
            TRUE_PTR
        } else {
            FALSE_PTR
        };
        self.jump_if_by(condition, offset * 256 + low);
    }

    // ── Send bytecodes ─────────────────────────────────────────────

    fn send_special_selector_bytecode(&mut self) {
        if !self.special_selector_primitive_response() {
            let selector_index = (self.current_bytecode as usize - 176) * 2;
            let selector = self
                .memory
                .fetch_pointer(selector_index, SPECIAL_SELECTORS_PTR);
            let count = self
                .fetch_integer_field(selector_index + 1, SPECIAL_SELECTORS_PTR)
                as i32;
            self.send_selector(selector, count);
        }
    }

    fn send_literal_selector_bytecode(&mut self) {
        let selector = self.literal((self.current_bytecode & 0x0F) as usize);
        let count = ((self.current_bytecode as i32 - 208) >> 4) & 0x03;
        self.send_selector(selector, count);
    }

    fn single_extended_send_bytecode(&mut self) {
        let descriptor = self.fetch_byte();
        let selector = self.literal((descriptor & 0x1F) as usize);
        self.send_selector(selector, (descriptor >> 5) as i32);
    }

    fn double_extended_send_bytecode(&mut self) {
        let count = self.fetch_byte() as i32;
        let selector_index = self.fetch_byte() as usize;
        let selector = self.literal(selector_index);
        self.send_selector(selector, count);
    }

    fn single_extended_super_bytecode(&mut self) {
        let descriptor = self.fetch_byte();
        self.argument_count = (descriptor >> 5) as i32;
        self.message_selector = self.literal((descriptor & 0x1F) as usize);
        self.send_to_super();
    }

    fn double_extended_super_bytecode(&mut self) {
        self.argument_count = self.fetch_byte() as i32;
        let selector_index = self.fetch_byte() as usize;
        self.message_selector = self.literal(selector_index);
        self.send_to_super();
    }

    fn send_to_super(&mut self) {
        let method_class = self.method_class_of(self.method);
        let super_class = self.superclass_of(method_class);
        self.send_selector_to_class(super_class);
    }

    // ── Return bytecodes ───────────────────────────────────────────

    fn return_bytecode(&mut self) {
        match self.current_bytecode {
            120 => {
                let receiver = self.receiver;
                let sender = self.sender();
                self.return_value_to(receiver, sender);
            }
            121 => {
                let sender = self.sender();
                self.return_value_to(TRUE_PTR, sender);
            }
            122 => {
                let sender = self.sender();
                self.return_value_to(FALSE_PTR, sender);
            }
            123 => {
                let sender = self.sender();
                self.return_value_to(NIL_PTR, sender);
            }
            124 => {
                let result = self.pop_stack();
                let sender = self.sender();
                self.return_value_to(result, sender);
            }
            _ => {
                let result = self.pop_stack();
                let caller = self.caller();
                self.return_value_to(result, caller);
            }
        }
    }
}
