//! Message dispatch: selector lookup, the method cache, context
//! activation and returns.
//!
//! Lookup walks the receiver's class chain probing each method
//! dictionary by selector identity. A hit lands in a 256-entry
//! direct-mapped cache of (selector, class, method, primitive) rows; a
//! total miss materialises a Message and restarts the lookup with
//! `doesNotUnderstand:`.

use memory::FileSystem;
use object::{
    Oop, CANNOT_RETURN_SEL, CLASS_MESSAGE_PTR, CLASS_METHOD_CONTEXT_PTR,
    DOES_NOT_UNDERSTAND_SEL, INSTRUCTION_POINTER_INDEX, LITERAL_START,
    MESSAGE_ARGUMENTS_INDEX, MESSAGE_DICTIONARY_INDEX, MESSAGE_SELECTOR_INDEX,
    MESSAGE_SIZE, METHOD_ARRAY_INDEX, METHOD_INDEX, NIL_PTR, RECEIVER_INDEX,
    SELECTOR_START, SENDER_INDEX, TEMP_FRAME_START, VALUE_INDEX,
};
use object::{CLASS_ARRAY_PTR, CLASS_BLOCK_CONTEXT_PTR};
use tracing::trace;

use crate::hal::Hal;
use crate::interpreter::{Interpreter, METHOD_CACHE_WORDS};

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    // ── Sending ────────────────────────────────────────────────────

    pub(crate) fn send_selector(&mut self, selector: Oop, count: i32) {
        self.message_selector = selector;
        self.argument_count = count;
        let receiver_class =
            self.memory.fetch_class_of(self.stack_value(count));
        self.send_selector_to_class(receiver_class);
    }

    pub(crate) fn send_selector_to_class(&mut self, class_pointer: Oop) {
        self.find_new_method_in_class(class_pointer);
        self.execute_new_method();
    }

    // ── Method cache ───────────────────────────────────────────────

    pub(crate) fn initialize_method_cache(&mut self) {
        self.method_cache = [0; METHOD_CACHE_WORDS];
    }

    fn find_new_method_in_class(&mut self, class_pointer: Oop) {
        let hash = (((self.message_selector >> 1) ^ (class_pointer >> 1))
            & 0xFF) as usize
            * 4;
        if self.method_cache[hash] == self.message_selector
            && self.method_cache[hash + 1] == class_pointer
        {
            self.new_method = self.method_cache[hash + 2];
            self.primitive_index = self.method_cache[hash + 3];
        } else {
            self.lookup_method_in_class(class_pointer);
            self.method_cache[hash] = self.message_selector;
            self.method_cache[hash + 1] = class_pointer;
            self.method_cache[hash + 2] = self.new_method;
            self.method_cache[hash + 3] = self.primitive_index;
        }
    }

    // ── Lookup ─────────────────────────────────────────────────────

    pub(crate) fn lookup_method_in_class(&mut self, class_pointer: Oop) -> bool {
        let mut current_class = class_pointer;
        while current_class != NIL_PTR {
            let dictionary = self
                .memory
                .fetch_pointer(MESSAGE_DICTIONARY_INDEX, current_class);
            if self.lookup_method_in_dictionary(dictionary) {
                return true;
            }
            current_class = self.superclass_of(current_class);
        }
        if self.message_selector == DOES_NOT_UNDERSTAND_SEL {
            self.error("recursive message not understood");
        }
        trace!(
            selector = self.message_selector,
            class = class_pointer,
            "message not understood"
        );
        self.create_actual_message();
        self.message_selector = DOES_NOT_UNDERSTAND_SEL;
        self.lookup_method_in_class(class_pointer)
    }

    fn lookup_method_in_dictionary(&mut self, dictionary: Oop) -> bool {
        let length = self.memory.fetch_word_length_of(dictionary);
        // dictionaries are sized to a power of two of selector slots
        let mask = length - SELECTOR_START - 1;
        let mut index =
            (mask & (self.message_selector >> 1) as usize) + SELECTOR_START;
        let mut wrap_around = false;
        loop {
            let next_selector = self.memory.fetch_pointer(index, dictionary);
            if next_selector == NIL_PTR {
                return false;
            }
            if next_selector == self.message_selector {
                let method_array = self
                    .memory
                    .fetch_pointer(METHOD_ARRAY_INDEX, dictionary);
                self.new_method = self
                    .memory
                    .fetch_pointer(index - SELECTOR_START, method_array);
                self.primitive_index = self.primitive_index_of(self.new_method);
                return true;
            }
            index += 1;
            if index == length {
                if wrap_around {
                    return false;
                }
                wrap_around = true;
                index = SELECTOR_START;
            }
        }
    }

    /// Package the failed message's arguments for `doesNotUnderstand:`.
    fn create_actual_message(&mut self) {
        let argument_count = self.argument_count;
        let argument_array = self
            .instantiate_pointers(CLASS_ARRAY_PTR, argument_count as usize)
            .unwrap_or_else(|| self.out_of_memory());
        // keep the fresh array reachable while the Message is allocated
        self.push(argument_array);
        let message = self
            .instantiate_pointers(CLASS_MESSAGE_PTR, MESSAGE_SIZE)
            .unwrap_or_else(|| self.out_of_memory());
        self.pop_stack();
        self.memory.store_pointer(
            MESSAGE_SELECTOR_INDEX,
            message,
            self.message_selector,
        );
        self.memory
            .store_pointer(MESSAGE_ARGUMENTS_INDEX, message, argument_array);
        self.transfer_fields(
            argument_count,
            self.stack_pointer - argument_count + 1,
            self.active_context,
            0,
            argument_array,
        );
        self.pop(argument_count);
        self.push(message);
        self.argument_count = 1;
    }

    /// Move `count` pointer fields, nilling the source slots so the
    /// reference counts balance.
    pub(crate) fn transfer_fields(
        &mut self,
        count: i32,
        first_from: i32,
        from_oop: Oop,
        first_to: i32,
        to_oop: Oop,
    ) {
        for index in 0..count {
            let value = self
                .memory
                .fetch_pointer((first_from + index) as usize, from_oop);
            self.memory
                .store_pointer((first_to + index) as usize, to_oop, value);
            self.memory.store_pointer(
                (first_from + index) as usize,
                from_oop,
                NIL_PTR,
            );
        }
    }

    // ── Activation ─────────────────────────────────────────────────

    pub(crate) fn execute_new_method(&mut self) {
        if !self.primitive_response() {
            self.activate_new_method();
        }
    }

    fn primitive_response(&mut self) -> bool {
        if self.primitive_index == 0 {
            let header = self.method_header(self.new_method);
            match header.flag_value {
                5 => {
                    // quick return of self: the receiver is already on top
                    true
                }
                6 => {
                    self.quick_instance_load();
                    true
                }
                _ => false,
            }
        } else {
            self.init_primitive();
            self.dispatch_primitives();
            self.success_value()
        }
    }

    fn quick_instance_load(&mut self) {
        let this_receiver = self.pop_stack();
        let field_index = self.method_header(self.new_method).quick_field_index();
        let value = self.memory.fetch_pointer(field_index, this_receiver);
        self.push(value);
    }

    pub(crate) fn activate_new_method(&mut self) {
        let header = self.method_header(self.new_method);
        let context_size = if header.large_context {
            32 + TEMP_FRAME_START
        } else {
            12 + TEMP_FRAME_START
        };
        let new_context = self
            .instantiate_pointers(CLASS_METHOD_CONTEXT_PTR, context_size)
            .unwrap_or_else(|| self.out_of_memory());
        self.memory
            .store_pointer(SENDER_INDEX, new_context, self.active_context);
        self.store_instruction_pointer_value_in_context(
            header.initial_instruction_pointer() as i32,
            new_context,
        );
        self.store_stack_pointer_value_in_context(
            header.temporary_count as i32,
            new_context,
        );
        self.memory
            .store_pointer(METHOD_INDEX, new_context, self.new_method);
        self.transfer_fields(
            self.argument_count + 1,
            self.stack_pointer - self.argument_count,
            self.active_context,
            RECEIVER_INDEX as i32,
            new_context,
        );
        self.pop(self.argument_count + 1);
        self.new_active_context(new_context);
    }

    /// The class a method was compiled in: the value of its last
    /// literal, an association.
    pub(crate) fn method_class_of(&self, method_pointer: Oop) -> Oop {
        let literal_count =
            self.method_header(method_pointer).literal_count as usize;
        let association = self.memory.fetch_pointer(
            literal_count - 1 + LITERAL_START,
            method_pointer,
        );
        self.memory.fetch_pointer(VALUE_INDEX, association)
    }

    // ── Returns ────────────────────────────────────────────────────

    pub(crate) fn return_value_to(&mut self, result_pointer: Oop, context_pointer: Oop) {
        if context_pointer == NIL_PTR {
            self.push(self.active_context);
            self.push(result_pointer);
            return self.send_selector(CANNOT_RETURN_SEL, 1);
        }
        let senders_ip = self
            .memory
            .fetch_pointer(INSTRUCTION_POINTER_INDEX, context_pointer);
        if senders_ip == NIL_PTR {
            self.push(self.active_context);
            self.push(result_pointer);
            return self.send_selector(CANNOT_RETURN_SEL, 1);
        }
        self.memory.increase_references_to(result_pointer);
        self.return_to_active_context(context_pointer);
        self.push(result_pointer);
        self.memory.decrease_references_to(result_pointer);
    }

    fn return_to_active_context(&mut self, context: Oop) {
        self.memory.increase_references_to(context);
        self.nil_context_fields();
        self.memory.decrease_references_to(self.active_context);
        self.active_context = context;
        self.fetch_context_registers();
    }

    /// Clear the departing context's linkage so the reference counter
    /// can reclaim it promptly.
    fn nil_context_fields(&mut self) {
        self.memory
            .store_pointer(SENDER_INDEX, self.active_context, NIL_PTR);
        self.memory.store_pointer(
            INSTRUCTION_POINTER_INDEX,
            self.active_context,
            NIL_PTR,
        );
    }

    // ── Special selector fast paths ────────────────────────────────

    pub(crate) fn special_selector_primitive_response(&mut self) -> bool {
        self.init_primitive();
        if (176..=191).contains(&self.current_bytecode) {
            self.arithmetic_selector_primitive();
        } else {
            self.common_selector_primitive();
        }
        self.success_value()
    }

    fn arithmetic_selector_primitive(&mut self) {
        self.success(object::is_integer_object(self.stack_value(1)));
        if !self.success_value() {
            return;
        }
        match self.current_bytecode {
            176 => self.primitive_add(),
            177 => self.primitive_subtract(),
            178 => self.primitive_less_than(),
            179 => self.primitive_greater_than(),
            180 => self.primitive_less_or_equal(),
            181 => self.primitive_greater_or_equal(),
            182 => self.primitive_equal(),
            183 => self.primitive_not_equal(),
            184 => self.primitive_multiply(),
            185 => self.primitive_divide(),
            186 => self.primitive_mod(),
            187 => self.primitive_make_point(),
            188 => self.primitive_bit_shift(),
            189 => self.primitive_div(),
            190 => self.primitive_bit_and(),
            _ => self.primitive_bit_or(),
        }
    }

    fn common_selector_primitive(&mut self) {
        let count = self.fetch_integer_field(
            (self.current_bytecode as usize - 176) * 2 + 1,
            object::SPECIAL_SELECTORS_PTR,
        ) as i32;
        self.argument_count = count;
        let receiver_class = self
            .memory
            .fetch_class_of(self.stack_value(self.argument_count));
        match self.current_bytecode {
            198 => self.primitive_equivalent(),
            199 => self.primitive_class(),
            200 => {
                self.success(
                    receiver_class == CLASS_METHOD_CONTEXT_PTR
                        || receiver_class == CLASS_BLOCK_CONTEXT_PTR,
                );
                if self.success_value() {
                    self.primitive_block_copy();
                }
            }
            201 => {
                self.success(receiver_class == CLASS_BLOCK_CONTEXT_PTR);
                if self.success_value() {
                    self.primitive_value();
                }
            }
            _ => {
                self.primitive_fail();
            }
        }
    }
}
