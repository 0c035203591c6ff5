//! Control primitives, 80 through 89.
//!
//! Block creation and evaluation, reflective sends, and the semaphore
//! and process operations that drive the scheduler.

use memory::FileSystem;
use object::{
    BLOCK_ARGUMENT_COUNT_INDEX, CALLER_INDEX, CLASS_ARRAY_PTR,
    CLASS_BLOCK_CONTEXT_PTR, CLASS_SEMAPHORE_PTR, HOME_INDEX, INITIAL_IP_INDEX,
    INSTRUCTION_POINTER_INDEX, NIL_PTR, TEMP_FRAME_START,
};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_control_primitives(&mut self) {
        match self.primitive_index {
            80 => self.primitive_block_copy(),
            81 => self.primitive_value(),
            82 => self.primitive_value_with_args(),
            83 => self.primitive_perform(),
            84 => self.primitive_perform_with_args(),
            85 => self.primitive_signal(),
            86 => self.primitive_wait(),
            87 => self.primitive_resume(),
            88 => self.primitive_suspend(),
            89 => self.primitive_flush_cache(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    /// `blockCopy:` makes a BlockContext sized like its home method
    /// context, remembering where the block's code starts.
    pub(crate) fn primitive_block_copy(&mut self) {
        let block_argument_count = self.pop_stack();
        let context = self.pop_stack();
        let method_context = if self.is_block_context(context) {
            self.memory.fetch_pointer(HOME_INDEX, context)
        } else {
            context
        };
        let context_size = self.memory.fetch_word_length_of(method_context);
        let new_context = self
            .instantiate_pointers(CLASS_BLOCK_CONTEXT_PTR, context_size)
            .unwrap_or_else(|| self.out_of_memory());
        // the block's body starts past the two-byte jump that follows
        // this send
        let initial_ip =
            object::integer_object_of(self.instruction_pointer as i16 + 3);
        self.memory
            .store_pointer(INITIAL_IP_INDEX, new_context, initial_ip);
        self.memory.store_pointer(
            INSTRUCTION_POINTER_INDEX,
            new_context,
            initial_ip,
        );
        self.store_stack_pointer_value_in_context(0, new_context);
        self.memory.store_pointer(
            BLOCK_ARGUMENT_COUNT_INDEX,
            new_context,
            block_argument_count,
        );
        self.memory
            .store_pointer(HOME_INDEX, new_context, method_context);
        self.push(new_context);
    }

    pub(crate) fn primitive_value(&mut self) {
        let block_context = self.stack_value(self.argument_count);
        let block_argument_count =
            self.argument_count_of_block(block_context) as i32;
        self.success(self.argument_count == block_argument_count);
        if !self.success_value() {
            return;
        }
        self.transfer_fields(
            self.argument_count,
            self.stack_pointer - self.argument_count + 1,
            self.active_context,
            TEMP_FRAME_START as i32,
            block_context,
        );
        self.pop(self.argument_count + 1);
        let initial_ip = self.memory.fetch_pointer(INITIAL_IP_INDEX, block_context);
        self.memory.store_pointer(
            INSTRUCTION_POINTER_INDEX,
            block_context,
            initial_ip,
        );
        self.store_stack_pointer_value_in_context(
            self.argument_count,
            block_context,
        );
        self.memory
            .store_pointer(CALLER_INDEX, block_context, self.active_context);
        self.new_active_context(block_context);
    }

    fn primitive_value_with_args(&mut self) {
        let argument_array = self.pop_stack();
        let block_context = self.pop_stack();
        let block_argument_count =
            self.argument_count_of_block(block_context) as i32;
        let array_class = self.memory.fetch_class_of(argument_array);
        self.success(array_class == CLASS_ARRAY_PTR);
        let array_argument_count = if self.success_value() {
            self.memory.fetch_word_length_of(argument_array) as i32
        } else {
            0
        };
        self.success(
            self.success_value() && array_argument_count == block_argument_count,
        );
        if !self.success_value() {
            self.un_pop(2);
            return;
        }
        self.transfer_fields(
            array_argument_count,
            0,
            argument_array,
            TEMP_FRAME_START as i32,
            block_context,
        );
        let initial_ip = self.memory.fetch_pointer(INITIAL_IP_INDEX, block_context);
        self.memory.store_pointer(
            INSTRUCTION_POINTER_INDEX,
            block_context,
            initial_ip,
        );
        self.store_stack_pointer_value_in_context(
            array_argument_count,
            block_context,
        );
        self.memory
            .store_pointer(CALLER_INDEX, block_context, self.active_context);
        self.new_active_context(block_context);
    }

    fn primitive_perform(&mut self) {
        let perform_selector = self.message_selector;
        self.message_selector = self.stack_value(self.argument_count - 1);
        let new_receiver = self.stack_value(self.argument_count);
        let receiver_class = self.memory.fetch_class_of(new_receiver);
        self.lookup_method_in_class(receiver_class);
        self.success(
            self.argument_count_of(self.new_method) == self.argument_count - 1,
        );
        if self.success_value() {
            // squeeze the selector out from under the arguments
            let selector_index = self.stack_pointer - self.argument_count + 1;
            self.transfer_fields(
                self.argument_count - 1,
                selector_index + 1,
                self.active_context,
                selector_index,
                self.active_context,
            );
            self.pop(1);
            self.argument_count -= 1;
            self.execute_new_method();
        } else {
            self.message_selector = perform_selector;
        }
    }

    fn primitive_perform_with_args(&mut self) {
        let argument_array = self.pop_stack();
        let array_size = self.memory.fetch_word_length_of(argument_array) as i32;
        let array_class = self.memory.fetch_class_of(argument_array);
        self.success(
            ((self.stack_pointer + array_size) as usize)
                < self.memory.fetch_word_length_of(self.active_context),
        );
        self.success(array_class == CLASS_ARRAY_PTR);
        if !self.success_value() {
            self.un_pop(1);
            return;
        }
        let perform_selector = self.message_selector;
        self.message_selector = self.pop_stack();
        let this_receiver = self.stack_top();
        self.argument_count = array_size;
        for index in 0..array_size {
            let argument = self
                .memory
                .fetch_pointer(index as usize, argument_array);
            self.push(argument);
        }
        let receiver_class = self.memory.fetch_class_of(this_receiver);
        self.lookup_method_in_class(receiver_class);
        self.success(
            self.argument_count_of(self.new_method) == self.argument_count,
        );
        if self.success_value() {
            self.execute_new_method();
        } else {
            self.pop(self.argument_count);
            self.push(self.message_selector);
            self.push(argument_array);
            self.argument_count = 2;
            self.message_selector = perform_selector;
        }
    }

    fn primitive_signal(&mut self) {
        let semaphore = self.stack_top();
        self.success(
            self.memory.fetch_class_of(semaphore) == CLASS_SEMAPHORE_PTR,
        );
        if self.success_value() {
            self.synchronous_signal(semaphore);
        }
    }

    fn primitive_wait(&mut self) {
        let semaphore = self.stack_top();
        self.success(
            self.memory.fetch_class_of(semaphore) == CLASS_SEMAPHORE_PTR,
        );
        if self.success_value() {
            self.wait_on(semaphore);
        }
    }

    fn primitive_resume(&mut self) {
        let process = self.stack_top();
        self.resume(process);
    }

    fn primitive_suspend(&mut self) {
        self.success(self.stack_top() == self.active_process());
        if self.success_value() {
            self.pop_stack();
            self.push(NIL_PTR);
            self.suspend_active();
        }
    }

    fn primitive_flush_cache(&mut self) {
        self.initialize_method_cache();
    }
}
