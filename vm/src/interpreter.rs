//! The bytecode interpreter.
//!
//! All mutable machine state lives in a handful of "registers" outside
//! object memory; everything else, including the contexts that form the
//! call stack, is heap objects. One `cycle` drains pending asynchronous
//! signals, honours a deferred process switch, then fetches and
//! dispatches a single bytecode.

use memory::{FileSystem, ObjectMemory, RootProvider};
use object::{
    integer_object_of, integer_value_of, is_integer_object, is_integer_value,
    MethodHeader, Oop, ACTIVE_PROCESS_INDEX, BLOCK_ARGUMENT_COUNT_INDEX,
    CLASS_CHARACTER_PTR, CLASS_LARGE_POSITIVE_INTEGER_PTR, CLASS_STRING_PTR,
    HEADER_INDEX, HOME_INDEX, INSTANCE_SPECIFICATION_INDEX,
    INSTRUCTION_POINTER_INDEX, LITERAL_START, METHOD_INDEX, NIL_PTR,
    RECEIVER_INDEX, SENDER_INDEX, STACK_POINTER_INDEX, SUPERCLASS_INDEX,
    SUSPENDED_CONTEXT_INDEX, TEMP_FRAME_START,
};
use tracing::error;

use crate::hal::Hal;
use crate::process::SignalBuffer;

/// Method cache geometry: 256 direct-mapped entries of four words.
pub(crate) const METHOD_CACHE_WORDS: usize = 1024;

pub struct Interpreter<H: Hal, F: FileSystem> {
    pub memory: ObjectMemory,
    pub hal: H,
    pub fs: F,
    pub(crate) signals: SignalBuffer,

    // activation registers
    pub(crate) active_context: Oop,
    pub(crate) home_context: Oop,
    pub(crate) method: Oop,
    pub(crate) receiver: Oop,
    pub(crate) instruction_pointer: i32,
    pub(crate) stack_pointer: i32,
    pub(crate) current_bytecode: u8,
    pub(crate) success_flag: bool,

    // send registers
    pub(crate) message_selector: Oop,
    pub(crate) argument_count: i32,
    pub(crate) new_method: Oop,
    pub(crate) primitive_index: u16,

    // deferred process switch
    pub(crate) new_process_waiting: bool,
    pub(crate) new_process: Oop,

    pub(crate) method_cache: [u16; METHOD_CACHE_WORDS],
    gc_epoch_seen: u64,

    // display and input state
    pub(crate) current_display: Oop,
    pub(crate) current_cursor: Oop,
    pub(crate) input_semaphore: Oop,
    pub(crate) timer_semaphore: Oop,
    pub(crate) sample_interval: i32,

    // low-space signalling
    pub(crate) check_low_memory: bool,
    pub(crate) memory_is_low: bool,
    pub(crate) low_space_semaphore: Oop,
    pub(crate) oops_left_limit: u32,
    pub(crate) words_left_limit: u32,
}

/// Snapshot of the registers handed to the collector as roots.
pub(crate) struct InterpreterRoots {
    roots: Vec<Oop>,
}

impl RootProvider for InterpreterRoots {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Oop)) {
        for &oop in &self.roots {
            visitor(oop);
        }
    }
}

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub fn new(memory: ObjectMemory, hal: H, fs: F) -> Self {
        Self {
            memory,
            hal,
            fs,
            signals: SignalBuffer::new(),
            active_context: NIL_PTR,
            home_context: NIL_PTR,
            method: NIL_PTR,
            receiver: NIL_PTR,
            instruction_pointer: 0,
            stack_pointer: 0,
            current_bytecode: 0,
            success_flag: true,
            message_selector: NIL_PTR,
            argument_count: 0,
            new_method: NIL_PTR,
            primitive_index: 0,
            new_process_waiting: false,
            new_process: NIL_PTR,
            method_cache: [0; METHOD_CACHE_WORDS],
            gc_epoch_seen: 0,
            current_display: NIL_PTR,
            current_cursor: NIL_PTR,
            input_semaphore: NIL_PTR,
            timer_semaphore: NIL_PTR,
            sample_interval: 0,
            check_low_memory: false,
            memory_is_low: false,
            low_space_semaphore: NIL_PTR,
            oops_left_limit: 0,
            words_left_limit: 0,
        }
    }

    /// Pick up the image's active process and start interpreting from
    /// its suspended context.
    pub fn boot(&mut self) {
        self.initialize_method_cache();
        self.gc_epoch_seen = self.memory.gc_epoch();
        let scheduler = self.scheduler_pointer();
        let process = self.memory.fetch_pointer(ACTIVE_PROCESS_INDEX, scheduler);
        let context = self
            .memory
            .fetch_pointer(SUSPENDED_CONTEXT_INDEX, process);
        self.active_context = context;
        self.memory.increase_references_to(context);
        self.fetch_context_registers();
    }

    /// A cross-thread handle for asynchronous semaphore signals.
    pub fn signal_buffer(&self) -> SignalBuffer {
        self.signals.clone()
    }

    /// Ask for one low-space check at the next cycle; hosts typically
    /// call this once per frame.
    pub fn check_low_memory_conditions(&mut self) {
        self.check_low_memory = true;
    }

    /// The byte the last cycle executed.
    pub fn last_bytecode(&self) -> u8 {
        self.current_bytecode
    }

    /// One fetch-decode-execute step.
    pub fn cycle(&mut self) {
        self.drain_asynchronous_signals();
        if self.check_low_memory {
            self.check_low_memory = false;
            if !self.memory_is_low && self.is_in_low_memory_condition() {
                self.memory_is_low = true;
                if self.low_space_semaphore != NIL_PTR {
                    let semaphore = self.low_space_semaphore;
                    self.synchronous_signal(semaphore);
                }
            }
        }
        self.check_process_switch();
        self.current_bytecode = self.fetch_byte();
        self.dispatch_on_this_bytecode();
    }

    fn is_in_low_memory_condition(&self) -> bool {
        self.memory.core_left() < self.words_left_limit
            || self.memory.oops_left() < self.oops_left_limit
    }

    pub(crate) fn error(&mut self, message: &str) -> ! {
        error!(message, "fatal interpreter error");
        self.hal.error(message)
    }

    // ── Instruction fetch ──────────────────────────────────────────

    /// Read the next byte of the current method; bytes are indexed over
    /// the whole method body, high byte of each word first.
    pub(crate) fn fetch_byte(&mut self) -> u8 {
        if self.instruction_pointer < 0
            || self.instruction_pointer as usize
                >= self.memory.fetch_byte_length_of(self.method)
        {
            self.error("instruction pointer ran off the method");
        }
        let byte = self
            .memory
            .fetch_byte(self.instruction_pointer as usize, self.method);
        self.instruction_pointer += 1;
        byte
    }

    // ── Context stack ──────────────────────────────────────────────

    pub(crate) fn push(&mut self, object: Oop) {
        self.stack_pointer += 1;
        self.memory
            .store_pointer(self.stack_pointer as usize, self.active_context, object);
    }

    pub(crate) fn pop_stack(&mut self) -> Oop {
        let top = self
            .memory
            .fetch_pointer(self.stack_pointer as usize, self.active_context);
        self.stack_pointer -= 1;
        top
    }

    pub(crate) fn pop(&mut self, number: i32) {
        self.stack_pointer -= number;
    }

    pub(crate) fn un_pop(&mut self, number: i32) {
        self.stack_pointer += number;
    }

    pub(crate) fn stack_top(&self) -> Oop {
        self.memory
            .fetch_pointer(self.stack_pointer as usize, self.active_context)
    }

    pub(crate) fn stack_value(&self, offset: i32) -> Oop {
        self.memory.fetch_pointer(
            (self.stack_pointer - offset) as usize,
            self.active_context,
        )
    }

    // ── Contexts ───────────────────────────────────────────────────

    /// Block contexts keep their argument count, a SmallInteger, where
    /// method contexts keep the method.
    pub(crate) fn is_block_context(&self, context_pointer: Oop) -> bool {
        is_integer_object(
            self.memory.fetch_pointer(METHOD_INDEX, context_pointer),
        )
    }

    pub(crate) fn fetch_context_registers(&mut self) {
        if self.is_block_context(self.active_context) {
            self.home_context =
                self.memory.fetch_pointer(HOME_INDEX, self.active_context);
        } else {
            self.home_context = self.active_context;
        }
        self.receiver = self
            .memory
            .fetch_pointer(RECEIVER_INDEX, self.home_context);
        self.method = self.memory.fetch_pointer(METHOD_INDEX, self.home_context);
        self.instruction_pointer =
            self.instruction_pointer_of_context(self.active_context) as i32 - 1;
        self.stack_pointer = self.stack_pointer_of_context(self.active_context)
            as i32
            + TEMP_FRAME_START as i32
            - 1;
    }

    pub(crate) fn store_context_registers(&mut self) {
        self.store_instruction_pointer_value_in_context(
            self.instruction_pointer + 1,
            self.active_context,
        );
        self.store_stack_pointer_value_in_context(
            self.stack_pointer - TEMP_FRAME_START as i32 + 1,
            self.active_context,
        );
    }

    pub(crate) fn new_active_context(&mut self, context: Oop) {
        self.store_context_registers();
        self.memory.decrease_references_to(self.active_context);
        self.active_context = context;
        self.memory.increase_references_to(context);
        self.fetch_context_registers();
    }

    pub(crate) fn instruction_pointer_of_context(&self, context_pointer: Oop) -> i16 {
        self.fetch_integer_field(INSTRUCTION_POINTER_INDEX, context_pointer)
    }

    pub(crate) fn stack_pointer_of_context(&self, context_pointer: Oop) -> i16 {
        self.fetch_integer_field(STACK_POINTER_INDEX, context_pointer)
    }

    pub(crate) fn store_instruction_pointer_value_in_context(
        &mut self,
        value: i32,
        context_pointer: Oop,
    ) {
        self.store_integer_field(INSTRUCTION_POINTER_INDEX, context_pointer, value);
    }

    pub(crate) fn store_stack_pointer_value_in_context(
        &mut self,
        value: i32,
        context_pointer: Oop,
    ) {
        self.store_integer_field(STACK_POINTER_INDEX, context_pointer, value);
    }

    pub(crate) fn argument_count_of_block(&self, block_pointer: Oop) -> i16 {
        self.fetch_integer_field(BLOCK_ARGUMENT_COUNT_INDEX, block_pointer)
    }

    pub(crate) fn sender(&self) -> Oop {
        self.memory.fetch_pointer(SENDER_INDEX, self.home_context)
    }

    pub(crate) fn caller(&self) -> Oop {
        self.memory.fetch_pointer(SENDER_INDEX, self.active_context)
    }

    pub(crate) fn temporary(&self, offset: usize) -> Oop {
        self.memory
            .fetch_pointer(offset + TEMP_FRAME_START, self.home_context)
    }

    pub(crate) fn literal(&self, offset: usize) -> Oop {
        self.memory
            .fetch_pointer(offset + LITERAL_START, self.method)
    }

    // ── Integer fields ─────────────────────────────────────────────

    /// Known-integer field access for scheduler bookkeeping; a
    /// non-integer here is a corrupt image.
    pub(crate) fn fetch_integer_field(
        &self,
        field_index: usize,
        object_pointer: Oop,
    ) -> i16 {
        let pointer = self.memory.fetch_pointer(field_index, object_pointer);
        debug_assert!(is_integer_object(pointer));
        integer_value_of(pointer)
    }

    pub(crate) fn store_integer_field(
        &mut self,
        field_index: usize,
        object_pointer: Oop,
        value: i32,
    ) {
        debug_assert!(is_integer_value(value));
        self.memory.store_pointer(
            field_index,
            object_pointer,
            integer_object_of(value as i16),
        );
    }

    /// Primitive-level integer fetch; failure clears the success flag.
    pub(crate) fn fetch_integer_of_object(
        &mut self,
        field_index: usize,
        object_pointer: Oop,
    ) -> i16 {
        let pointer = self.memory.fetch_pointer(field_index, object_pointer);
        if is_integer_object(pointer) {
            integer_value_of(pointer)
        } else {
            self.primitive_fail();
            0
        }
    }

    pub(crate) fn store_integer_of_object(
        &mut self,
        field_index: usize,
        object_pointer: Oop,
        value: i32,
    ) {
        if is_integer_value(value) {
            self.memory.store_pointer(
                field_index,
                object_pointer,
                integer_object_of(value as i16),
            );
        } else {
            self.primitive_fail();
        }
    }

    // ── Primitive success tracking ─────────────────────────────────

    pub(crate) fn init_primitive(&mut self) {
        self.success_flag = true;
    }

    pub(crate) fn success(&mut self, condition: bool) {
        self.success_flag = condition && self.success_flag;
    }

    pub(crate) fn success_value(&self) -> bool {
        self.success_flag
    }

    pub(crate) fn primitive_fail(&mut self) -> Oop {
        self.success_flag = false;
        0
    }

    pub(crate) fn pop_integer(&mut self) -> i16 {
        let pointer = self.pop_stack();
        self.success(is_integer_object(pointer));
        if self.success_flag {
            integer_value_of(pointer)
        } else {
            0
        }
    }

    pub(crate) fn push_integer(&mut self, value: i32) {
        debug_assert!(is_integer_value(value));
        self.push(integer_object_of(value as i16));
    }

    // ── Positive integer conversions ───────────────────────────────

    pub(crate) fn positive_16bit_value_of(&mut self, integer_pointer: Oop) -> u16 {
        if is_integer_object(integer_pointer) {
            let value = integer_value_of(integer_pointer);
            if value >= 0 {
                return value as u16;
            }
            self.primitive_fail();
            return 0;
        }
        if self.memory.fetch_class_of(integer_pointer)
            != CLASS_LARGE_POSITIVE_INTEGER_PTR
            || self.memory.fetch_byte_length_of(integer_pointer) != 2
        {
            self.primitive_fail();
            return 0;
        }
        // digits are least significant first
        let low = self.memory.fetch_byte(0, integer_pointer) as u16;
        let high = self.memory.fetch_byte(1, integer_pointer) as u16;
        (high << 8) | low
    }

    pub(crate) fn positive_16bit_integer_for(&mut self, value: i32) -> Oop {
        if value < 0 {
            return self.primitive_fail();
        }
        if is_integer_value(value) {
            return integer_object_of(value as i16);
        }
        match self.instantiate_bytes(CLASS_LARGE_POSITIVE_INTEGER_PTR, 2) {
            Some(large) => {
                self.memory.store_byte(0, large, (value & 0xFF) as u8);
                self.memory.store_byte(1, large, (value >> 8) as u8);
                large
            }
            None => self.out_of_memory(),
        }
    }

    pub(crate) fn positive_32bit_value_of(&mut self, integer_pointer: Oop) -> u32 {
        if is_integer_object(integer_pointer) {
            let value = integer_value_of(integer_pointer);
            if value >= 0 {
                return value as u32;
            }
            self.primitive_fail();
            return 0;
        }
        if self.memory.fetch_class_of(integer_pointer)
            != CLASS_LARGE_POSITIVE_INTEGER_PTR
        {
            self.primitive_fail();
            return 0;
        }
        let length = self.memory.fetch_byte_length_of(integer_pointer);
        if length == 0 || length > 4 {
            self.primitive_fail();
            return 0;
        }
        let mut value: u32 = 0;
        for index in (0..length).rev() {
            value = (value << 8)
                | self.memory.fetch_byte(index, integer_pointer) as u32;
        }
        value
    }

    pub(crate) fn positive_32bit_integer_for(&mut self, value: u32) -> Oop {
        if value <= MAX_SMALL_INT_U32 {
            return integer_object_of(value as i16);
        }
        match self.instantiate_bytes(CLASS_LARGE_POSITIVE_INTEGER_PTR, 4) {
            Some(large) => {
                for index in 0..4 {
                    self.memory.store_byte(
                        index,
                        large,
                        ((value >> (8 * index)) & 0xFF) as u8,
                    );
                }
                large
            }
            None => self.out_of_memory(),
        }
    }

    // ── Class queries ──────────────────────────────────────────────

    pub(crate) fn instance_specification_of(&self, class_pointer: Oop) -> Oop {
        self.memory
            .fetch_pointer(INSTANCE_SPECIFICATION_INDEX, class_pointer)
    }

    pub(crate) fn is_pointers(&self, class_pointer: Oop) -> bool {
        object::extract_bits(0, 0, self.instance_specification_of(class_pointer))
            == 1
    }

    pub(crate) fn is_words(&self, class_pointer: Oop) -> bool {
        object::extract_bits(1, 1, self.instance_specification_of(class_pointer))
            == 1
    }

    pub(crate) fn is_indexable(&self, class_pointer: Oop) -> bool {
        object::extract_bits(2, 2, self.instance_specification_of(class_pointer))
            == 1
    }

    pub(crate) fn fixed_fields_of(&self, class_pointer: Oop) -> usize {
        object::extract_bits(4, 14, self.instance_specification_of(class_pointer))
            as usize
    }

    pub(crate) fn superclass_of(&self, class_pointer: Oop) -> Oop {
        self.memory.fetch_pointer(SUPERCLASS_INDEX, class_pointer)
    }

    // ── Compiled methods ───────────────────────────────────────────

    pub(crate) fn header_of(&self, method_pointer: Oop) -> Oop {
        self.memory.fetch_pointer(HEADER_INDEX, method_pointer)
    }

    pub(crate) fn method_header(&self, method_pointer: Oop) -> MethodHeader {
        MethodHeader::of_header_word(self.header_of(method_pointer))
    }

    pub(crate) fn header_extension_of(&self, method_pointer: Oop) -> Oop {
        let header = self.method_header(method_pointer);
        self.memory.fetch_pointer(
            header.extension_literal_index() + LITERAL_START,
            method_pointer,
        )
    }

    pub(crate) fn argument_count_of(&self, method_pointer: Oop) -> i32 {
        let header = self.method_header(method_pointer);
        let extension = if header.flag_value == 7 {
            self.header_extension_of(method_pointer)
        } else {
            0
        };
        header.argument_count_with(extension) as i32
    }

    pub(crate) fn primitive_index_of(&self, method_pointer: Oop) -> u16 {
        let header = self.method_header(method_pointer);
        if header.flag_value == 7 {
            header.primitive_index_with(self.header_extension_of(method_pointer))
        } else {
            0
        }
    }

    // ── Allocation with roots and cache hygiene ────────────────────

    /// The registers the collector must treat as roots, together with
    /// the well-known oops the interpreter reaches without references.
    pub(crate) fn gc_roots(&self) -> InterpreterRoots {
        let mut roots = vec![
            self.active_context,
            self.home_context,
            self.method,
            self.receiver,
            self.message_selector,
            self.new_method,
            self.new_process,
            self.current_display,
            self.current_cursor,
            self.input_semaphore,
            self.timer_semaphore,
            self.low_space_semaphore,
        ];
        roots.extend((2..=object::LAST_SPECIAL_OOP).step_by(2));
        roots.extend(self.signals.pending());
        InterpreterRoots { roots }
    }

    /// A collection invalidates the method cache: its entries hold
    /// uncounted oops.
    fn note_possible_collection(&mut self) {
        let epoch = self.memory.gc_epoch();
        if epoch != self.gc_epoch_seen {
            self.gc_epoch_seen = epoch;
            self.initialize_method_cache();
        }
    }

    pub(crate) fn instantiate_pointers(
        &mut self,
        class_pointer: Oop,
        length: usize,
    ) -> Option<Oop> {
        let mut roots = self.gc_roots();
        let result = self.memory.instantiate_class_with_pointers(
            class_pointer,
            length,
            &mut roots,
        );
        self.note_possible_collection();
        result
    }

    pub(crate) fn instantiate_words(
        &mut self,
        class_pointer: Oop,
        length: usize,
    ) -> Option<Oop> {
        let mut roots = self.gc_roots();
        let result = self.memory.instantiate_class_with_words(
            class_pointer,
            length,
            &mut roots,
        );
        self.note_possible_collection();
        result
    }

    pub(crate) fn instantiate_bytes(
        &mut self,
        class_pointer: Oop,
        length: usize,
    ) -> Option<Oop> {
        let mut roots = self.gc_roots();
        let result = self.memory.instantiate_class_with_bytes(
            class_pointer,
            length,
            &mut roots,
        );
        self.note_possible_collection();
        result
    }

    pub(crate) fn instantiate_method_object(
        &mut self,
        class_pointer: Oop,
        literal_count: usize,
        byte_count: usize,
    ) -> Option<Oop> {
        let mut roots = self.gc_roots();
        let result = self.memory.instantiate_method(
            class_pointer,
            literal_count,
            byte_count,
            &mut roots,
        );
        self.note_possible_collection();
        result
    }

    pub(crate) fn out_of_memory(&mut self) -> ! {
        self.error("object memory exhausted")
    }

    // ── Strings ────────────────────────────────────────────────────

    pub(crate) fn string_from_object(&self, string_pointer: Oop) -> String {
        let length = self.memory.fetch_byte_length_of(string_pointer);
        let mut bytes = Vec::with_capacity(length);
        for index in 0..length {
            bytes.push(self.memory.fetch_byte(index, string_pointer));
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub(crate) fn string_object_for(&mut self, string: &str) -> Option<Oop> {
        let bytes = string.as_bytes();
        let object = self.instantiate_bytes(CLASS_STRING_PTR, bytes.len())?;
        for (index, &byte) in bytes.iter().enumerate() {
            self.memory.store_byte(index, object, byte);
        }
        Some(object)
    }

    pub(crate) fn character_for(&self, ascii: u8) -> Oop {
        self.memory
            .fetch_pointer(ascii as usize, object::CHARACTER_TABLE_PTR)
    }

    pub(crate) fn ascii_of_character(&mut self, character: Oop) -> i16 {
        self.success(
            self.memory.fetch_class_of(character) == CLASS_CHARACTER_PTR,
        );
        if self.success_flag {
            self.fetch_integer_of_object(
                object::CHARACTER_VALUE_INDEX,
                character,
            )
        } else {
            0
        }
    }

    // ── Display access for the host ────────────────────────────────

    /// The display form's bits, if a form of the given extent is
    /// installed; hosts use this to blit the screen.
    pub fn display_bits(&self, width: u16, height: u16) -> Option<Oop> {
        if self.current_display == NIL_PTR {
            return None;
        }
        let form_width =
            self.fetch_integer_field(object::WIDTH_IN_FORM, self.current_display);
        let form_height =
            self.fetch_integer_field(object::HEIGHT_IN_FORM, self.current_display);
        if form_width as u16 != width || form_height as u16 != height {
            return None;
        }
        Some(
            self.memory
                .fetch_pointer(object::BITS_IN_FORM, self.current_display),
        )
    }

    /// Read-only access to display words for host blitting.
    pub fn fetch_word_of_display_bits(&self, word_index: usize, bits: Oop) -> u16 {
        self.memory.fetch_word(word_index, bits)
    }
}

const MAX_SMALL_INT_U32: u32 = object::MAX_SMALL_INT as u32;
