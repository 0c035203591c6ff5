//! Subscript and stream primitives, 60 through 67.
//!
//! `at:` and friends use one-based subscripts past any fixed fields and
//! answer Characters for Strings. The stream fast paths cover
//! ReadStream/WriteStream over Arrays and Strings using the stream's
//! four well-known fields.

use memory::FileSystem;
use object::{
    integer_object_of, is_integer_object, Oop, CLASS_ARRAY_PTR,
    CLASS_STRING_PTR, FALSE_PTR, STREAM_ARRAY_INDEX, STREAM_INDEX_INDEX,
    STREAM_READ_LIMIT_INDEX, STREAM_WRITE_LIMIT_INDEX, TRUE_PTR,
};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_subscript_and_stream_primitives(&mut self) {
        match self.primitive_index {
            60 => self.primitive_at(),
            61 => self.primitive_at_put(),
            62 => self.primitive_size(),
            63 => self.primitive_string_at(),
            64 => self.primitive_string_at_put(),
            65 => self.primitive_next(),
            66 => self.primitive_next_put(),
            67 => self.primitive_at_end(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    /// Indexable element count: words for pointer and word classes,
    /// bytes otherwise.
    pub(crate) fn length_of(&self, array: Oop) -> usize {
        let class = self.memory.fetch_class_of(array);
        if self.is_pointers(class) || self.is_words(class) {
            self.memory.fetch_word_length_of(array)
        } else {
            self.memory.fetch_byte_length_of(array)
        }
    }

    pub(crate) fn check_indexable_bounds_of(&mut self, index: i32, array: Oop) {
        let class = self.memory.fetch_class_of(array);
        self.success(index >= 1);
        self.success(
            index as i64 + self.fixed_fields_of(class) as i64
                <= self.length_of(array) as i64,
        );
    }

    /// One-based element fetch over the whole body, fixed fields
    /// included.
    pub(crate) fn subscript_with(&mut self, array: Oop, index: i32) -> Oop {
        let class = self.memory.fetch_class_of(array);
        if self.is_pointers(class) {
            self.memory.fetch_pointer(index as usize - 1, array)
        } else if self.is_words(class) {
            let value = self.memory.fetch_word(index as usize - 1, array);
            self.positive_16bit_integer_for(value as i32)
        } else {
            let value = self.memory.fetch_byte(index as usize - 1, array);
            integer_object_of(value as i16)
        }
    }

    pub(crate) fn subscript_with_storing(
        &mut self,
        array: Oop,
        index: i32,
        value: Oop,
    ) {
        let class = self.memory.fetch_class_of(array);
        if self.is_pointers(class) {
            self.memory.store_pointer(index as usize - 1, array, value);
        } else if self.is_words(class) {
            let word = self.positive_16bit_value_of(value);
            if self.success_value() {
                self.memory.store_word(index as usize - 1, array, word);
            }
        } else {
            self.success(is_integer_object(value));
            if self.success_value() {
                let byte = object::integer_value_of(value);
                self.success((0..=255).contains(&byte));
                if self.success_value() {
                    self.memory
                        .store_byte(index as usize - 1, array, byte as u8);
                }
            }
        }
    }

    fn primitive_at(&mut self) {
        let index_pointer = self.pop_stack();
        let index = self.positive_16bit_value_of(index_pointer) as i32;
        let array = self.pop_stack();
        let array_class = self.memory.fetch_class_of(array);
        self.check_indexable_bounds_of(index, array);
        if self.success_value() {
            let index = index + self.fixed_fields_of(array_class) as i32;
            let result = self.subscript_with(array, index);
            self.push(result);
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_at_put(&mut self) {
        let value = self.pop_stack();
        let index_pointer = self.pop_stack();
        let index = self.positive_16bit_value_of(index_pointer) as i32;
        let array = self.pop_stack();
        let array_class = self.memory.fetch_class_of(array);
        self.check_indexable_bounds_of(index, array);
        if self.success_value() {
            let index = index + self.fixed_fields_of(array_class) as i32;
            self.subscript_with_storing(array, index, value);
        }
        if self.success_value() {
            self.push(value);
        } else {
            self.un_pop(3);
        }
    }

    fn primitive_size(&mut self) {
        let array = self.pop_stack();
        if is_integer_object(array) {
            self.primitive_fail();
            self.un_pop(1);
            return;
        }
        let class = self.memory.fetch_class_of(array);
        let length =
            self.length_of(array).saturating_sub(self.fixed_fields_of(class));
        let result = self.positive_16bit_integer_for(length as i32);
        if self.success_value() {
            self.push(result);
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_string_at(&mut self) {
        let index_pointer = self.pop_stack();
        let index = self.positive_16bit_value_of(index_pointer) as i32;
        let array = self.pop_stack();
        self.success(self.memory.fetch_class_of(array) == CLASS_STRING_PTR);
        self.check_indexable_bounds_of(index, array);
        if self.success_value() {
            let ascii = self.memory.fetch_byte(index as usize - 1, array);
            let character = self.character_for(ascii);
            self.push(character);
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_string_at_put(&mut self) {
        let character = self.pop_stack();
        let index_pointer = self.pop_stack();
        let index = self.positive_16bit_value_of(index_pointer) as i32;
        let array = self.pop_stack();
        self.success(self.memory.fetch_class_of(array) == CLASS_STRING_PTR);
        self.check_indexable_bounds_of(index, array);
        let ascii = self.ascii_of_character(character);
        if self.success_value() {
            self.memory
                .store_byte(index as usize - 1, array, ascii as u8);
            self.push(character);
        } else {
            self.un_pop(3);
        }
    }

    fn primitive_next(&mut self) {
        let stream = self.pop_stack();
        let array = self.memory.fetch_pointer(STREAM_ARRAY_INDEX, stream);
        let array_class = self.memory.fetch_class_of(array);
        let mut index =
            self.fetch_integer_of_object(STREAM_INDEX_INDEX, stream) as i32;
        let limit =
            self.fetch_integer_of_object(STREAM_READ_LIMIT_INDEX, stream) as i32;
        self.success(index < limit);
        self.success(
            array_class == CLASS_ARRAY_PTR || array_class == CLASS_STRING_PTR,
        );
        if self.success_value() {
            index += 1;
            let result = self.subscript_with(array, index);
            self.store_integer_of_object(STREAM_INDEX_INDEX, stream, index);
            if array_class == CLASS_ARRAY_PTR {
                self.push(result);
            } else {
                let ascii = object::integer_value_of(result);
                let character = self.character_for(ascii as u8);
                self.push(character);
            }
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_next_put(&mut self) {
        let value = self.pop_stack();
        let stream = self.pop_stack();
        let array = self.memory.fetch_pointer(STREAM_ARRAY_INDEX, stream);
        let array_class = self.memory.fetch_class_of(array);
        let mut index =
            self.fetch_integer_of_object(STREAM_INDEX_INDEX, stream) as i32;
        let limit = self
            .fetch_integer_of_object(STREAM_WRITE_LIMIT_INDEX, stream)
            as i32;
        self.success(index < limit);
        self.success(
            array_class == CLASS_ARRAY_PTR || array_class == CLASS_STRING_PTR,
        );
        if self.success_value() {
            index += 1;
            if array_class == CLASS_ARRAY_PTR {
                self.subscript_with_storing(array, index, value);
            } else {
                let ascii = self.ascii_of_character(value);
                if self.success_value() {
                    self.memory
                        .store_byte(index as usize - 1, array, ascii as u8);
                }
            }
        }
        if self.success_value() {
            self.store_integer_of_object(STREAM_INDEX_INDEX, stream, index);
            self.push(value);
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_at_end(&mut self) {
        let stream = self.pop_stack();
        let array = self.memory.fetch_pointer(STREAM_ARRAY_INDEX, stream);
        let array_class = self.memory.fetch_class_of(array);
        let index =
            self.fetch_integer_of_object(STREAM_INDEX_INDEX, stream) as i32;
        let limit =
            self.fetch_integer_of_object(STREAM_READ_LIMIT_INDEX, stream) as i32;
        self.success(
            array_class == CLASS_ARRAY_PTR || array_class == CLASS_STRING_PTR,
        );
        if self.success_value() {
            self.push(if index >= limit { TRUE_PTR } else { FALSE_PTR });
        } else {
            self.un_pop(1);
        }
    }
}
