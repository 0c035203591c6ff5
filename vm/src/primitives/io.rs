//! Input/output primitives, 90 through 109.
//!
//! Mouse and cursor, the input word queue, BitBlt entry points, clock
//! access, timer scheduling and snapshots.

use memory::FileSystem;
use object::{
    Oop, BITS_IN_FORM, CLASS_POINT_PTR, CLASS_POINT_SIZE, CLASS_SEMAPHORE_PTR,
    HEIGHT_IN_FORM, NIL_PTR, TRUE_PTR, WIDTH_IN_FORM, X_INDEX, Y_INDEX,
};
use tracing::info;

use crate::bitblt::{BitBlt, CharacterScanner};
use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_input_output_primitives(&mut self) {
        match self.primitive_index {
            90 => self.primitive_mouse_point(),
            91 => self.primitive_cursor_loc_put(),
            92 => self.primitive_cursor_link(),
            93 => self.primitive_input_semaphore(),
            94 => self.primitive_sample_interval(),
            95 => self.primitive_input_word(),
            96 => self.primitive_copy_bits(),
            97 => self.primitive_snapshot(),
            98 => self.primitive_time_words_into(),
            99 => self.primitive_tick_words_into(),
            100 => self.primitive_signal_at_tick(),
            101 => self.primitive_be_cursor(),
            102 => self.primitive_be_display(),
            103 => self.primitive_scan_characters(),
            104 => self.primitive_draw_loop(),
            105 => self.primitive_string_replace(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    fn primitive_mouse_point(&mut self) {
        self.pop_stack();
        let (x, y) = self.hal.cursor_location();
        let point = self
            .instantiate_pointers(CLASS_POINT_PTR, CLASS_POINT_SIZE)
            .unwrap_or_else(|| self.out_of_memory());
        self.store_integer_field(X_INDEX, point, x.clamp(-16384, 16383));
        self.store_integer_field(Y_INDEX, point, y.clamp(-16384, 16383));
        self.push(point);
    }

    fn primitive_cursor_loc_put(&mut self) {
        let point = self.pop_stack();
        self.success(self.memory.fetch_class_of(point) == CLASS_POINT_PTR);
        if self.success_value() {
            let x = self.fetch_integer_of_object(X_INDEX, point);
            let y = self.fetch_integer_of_object(Y_INDEX, point);
            if self.success_value() {
                self.hal.set_cursor_location(x as i32, y as i32);
                return;
            }
        }
        self.un_pop(1);
    }

    fn primitive_cursor_link(&mut self) {
        let flag = self.pop_stack();
        self.hal.set_link_cursor(flag == TRUE_PTR);
    }

    fn primitive_input_semaphore(&mut self) {
        let semaphore = self.pop_stack();
        self.success(
            semaphore == NIL_PTR
                || self.memory.fetch_class_of(semaphore) == CLASS_SEMAPHORE_PTR,
        );
        if self.success_value() {
            if self.input_semaphore != NIL_PTR {
                self.memory.decrease_references_to(self.input_semaphore);
            }
            self.input_semaphore = semaphore;
            self.memory.increase_references_to(semaphore);
            self.hal.set_input_semaphore(semaphore);
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_sample_interval(&mut self) {
        let interval = self.pop_integer();
        if self.success_value() {
            self.sample_interval = interval as i32;
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_input_word(&mut self) {
        self.pop_stack();
        match self.hal.next_input_word() {
            Some(word) => {
                let result = self.positive_16bit_integer_for(word as i32);
                self.push(result);
            }
            None => {
                self.primitive_fail();
                self.un_pop(1);
            }
        }
    }

    fn primitive_copy_bits(&mut self) {
        let blt_pointer = self.stack_top();
        let Some(mut blt) = BitBlt::from_object(self, blt_pointer) else {
            self.primitive_fail();
            return;
        };
        if !blt.copy_bits(self) {
            self.primitive_fail();
            return;
        }
        self.update_display(
            blt.dest_form,
            blt.updated_x,
            blt.updated_y,
            blt.updated_width,
            blt.updated_height,
        );
    }

    pub(crate) fn update_display(
        &mut self,
        dest_form: Oop,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) {
        if dest_form == self.current_display && width > 0 && height > 0 {
            self.hal.display_changed(x, y, width, height);
        }
    }

    fn primitive_snapshot(&mut self) {
        // the resumed image must find nil on top where the running one
        // sees the receiver again
        let this_receiver = self.pop_stack();
        self.push(NIL_PTR);
        self.store_context_registers();
        let image_name = self.hal.image_name().to_string();
        let result = self
            .fs
            .open_image(&image_name, true)
            .and_then(|mut stream| self.memory.save_snapshot(&mut stream));
        self.pop(1);
        self.push(this_receiver);
        match result {
            Ok(()) => info!(image = %image_name, "snapshot written"),
            Err(error) => {
                info!(image = %image_name, %error, "snapshot failed");
                self.primitive_fail();
            }
        }
    }

    /// Seconds since the Smalltalk epoch into a four-byte array, least
    /// significant byte first.
    fn primitive_time_words_into(&mut self) {
        let array = self.pop_stack();
        self.pop_stack();
        let time = self.hal.smalltalk_epoch_time();
        self.store_clock_bytes(array, time);
        self.push(array);
    }

    fn primitive_tick_words_into(&mut self) {
        let array = self.pop_stack();
        self.pop_stack();
        let ticks = self.hal.msclock();
        self.store_clock_bytes(array, ticks);
        self.push(array);
    }

    fn store_clock_bytes(&mut self, array: Oop, value: u32) {
        self.success(self.memory.fetch_byte_length_of(array) >= 4);
        if self.success_value() {
            for index in 0..4 {
                self.memory.store_byte(
                    index,
                    array,
                    ((value >> (8 * index)) & 0xFF) as u8,
                );
            }
        }
    }

    fn primitive_signal_at_tick(&mut self) {
        let time_pointer = self.pop_stack();
        let time = self.positive_32bit_value_of(time_pointer);
        let semaphore = self.pop_stack();
        let install = semaphore != NIL_PTR;
        if install {
            self.success(
                self.memory.fetch_class_of(semaphore) == CLASS_SEMAPHORE_PTR,
            );
        }
        if self.success_value() {
            if self.timer_semaphore != NIL_PTR {
                self.memory.decrease_references_to(self.timer_semaphore);
            }
            if install {
                self.timer_semaphore = semaphore;
                self.memory.increase_references_to(semaphore);
                self.hal.signal_at(semaphore, time);
            } else {
                self.timer_semaphore = NIL_PTR;
                self.hal.signal_at(0, 0);
            }
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_be_cursor(&mut self) {
        let cursor = self.stack_top();
        let bits = self.memory.fetch_pointer(BITS_IN_FORM, cursor);
        self.success(self.memory.fetch_word_length_of(bits) >= 16);
        if self.success_value() {
            let mut image = [0u16; 16];
            for (row, slot) in image.iter_mut().enumerate() {
                *slot = self.memory.fetch_word(row, bits);
            }
            if self.current_cursor != NIL_PTR {
                self.memory.decrease_references_to(self.current_cursor);
            }
            self.current_cursor = cursor;
            self.memory.increase_references_to(cursor);
            self.hal.set_cursor_image(&image);
        }
    }

    fn primitive_be_display(&mut self) {
        let form = self.stack_top();
        let width = self.fetch_integer_of_object(WIDTH_IN_FORM, form);
        let height = self.fetch_integer_of_object(HEIGHT_IN_FORM, form);
        if self.success_value() {
            if self.current_display != NIL_PTR {
                self.memory.decrease_references_to(self.current_display);
            }
            self.current_display = form;
            self.memory.increase_references_to(form);
            self.hal.set_display_size(width as u16, height as u16);
        }
    }

    fn primitive_scan_characters(&mut self) {
        let display = self.pop_stack();
        let stops = self.pop_stack();
        let right_x_pointer = self.pop_stack();
        let right_x = self.positive_16bit_value_of(right_x_pointer) as i32;
        let source_string = self.pop_stack();
        let stop_index_pointer = self.pop_stack();
        let stop_index = self.positive_16bit_value_of(stop_index_pointer) as i32;
        let start_index_pointer = self.pop_stack();
        let start_index = self.positive_16bit_value_of(start_index_pointer) as i32;
        let scanner_pointer = self.pop_stack();
        self.success(start_index >= 1);
        self.success(
            stop_index as i64
                <= self.memory.fetch_byte_length_of(source_string) as i64,
        );
        if !self.success_value() {
            self.un_pop(7);
            return;
        }
        let Some(mut scanner) = CharacterScanner::from_object(self, scanner_pointer)
        else {
            self.primitive_fail();
            self.un_pop(7);
            return;
        };
        match scanner.scan_characters(
            self,
            start_index,
            stop_index,
            source_string,
            right_x,
            stops,
            display == TRUE_PTR,
        ) {
            Some(stop) => self.push(stop),
            None => {
                self.primitive_fail();
                self.un_pop(7);
            }
        }
    }

    fn primitive_draw_loop(&mut self) {
        let y_delta = self.pop_integer() as i32;
        let x_delta = self.pop_integer() as i32;
        let blt_pointer = self.stack_top();
        if !self.success_value() {
            self.un_pop(2);
            return;
        }
        let Some(mut blt) = BitBlt::from_object(self, blt_pointer) else {
            self.primitive_fail();
            self.un_pop(2);
            return;
        };
        if !blt.draw_loop(self, x_delta, y_delta) {
            self.primitive_fail();
            self.un_pop(2);
            return;
        }
        self.update_display(
            blt.dest_form,
            0,
            0,
            blt.dest_form_width,
            blt.dest_form_height,
        );
    }

    /// `replaceFrom:to:with:startingAt:` without the element-by-element
    /// sends.
    fn primitive_string_replace(&mut self) {
        let rep_start = self.pop_integer() as i32;
        let replacement = self.pop_stack();
        let stop = self.pop_integer() as i32;
        let start = self.pop_integer() as i32;
        let array = self.stack_top();
        if !self.success_value() {
            self.un_pop(4);
            return;
        }
        let array_class = self.memory.fetch_class_of(array);
        let replacement_class = self.memory.fetch_class_of(replacement);
        let count = stop - start + 1;
        self.success(start >= 1 && count >= 0);
        self.success(
            stop as i64 <= self.length_of(array) as i64
                && (rep_start + count - 1) as i64
                    <= self.length_of(replacement) as i64,
        );
        self.success(rep_start >= 1);
        // both sides must agree on their body representation
        let pointers = self.is_pointers(array_class);
        self.success(pointers == self.is_pointers(replacement_class));
        let words = self.is_words(array_class);
        self.success(words == self.is_words(replacement_class));
        if !self.success_value() {
            self.un_pop(4);
            return;
        }
        for offset in 0..count {
            let to = (start - 1 + offset) as usize;
            let from = (rep_start - 1 + offset) as usize;
            if pointers {
                let value = self.memory.fetch_pointer(from, replacement);
                self.memory.store_pointer(to, array, value);
            } else if words {
                let value = self.memory.fetch_word(from, replacement);
                self.memory.store_word(to, array, value);
            } else {
                let value = self.memory.fetch_byte(from, replacement);
                self.memory.store_byte(to, array, value);
            }
        }
    }
}
