//! BitBlt: the bit-boundary block transfer kernel.
//!
//! Works on 16-bit words of one-bit-deep forms, rows padded to whole
//! words, most significant bit leftmost. The combination rule selects
//! one of the sixteen boolean functions of source and destination. The
//! inner loop shifts a two-word window of source across the skew so a
//! destination word is always assembled from at most two source words.

use memory::FileSystem;
use object::{integer_value_of, Oop, BITS_IN_FORM, NIL_PTR};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

const ALL_ONES: u16 = 0xFFFF;

const RIGHT_MASKS: [u16; 17] = [
    0x0000, 0x0001, 0x0003, 0x0007, 0x000F, 0x001F, 0x003F, 0x007F, 0x00FF,
    0x01FF, 0x03FF, 0x07FF, 0x0FFF, 0x1FFF, 0x3FFF, 0x7FFF, 0xFFFF,
];

// BitBlt instance fields
const DEST_FORM_INDEX: usize = 0;
const SOURCE_FORM_INDEX: usize = 1;
const HALFTONE_FORM_INDEX: usize = 2;
const COMBINATION_RULE_INDEX: usize = 3;
const DEST_X_INDEX: usize = 4;
const DEST_Y_INDEX: usize = 5;
const WIDTH_INDEX: usize = 6;
const HEIGHT_INDEX: usize = 7;
const SOURCE_X_INDEX: usize = 8;
const SOURCE_Y_INDEX: usize = 9;
const CLIP_X_INDEX: usize = 10;
const CLIP_Y_INDEX: usize = 11;
const CLIP_WIDTH_INDEX: usize = 12;
const CLIP_HEIGHT_INDEX: usize = 13;

// CharacterScanner extends BitBlt
const LAST_INDEX_INDEX: usize = 14;
const X_TABLE_INDEX: usize = 15;
const STOP_CONDITIONS_INDEX: usize = 16;

// TextConstants the scanner answers through its stops array
const END_OF_RUN: usize = 257;
const CROSSED_X: usize = 258;

pub(crate) struct BitBlt {
    pub(crate) dest_form: Oop,
    source_form: Oop,
    halftone_form: Oop,
    combination_rule: i32,
    dest_x: i32,
    dest_y: i32,
    width: i32,
    height: i32,
    source_x: i32,
    source_y: i32,
    clip_x: i32,
    clip_y: i32,
    clip_width: i32,
    clip_height: i32,

    pub(crate) dest_form_width: i32,
    pub(crate) dest_form_height: i32,
    source_form_width: i32,
    source_form_height: i32,

    // computed per transfer
    dest_bits: Oop,
    dest_bits_word_length: i32,
    dest_raster: i32,
    source_bits: Oop,
    source_bits_word_length: i32,
    source_raster: i32,
    halftone_bits: Oop,
    skew: i32,
    skew_mask: u16,
    mask1: u16,
    mask2: u16,
    preload: bool,
    n_words: i32,
    h_dir: i32,
    v_dir: i32,
    source_index: i32,
    dest_index: i32,
    source_delta: i32,
    dest_delta: i32,
    sx: i32,
    sy: i32,
    dx: i32,
    dy: i32,
    w: i32,
    h: i32,

    pub(crate) updated_x: i32,
    pub(crate) updated_y: i32,
    pub(crate) updated_width: i32,
    pub(crate) updated_height: i32,
}

fn form_word_count(width: i32, height: i32) -> i32 {
    (width + 15) / 16 * height
}

/// One of the sixteen boolean functions of two one-bit inputs, applied
/// word-wide.
fn merge(combination_rule: i32, source: u16, destination: u16) -> u16 {
    match combination_rule {
        0 => 0,
        1 => source & destination,
        2 => source & !destination,
        3 => source,
        4 => !source & destination,
        5 => destination,
        6 => source ^ destination,
        7 => source | destination,
        8 => !source & !destination,
        9 => !source ^ destination,
        10 => !destination,
        11 => source | !destination,
        12 => !source,
        13 => !source | destination,
        14 => !source | !destination,
        _ => ALL_ONES,
    }
}

impl BitBlt {
    /// Read a BitBlt object's fields; `None` when a numeric field holds
    /// a non-integer, which fails the calling primitive.
    pub(crate) fn from_object<H: Hal, F: FileSystem>(
        interpreter: &mut Interpreter<H, F>,
        blt_pointer: Oop,
    ) -> Option<Self> {
        let fetch_int = |interpreter: &mut Interpreter<H, F>, index: usize| {
            let pointer = interpreter.memory.fetch_pointer(index, blt_pointer);
            if object::is_integer_object(pointer) {
                Some(integer_value_of(pointer) as i32)
            } else {
                None
            }
        };
        let fetch_int_or = |interpreter: &mut Interpreter<H, F>,
                            index: usize,
                            default: i32| {
            fetch_int(interpreter, index).unwrap_or(default)
        };

        let memory = &interpreter.memory;
        let dest_form = memory.fetch_pointer(DEST_FORM_INDEX, blt_pointer);
        let source_form = memory.fetch_pointer(SOURCE_FORM_INDEX, blt_pointer);
        let halftone_form =
            memory.fetch_pointer(HALFTONE_FORM_INDEX, blt_pointer);
        if dest_form == NIL_PTR {
            return None;
        }

        let mut blt = BitBlt {
            dest_form,
            source_form,
            halftone_form,
            combination_rule: fetch_int(interpreter, COMBINATION_RULE_INDEX)?,
            dest_x: fetch_int_or(interpreter, DEST_X_INDEX, 0),
            dest_y: fetch_int_or(interpreter, DEST_Y_INDEX, 0),
            width: fetch_int_or(interpreter, WIDTH_INDEX, 0),
            height: fetch_int_or(interpreter, HEIGHT_INDEX, 0),
            source_x: fetch_int_or(interpreter, SOURCE_X_INDEX, 0),
            source_y: fetch_int_or(interpreter, SOURCE_Y_INDEX, 0),
            clip_x: fetch_int_or(interpreter, CLIP_X_INDEX, 0),
            clip_y: fetch_int_or(interpreter, CLIP_Y_INDEX, 0),
            clip_width: fetch_int_or(interpreter, CLIP_WIDTH_INDEX, 0),
            clip_height: fetch_int_or(interpreter, CLIP_HEIGHT_INDEX, 0),
            dest_form_width: 0,
            dest_form_height: 0,
            source_form_width: 0,
            source_form_height: 0,
            dest_bits: NIL_PTR,
            dest_bits_word_length: 0,
            dest_raster: 0,
            source_bits: NIL_PTR,
            source_bits_word_length: 0,
            source_raster: 0,
            halftone_bits: NIL_PTR,
            skew: 0,
            skew_mask: 0,
            mask1: 0,
            mask2: 0,
            preload: false,
            n_words: 0,
            h_dir: 1,
            v_dir: 1,
            source_index: 0,
            dest_index: 0,
            source_delta: 0,
            dest_delta: 0,
            sx: 0,
            sy: 0,
            dx: 0,
            dy: 0,
            w: 0,
            h: 0,
            updated_x: 0,
            updated_y: 0,
            updated_width: 0,
            updated_height: 0,
        };

        blt.dest_form_width = interpreter
            .fetch_integer_of_object(object::WIDTH_IN_FORM, dest_form)
            as i32;
        blt.dest_form_height = interpreter
            .fetch_integer_of_object(object::HEIGHT_IN_FORM, dest_form)
            as i32;
        if blt.source_form != NIL_PTR {
            blt.source_form_width = interpreter
                .fetch_integer_of_object(object::WIDTH_IN_FORM, blt.source_form)
                as i32;
            blt.source_form_height = interpreter
                .fetch_integer_of_object(object::HEIGHT_IN_FORM, blt.source_form)
                as i32;
        }
        interpreter.success_value().then_some(blt)
    }

    pub(crate) fn copy_bits<H: Hal, F: FileSystem>(
        &mut self,
        interpreter: &mut Interpreter<H, F>,
    ) -> bool {
        self.clip_range();
        if self.w <= 0 || self.h <= 0 {
            self.updated_x = 0;
            self.updated_y = 0;
            self.updated_width = 0;
            self.updated_height = 0;
            return true;
        }
        self.updated_x = self.dx;
        self.updated_y = self.dy;
        self.updated_width = self.w;
        self.updated_height = self.h;
        self.compute_masks(interpreter);
        // a Form whose bits were clamped at the WordArray maximum can
        // reach here with a short bitmap
        if self.source_form != NIL_PTR
            && form_word_count(self.source_form_width, self.source_form_height)
                != self.source_bits_word_length
        {
            return false;
        }
        if form_word_count(self.dest_form_width, self.dest_form_height)
            != self.dest_bits_word_length
        {
            return false;
        }
        self.check_overlap();
        self.calculate_offsets();
        self.copy_loop(interpreter);
        true
    }

    fn clip_range(&mut self) {
        if self.clip_x < 0 {
            self.clip_width += self.clip_x;
            self.clip_x = 0;
        }
        if self.clip_y < 0 {
            self.clip_height += self.clip_y;
            self.clip_y = 0;
        }
        if self.clip_x + self.clip_width > self.dest_form_width {
            self.clip_width = self.dest_form_width - self.clip_x;
        }
        if self.clip_y + self.clip_height > self.dest_form_height {
            self.clip_height = self.dest_form_height - self.clip_y;
        }

        // clip and adjust the source origin and extent, first in x
        if self.dest_x >= self.clip_x {
            self.sx = self.source_x;
            self.dx = self.dest_x;
            self.w = self.width;
        } else {
            self.sx = self.source_x + (self.clip_x - self.dest_x);
            self.w = self.width - (self.clip_x - self.dest_x);
            self.dx = self.clip_x;
        }
        if self.dx + self.w > self.clip_x + self.clip_width {
            self.w -= (self.dx + self.w) - (self.clip_x + self.clip_width);
        }

        // then in y
        if self.dest_y >= self.clip_y {
            self.sy = self.source_y;
            self.dy = self.dest_y;
            self.h = self.height;
        } else {
            self.sy = self.source_y + self.clip_y - self.dest_y;
            self.h = self.height - (self.clip_y - self.dest_y);
            self.dy = self.clip_y;
        }
        if self.dy + self.h > self.clip_y + self.clip_height {
            self.h -= (self.dy + self.h) - (self.clip_y + self.clip_height);
        }

        if self.source_form == NIL_PTR {
            return;
        }
        if self.sx < 0 {
            self.dx -= self.sx;
            self.w += self.sx;
            self.sx = 0;
        }
        if self.sx + self.w > self.source_form_width {
            self.w -= self.sx + self.w - self.source_form_width;
        }
        if self.sy < 0 {
            self.dy -= self.sy;
            self.h += self.sy;
            self.sy = 0;
        }
        if self.sy + self.h > self.source_form_height {
            self.h -= self.sy + self.h - self.source_form_height;
        }
    }

    fn compute_masks<H: Hal, F: FileSystem>(
        &mut self,
        interpreter: &Interpreter<H, F>,
    ) {
        let memory = &interpreter.memory;
        self.dest_bits = memory.fetch_pointer(BITS_IN_FORM, self.dest_form);
        self.dest_bits_word_length =
            memory.fetch_word_length_of(self.dest_bits) as i32;
        self.dest_raster = (self.dest_form_width - 1) / 16 + 1;
        if self.source_form != NIL_PTR {
            self.source_bits =
                memory.fetch_pointer(BITS_IN_FORM, self.source_form);
            self.source_bits_word_length =
                memory.fetch_word_length_of(self.source_bits) as i32;
            self.source_raster = (self.source_form_width - 1) / 16 + 1;
        } else {
            self.source_bits_word_length = 0;
        }
        if self.halftone_form != NIL_PTR {
            self.halftone_bits =
                memory.fetch_pointer(BITS_IN_FORM, self.halftone_form);
        }

        // how many bits the source is skewed right of the destination
        self.skew = (self.sx - self.dx) & 15;
        // bits in the first destination word
        let start_bits = 16 - (self.dx & 15);
        self.mask1 = RIGHT_MASKS[start_bits as usize];
        // bits in the last destination word
        let end_bits = 15 - ((self.dx + self.w - 1) & 15);
        self.mask2 = !RIGHT_MASKS[end_bits as usize];
        self.skew_mask = if self.skew == 0 {
            0
        } else {
            RIGHT_MASKS[(16 - self.skew) as usize]
        };
        if self.w < start_bits {
            self.mask1 &= self.mask2;
            self.mask2 = 0;
            self.n_words = 1;
        } else {
            self.n_words = (self.w - start_bits + 15) / 16 + 1;
        }
    }

    fn check_overlap(&mut self) {
        self.h_dir = 1;
        self.v_dir = 1;
        if self.source_form == self.dest_form && self.dy >= self.sy {
            if self.dy > self.sy {
                // start at the bottom
                self.v_dir = -1;
                self.sy = self.sy + self.h - 1;
                self.dy = self.dy + self.h - 1;
            } else if self.dx > self.sx {
                // same rows, backward in x: start at the right
                self.h_dir = -1;
                self.sx = self.sx + self.w - 1;
                self.dx = self.dx + self.w - 1;
                self.skew_mask = !self.skew_mask;
                std::mem::swap(&mut self.mask1, &mut self.mask2);
            }
        }
    }

    fn calculate_offsets(&mut self) {
        // two words of source feed the first destination word when the
        // skew pushes the window across a word boundary
        self.preload = self.source_form != NIL_PTR
            && self.skew != 0
            && self.skew <= (self.sx & 15);
        if self.h_dir < 0 {
            self.preload = !self.preload;
        }
        self.source_index = self.sy * self.source_raster + self.sx / 16;
        self.dest_index = self.dy * self.dest_raster + self.dx / 16;
        self.source_delta = self.source_raster * self.v_dir
            - (self.n_words + i32::from(self.preload)) * self.h_dir;
        self.dest_delta =
            self.dest_raster * self.v_dir - self.n_words * self.h_dir;
    }

    fn copy_loop<H: Hal, F: FileSystem>(
        &mut self,
        interpreter: &mut Interpreter<H, F>,
    ) {
        let mut this_word: u16 = 0;
        for _ in 1..=self.h {
            // vertical loop
            let halftone_word = if self.halftone_form != NIL_PTR {
                let word = interpreter
                    .memory
                    .fetch_word((self.dy & 15) as usize, self.halftone_bits);
                self.dy += self.v_dir;
                word
            } else {
                ALL_ONES
            };
            let mut skew_word = halftone_word;
            let mut prev_word: u16 = if self.preload {
                let word = interpreter
                    .memory
                    .fetch_word(self.source_index as usize, self.source_bits);
                self.source_index += self.h_dir;
                word
            } else {
                0
            };
            let mut merge_mask = self.mask1;
            for word in 1..=self.n_words {
                // horizontal loop
                if self.source_form != NIL_PTR {
                    prev_word &= self.skew_mask;
                    if self.source_index >= 0
                        && self.source_index < self.source_bits_word_length
                    {
                        this_word = interpreter.memory.fetch_word(
                            self.source_index as usize,
                            self.source_bits,
                        );
                    }
                    skew_word = prev_word | (this_word & !self.skew_mask);
                    prev_word = this_word;
                    // 16-bit rotate by the skew
                    skew_word = skew_word.rotate_left(self.skew as u32);
                }
                if self.dest_index < 0
                    || self.dest_index >= self.dest_bits_word_length
                {
                    return;
                }
                let dest_word = interpreter
                    .memory
                    .fetch_word(self.dest_index as usize, self.dest_bits);
                let merge_word = merge(
                    self.combination_rule,
                    skew_word & halftone_word,
                    dest_word,
                );
                interpreter.memory.store_word(
                    self.dest_index as usize,
                    self.dest_bits,
                    (merge_mask & merge_word) | (!merge_mask & dest_word),
                );
                self.source_index += self.h_dir;
                self.dest_index += self.h_dir;
                merge_mask = if word == self.n_words - 1 {
                    self.mask2
                } else {
                    ALL_ONES
                };
            }
            self.source_index += self.source_delta;
            self.dest_index += self.dest_delta;
        }
    }

    /// Walk a line from the destination origin, transferring once per
    /// step.
    pub(crate) fn draw_loop<H: Hal, F: FileSystem>(
        &mut self,
        interpreter: &mut Interpreter<H, F>,
        x_delta: i32,
        y_delta: i32,
    ) -> bool {
        let dx = x_delta.signum();
        let dy = y_delta.signum();
        let px = y_delta.abs();
        let py = x_delta.abs();
        if !self.copy_bits(interpreter) {
            return false;
        }
        if py > px {
            // more horizontal
            let mut p = py / 2;
            for i in 1..=py {
                self.dest_x += dx;
                p -= px;
                if p < 0 {
                    self.dest_y += dy;
                    p += py;
                }
                if i < py && !self.copy_bits(interpreter) {
                    return false;
                }
            }
        } else {
            // more vertical
            let mut p = px / 2;
            for i in 1..=px {
                self.dest_y += dy;
                p -= py;
                if p < 0 {
                    self.dest_x += dx;
                    p += px;
                }
                if i < px && !self.copy_bits(interpreter) {
                    return false;
                }
            }
        }
        true
    }
}

/// The text-display fast path: advance through a string by font widths,
/// stopping on special characters or the right margin.
pub(crate) struct CharacterScanner {
    blt: BitBlt,
    scanner_pointer: Oop,
    x_table: Oop,
    stop_conditions: Oop,
}

impl CharacterScanner {
    pub(crate) fn from_object<H: Hal, F: FileSystem>(
        interpreter: &mut Interpreter<H, F>,
        scanner_pointer: Oop,
    ) -> Option<Self> {
        let blt = BitBlt::from_object(interpreter, scanner_pointer)?;
        let x_table = interpreter
            .memory
            .fetch_pointer(X_TABLE_INDEX, scanner_pointer);
        let stop_conditions = interpreter
            .memory
            .fetch_pointer(STOP_CONDITIONS_INDEX, scanner_pointer);
        if x_table == NIL_PTR || stop_conditions == NIL_PTR {
            return None;
        }
        Some(Self {
            blt,
            scanner_pointer,
            x_table,
            stop_conditions,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn scan_characters<H: Hal, F: FileSystem>(
        &mut self,
        interpreter: &mut Interpreter<H, F>,
        start_index: i32,
        stop_index: i32,
        source_string: Oop,
        right_x: i32,
        stops: Oop,
        displaying: bool,
    ) -> Option<Oop> {
        let stops_length =
            interpreter.memory.fetch_word_length_of(stops) as i32;
        if stops_length < CROSSED_X as i32 {
            return None;
        }
        let x_table_length =
            interpreter.memory.fetch_word_length_of(self.x_table) as i32;
        let mut last_index = start_index;
        let result = loop {
            if last_index > stop_index {
                last_index = stop_index;
                break interpreter
                    .memory
                    .fetch_pointer(END_OF_RUN - 1, stops);
            }
            let ascii = interpreter
                .memory
                .fetch_byte(last_index as usize - 1, source_string)
                as i32;
            let stop = interpreter
                .memory
                .fetch_pointer(ascii as usize, self.stop_conditions);
            if stop != NIL_PTR {
                break interpreter
                    .memory
                    .fetch_pointer(ascii as usize, stops);
            }
            if ascii + 1 >= x_table_length {
                return None;
            }
            let source_x = integer_value_of(
                interpreter
                    .memory
                    .fetch_pointer(ascii as usize, self.x_table),
            ) as i32;
            let width = integer_value_of(
                interpreter
                    .memory
                    .fetch_pointer(ascii as usize + 1, self.x_table),
            ) as i32
                - source_x;
            let next_dest_x = self.blt.dest_x + width;
            if next_dest_x > right_x {
                break interpreter
                    .memory
                    .fetch_pointer(CROSSED_X - 1, stops);
            }
            if displaying {
                self.blt.source_x = source_x;
                self.blt.width = width;
                self.blt.copy_bits(interpreter);
            }
            self.blt.dest_x = next_dest_x;
            last_index += 1;
        };
        interpreter.store_integer_field(
            LAST_INDEX_INDEX,
            self.scanner_pointer,
            last_index,
        );
        // the advancing pen position survives the primitive
        interpreter.store_integer_field(
            DEST_X_INDEX,
            self.scanner_pointer,
            self.blt.dest_x,
        );
        if displaying {
            interpreter.update_display(
                self.blt.dest_form,
                0,
                0,
                self.blt.dest_form_width,
                self.blt.dest_form_height,
            );
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_sixteen_combination_rules() {
        let source: u16 = 0b1100;
        let destination: u16 = 0b1010;
        assert_eq!(merge(0, source, destination), 0);
        assert_eq!(merge(1, source, destination), 0b1000);
        assert_eq!(merge(2, source, destination), 0b0100);
        assert_eq!(merge(3, source, destination), source);
        assert_eq!(merge(4, source, destination), 0b0010);
        assert_eq!(merge(5, source, destination), destination);
        assert_eq!(merge(6, source, destination), 0b0110);
        assert_eq!(merge(7, source, destination), 0b1110);
        assert_eq!(merge(8, source, destination), !0b1110);
        assert_eq!(merge(9, source, destination), !0b0110);
        assert_eq!(merge(10, source, destination), !destination);
        assert_eq!(merge(11, source, destination), source | !destination);
        assert_eq!(merge(12, source, destination), !source);
        assert_eq!(merge(13, source, destination), !source | destination);
        assert_eq!(merge(14, source, destination), !(source & destination));
        assert_eq!(merge(15, source, destination), ALL_ONES);
    }

    #[test]
    fn right_masks_cover_every_width() {
        assert_eq!(RIGHT_MASKS[0], 0);
        assert_eq!(RIGHT_MASKS[16], 0xFFFF);
        for bits in 1..=16usize {
            assert_eq!(RIGHT_MASKS[bits].count_ones() as usize, bits);
        }
    }

    #[test]
    fn form_words_round_up_to_whole_words() {
        assert_eq!(form_word_count(16, 1), 1);
        assert_eq!(form_word_count(17, 1), 2);
        assert_eq!(form_word_count(1, 3), 3);
        assert_eq!(form_word_count(640, 480), 40 * 480);
    }
}
