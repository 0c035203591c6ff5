use crate::layout::LITERAL_START;
use crate::oop::{extract_bits, Oop};

/// Decoded CompiledMethod header word.
///
/// The header is literal zero of every method, stored as a SmallInteger
/// whose raw bits carry the fields below (bit 0 is the word's most
/// significant bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHeader {
    /// Bits 0..=2. 0..=4: normal with that many arguments; 5: quick
    /// return self; 6: quick instance-variable load; 7: header extension
    /// present (primitive and argument count live there).
    pub flag_value: u16,
    /// Bits 3..=7.
    pub temporary_count: u16,
    /// Bit 8: contexts for this method get the 32-slot stack frame.
    pub large_context: bool,
    /// Bits 9..=14.
    pub literal_count: u16,
}

impl MethodHeader {
    pub fn of_header_word(header: Oop) -> Self {
        Self {
            flag_value: extract_bits(0, 2, header),
            temporary_count: extract_bits(3, 7, header),
            large_context: extract_bits(8, 8, header) == 1,
            literal_count: extract_bits(9, 14, header),
        }
    }

    /// Byte offset of the first bytecode, 1-based as stored in contexts.
    pub fn initial_instruction_pointer(&self) -> u16 {
        (self.literal_count + LITERAL_START as u16) * 2 + 1
    }

    /// Word index of the header extension literal, if `flag_value` is 7.
    pub fn extension_literal_index(&self) -> usize {
        self.literal_count as usize - 2
    }

    /// Total pointer fields (header plus literal frame); the rest of a
    /// method is bytes.
    pub fn object_pointer_count(&self) -> usize {
        self.literal_count as usize + LITERAL_START
    }

    /// Field index for a quick instance-variable load (flag 6).
    pub fn quick_field_index(&self) -> usize {
        self.temporary_count as usize
    }

    /// Argument count, given the extension word for flag 7 methods.
    pub fn argument_count_with(&self, extension: Oop) -> u16 {
        match self.flag_value {
            0..=4 => self.flag_value,
            5 | 6 => 0,
            _ => extract_bits(2, 6, extension),
        }
    }

    /// Primitive index, given the extension word for flag 7 methods.
    pub fn primitive_index_with(&self, extension: Oop) -> u16 {
        if self.flag_value == 7 {
            extract_bits(7, 14, extension)
        } else {
            0
        }
    }
}
