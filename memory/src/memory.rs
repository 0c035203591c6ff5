//! The object memory: an object table over segmented heap storage.
//!
//! Every non-immediate oop indexes a two-word object table entry in the
//! last segment; the entry carries the reference count, status flags and
//! the (segment, location) of the object's heap chunk. A chunk is a
//! two-word header (size in words, class oop) followed by the body.

use bitflags::bitflags;
use object::{
    is_integer_object, Oop, CLASS_COMPILED_METHOD_PTR, CLASS_SMALL_INTEGER,
    NIL_PTR, NON_POINTER,
};

use crate::words::WordMemory;
use crate::{
    RootProvider, FREE_POINTER_LIST, HEADER_SIZE, HUGE_SIZE,
    OBJECT_TABLE_SEGMENT, OBJECT_TABLE_SIZE, OBJECT_TABLE_START,
};

bitflags! {
    /// Flag bits of an object table entry's first word.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct OtFlags: u16 {
        /// Byte objects with an odd byte length waste the low byte of
        /// their last word.
        const ODD = 1 << 7;
        /// The body holds oops, one per word.
        const POINTER = 1 << 6;
        /// The entry is on the free-pointer list.
        const FREE = 1 << 5;
    }
}

#[derive(Debug)]
pub struct ObjectMemory {
    pub(crate) words: WordMemory,
    /// The heap segment allocation currently works in.
    pub(crate) current_segment: usize,
    /// Free heap words across all segments, kept for `coreLeft`.
    pub(crate) free_words: u32,
    /// Free object table entries (free bit set, or referencing a free
    /// chunk), kept for `oopsLeft`.
    pub(crate) free_oops: u32,
    /// Bumped by every mark-sweep run; clients watch it to invalidate
    /// caches of uncounted oops.
    pub(crate) gc_epoch: u64,
}

impl ObjectMemory {
    /// An empty memory: every heap word free, every table entry on the
    /// free-pointer list. Images normally arrive via snapshot load.
    pub fn new() -> Self {
        let mut memory = Self {
            words: WordMemory::new(),
            current_segment: crate::FIRST_HEAP_SEGMENT,
            free_words: 0,
            free_oops: 0,
            gc_epoch: 0,
        };
        memory.format();
        memory
    }

    /// Collections so far; see the field note.
    pub fn gc_epoch(&self) -> u64 {
        self.gc_epoch
    }

    #[inline(always)]
    pub(crate) fn cant_be_integer_object(&self, object_pointer: Oop) {
        debug_assert!(
            !is_integer_object(object_pointer),
            "a small integer has no object table entry"
        );
    }

    // ── Object table entries ───────────────────────────────────────

    #[inline(always)]
    pub(crate) fn ot(&self, object_pointer: Oop) -> u16 {
        self.cant_be_integer_object(object_pointer);
        self.words.word(
            OBJECT_TABLE_SEGMENT,
            OBJECT_TABLE_START + object_pointer as usize,
        )
    }

    #[inline(always)]
    pub(crate) fn ot_put(&mut self, object_pointer: Oop, value: u16) {
        self.cant_be_integer_object(object_pointer);
        self.words.word_put(
            OBJECT_TABLE_SEGMENT,
            OBJECT_TABLE_START + object_pointer as usize,
            value,
        );
    }

    #[inline(always)]
    fn ot_flag(&self, object_pointer: Oop, flag: OtFlags) -> u16 {
        u16::from(
            OtFlags::from_bits_truncate(self.ot(object_pointer)).contains(flag),
        )
    }

    #[inline(always)]
    fn ot_flag_put(&mut self, object_pointer: Oop, flag: OtFlags, value: u16) {
        let word = self.ot(object_pointer);
        let word = if value != 0 {
            word | flag.bits()
        } else {
            word & !flag.bits()
        };
        self.ot_put(object_pointer, word);
    }

    /// The count lives in the high byte of the entry word.
    #[inline(always)]
    pub(crate) fn count_bits_of(&self, object_pointer: Oop) -> u16 {
        self.ot(object_pointer) >> 8
    }

    #[inline(always)]
    pub(crate) fn count_bits_of_put(&mut self, object_pointer: Oop, value: u16) {
        let word = (self.ot(object_pointer) & 0x00FF) | (value << 8);
        self.ot_put(object_pointer, word);
    }

    #[inline(always)]
    pub(crate) fn odd_bit_of(&self, object_pointer: Oop) -> u16 {
        self.ot_flag(object_pointer, OtFlags::ODD)
    }

    #[inline(always)]
    pub(crate) fn odd_bit_of_put(&mut self, object_pointer: Oop, value: u16) {
        self.ot_flag_put(object_pointer, OtFlags::ODD, value);
    }

    #[inline(always)]
    pub(crate) fn pointer_bit_of(&self, object_pointer: Oop) -> u16 {
        self.ot_flag(object_pointer, OtFlags::POINTER)
    }

    #[inline(always)]
    pub(crate) fn pointer_bit_of_put(&mut self, object_pointer: Oop, value: u16) {
        self.ot_flag_put(object_pointer, OtFlags::POINTER, value);
    }

    #[inline(always)]
    pub(crate) fn free_bit_of(&self, object_pointer: Oop) -> u16 {
        self.ot_flag(object_pointer, OtFlags::FREE)
    }

    #[inline(always)]
    pub(crate) fn free_bit_of_put(&mut self, object_pointer: Oop, value: u16) {
        self.ot_flag_put(object_pointer, OtFlags::FREE, value);
    }

    /// The segment number is the low nibble of the entry word.
    #[inline(always)]
    pub(crate) fn segment_bits_of(&self, object_pointer: Oop) -> usize {
        (self.ot(object_pointer) & 0x000F) as usize
    }

    #[inline(always)]
    pub(crate) fn segment_bits_of_put(&mut self, object_pointer: Oop, value: usize) {
        let word = (self.ot(object_pointer) & 0xFFF0) | (value as u16 & 0x000F);
        self.ot_put(object_pointer, word);
    }

    #[inline(always)]
    pub(crate) fn location_bits_of(&self, object_pointer: Oop) -> usize {
        self.cant_be_integer_object(object_pointer);
        self.words.word(
            OBJECT_TABLE_SEGMENT,
            OBJECT_TABLE_START + object_pointer as usize + 1,
        ) as usize
    }

    #[inline(always)]
    pub(crate) fn location_bits_of_put(
        &mut self,
        object_pointer: Oop,
        value: usize,
    ) {
        self.cant_be_integer_object(object_pointer);
        self.words.word_put(
            OBJECT_TABLE_SEGMENT,
            OBJECT_TABLE_START + object_pointer as usize + 1,
            value as u16,
        );
    }

    // ── Heap chunks ────────────────────────────────────────────────

    #[inline(always)]
    pub(crate) fn heap_chunk_word(&self, object_pointer: Oop, offset: usize) -> u16 {
        self.words.word(
            self.segment_bits_of(object_pointer),
            self.location_bits_of(object_pointer) + offset,
        )
    }

    #[inline(always)]
    pub(crate) fn heap_chunk_word_put(
        &mut self,
        object_pointer: Oop,
        offset: usize,
        value: u16,
    ) {
        let segment = self.segment_bits_of(object_pointer);
        let location = self.location_bits_of(object_pointer);
        self.words.word_put(segment, location + offset, value);
    }

    #[inline(always)]
    pub(crate) fn heap_chunk_byte(&self, object_pointer: Oop, offset: usize) -> u8 {
        self.words.byte(
            self.segment_bits_of(object_pointer),
            self.location_bits_of(object_pointer) + offset / 2,
            offset % 2,
        )
    }

    #[inline(always)]
    pub(crate) fn heap_chunk_byte_put(
        &mut self,
        object_pointer: Oop,
        offset: usize,
        value: u8,
    ) {
        let segment = self.segment_bits_of(object_pointer);
        let word = self.location_bits_of(object_pointer) + offset / 2;
        self.words.byte_put(segment, word, offset % 2, value);
    }

    #[inline(always)]
    pub(crate) fn size_bits_of(&self, object_pointer: Oop) -> usize {
        self.heap_chunk_word(object_pointer, 0) as usize
    }

    #[inline(always)]
    pub(crate) fn size_bits_of_put(&mut self, object_pointer: Oop, value: usize) {
        self.heap_chunk_word_put(object_pointer, 0, value as u16);
    }

    #[inline(always)]
    pub(crate) fn class_bits_of(&self, object_pointer: Oop) -> Oop {
        self.heap_chunk_word(object_pointer, 1)
    }

    #[inline(always)]
    pub(crate) fn class_bits_of_put(&mut self, object_pointer: Oop, value: Oop) {
        self.heap_chunk_word_put(object_pointer, 1, value);
    }

    // ── Public accessors ───────────────────────────────────────────

    pub fn fetch_class_of(&self, object_pointer: Oop) -> Oop {
        if is_integer_object(object_pointer) {
            CLASS_SMALL_INTEGER
        } else {
            self.class_bits_of(object_pointer)
        }
    }

    /// Body length in words.
    pub fn fetch_word_length_of(&self, object_pointer: Oop) -> usize {
        self.size_bits_of(object_pointer) - HEADER_SIZE
    }

    /// Body length in bytes, honouring the odd-byte flag.
    pub fn fetch_byte_length_of(&self, object_pointer: Oop) -> usize {
        self.fetch_word_length_of(object_pointer) * 2
            - self.odd_bit_of(object_pointer) as usize
    }

    pub fn fetch_pointer(&self, field_index: usize, object_pointer: Oop) -> Oop {
        debug_assert!(field_index < self.fetch_word_length_of(object_pointer));
        self.heap_chunk_word(object_pointer, HEADER_SIZE + field_index)
    }

    /// Store an oop into a pointer field, adjusting reference counts:
    /// the new value is counted up before the old one is counted down.
    pub fn store_pointer(
        &mut self,
        field_index: usize,
        object_pointer: Oop,
        value_pointer: Oop,
    ) -> Oop {
        debug_assert!(field_index < self.fetch_word_length_of(object_pointer));
        let chunk_index = HEADER_SIZE + field_index;
        self.count_up(value_pointer);
        let old = self.heap_chunk_word(object_pointer, chunk_index);
        self.count_down(old);
        self.heap_chunk_word_put(object_pointer, chunk_index, value_pointer);
        value_pointer
    }

    pub fn fetch_word(&self, word_index: usize, object_pointer: Oop) -> u16 {
        self.heap_chunk_word(object_pointer, HEADER_SIZE + word_index)
    }

    pub fn store_word(
        &mut self,
        word_index: usize,
        object_pointer: Oop,
        value_word: u16,
    ) -> u16 {
        self.heap_chunk_word_put(object_pointer, HEADER_SIZE + word_index, value_word);
        value_word
    }

    pub fn fetch_byte(&self, byte_index: usize, object_pointer: Oop) -> u8 {
        self.heap_chunk_byte(object_pointer, HEADER_SIZE * 2 + byte_index)
    }

    pub fn store_byte(
        &mut self,
        byte_index: usize,
        object_pointer: Oop,
        value_byte: u8,
    ) -> u8 {
        self.heap_chunk_byte_put(
            object_pointer,
            HEADER_SIZE * 2 + byte_index,
            value_byte,
        );
        value_byte
    }

    pub fn increase_references_to(&mut self, object_pointer: Oop) {
        self.count_up(object_pointer);
    }

    pub fn decrease_references_to(&mut self, object_pointer: Oop) {
        self.count_down(object_pointer);
    }

    /// Word count of the heap, for `coreLeft`.
    pub fn core_left(&self) -> u32 {
        self.free_words
    }

    /// Free object table entries, for `oopsLeft`.
    pub fn oops_left(&self) -> u32 {
        self.free_oops
    }

    // ── Instantiation ──────────────────────────────────────────────

    pub fn instantiate_class_with_pointers(
        &mut self,
        class_pointer: Oop,
        length: usize,
        roots: &mut dyn RootProvider,
    ) -> Option<Oop> {
        let size = HEADER_SIZE + length;
        let extra = usize::from(size >= HUGE_SIZE);
        let object_pointer =
            self.allocate(size, 0, 1, extra, class_pointer, roots)?;
        // fresh pointer fields hold nil and are counted as references
        for field_index in 0..length {
            self.heap_chunk_word_put(
                object_pointer,
                HEADER_SIZE + field_index,
                NIL_PTR,
            );
            self.count_up(NIL_PTR);
        }
        Some(object_pointer)
    }

    pub fn instantiate_class_with_words(
        &mut self,
        class_pointer: Oop,
        length: usize,
        roots: &mut dyn RootProvider,
    ) -> Option<Oop> {
        let size = HEADER_SIZE + length;
        let object_pointer = self.allocate(size, 0, 0, 0, class_pointer, roots)?;
        for word_index in 0..length {
            self.heap_chunk_word_put(object_pointer, HEADER_SIZE + word_index, 0);
        }
        Some(object_pointer)
    }

    pub fn instantiate_class_with_bytes(
        &mut self,
        class_pointer: Oop,
        length: usize,
        roots: &mut dyn RootProvider,
    ) -> Option<Oop> {
        let size = HEADER_SIZE + (length + 1) / 2;
        let odd = (length % 2) as u16;
        let object_pointer = self.allocate(size, odd, 0, 0, class_pointer, roots)?;
        for word_index in 0..size - HEADER_SIZE {
            self.heap_chunk_word_put(object_pointer, HEADER_SIZE + word_index, 0);
        }
        Some(object_pointer)
    }

    /// A method with `literal_count` literals and `byte_count` bytecodes:
    /// a byte object whose first words are traversed as pointers.
    pub fn instantiate_method(
        &mut self,
        class_pointer: Oop,
        literal_count: usize,
        byte_count: usize,
        roots: &mut dyn RootProvider,
    ) -> Option<Oop> {
        debug_assert_eq!(class_pointer, CLASS_COMPILED_METHOD_PTR);
        let pointer_words = 1 + literal_count;
        let size = HEADER_SIZE + pointer_words + (byte_count + 1) / 2;
        let odd = (byte_count % 2) as u16;
        let object_pointer =
            self.allocate(size, odd, 0, 0, class_pointer, roots)?;
        for field_index in 0..pointer_words {
            self.heap_chunk_word_put(
                object_pointer,
                HEADER_SIZE + field_index,
                NIL_PTR,
            );
            self.count_up(NIL_PTR);
        }
        for word_index in pointer_words..size - HEADER_SIZE {
            self.heap_chunk_word_put(object_pointer, HEADER_SIZE + word_index, 0);
        }
        Some(object_pointer)
    }

    // ── Enumeration ────────────────────────────────────────────────

    /// First instance of a class in oop order, or nil.
    pub fn initial_instance_of(&self, class_pointer: Oop) -> Oop {
        let mut pointer: Oop = 0;
        while (pointer as usize) < OBJECT_TABLE_SIZE {
            if self.free_bit_of(pointer) == 0
                && self.count_bits_of(pointer) > 0
                && self.fetch_class_of(pointer) == class_pointer
            {
                return pointer;
            }
            pointer += 2;
        }
        NIL_PTR
    }

    /// Next instance of the same class after `object_pointer`, or nil.
    pub fn instance_after(&self, object_pointer: Oop) -> Oop {
        let class_pointer = self.fetch_class_of(object_pointer);
        let mut pointer = object_pointer + 2;
        while (pointer as usize) < OBJECT_TABLE_SIZE {
            if self.free_bit_of(pointer) == 0
                && self.count_bits_of(pointer) > 0
                && self.fetch_class_of(pointer) == class_pointer
            {
                return pointer;
            }
            pointer += 2;
        }
        NIL_PTR
    }

    /// Whether the oop denotes a live object.
    pub fn has_object(&self, object_pointer: Oop) -> bool {
        !is_integer_object(object_pointer)
            && (object_pointer as usize) < OBJECT_TABLE_SIZE
            && self.free_bit_of(object_pointer) == 0
            && self.count_bits_of(object_pointer) > 0
    }

    /// `become:` — exchange the identities of two objects by swapping
    /// their table entries, leaving the reference counts in place.
    pub fn swap_pointers_of(&mut self, first_pointer: Oop, second_pointer: Oop) {
        let first_segment = self.segment_bits_of(first_pointer);
        let first_location = self.location_bits_of(first_pointer);
        let first_pointer_bit = self.pointer_bit_of(first_pointer);
        let first_odd_bit = self.odd_bit_of(first_pointer);

        self.segment_bits_of_put(first_pointer, self.segment_bits_of(second_pointer));
        self.location_bits_of_put(
            first_pointer,
            self.location_bits_of(second_pointer),
        );
        let second_pointer_bit = self.pointer_bit_of(second_pointer);
        let second_odd_bit = self.odd_bit_of(second_pointer);
        self.pointer_bit_of_put(first_pointer, second_pointer_bit);
        self.odd_bit_of_put(first_pointer, second_odd_bit);

        self.segment_bits_of_put(second_pointer, first_segment);
        self.location_bits_of_put(second_pointer, first_location);
        self.pointer_bit_of_put(second_pointer, first_pointer_bit);
        self.odd_bit_of_put(second_pointer, first_odd_bit);
    }

    // ── Oop conversions (asOop / asObject) ─────────────────────────

    /// The SmallInteger identifying an object for `asOop`.
    pub fn oop_identifier_of(&self, object_pointer: Oop) -> Oop {
        object_pointer | 1
    }

    /// Inverse of `oop_identifier_of`.
    pub fn object_of_identifier(&self, identifier: Oop) -> Oop {
        identifier & 0xFFFE
    }

    // ── Formatting ─────────────────────────────────────────────────

    /// Set up empty free lists: every table entry on the free-pointer
    /// list, each heap segment one big free chunk.
    fn format(&mut self) {
        for segment in crate::FIRST_HEAP_SEGMENT..=crate::LAST_HEAP_SEGMENT {
            for size in 0..=crate::BIG_SIZE {
                self.reset_free_chunk_list(size, segment);
            }
        }
        self.head_of_free_pointer_list_put(NON_POINTER as usize);
        let mut pointer = (OBJECT_TABLE_SIZE - 2) as Oop;
        loop {
            self.release_pointer(pointer);
            if pointer == 0 {
                break;
            }
            pointer -= 2;
        }
        // oop 0 stays reserved so it can never look like a valid object
        let reserved = self.remove_from_free_pointer_list();
        debug_assert_eq!(reserved, Some(0));

        for segment in crate::FIRST_HEAP_SEGMENT..=crate::LAST_HEAP_SEGMENT {
            self.current_segment = segment;
            let pointer = self
                .obtain_pointer_location(crate::HEAP_SPACE_STOP + 1, 0)
                .expect("formatting cannot exhaust the table");
            self.deallocate(pointer);
        }
        self.current_segment = crate::FIRST_HEAP_SEGMENT;
        let (free_words, free_oops) = self.audit_free_space();
        self.free_words = free_words;
        self.free_oops = free_oops;
    }

    // The free-pointer list head lives just past the table.

    #[inline(always)]
    pub(crate) fn head_of_free_pointer_list(&self) -> usize {
        self.words.word(OBJECT_TABLE_SEGMENT, FREE_POINTER_LIST) as usize
    }

    #[inline(always)]
    pub(crate) fn head_of_free_pointer_list_put(&mut self, value: usize) {
        self.words
            .word_put(OBJECT_TABLE_SEGMENT, FREE_POINTER_LIST, value as u16);
    }
}

impl Default for ObjectMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::NoRoots;
    use object::{integer_object_of, CLASS_SMALL_INTEGER};

    /// A class oop that is immediate, so counting and traversal skip it.
    pub(crate) const TEST_CLASS: Oop = integer_object_of(99);

    /// Allocate a bare pointer object without the nil fill, so tests
    /// need no bootstrapped nil object.
    pub(crate) fn new_pointer_object(
        memory: &mut ObjectMemory,
        length: usize,
    ) -> Oop {
        let object_pointer = memory
            .allocate(HEADER_SIZE + length, 0, 1, 0, TEST_CLASS, &mut NoRoots)
            .expect("allocation");
        for field_index in 0..length {
            memory.heap_chunk_word_put(
                object_pointer,
                HEADER_SIZE + field_index,
                integer_object_of(0),
            );
        }
        memory.count_up(object_pointer);
        object_pointer
    }

    #[test]
    fn fresh_memory_is_mostly_free() {
        let memory = ObjectMemory::new();
        // every heap segment contributes one big free chunk
        assert_eq!(
            memory.core_left(),
            (crate::HEAP_SPACE_STOP as u32 + 1) * crate::HEAP_SEGMENT_COUNT as u32
        );
        assert!(memory.oops_left() > 32_000);
    }

    #[test]
    fn class_of_immediate_is_small_integer() {
        let memory = ObjectMemory::new();
        assert_eq!(memory.fetch_class_of(integer_object_of(7)), CLASS_SMALL_INTEGER);
    }

    #[test]
    fn allocation_sets_up_the_header() {
        let mut memory = ObjectMemory::new();
        let object_pointer = new_pointer_object(&mut memory, 3);
        assert_eq!(memory.size_bits_of(object_pointer), HEADER_SIZE + 3);
        assert_eq!(memory.fetch_class_of(object_pointer), TEST_CLASS);
        assert_eq!(memory.fetch_word_length_of(object_pointer), 3);
        assert_eq!(memory.pointer_bit_of(object_pointer), 1);
        assert_eq!(memory.free_bit_of(object_pointer), 0);
    }

    #[test]
    fn store_pointer_adjusts_reference_counts() {
        let mut memory = ObjectMemory::new();
        let holder = new_pointer_object(&mut memory, 2);
        let value = new_pointer_object(&mut memory, 0);
        let count_before = memory.count_bits_of(value);

        memory.store_pointer(0, holder, value);
        assert_eq!(memory.fetch_pointer(0, holder), value);
        assert_eq!(memory.count_bits_of(value), count_before + 1);

        memory.store_pointer(0, holder, integer_object_of(5));
        assert_eq!(memory.count_bits_of(value), count_before);
    }

    #[test]
    fn dropping_the_last_reference_frees_the_object() {
        let mut memory = ObjectMemory::new();
        let holder = new_pointer_object(&mut memory, 1);
        let value = new_pointer_object(&mut memory, 0);
        memory.store_pointer(0, holder, value);

        // drop the manufactured reference, then the stored one
        memory.count_down(value);
        assert!(memory.has_object(value));
        let free_before = memory.oops_left();
        memory.store_pointer(0, holder, integer_object_of(0));
        assert!(!memory.has_object(value));
        assert_eq!(memory.oops_left(), free_before + 1);
    }

    #[test]
    fn byte_objects_honour_the_odd_length() {
        let mut memory = ObjectMemory::new();
        let even = memory
            .instantiate_class_with_bytes(TEST_CLASS, 4, &mut NoRoots)
            .unwrap();
        let odd = memory
            .instantiate_class_with_bytes(TEST_CLASS, 5, &mut NoRoots)
            .unwrap();
        assert_eq!(memory.fetch_byte_length_of(even), 4);
        assert_eq!(memory.fetch_byte_length_of(odd), 5);
        assert_eq!(memory.fetch_word_length_of(odd), 3);

        for index in 0..5 {
            memory.store_byte(index, odd, index as u8 + 1);
        }
        for index in 0..5 {
            assert_eq!(memory.fetch_byte(index, odd), index as u8 + 1);
        }
        // byte 0 is the high byte of the first body word
        assert_eq!(memory.fetch_word(0, odd), 0x0102);
    }

    #[test]
    fn word_objects_store_raw_words() {
        let mut memory = ObjectMemory::new();
        let words = memory
            .instantiate_class_with_words(TEST_CLASS, 2, &mut NoRoots)
            .unwrap();
        memory.store_word(0, words, 0xDEAD);
        memory.store_word(1, words, 0xBEEF);
        assert_eq!(memory.fetch_word(0, words), 0xDEAD);
        assert_eq!(memory.fetch_word(1, words), 0xBEEF);
        assert_eq!(memory.pointer_bit_of(words), 0);
    }

    #[test]
    fn become_swaps_identities_but_not_counts() {
        let mut memory = ObjectMemory::new();
        let first = new_pointer_object(&mut memory, 1);
        let second = new_pointer_object(&mut memory, 2);
        memory.heap_chunk_word_put(first, HEADER_SIZE, integer_object_of(11));
        memory.heap_chunk_word_put(second, HEADER_SIZE, integer_object_of(22));
        let first_count = memory.count_bits_of(first);
        let second_count = memory.count_bits_of(second);

        memory.swap_pointers_of(first, second);

        assert_eq!(memory.fetch_word_length_of(first), 2);
        assert_eq!(memory.fetch_word_length_of(second), 1);
        assert_eq!(memory.fetch_pointer(0, first), integer_object_of(22));
        assert_eq!(memory.fetch_pointer(0, second), integer_object_of(11));
        assert_eq!(memory.count_bits_of(first), first_count);
        assert_eq!(memory.count_bits_of(second), second_count);
    }

    #[test]
    fn instance_enumeration_walks_oop_order() {
        let mut memory = ObjectMemory::new();
        let first = new_pointer_object(&mut memory, 0);
        let _other = memory
            .instantiate_class_with_words(integer_object_of(7), 1, &mut NoRoots)
            .unwrap();
        let second = new_pointer_object(&mut memory, 0);

        let found = memory.initial_instance_of(TEST_CLASS);
        assert_eq!(found, first.min(second));
        let next = memory.instance_after(found);
        assert_eq!(next, first.max(second));
        assert_eq!(memory.instance_after(next), object::NIL_PTR);
    }

    #[test]
    fn oop_identifier_round_trip() {
        let memory = ObjectMemory::new();
        let oop: Oop = 132;
        let identifier = memory.oop_identifier_of(oop);
        assert!(is_integer_object(identifier));
        assert_eq!(memory.object_of_identifier(identifier), oop);
    }
}
