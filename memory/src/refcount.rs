//! Reference counting.
//!
//! Counts saturate at 255 and stick there; a sticky object is reclaimed
//! only by the mark-sweep collector. Transitive freeing walks the object
//! graph iteratively with the pointer-reversal technique so deep chains
//! cannot exhaust the native stack. During a walk the traversal offset
//! is parked in the count field, or in the hidden extra word of objects
//! too big for eight bits.

use object::{is_integer_object, Oop, CLASS_COMPILED_METHOD_PTR, NON_POINTER};

use crate::memory::ObjectMemory;
use crate::{HEADER_SIZE, HUGE_SIZE};

/// Counts at this value stick; the object becomes permanent.
pub(crate) const STICKY_COUNT: u16 = 255;

impl ObjectMemory {
    pub(crate) fn count_up(&mut self, object_pointer: Oop) {
        if is_integer_object(object_pointer) {
            return;
        }
        let count = self.count_bits_of(object_pointer);
        if count < STICKY_COUNT {
            self.count_bits_of_put(object_pointer, count + 1);
        }
    }

    pub(crate) fn count_down(&mut self, root_object_pointer: Oop) {
        if is_integer_object(root_object_pointer) {
            return;
        }
        self.for_all_objects_accessible_from(
            root_object_pointer,
            |memory, object_pointer| {
                // the predicate decrements the count and tests for zero
                let count = memory.count_bits_of(object_pointer);
                if count == STICKY_COUNT || count == 0 {
                    return false;
                }
                let count = count - 1;
                memory.count_bits_of_put(object_pointer, count);
                count == 0
            },
            |memory, object_pointer| {
                // the action deallocates objects whose count reached zero
                memory.count_bits_of_put(object_pointer, 0);
                memory.deallocate(object_pointer);
            },
        );
    }

    /// One past the last pointer field's chunk offset. Byte objects have
    /// no pointer body; compiled methods are byte objects whose literal
    /// frame is traversed anyway.
    pub(crate) fn last_pointer_of(&self, object_pointer: Oop) -> usize {
        if self.pointer_bit_of(object_pointer) == 0 {
            if self.class_bits_of(object_pointer) == CLASS_COMPILED_METHOD_PTR {
                let method_header = self.heap_chunk_word(object_pointer, HEADER_SIZE);
                HEADER_SIZE + 1 + ((method_header & 126) >> 1) as usize
            } else {
                HEADER_SIZE
            }
        } else {
            self.size_bits_of(object_pointer)
        }
    }

    fn save_traversal_offset(&mut self, object_pointer: Oop, offset: usize) {
        let size = self.last_pointer_of(object_pointer);
        if size < HUGE_SIZE {
            self.count_bits_of_put(object_pointer, offset as u16);
        } else {
            self.heap_chunk_word_put(object_pointer, size, offset as u16);
        }
    }

    fn restore_traversal_offset(&self, object_pointer: Oop) -> usize {
        let size = self.last_pointer_of(object_pointer);
        if size < HUGE_SIZE {
            self.count_bits_of(object_pointer) as usize
        } else {
            self.heap_chunk_word(object_pointer, size) as usize
        }
    }

    /// Apply `predicate` to `root`; if it answers true, visit the class
    /// field and every pointer field of the graph below it, descending
    /// into each field whose `predicate` answers true and running
    /// `action` over each entered object once its fields are exhausted.
    pub(crate) fn for_all_objects_accessible_from(
        &mut self,
        root: Oop,
        mut predicate: impl FnMut(&mut Self, Oop) -> bool,
        mut action: impl FnMut(&mut Self, Oop),
    ) {
        if !predicate(self, root) {
            return;
        }
        self.for_all_other_objects_accessible_from(root, &mut predicate, &mut action);
    }

    /// The pointer-reversal walk. Parent links are threaded through the
    /// visited field itself; the offset being traversed is parked via
    /// `save_traversal_offset`. Field offsets run from the last pointer
    /// down to the first, then the class word; byte objects skip
    /// straight from the header to the class word.
    fn for_all_other_objects_accessible_from(
        &mut self,
        root: Oop,
        predicate: &mut impl FnMut(&mut Self, Oop) -> bool,
        action: &mut impl FnMut(&mut Self, Oop),
    ) {
        // offsets: last_pointer-1, .., HEADER_SIZE, then 1 (class), then done
        fn next_offset(offset: usize) -> Option<usize> {
            match offset {
                0 | 1 => None,
                o if o == HEADER_SIZE => Some(1),
                o => Some(o - 1),
            }
        }

        let mut prior = NON_POINTER;
        let mut current = root;
        let mut offset = self.last_pointer_of(current);
        loop {
            match next_offset(offset) {
                Some(next) => {
                    offset = next;
                    let field = self.heap_chunk_word(current, offset);
                    if !is_integer_object(field) && predicate(self, field) {
                        // descend: reverse the link, park the offset
                        self.heap_chunk_word_put(current, offset, prior);
                        self.save_traversal_offset(current, offset);
                        prior = current;
                        current = field;
                        offset = self.last_pointer_of(current);
                    }
                }
                None => {
                    action(self, current);
                    if prior == NON_POINTER {
                        return;
                    }
                    // retreat: unpark the offset, restore the field
                    let descendant = current;
                    current = prior;
                    offset = self.restore_traversal_offset(current);
                    prior = self.heap_chunk_word(current, offset);
                    self.heap_chunk_word_put(current, offset, descendant);
                }
            }
        }
    }
}
