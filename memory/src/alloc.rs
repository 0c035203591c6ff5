//! Chunk allocation, free lists and segment compaction.
//!
//! Each heap segment keeps `BIG_SIZE + 1` free-list heads in its top
//! words, indexed by chunk size; the last list collects everything of
//! `BIG_SIZE` words or more and is searched linearly. Free chunks link
//! through their class word and keep an object table entry (free bit
//! clear, count zero) so the sweep can recognise them.

use object::{Oop, NON_POINTER};
use tracing::{debug, trace};

use crate::memory::ObjectMemory;
use crate::{
    RootProvider, BIG_SIZE, FIRST_FREE_CHUNK_LIST, FIRST_HEAP_SEGMENT,
    HEADER_SIZE, HEAP_SEGMENT_COUNT, HEAP_SPACE_STOP, HUGE_SIZE,
    LAST_HEAP_SEGMENT, OBJECT_TABLE_SIZE,
};

impl ObjectMemory {
    // ── Free chunk lists ───────────────────────────────────────────

    #[inline(always)]
    pub(crate) fn head_of_free_chunk_list(&self, size: usize, segment: usize) -> Oop {
        debug_assert!(size <= BIG_SIZE);
        self.words.word(segment, FIRST_FREE_CHUNK_LIST + size)
    }

    #[inline(always)]
    pub(crate) fn head_of_free_chunk_list_put(
        &mut self,
        size: usize,
        segment: usize,
        object_pointer: Oop,
    ) {
        debug_assert!(size <= BIG_SIZE);
        self.words
            .word_put(segment, FIRST_FREE_CHUNK_LIST + size, object_pointer);
    }

    pub(crate) fn reset_free_chunk_list(&mut self, size: usize, segment: usize) {
        self.head_of_free_chunk_list_put(size, segment, NON_POINTER);
    }

    /// Link a free chunk onto the list for `size` in its own segment;
    /// the class word becomes the link.
    pub(crate) fn to_free_chunk_list(&mut self, size: usize, object_pointer: Oop) {
        let segment = self.segment_bits_of(object_pointer);
        let head = self.head_of_free_chunk_list(size, segment);
        self.class_bits_of_put(object_pointer, head);
        self.head_of_free_chunk_list_put(size, segment, object_pointer);
    }

    /// Pop the head of an exact-size list in the current segment.
    pub(crate) fn remove_from_free_chunk_list(&mut self, size: usize) -> Option<Oop> {
        let object_pointer =
            self.head_of_free_chunk_list(size, self.current_segment);
        if object_pointer == NON_POINTER {
            return None;
        }
        let second_chunk = self.class_bits_of(object_pointer);
        self.head_of_free_chunk_list_put(
            size,
            self.current_segment,
            second_chunk,
        );
        Some(object_pointer)
    }

    // ── Free pointer list ──────────────────────────────────────────

    pub(crate) fn remove_from_free_pointer_list(&mut self) -> Option<Oop> {
        let object_pointer = self.head_of_free_pointer_list();
        if object_pointer == NON_POINTER as usize {
            return None;
        }
        let object_pointer = object_pointer as Oop;
        self.head_of_free_pointer_list_put(self.location_bits_of(object_pointer));
        self.free_bit_of_put(object_pointer, 0);
        Some(object_pointer)
    }

    /// Return a table entry to the free-pointer list.
    pub(crate) fn release_pointer(&mut self, object_pointer: Oop) {
        self.ot_put(object_pointer, 0);
        self.free_bit_of_put(object_pointer, 1);
        self.location_bits_of_put(object_pointer, self.head_of_free_pointer_list());
        self.head_of_free_pointer_list_put(object_pointer as usize);
    }

    // ── Allocation ─────────────────────────────────────────────────

    /// Reserve a table entry describing a chunk at `location` in the
    /// current segment.
    pub(crate) fn obtain_pointer_location(
        &mut self,
        size: usize,
        location: usize,
    ) -> Option<Oop> {
        let object_pointer = self.remove_from_free_pointer_list()?;
        self.ot_put(object_pointer, 0);
        self.segment_bits_of_put(object_pointer, self.current_segment);
        self.location_bits_of_put(object_pointer, location);
        self.size_bits_of_put(object_pointer, size);
        self.class_bits_of_put(object_pointer, NON_POINTER);
        Some(object_pointer)
    }

    /// The words a chunk occupies: huge pointer objects carry one hidden
    /// word past their official size for the traversal offset.
    pub(crate) fn space_occupied_by(&self, object_pointer: Oop) -> usize {
        let size = self.size_bits_of(object_pointer);
        if size < HUGE_SIZE || self.pointer_bit_of(object_pointer) == 0 {
            size
        } else {
            size + 1
        }
    }

    /// The heart of `new` / `new:`: reserve an entry and a chunk, set up
    /// the header. `None` means memory is exhausted even after collection.
    pub(crate) fn allocate(
        &mut self,
        size: usize,
        odd_bit: u16,
        pointer_bit: u16,
        extra_word: usize,
        class_pointer: Oop,
        roots: &mut dyn RootProvider,
    ) -> Option<Oop> {
        let object_pointer = self.allocate_chunk(size + extra_word, roots)?;
        self.odd_bit_of_put(object_pointer, odd_bit);
        self.pointer_bit_of_put(object_pointer, pointer_bit);
        self.class_bits_of_put(object_pointer, class_pointer);
        self.size_bits_of_put(object_pointer, size);
        self.count_up(class_pointer);
        Some(object_pointer)
    }

    fn allocate_chunk(
        &mut self,
        size: usize,
        roots: &mut dyn RootProvider,
    ) -> Option<Oop> {
        if let Some(object_pointer) = self.attempt_to_allocate_chunk(size) {
            self.free_words -= size as u32;
            self.free_oops -= 1;
            return Some(object_pointer);
        }
        debug!(size, "heap exhausted, collecting");
        self.reclaim_inaccessible_objects(roots);
        if let Some(object_pointer) = self.attempt_to_allocate_chunk(size) {
            self.free_words -= size as u32;
            self.free_oops -= 1;
            return Some(object_pointer);
        }
        None
    }

    fn attempt_to_allocate_chunk(&mut self, size: usize) -> Option<Oop> {
        if let Some(object_pointer) =
            self.attempt_to_allocate_chunk_in_current_segment(size)
        {
            return Some(object_pointer);
        }
        for _ in 0..HEAP_SEGMENT_COUNT {
            self.current_segment += 1;
            if self.current_segment > LAST_HEAP_SEGMENT {
                self.current_segment = FIRST_HEAP_SEGMENT;
            }
            self.compact_current_segment();
            if let Some(object_pointer) =
                self.attempt_to_allocate_chunk_in_current_segment(size)
            {
                return Some(object_pointer);
            }
        }
        None
    }

    fn attempt_to_allocate_chunk_in_current_segment(
        &mut self,
        size: usize,
    ) -> Option<Oop> {
        if size < BIG_SIZE {
            if let Some(object_pointer) = self.remove_from_free_chunk_list(size) {
                return Some(object_pointer);
            }
            // search the larger exact lists, splitting off the surplus
            for list_size in size + HEADER_SIZE..BIG_SIZE {
                let chunk = match self.remove_from_free_chunk_list(list_size) {
                    Some(chunk) => chunk,
                    None => continue,
                };
                let excess = list_size - size;
                let location = self.location_bits_of(chunk);
                let Some(new_pointer) =
                    self.obtain_pointer_location(size, location + excess)
                else {
                    self.to_free_chunk_list(list_size, chunk);
                    return None;
                };
                self.size_bits_of_put(chunk, excess);
                self.to_free_chunk_list(excess.min(BIG_SIZE), chunk);
                return Some(new_pointer);
            }
        }

        // the big list holds assorted sizes and is searched linearly
        let mut predecessor = NON_POINTER;
        let mut object_pointer =
            self.head_of_free_chunk_list(BIG_SIZE, self.current_segment);
        while object_pointer != NON_POINTER {
            let available_size = self.size_bits_of(object_pointer);
            if available_size == size {
                let next = self.class_bits_of(object_pointer);
                if predecessor == NON_POINTER {
                    self.head_of_free_chunk_list_put(
                        BIG_SIZE,
                        self.current_segment,
                        next,
                    );
                } else {
                    self.class_bits_of_put(predecessor, next);
                }
                return Some(object_pointer);
            }
            if available_size >= size + HEADER_SIZE {
                // split: the tail becomes the new object, the head stays
                // free and moves to the list matching its reduced size
                let excess = available_size - size;
                let location = self.location_bits_of(object_pointer);
                let new_pointer =
                    self.obtain_pointer_location(size, location + excess)?;
                let next = self.class_bits_of(object_pointer);
                if predecessor == NON_POINTER {
                    self.head_of_free_chunk_list_put(
                        BIG_SIZE,
                        self.current_segment,
                        next,
                    );
                } else {
                    self.class_bits_of_put(predecessor, next);
                }
                self.size_bits_of_put(object_pointer, excess);
                self.to_free_chunk_list(excess.min(BIG_SIZE), object_pointer);
                return Some(new_pointer);
            }
            predecessor = object_pointer;
            object_pointer = self.class_bits_of(object_pointer);
        }
        None
    }

    /// Return an object's storage to the free lists and keep its table
    /// entry as the free chunk's handle.
    pub(crate) fn deallocate(&mut self, object_pointer: Oop) {
        let space = self.space_occupied_by(object_pointer);
        self.size_bits_of_put(object_pointer, space);
        // free chunks are raw storage from here on
        self.pointer_bit_of_put(object_pointer, 0);
        self.odd_bit_of_put(object_pointer, 0);
        self.to_free_chunk_list(space.min(BIG_SIZE), object_pointer);
        self.free_words += space as u32;
        self.free_oops += 1;
    }

    // ── Compaction ─────────────────────────────────────────────────

    /// Slide the current segment's live chunks down over the dead ones,
    /// leaving a single free chunk at the top.
    pub(crate) fn compact_current_segment(&mut self) {
        let low_water_mark = self.abandon_free_chunks_in_segment(self.current_segment);
        if low_water_mark < HEAP_SPACE_STOP {
            trace!(
                segment = self.current_segment,
                low_water_mark,
                "compacting segment"
            );
            self.reverse_heap_pointers_above(low_water_mark);
            let big_space = self.sweep_current_segment_from(low_water_mark);
            let free_size = HEAP_SPACE_STOP + 1 - big_space;
            if free_size >= HEADER_SIZE {
                if let Some(pointer) =
                    self.obtain_pointer_location(free_size, big_space)
                {
                    self.deallocate(pointer);
                    // the chunk was already counted free before compaction
                    self.free_words -= free_size as u32;
                    self.free_oops -= 1;
                }
            }
        }
    }

    /// Walk every free-chunk list of `segment`, releasing the entries
    /// and marking each chunk's class word dead for the sweep. Returns
    /// the lowest freed location.
    pub(crate) fn abandon_free_chunks_in_segment(&mut self, segment: usize) -> usize {
        let mut low_water_mark = HEAP_SPACE_STOP;
        for size in HEADER_SIZE..=BIG_SIZE {
            let mut object_pointer = self.head_of_free_chunk_list(size, segment);
            while object_pointer != NON_POINTER {
                low_water_mark =
                    low_water_mark.min(self.location_bits_of(object_pointer));
                let next_pointer = self.class_bits_of(object_pointer);
                self.class_bits_of_put(object_pointer, NON_POINTER);
                self.release_pointer(object_pointer);
                object_pointer = next_pointer;
            }
            self.reset_free_chunk_list(size, segment);
        }
        low_water_mark
    }

    /// For every live object above the mark, exchange the size header
    /// word and the table location so the sweep can find the entry from
    /// the chunk.
    fn reverse_heap_pointers_above(&mut self, low_water_mark: usize) {
        let mut object_pointer: Oop = 0;
        while (object_pointer as usize) < OBJECT_TABLE_SIZE {
            if self.free_bit_of(object_pointer) == 0
                && self.segment_bits_of(object_pointer) == self.current_segment
                && self.location_bits_of(object_pointer) >= low_water_mark
            {
                let size = self.size_bits_of(object_pointer);
                self.size_bits_of_put(object_pointer, object_pointer as usize);
                self.location_bits_of_put(object_pointer, size);
            }
            object_pointer += 2;
        }
    }

    /// Slide live chunks down; returns the first free word afterwards.
    fn sweep_current_segment_from(&mut self, low_water_mark: usize) -> usize {
        let segment = self.current_segment;
        let mut source = low_water_mark;
        let mut destination = low_water_mark;
        while source < HEAP_SPACE_STOP {
            if self.words.word(segment, source + 1) == NON_POINTER {
                // dead chunk: skip it
                let size = self.words.word(segment, source) as usize;
                debug_assert!(size >= HEADER_SIZE);
                source += size;
            } else {
                // live chunk: the reversed size word holds its oop
                let object_pointer = self.words.word(segment, source);
                let size = self.location_bits_of(object_pointer);
                self.location_bits_of_put(object_pointer, destination);
                self.words.word_put(segment, destination, size as u16);
                source += 1;
                destination += 1;
                for _ in 1..size {
                    let word = self.words.word(segment, source);
                    self.words.word_put(segment, destination, word);
                    source += 1;
                    destination += 1;
                }
            }
        }
        destination
    }

    // ── Auditing ───────────────────────────────────────────────────

    /// Recount free words and free oops from the ground truth; used
    /// after formatting, snapshot load, dump and collection.
    pub(crate) fn audit_free_space(&self) -> (u32, u32) {
        let mut free_words: u32 = 0;
        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            for size in 0..=BIG_SIZE {
                let mut object_pointer = self.head_of_free_chunk_list(size, segment);
                while object_pointer != NON_POINTER {
                    free_words += self.size_bits_of(object_pointer) as u32;
                    object_pointer = self.class_bits_of(object_pointer);
                }
            }
        }
        let mut free_oops: u32 = 0;
        let mut object_pointer: Oop = 0;
        while (object_pointer as usize) < OBJECT_TABLE_SIZE {
            if self.free_bit_of(object_pointer) == 1
                || self.count_bits_of(object_pointer) == 0
            {
                free_oops += 1;
            }
            object_pointer += 2;
        }
        (free_words, free_oops)
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::tests::{new_pointer_object, TEST_CLASS};
    use crate::memory::ObjectMemory;
    use crate::{NoRoots, BIG_SIZE, HEADER_SIZE};
    use object::integer_object_of;

    #[test]
    fn freed_chunks_are_reused_for_the_same_size() {
        let mut memory = ObjectMemory::new();
        let object_pointer = new_pointer_object(&mut memory, 4);
        let location = memory.location_bits_of(object_pointer);
        memory.count_down(object_pointer);

        let replacement = new_pointer_object(&mut memory, 4);
        assert_eq!(memory.location_bits_of(replacement), location);
    }

    #[test]
    fn big_chunks_split_and_return_the_surplus() {
        let mut memory = ObjectMemory::new();
        let free_before = memory.core_left();
        let big = memory
            .allocate(BIG_SIZE + 30, 0, 1, 0, TEST_CLASS, &mut NoRoots)
            .expect("big allocation");
        assert_eq!(memory.size_bits_of(big), BIG_SIZE + 30);
        assert_eq!(memory.core_left(), free_before - (BIG_SIZE as u32 + 30));
    }

    #[test]
    fn compaction_slides_live_objects_down() {
        // allocations split from the top of the segment's big chunk, so
        // the later object sits lower; freeing the middle one leaves a
        // hole that compaction squeezes out
        let mut memory = ObjectMemory::new();
        let first = new_pointer_object(&mut memory, 3);
        let doomed = new_pointer_object(&mut memory, 5);
        let last = new_pointer_object(&mut memory, 2);
        memory.heap_chunk_word_put(first, HEADER_SIZE, integer_object_of(7));
        memory.heap_chunk_word_put(last, HEADER_SIZE, integer_object_of(9));
        memory.count_down(doomed);

        let free_before = memory.core_left();
        memory.compact_current_segment();

        assert_eq!(memory.core_left(), free_before);
        // live chunks are packed from the bottom in heap order
        assert_eq!(memory.location_bits_of(last), 0);
        assert_eq!(
            memory.location_bits_of(first),
            memory.size_bits_of(last)
        );
        assert_eq!(memory.fetch_pointer(0, first), integer_object_of(7));
        assert_eq!(memory.fetch_pointer(0, last), integer_object_of(9));
    }

    #[test]
    fn allocation_survives_a_full_segment_cycle() {
        let mut memory = ObjectMemory::new();
        // burn through several segments with permanent large objects
        let mut kept = Vec::new();
        for _ in 0..40 {
            let object_pointer = memory
                .allocate(20_000, 0, 0, 0, TEST_CLASS, &mut NoRoots)
                .expect("large allocation");
            memory.count_up(object_pointer);
            kept.push(object_pointer);
        }
        // all segments now hold live data; small allocations still work
        let small = new_pointer_object(&mut memory, 2);
        assert!(memory.has_object(small));
    }
}
