//! The mark-sweep collector.
//!
//! Reference counting cannot reclaim cycles, and the running image
//! produces them constantly (a MethodContext holding a BlockContext that
//! points back through its home field). When the allocator comes up
//! empty it zeroes every count, marks from the roots reusing the count
//! field, then sweeps the table: unmarked entries are deallocated and
//! marked ones get their true counts rebuilt from the surviving edges.

use object::{is_integer_object, Oop};
use tracing::debug;

use crate::memory::ObjectMemory;
use crate::refcount::STICKY_COUNT;
use crate::{
    RootProvider, BIG_SIZE, FIRST_HEAP_SEGMENT, LAST_HEAP_SEGMENT,
    OBJECT_TABLE_SIZE,
};

impl ObjectMemory {
    /// Collect everything unreachable from the provided roots.
    pub fn reclaim_inaccessible_objects(&mut self, roots: &mut dyn RootProvider) {
        let before = self.free_oops;
        self.gc_epoch += 1;
        self.zero_reference_counts();
        self.mark_accessible_objects(roots);
        self.rectify_counts_and_deallocate_garbage();
        // the registers hold counted references; re-establish them
        let mut root_list = Vec::new();
        roots.visit_roots(&mut |oop| root_list.push(oop));
        for oop in root_list {
            self.count_up(oop);
        }
        let (free_words, free_oops) = self.audit_free_space();
        self.free_words = free_words;
        self.free_oops = free_oops;
        debug!(
            reclaimed = self.free_oops.saturating_sub(before),
            free_words = self.free_words,
            "mark-sweep complete"
        );
    }

    fn zero_reference_counts(&mut self) {
        let mut object_pointer: Oop = 0;
        while (object_pointer as usize) < OBJECT_TABLE_SIZE {
            self.count_bits_of_put(object_pointer, 0);
            object_pointer += 2;
        }
    }

    fn mark_accessible_objects(&mut self, roots: &mut dyn RootProvider) {
        let mut root_list = Vec::new();
        roots.visit_roots(&mut |oop| root_list.push(oop));
        for root in root_list {
            if !is_integer_object(root) {
                self.mark_objects_accessible_from(root);
            }
        }
    }

    fn mark_objects_accessible_from(&mut self, root_object_pointer: Oop) {
        self.for_all_objects_accessible_from(
            root_object_pointer,
            |memory, object_pointer| {
                // unmarked objects get a provisional nonzero mark so a
                // cycle back into the traversal chain terminates
                let unmarked = memory.count_bits_of(object_pointer) == 0;
                if unmarked {
                    memory.count_bits_of_put(object_pointer, 2);
                }
                unmarked
            },
            |memory, object_pointer| {
                // the action settles the mark once the fields are done
                memory.count_bits_of_put(object_pointer, 1);
            },
        );
    }

    fn rectify_counts_and_deallocate_garbage(&mut self) {
        // fresh free-chunk lists; surviving free chunks re-register
        // through the deallocate branch below
        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            for size in 0..=BIG_SIZE {
                self.reset_free_chunk_list(size, segment);
            }
        }
        let mut object_pointer: Oop = 0;
        while (object_pointer as usize) < OBJECT_TABLE_SIZE {
            if self.free_bit_of(object_pointer) == 0 {
                let count = self.count_bits_of(object_pointer);
                if count == 0 {
                    // unmarked: either garbage or an abandoned free
                    // chunk; both go back on the free lists
                    self.deallocate(object_pointer);
                } else {
                    // marked: cancel the mark, then count the outgoing
                    // edges (class word and pointer fields)
                    if count < STICKY_COUNT {
                        self.count_bits_of_put(object_pointer, count - 1);
                    }
                    let last_pointer = self.last_pointer_of(object_pointer);
                    for offset in 1..last_pointer {
                        let field = self.heap_chunk_word(object_pointer, offset);
                        if !is_integer_object(field) {
                            self.count_up(field);
                        }
                    }
                }
            }
            object_pointer += 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::new_pointer_object;
    use crate::NoRoots;

    struct OneRoot(Oop);

    impl RootProvider for OneRoot {
        fn visit_roots(&mut self, visitor: &mut dyn FnMut(Oop)) {
            visitor(self.0);
        }
    }

    #[test]
    fn a_cycle_survives_counting_but_not_collection() {
        let mut memory = ObjectMemory::new();
        let a = new_pointer_object(&mut memory, 1);
        let b = new_pointer_object(&mut memory, 1);
        memory.store_pointer(0, a, b);
        memory.store_pointer(0, b, a);

        // drop the external references; the cycle keeps both alive
        let free_before = memory.oops_left();
        memory.count_down(a);
        memory.count_down(b);
        assert!(memory.has_object(a));
        assert!(memory.has_object(b));
        assert_eq!(memory.oops_left(), free_before);

        memory.reclaim_inaccessible_objects(&mut NoRoots);
        assert!(!memory.has_object(a));
        assert!(!memory.has_object(b));
        assert_eq!(memory.oops_left(), free_before + 2);
    }

    #[test]
    fn rooted_objects_survive_collection_with_exact_counts() {
        let mut memory = ObjectMemory::new();
        let root = new_pointer_object(&mut memory, 2);
        let shared = new_pointer_object(&mut memory, 0);
        memory.store_pointer(0, root, shared);
        memory.store_pointer(1, root, shared);
        // lose the manufactured reference; only the two fields remain
        memory.count_down(shared);

        memory.reclaim_inaccessible_objects(&mut OneRoot(root));

        assert!(memory.has_object(root));
        assert!(memory.has_object(shared));
        // counts after collection equal the incoming edges
        assert_eq!(memory.count_bits_of(shared), 2);
        // the root register reference is re-established
        assert_eq!(memory.count_bits_of(root), 1);
    }

    #[test]
    fn garbage_reachable_only_from_garbage_is_reclaimed() {
        let mut memory = ObjectMemory::new();
        let root = new_pointer_object(&mut memory, 1);
        let doomed = new_pointer_object(&mut memory, 1);
        let leaf = new_pointer_object(&mut memory, 0);
        memory.store_pointer(0, doomed, leaf);
        memory.count_down(leaf);
        memory.count_down(doomed);

        memory.reclaim_inaccessible_objects(&mut OneRoot(root));
        assert!(memory.has_object(root));
        assert!(!memory.has_object(doomed));
        assert!(!memory.has_object(leaf));
    }
}
