mod alloc;
mod fs;
mod image;
mod marksweep;
mod memory;
mod refcount;
mod words;

pub use fs::{FileSystem, HostFileSystem, ImageStream, BAD_FD};
pub use image::{IMAGE_HEADER_SIZE, IMAGE_MAGIC, IMAGE_VERSION};
pub use memory::{ObjectMemory, OtFlags};
pub use words::WordMemory;

use object::Oop;

/// Segmented word memory dimensions.
pub const SEGMENT_COUNT: usize = 16;
pub const SEGMENT_SIZE: usize = 65536;

/// The last segment holds the object table and the free-pointer list head.
pub const OBJECT_TABLE_SEGMENT: usize = SEGMENT_COUNT - 1;
pub const OBJECT_TABLE_START: usize = 0;
pub const OBJECT_TABLE_SIZE: usize = SEGMENT_SIZE - 2;
pub const FREE_POINTER_LIST: usize = OBJECT_TABLE_START + OBJECT_TABLE_SIZE;

/// Heap segments are everything before the object table segment.
pub const HEAP_SEGMENT_COUNT: usize = SEGMENT_COUNT - 1;
pub const FIRST_HEAP_SEGMENT: usize = 0;
pub const LAST_HEAP_SEGMENT: usize = FIRST_HEAP_SEGMENT + HEAP_SEGMENT_COUNT - 1;

/// Chunks at or above this size share one unordered free list.
pub const BIG_SIZE: usize = 20;
pub const FIRST_FREE_CHUNK_LIST_SIZE: usize = BIG_SIZE + 1;

/// Last heap word usable for object storage in each segment; the
/// free-chunk list heads live above it.
pub const HEAP_SPACE_STOP: usize = SEGMENT_SIZE - FIRST_FREE_CHUNK_LIST_SIZE - 1;
pub const FIRST_FREE_CHUNK_LIST: usize = HEAP_SPACE_STOP + 1;

/// Words in an object header (size, class).
pub const HEADER_SIZE: usize = 2;

/// The smallest size that does not fit the eight-bit count field; objects
/// this big carry a hidden extra word for the traversal offset.
pub const HUGE_SIZE: usize = 256;

/// Supplies the transient roots (interpreter registers) to the collector.
///
/// Allocating entry points take a provider so a collection triggered by
/// heap exhaustion can see the roots that live outside object memory.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Oop));
}

/// A provider for contexts with no outside roots (tests, image tools).
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(Oop)) {}
}
