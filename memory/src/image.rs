//! Snapshot files.
//!
//! A snapshot is a 512-byte big-endian header, the raw object table, and
//! the used words of each heap segment. Saving compacts every segment and
//! releases the free-chunk bookkeeping first, so the file carries only
//! live storage; loading rebuilds the free lists and counters from the
//! per-segment used-word counts in the header.

use std::io::{self, Read, Write};

use object::NON_POINTER;
use tracing::info;

use crate::memory::ObjectMemory;
use crate::{
    FIRST_HEAP_SEGMENT, HEADER_SIZE, HEAP_SEGMENT_COUNT, HEAP_SPACE_STOP,
    LAST_HEAP_SEGMENT, OBJECT_TABLE_SEGMENT, OBJECT_TABLE_SIZE,
};

pub const IMAGE_MAGIC: &[u8; 8] = b"ST80SNAP";
pub const IMAGE_VERSION: u16 = 1;
pub const IMAGE_HEADER_SIZE: usize = 512;

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn write_u16(writer: &mut impl Write, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

fn write_u32(writer: &mut impl Write, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

fn read_u16(reader: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

impl ObjectMemory {
    /// Write the whole object space. The memory remains fully usable
    /// afterwards; the free chunks disturbed by the dump are rebuilt.
    pub fn save_snapshot(&mut self, writer: &mut impl Write) -> io::Result<()> {
        let saved_segment = self.current_segment;
        let mut used = [0u32; HEAP_SEGMENT_COUNT];
        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            self.current_segment = segment;
            self.compact_current_segment();
            let low_water_mark = self.abandon_free_chunks_in_segment(segment);
            used[segment] = if low_water_mark >= HEAP_SPACE_STOP {
                (HEAP_SPACE_STOP + 1) as u32
            } else {
                low_water_mark as u32
            };
        }

        let mut header = Vec::with_capacity(IMAGE_HEADER_SIZE);
        header.extend_from_slice(IMAGE_MAGIC);
        write_u16(&mut header, IMAGE_VERSION)?;
        write_u16(&mut header, HEAP_SEGMENT_COUNT as u16)?;
        for words in used {
            write_u32(&mut header, words)?;
        }
        header.resize(IMAGE_HEADER_SIZE, 0);
        writer.write_all(&header)?;

        for index in 0..OBJECT_TABLE_SIZE {
            write_u16(writer, self.words.word(OBJECT_TABLE_SEGMENT, index))?;
        }

        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            for index in 0..used[segment] as usize {
                write_u16(writer, self.words.word(segment, index))?;
            }
        }
        writer.flush()?;

        // restore the free chunks the dump released
        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            self.current_segment = segment;
            self.rebuild_segment_free_chunk(segment, used[segment] as usize);
        }
        self.current_segment = saved_segment;
        let (free_words, free_oops) = self.audit_free_space();
        self.free_words = free_words;
        self.free_oops = free_oops;
        info!(free_words, free_oops, "snapshot saved");
        Ok(())
    }

    /// Read a snapshot into a fresh memory.
    pub fn load_snapshot(reader: &mut impl Read) -> io::Result<ObjectMemory> {
        let mut header = [0u8; IMAGE_HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let mut cursor: &[u8] = &header;
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != IMAGE_MAGIC {
            return Err(invalid_data("not a snapshot file"));
        }
        if read_u16(&mut cursor)? != IMAGE_VERSION {
            return Err(invalid_data("unsupported snapshot version"));
        }
        if read_u16(&mut cursor)? as usize != HEAP_SEGMENT_COUNT {
            return Err(invalid_data("snapshot segment count mismatch"));
        }
        let mut used = [0usize; HEAP_SEGMENT_COUNT];
        for words in used.iter_mut() {
            *words = read_u32(&mut cursor)? as usize;
            if *words > HEAP_SPACE_STOP + 1 {
                return Err(invalid_data("snapshot segment overflows the heap"));
            }
        }

        let mut memory = ObjectMemory {
            words: crate::words::WordMemory::new(),
            current_segment: FIRST_HEAP_SEGMENT,
            free_words: 0,
            free_oops: 0,
            gc_epoch: 0,
        };

        for index in 0..OBJECT_TABLE_SIZE {
            let word = read_u16(reader)?;
            memory.words.word_put(OBJECT_TABLE_SEGMENT, index, word);
        }

        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            for index in 0..used[segment] {
                let word = read_u16(reader)?;
                memory.words.word_put(segment, index, word);
            }
        }

        // rebuild the free-pointer list from the table's free entries;
        // an empty location slot also marks an unassigned entry
        memory.head_of_free_pointer_list_put(NON_POINTER as usize);
        let mut pointer = (OBJECT_TABLE_SIZE - 2) as u16;
        loop {
            if memory.free_bit_of(pointer) == 1
                || memory.location_bits_of(pointer) == NON_POINTER as usize
            {
                memory.release_pointer(pointer);
            } else {
                let segment = memory.segment_bits_of(pointer);
                if segment > LAST_HEAP_SEGMENT
                    || memory.location_bits_of(pointer) >= used[segment]
                {
                    return Err(invalid_data("corrupt object table entry"));
                }
            }
            if pointer == 0 {
                break;
            }
            pointer -= 2;
        }
        // oop 0 stays reserved, as in a freshly formatted memory
        if memory.free_bit_of(0) == 1 {
            memory.remove_from_free_pointer_list();
        }

        for segment in FIRST_HEAP_SEGMENT..=LAST_HEAP_SEGMENT {
            memory.current_segment = segment;
            for size in 0..=crate::BIG_SIZE {
                memory.reset_free_chunk_list(size, segment);
            }
            memory.rebuild_segment_free_chunk(segment, used[segment]);
        }
        memory.current_segment = FIRST_HEAP_SEGMENT;

        let (free_words, free_oops) = memory.audit_free_space();
        memory.free_words = free_words;
        memory.free_oops = free_oops;
        info!(free_words, free_oops, "snapshot loaded");
        Ok(memory)
    }

    /// Hand the storage above `used` back to the segment's free lists as
    /// one chunk.
    fn rebuild_segment_free_chunk(&mut self, segment: usize, used: usize) {
        debug_assert_eq!(self.current_segment, segment);
        let free = HEAP_SPACE_STOP + 1 - used.min(HEAP_SPACE_STOP + 1);
        if free >= HEADER_SIZE {
            if let Some(pointer) = self.obtain_pointer_location(free, used) {
                self.deallocate(pointer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::{new_pointer_object, TEST_CLASS};
    use crate::NoRoots;
    use object::integer_object_of;
    use std::io::Cursor;

    #[test]
    fn snapshot_round_trips_object_contents() {
        let mut memory = ObjectMemory::new();
        let holder = new_pointer_object(&mut memory, 2);
        let value = new_pointer_object(&mut memory, 0);
        memory.store_pointer(0, holder, value);
        memory.store_pointer(1, holder, integer_object_of(-7));
        let bytes_object = memory
            .instantiate_class_with_bytes(TEST_CLASS, 3, &mut NoRoots)
            .unwrap();
        memory.count_up(bytes_object);
        for index in 0..3 {
            memory.store_byte(index, bytes_object, b'a' + index as u8);
        }

        let mut file = Vec::new();
        memory.save_snapshot(&mut file).expect("save");

        let mut reloaded =
            ObjectMemory::load_snapshot(&mut Cursor::new(&file)).expect("load");

        assert!(reloaded.has_object(holder));
        assert_eq!(reloaded.fetch_pointer(0, holder), value);
        assert_eq!(reloaded.fetch_pointer(1, holder), integer_object_of(-7));
        assert_eq!(reloaded.fetch_byte_length_of(bytes_object), 3);
        for index in 0..3 {
            assert_eq!(
                reloaded.fetch_byte(index, bytes_object),
                b'a' + index as u8
            );
        }
        assert_eq!(reloaded.fetch_class_of(holder), TEST_CLASS);

        // the reloaded memory allocates and frees normally
        let fresh = new_pointer_object(&mut reloaded, 4);
        assert!(reloaded.has_object(fresh));
    }

    #[test]
    fn snapshot_preserves_free_space_accounting() {
        let mut memory = ObjectMemory::new();
        let _object = new_pointer_object(&mut memory, 10);

        let mut file = Vec::new();
        memory.save_snapshot(&mut file).expect("save");
        let reloaded =
            ObjectMemory::load_snapshot(&mut Cursor::new(&file)).expect("load");

        assert_eq!(reloaded.core_left(), memory.core_left());
        assert_eq!(reloaded.oops_left(), memory.oops_left());
    }

    #[test]
    fn the_magic_is_checked() {
        let mut file = vec![0u8; IMAGE_HEADER_SIZE];
        file[..8].copy_from_slice(b"NOTANIMG");
        let error = ObjectMemory::load_snapshot(&mut Cursor::new(&file))
            .expect_err("bad magic");
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn saving_twice_is_stable() {
        let mut memory = ObjectMemory::new();
        let _object = new_pointer_object(&mut memory, 5);

        let mut first = Vec::new();
        memory.save_snapshot(&mut first).expect("first save");
        let mut second = Vec::new();
        memory.save_snapshot(&mut second).expect("second save");
        assert_eq!(first, second);
    }
}
