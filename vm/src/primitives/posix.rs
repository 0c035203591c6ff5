//! Private host filesystem primitives, 128 through 132.
//!
//! The image's FileStream support calls these with small operation
//! codes; everything funnels through the host filesystem trait, and
//! failures surface through `lastError` as errno-style numbers. A
//! handle opened here is the image's to close, but a failing operation
//! never leaks one.

use memory::FileSystem;
use object::{is_integer_object, FALSE_PTR, FILE_NAME_INDEX, TRUE_PTR};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

// primitivePosixFileOperation codes
const FILE_OPEN_READ: i16 = 0;
const FILE_OPEN_WRITE: i16 = 1;
const FILE_CLOSE: i16 = 2;
const FILE_READ: i16 = 3;
const FILE_WRITE: i16 = 4;
const FILE_SEEK: i16 = 5;
const FILE_TELL: i16 = 6;
const FILE_SIZE: i16 = 7;
const FILE_TRUNCATE: i16 = 8;

// primitivePosixDirectoryOperation codes
const DIRECTORY_ENUMERATE: i16 = 0;
const DIRECTORY_DELETE: i16 = 1;
const DIRECTORY_RENAME: i16 = 2;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_private_primitives(&mut self) {
        match self.primitive_index {
            128 => self.primitive_be_snapshot_file(),
            129 => self.primitive_posix_file_operation(),
            130 => self.primitive_posix_directory_operation(),
            131 => self.primitive_posix_last_error(),
            132 => self.primitive_posix_error_string(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    /// Make the receiver file the snapshot target.
    fn primitive_be_snapshot_file(&mut self) {
        let file = self.stack_top();
        let name_pointer = self.memory.fetch_pointer(FILE_NAME_INDEX, file);
        self.success(!is_integer_object(name_pointer));
        if self.success_value() {
            let name = self.string_from_object(name_pointer);
            self.hal.set_image_name(&name);
        }
    }

    /// op, argument one, argument two; answers a SmallInteger status or
    /// datum, or the bytes-transferred count for read/write.
    fn primitive_posix_file_operation(&mut self) {
        let second = self.pop_stack();
        let first = self.pop_stack();
        let op = self.pop_integer();
        self.pop_stack();
        if !self.success_value() {
            self.un_pop(4);
            return;
        }
        let result: i32 = match op {
            FILE_OPEN_READ | FILE_OPEN_WRITE => {
                self.success(!is_integer_object(first));
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                let name = self.string_from_object(first);
                self.fs.open(&name, op == FILE_OPEN_WRITE)
            }
            FILE_CLOSE => {
                let fd = self.integer_or_fail(first);
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                self.fs.close(fd)
            }
            FILE_READ | FILE_WRITE => {
                let fd = self.integer_or_fail(first);
                self.success(!is_integer_object(second));
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                let length = self.memory.fetch_byte_length_of(second);
                if op == FILE_READ {
                    let mut buffer = vec![0u8; length];
                    let count = self.fs.read(fd, &mut buffer);
                    if count > 0 {
                        for (index, &byte) in
                            buffer[..count as usize].iter().enumerate()
                        {
                            self.memory.store_byte(index, second, byte);
                        }
                    }
                    count
                } else {
                    let mut buffer = Vec::with_capacity(length);
                    for index in 0..length {
                        buffer.push(self.memory.fetch_byte(index, second));
                    }
                    self.fs.write(fd, &buffer)
                }
            }
            FILE_SEEK => {
                let fd = self.integer_or_fail(first);
                let position = self.integer_or_fail(second);
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                self.fs.seek_to(fd, position)
            }
            FILE_TELL => {
                let fd = self.integer_or_fail(first);
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                self.fs.tell(fd)
            }
            FILE_SIZE => {
                let fd = self.integer_or_fail(first);
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                self.fs.file_size(fd)
            }
            FILE_TRUNCATE => {
                let fd = self.integer_or_fail(first);
                let size = self.integer_or_fail(second);
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                self.fs.truncate(fd, size)
            }
            _ => {
                self.primitive_fail();
                self.un_pop(4);
                return;
            }
        };
        let pushed = if result < 0 {
            object::integer_object_of(-1)
        } else {
            self.positive_32bit_integer_for(result as u32)
        };
        self.push(pushed);
    }

    fn integer_or_fail(&mut self, pointer: object::Oop) -> i32 {
        self.success(is_integer_object(pointer));
        if self.success_value() {
            object::integer_value_of(pointer) as i32
        } else {
            0
        }
    }

    fn primitive_posix_directory_operation(&mut self) {
        let second = self.pop_stack();
        let first = self.pop_stack();
        let op = self.pop_integer();
        self.pop_stack();
        self.success(!is_integer_object(first));
        if !self.success_value() {
            self.un_pop(4);
            return;
        }
        let first_name = self.string_from_object(first);
        match op {
            DIRECTORY_ENUMERATE => {
                let names = self.fs.enumerate_directory(&first_name);
                let listing = names.join("\n");
                match self.string_object_for(&listing) {
                    Some(string) => self.push(string),
                    None => self.out_of_memory(),
                }
            }
            DIRECTORY_DELETE => {
                let deleted = self.fs.delete_file(&first_name);
                self.push(if deleted { TRUE_PTR } else { FALSE_PTR });
            }
            DIRECTORY_RENAME => {
                self.success(!is_integer_object(second));
                if !self.success_value() {
                    self.un_pop(4);
                    return;
                }
                let second_name = self.string_from_object(second);
                let renamed = self.fs.rename_file(&first_name, &second_name);
                self.push(if renamed { TRUE_PTR } else { FALSE_PTR });
            }
            _ => {
                self.primitive_fail();
                self.un_pop(4);
            }
        }
    }

    fn primitive_posix_last_error(&mut self) {
        self.pop_stack();
        let errno = self.fs.last_error();
        let result = self.positive_32bit_integer_for(errno.max(0) as u32);
        self.push(result);
    }

    fn primitive_posix_error_string(&mut self) {
        self.pop_stack();
        let errno = self.fs.last_error();
        match self.string_object_for(&format!("host error {errno}")) {
            Some(string) => self.push(string),
            None => self.out_of_memory(),
        }
    }
}
