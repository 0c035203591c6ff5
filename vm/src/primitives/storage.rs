//! Storage management primitives, 68 through 79.
//!
//! Instantiation, `become:`, reflective field access and the instance
//! enumeration used by `allInstances`.

use memory::FileSystem;
use object::{
    is_integer_object, Oop, CLASS_COMPILED_METHOD_PTR, HEADER_INDEX, NIL_PTR,
};

use crate::hal::Hal;
use crate::interpreter::Interpreter;

impl<H: Hal, F: FileSystem> Interpreter<H, F> {
    pub(crate) fn dispatch_storage_management_primitives(&mut self) {
        match self.primitive_index {
            68 => self.primitive_object_at(),
            69 => self.primitive_object_at_put(),
            70 => self.primitive_new(),
            71 => self.primitive_new_with_arg(),
            72 => self.primitive_become(),
            73 => self.primitive_inst_var_at(),
            74 => self.primitive_inst_var_at_put(),
            75 => self.primitive_as_oop(),
            76 => self.primitive_as_object(),
            77 => self.primitive_some_instance(),
            78 => self.primitive_next_instance(),
            79 => self.primitive_new_method(),
            _ => {
                self.primitive_fail();
            }
        }
    }

    /// Header and literal access on compiled methods.
    fn primitive_object_at(&mut self) {
        let index = self.pop_integer() as i32;
        let this_receiver = self.pop_stack();
        let header = self.method_header(this_receiver);
        self.success(index > 0);
        self.success(index as usize <= header.object_pointer_count());
        if self.success_value() {
            let value = self
                .memory
                .fetch_pointer(index as usize - 1, this_receiver);
            self.push(value);
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_object_at_put(&mut self) {
        let new_value = self.pop_stack();
        let index = self.pop_integer() as i32;
        let this_receiver = self.pop_stack();
        let header = self.method_header(this_receiver);
        self.success(index > 0);
        self.success(index as usize <= header.object_pointer_count());
        if self.success_value() {
            self.memory
                .store_pointer(index as usize - 1, this_receiver, new_value);
            self.push(new_value);
        } else {
            self.un_pop(3);
        }
    }

    fn primitive_new(&mut self) {
        let class = self.pop_stack();
        let size = self.fixed_fields_of(class);
        self.success(!self.is_indexable(class));
        if self.success_value() {
            let instance = if self.is_pointers(class) {
                self.instantiate_pointers(class, size)
            } else {
                self.instantiate_words(class, size)
            };
            match instance {
                Some(instance) => self.push(instance),
                None => self.out_of_memory(),
            }
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_new_with_arg(&mut self) {
        let length_pointer = self.pop_stack();
        let length = self.positive_32bit_value_of(length_pointer) as usize;
        let class = self.pop_stack();
        self.success(self.is_indexable(class));
        if !self.success_value() {
            self.un_pop(2);
            return;
        }
        let instance = if self.is_pointers(class) {
            let length = length + self.fixed_fields_of(class);
            self.instantiate_pointers(class, length)
        } else if self.is_words(class) {
            self.instantiate_words(class, length)
        } else {
            self.instantiate_bytes(class, length)
        };
        match instance {
            Some(instance) => self.push(instance),
            None => self.out_of_memory(),
        }
    }

    /// Swap two object identities; every reference to one now reaches
    /// the other.
    fn primitive_become(&mut self) {
        let other_pointer = self.pop_stack();
        let this_receiver = self.pop_stack();
        self.success(!is_integer_object(other_pointer));
        self.success(!is_integer_object(this_receiver));
        if self.success_value() {
            self.memory.swap_pointers_of(this_receiver, other_pointer);
            self.push(this_receiver);
        } else {
            self.un_pop(2);
        }
    }

    fn check_instance_variable_bounds_of(&mut self, index: i32, object: Oop) {
        self.success(index >= 1);
        self.success(index as i64 <= self.length_of(object) as i64);
    }

    fn primitive_inst_var_at(&mut self) {
        let index = self.pop_integer() as i32;
        let this_receiver = self.pop_stack();
        self.check_instance_variable_bounds_of(index, this_receiver);
        if self.success_value() {
            let value = self.subscript_with(this_receiver, index);
            self.push(value);
        } else {
            self.un_pop(2);
        }
    }

    fn primitive_inst_var_at_put(&mut self) {
        let new_value = self.pop_stack();
        let index = self.pop_integer() as i32;
        let this_receiver = self.pop_stack();
        self.check_instance_variable_bounds_of(index, this_receiver);
        if self.success_value() {
            self.subscript_with_storing(this_receiver, index, new_value);
        }
        if self.success_value() {
            self.push(new_value);
        } else {
            self.un_pop(3);
        }
    }

    /// An object's identity as a SmallInteger.
    fn primitive_as_oop(&mut self) {
        let this_receiver = self.pop_stack();
        self.success(!is_integer_object(this_receiver));
        if self.success_value() {
            self.push(self.memory.oop_identifier_of(this_receiver));
        } else {
            self.un_pop(1);
        }
    }

    fn primitive_as_object(&mut self) {
        let identifier = self.pop_stack();
        self.success(is_integer_object(identifier));
        if self.success_value() {
            let object_pointer = self.memory.object_of_identifier(identifier);
            self.success(self.memory.has_object(object_pointer));
            if self.success_value() {
                self.push(object_pointer);
                return;
            }
        }
        self.un_pop(1);
    }

    fn primitive_some_instance(&mut self) {
        let class = self.pop_stack();
        let instance = self.memory.initial_instance_of(class);
        if instance != NIL_PTR {
            self.push(instance);
        } else {
            self.primitive_fail();
            self.un_pop(1);
        }
    }

    fn primitive_next_instance(&mut self) {
        let object = self.pop_stack();
        let instance = self.memory.instance_after(object);
        if instance != NIL_PTR {
            self.push(instance);
        } else {
            self.primitive_fail();
            self.un_pop(1);
        }
    }

    fn primitive_new_method(&mut self) {
        let header = self.pop_stack();
        let bytecode_count = self.pop_integer() as i32;
        let class = self.pop_stack();
        self.success(is_integer_object(header));
        self.success(bytecode_count >= 0);
        self.success(class == CLASS_COMPILED_METHOD_PTR);
        if !self.success_value() {
            self.un_pop(3);
            return;
        }
        let literal_count =
            object::MethodHeader::of_header_word(header).literal_count as usize;
        let method = self
            .instantiate_method_object(class, literal_count, bytecode_count as usize)
            .unwrap_or_else(|| self.out_of_memory());
        self.memory.store_pointer(HEADER_INDEX, method, header);
        self.push(method);
    }
}
