//! Construction of minimal images.
//!
//! A real system arrives as a snapshot traced out of a running image;
//! this builder plays the tracer's role for tests and the demo mode,
//! laying out a kernel of classes and well-known objects at their fixed
//! oops and emitting standard snapshot bytes for the loader.

use std::collections::HashMap;

use memory::{
    HEAP_SEGMENT_COUNT, HEAP_SPACE_STOP, IMAGE_HEADER_SIZE, IMAGE_MAGIC,
    IMAGE_VERSION, OBJECT_TABLE_SIZE,
};
use object::{
    integer_object_of, Oop, ACTIVE_PROCESS_INDEX, CLASS_ARRAY_PTR,
    CLASS_BLOCK_CONTEXT_PTR, CLASS_CHARACTER_PTR, CLASS_COMPILED_METHOD_PTR,
    CLASS_DISPLAY_BITMAP_PTR, CLASS_FLOAT_PTR, CLASS_LARGE_POSITIVE_INTEGER_PTR,
    CLASS_MESSAGE_PTR, CLASS_METHOD_CONTEXT_PTR, CLASS_POINT_PTR,
    CLASS_SEMAPHORE_PTR, CLASS_SMALL_INTEGER, CLASS_STRING_PTR,
    CANNOT_RETURN_SEL, CHARACTER_TABLE_PTR, DOES_NOT_UNDERSTAND_SEL, FALSE_PTR,
    MUST_BE_BOOLEAN_SEL, NIL_PTR, SCHEDULER_ASSOCIATION_PTR,
    SPECIAL_SELECTORS_PTR, TRUE_PTR,
};

const FIRST_FREE_OOP: Oop = 54;
const STICKY: u16 = 255;

// object table entry flag bits
const OT_ODD: u16 = 1 << 7;
const OT_POINTER: u16 = 1 << 6;
const OT_FREE: u16 = 1 << 5;

/// The 32 special selectors, in send-bytecode order, with their
/// argument counts.
pub const SPECIAL_SELECTOR_NAMES: [(&str, i16); 32] = [
    ("+", 1),
    ("-", 1),
    ("<", 1),
    (">", 1),
    ("<=", 1),
    (">=", 1),
    ("=", 1),
    ("~=", 1),
    ("*", 1),
    ("/", 1),
    ("\\\\", 1),
    ("@", 1),
    ("bitShift:", 1),
    ("//", 1),
    ("bitAnd:", 1),
    ("bitOr:", 1),
    ("at:", 1),
    ("at:put:", 2),
    ("size", 0),
    ("next", 0),
    ("nextPut:", 1),
    ("atEnd", 0),
    ("==", 1),
    ("class", 0),
    ("blockCopy:", 1),
    ("value", 0),
    ("value:", 1),
    ("do:", 1),
    ("new", 0),
    ("new:", 1),
    ("x", 0),
    ("y", 0),
];

/// Shape of a class under construction.
#[derive(Clone, Copy)]
pub struct InstanceShape {
    pub pointers: bool,
    pub words: bool,
    pub indexable: bool,
    pub fixed_fields: u16,
}

impl InstanceShape {
    pub fn pointer_object(fixed_fields: u16) -> Self {
        Self {
            pointers: true,
            words: false,
            indexable: false,
            fixed_fields,
        }
    }

    pub fn indexable_pointers(fixed_fields: u16) -> Self {
        Self {
            pointers: true,
            words: false,
            indexable: true,
            fixed_fields,
        }
    }

    pub fn indexable_words() -> Self {
        Self {
            pointers: false,
            words: true,
            indexable: true,
            fixed_fields: 0,
        }
    }

    pub fn indexable_bytes() -> Self {
        Self {
            pointers: false,
            words: false,
            indexable: true,
            fixed_fields: 0,
        }
    }

    fn specification(&self) -> Oop {
        (u16::from(self.pointers) << 15)
            | (u16::from(self.words) << 14)
            | (u16::from(self.indexable) << 13)
            | (self.fixed_fields << 1)
            | 1
    }
}

pub struct ImageBuilder {
    table: Vec<u16>,
    storage: Vec<u16>,
    locations: HashMap<Oop, usize>,
    symbols: HashMap<String, Oop>,
    methods: HashMap<Oop, Vec<(Oop, Oop)>>,
    next_oop: Oop,

    /// The root class every other class inherits from.
    pub object_class: Oop,
    /// The class whose instances are the classes themselves; sends to a
    /// class look its selectors up here.
    pub metaclass: Oop,
    pub process_class: Oop,
    pub linked_list_class: Oop,
    pub scheduler_class: Oop,
    pub association_class: Oop,
    pub symbol_class: Oop,
    pub form_class: Oop,

    scheduler: Oop,
    idle_process: Oop,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// A kernel with the well-known objects at their burned-in oops.
    pub fn new() -> Self {
        let mut builder = Self {
            table: vec![0; OBJECT_TABLE_SIZE],
            storage: Vec::new(),
            locations: HashMap::new(),
            symbols: HashMap::new(),
            methods: HashMap::new(),
            next_oop: FIRST_FREE_OOP,
            object_class: 0,
            metaclass: 0,
            process_class: 0,
            linked_list_class: 0,
            scheduler_class: 0,
            association_class: 0,
            symbol_class: 0,
            form_class: 0,
            scheduler: 0,
            idle_process: 0,
        };
        for entry in 0..OBJECT_TABLE_SIZE / 2 {
            builder.table[entry * 2] = OT_FREE;
            builder.table[entry * 2 + 1] = object::NON_POINTER;
        }
        builder.build_kernel();
        builder
    }

    fn allocate_oop(&mut self) -> Oop {
        let oop = self.next_oop;
        self.next_oop += 2;
        oop
    }

    fn put_object(
        &mut self,
        oop: Oop,
        class: Oop,
        pointer: bool,
        odd: bool,
        body: &[u16],
    ) -> Oop {
        let location = self.storage.len();
        assert!(
            location + body.len() + 2 <= HEAP_SPACE_STOP + 1,
            "bootstrap image overflows its segment"
        );
        self.storage.push(body.len() as u16 + 2);
        self.storage.push(class);
        self.storage.extend_from_slice(body);
        let flags = (STICKY << 8)
            | if odd { OT_ODD } else { 0 }
            | if pointer { OT_POINTER } else { 0 };
        self.table[oop as usize] = flags;
        self.table[oop as usize + 1] = location as u16;
        self.locations.insert(oop, location);
        oop
    }

    /// A pointer object at a chosen or fresh oop.
    pub fn pointers(&mut self, oop: Option<Oop>, class: Oop, fields: &[Oop]) -> Oop {
        let oop = oop.unwrap_or_else(|| self.allocate_oop());
        self.put_object(oop, class, true, false, fields)
    }

    pub fn words(&mut self, oop: Option<Oop>, class: Oop, words: &[u16]) -> Oop {
        let oop = oop.unwrap_or_else(|| self.allocate_oop());
        self.put_object(oop, class, false, false, words)
    }

    pub fn bytes(&mut self, oop: Option<Oop>, class: Oop, bytes: &[u8]) -> Oop {
        let oop = oop.unwrap_or_else(|| self.allocate_oop());
        let mut body = Vec::with_capacity(bytes.len().div_ceil(2));
        for pair in bytes.chunks(2) {
            let high = pair[0] as u16;
            let low = pair.get(1).copied().unwrap_or(0) as u16;
            body.push((high << 8) | low);
        }
        self.put_object(oop, class, false, false, &body);
        if bytes.len() % 2 == 1 {
            self.table[oop as usize] |= OT_ODD;
        }
        oop
    }

    /// Patch a pointer field of an already-laid-out object.
    pub fn set_field(&mut self, oop: Oop, field_index: usize, value: Oop) {
        let location = self.locations[&oop];
        self.storage[location + 2 + field_index] = value;
    }

    pub fn field(&self, oop: Oop, field_index: usize) -> Oop {
        self.storage[self.locations[&oop] + 2 + field_index]
    }

    /// An interned Symbol.
    pub fn symbol(&mut self, name: &str) -> Oop {
        self.symbol_at(name, None)
    }

    fn symbol_at(&mut self, name: &str, oop: Option<Oop>) -> Oop {
        if let Some(&interned) = self.symbols.get(name) {
            return interned;
        }
        let class = self.symbol_class;
        let oop = self.bytes(oop, class, name.as_bytes());
        self.symbols.insert(name.to_string(), oop);
        oop
    }

    /// A class object; its method dictionary is assembled at build time
    /// from `add_method` calls.
    pub fn class(
        &mut self,
        oop: Option<Oop>,
        superclass: Oop,
        shape: InstanceShape,
    ) -> Oop {
        let specification = shape.specification();
        let class =
            self.pointers(oop, self.metaclass, &[superclass, NIL_PTR, specification]);
        self.methods.entry(class).or_default();
        class
    }

    pub fn add_method(&mut self, class: Oop, selector: Oop, method: Oop) {
        self.methods.entry(class).or_default().push((selector, method));
    }

    /// A compiled method. The header is assembled from the counts; flag
    /// 7 carries the primitive and argument count in an extension
    /// literal.
    pub fn method(
        &mut self,
        argument_count: u16,
        temporary_count: u16,
        primitive: u16,
        literals: &[Oop],
        bytecodes: &[u8],
    ) -> Oop {
        let mut literal_frame = literals.to_vec();
        let flag_value;
        if primitive != 0 {
            flag_value = 7;
            let extension = (primitive << 1) | (argument_count << 9) | 1;
            literal_frame.push(extension);
            // flag 7 methods keep the class association last
            literal_frame.push(NIL_PTR);
        } else {
            assert!(argument_count <= 4);
            flag_value = argument_count;
        }
        let literal_count = literal_frame.len() as u16;
        let header: Oop = (flag_value << 13)
            | (temporary_count << 8)
            | (literal_count << 1)
            | 1;

        let mut body: Vec<u16> = Vec::with_capacity(
            1 + literal_frame.len() + bytecodes.len().div_ceil(2),
        );
        body.push(header);
        body.extend_from_slice(&literal_frame);
        for pair in bytecodes.chunks(2) {
            let high = pair[0] as u16;
            let low = pair.get(1).copied().unwrap_or(0) as u16;
            body.push((high << 8) | low);
        }
        let oop = self.allocate_oop();
        self.put_object(oop, CLASS_COMPILED_METHOD_PTR, false, false, &body);
        if bytecodes.len() % 2 == 1 {
            self.table[oop as usize] |= OT_ODD;
        }
        oop
    }

    /// A runnable process whose suspended context will execute `method`
    /// against `receiver` from its first bytecode.
    pub fn process(&mut self, method: Oop, receiver: Oop, priority: i16) -> Oop {
        let header = object::MethodHeader::of_header_word(self.field(method, 0));
        let initial_ip = header.initial_instruction_pointer();
        let mut fields = vec![
            NIL_PTR,
            integer_object_of(initial_ip as i16),
            integer_object_of(header.temporary_count as i16),
            method,
            NIL_PTR,
            receiver,
        ];
        fields.resize(6 + 12, NIL_PTR);
        let context = self.pointers(None, CLASS_METHOD_CONTEXT_PTR, &fields);
        self.pointers(
            None,
            self.process_class,
            &[
                NIL_PTR,
                context,
                integer_object_of(priority),
                NIL_PTR,
            ],
        )
    }

    /// Queue a built process on its priority's run list.
    pub fn schedule(&mut self, process: Oop) {
        let priority =
            object::integer_value_of(self.field(process, object::PRIORITY_INDEX));
        let lists = self.field(self.scheduler, object::PROCESS_LISTS_INDEX);
        let list = self.field(lists, priority as usize - 1);
        let first = self.field(list, object::FIRST_LINK_INDEX);
        if first == NIL_PTR {
            self.set_field(list, object::FIRST_LINK_INDEX, process);
        } else {
            let last = self.field(list, object::LAST_LINK_INDEX);
            self.set_field(last, object::NEXT_LINK_INDEX, process);
        }
        self.set_field(list, object::LAST_LINK_INDEX, process);
        self.set_field(process, object::MY_LIST_INDEX, list);
    }

    /// Make `process` the one the interpreter boots into.
    pub fn activate(&mut self, process: Oop) {
        self.set_field(self.scheduler, ACTIVE_PROCESS_INDEX, process);
    }

    /// A semaphore, optionally with processes already waiting on it.
    pub fn semaphore(&mut self, excess_signals: i16) -> Oop {
        self.pointers(
            None,
            CLASS_SEMAPHORE_PTR,
            &[NIL_PTR, NIL_PTR, integer_object_of(excess_signals)],
        )
    }

    pub fn park_on_semaphore(&mut self, process: Oop, semaphore: Oop) {
        let first = self.field(semaphore, object::FIRST_LINK_INDEX);
        if first == NIL_PTR {
            self.set_field(semaphore, object::FIRST_LINK_INDEX, process);
        } else {
            let last = self.field(semaphore, object::LAST_LINK_INDEX);
            self.set_field(last, object::NEXT_LINK_INDEX, process);
        }
        self.set_field(semaphore, object::LAST_LINK_INDEX, process);
        self.set_field(process, object::MY_LIST_INDEX, semaphore);
    }

    fn build_kernel(&mut self) {
        // classes come first; their own class field is patched once the
        // metaclass exists
        self.metaclass = self.allocate_oop();
        self.object_class = self.allocate_oop();
        let object_shape = InstanceShape::pointer_object(0);
        self.pointers(
            Some(self.object_class),
            self.metaclass,
            &[NIL_PTR, NIL_PTR, object_shape.specification()],
        );
        self.methods.entry(self.object_class).or_default();
        self.pointers(
            Some(self.metaclass),
            self.metaclass,
            &[self.object_class, NIL_PTR, object_shape.specification()],
        );
        self.methods.entry(self.metaclass).or_default();

        let undefined_object =
            self.class(None, self.object_class, InstanceShape::pointer_object(0));
        let false_class =
            self.class(None, self.object_class, InstanceShape::pointer_object(0));
        let true_class =
            self.class(None, self.object_class, InstanceShape::pointer_object(0));

        self.pointers(Some(NIL_PTR), undefined_object, &[]);
        self.pointers(Some(FALSE_PTR), false_class, &[]);
        self.pointers(Some(TRUE_PTR), true_class, &[]);

        self.class(
            Some(CLASS_SMALL_INTEGER),
            self.object_class,
            InstanceShape::pointer_object(0),
        );
        self.class(
            Some(CLASS_STRING_PTR),
            self.object_class,
            InstanceShape::indexable_bytes(),
        );
        self.symbol_class = self.class(
            None,
            CLASS_STRING_PTR,
            InstanceShape::indexable_bytes(),
        );
        self.class(
            Some(CLASS_ARRAY_PTR),
            self.object_class,
            InstanceShape::indexable_pointers(0),
        );
        self.class(
            Some(CLASS_FLOAT_PTR),
            self.object_class,
            InstanceShape::indexable_words(),
        );
        self.class(
            Some(CLASS_METHOD_CONTEXT_PTR),
            self.object_class,
            InstanceShape::indexable_pointers(6),
        );
        self.class(
            Some(CLASS_BLOCK_CONTEXT_PTR),
            self.object_class,
            InstanceShape::indexable_pointers(6),
        );
        self.class(
            Some(CLASS_POINT_PTR),
            self.object_class,
            InstanceShape::pointer_object(2),
        );
        self.class(
            Some(CLASS_LARGE_POSITIVE_INTEGER_PTR),
            self.object_class,
            InstanceShape::indexable_bytes(),
        );
        self.class(
            Some(CLASS_DISPLAY_BITMAP_PTR),
            self.object_class,
            InstanceShape::indexable_words(),
        );
        self.class(
            Some(CLASS_MESSAGE_PTR),
            self.object_class,
            InstanceShape::pointer_object(2),
        );
        self.class(
            Some(CLASS_COMPILED_METHOD_PTR),
            self.object_class,
            InstanceShape::indexable_bytes(),
        );
        self.class(
            Some(CLASS_SEMAPHORE_PTR),
            self.object_class,
            InstanceShape::pointer_object(3),
        );
        self.class(
            Some(CLASS_CHARACTER_PTR),
            self.object_class,
            InstanceShape::pointer_object(1),
        );
        self.process_class = self.class(
            None,
            self.object_class,
            InstanceShape::pointer_object(4),
        );
        self.linked_list_class = self.class(
            None,
            self.object_class,
            InstanceShape::pointer_object(2),
        );
        self.scheduler_class = self.class(
            None,
            self.object_class,
            InstanceShape::pointer_object(2),
        );
        self.association_class = self.class(
            None,
            self.object_class,
            InstanceShape::pointer_object(2),
        );
        self.form_class = self.class(
            None,
            self.object_class,
            InstanceShape::pointer_object(4),
        );

        // well-known selector symbols live at their burned-in oops
        self.symbol_at("doesNotUnderstand:", Some(DOES_NOT_UNDERSTAND_SEL));
        self.symbol_at("cannotReturn:", Some(CANNOT_RETURN_SEL));
        self.symbol_at("mustBeBoolean", Some(MUST_BE_BOOLEAN_SEL));

        // the character table
        let mut characters = Vec::with_capacity(256);
        for code in 0..256u16 {
            let character = self.pointers(
                None,
                CLASS_CHARACTER_PTR,
                &[integer_object_of(code as i16)],
            );
            characters.push(character);
        }
        self.pointers(Some(CHARACTER_TABLE_PTR), CLASS_ARRAY_PTR, &characters);

        // the special selector table: 32 selector/argument-count pairs
        let mut pairs = Vec::with_capacity(64);
        for (name, count) in SPECIAL_SELECTOR_NAMES {
            let selector = self.symbol(name);
            pairs.push(selector);
            pairs.push(integer_object_of(count));
        }
        self.pointers(Some(SPECIAL_SELECTORS_PTR), CLASS_ARRAY_PTR, &pairs);

        // the scheduler: eight empty run lists and a placeholder active
        // process
        let mut lists = Vec::with_capacity(8);
        for _ in 0..8 {
            let list = self.pointers(
                None,
                self.linked_list_class,
                &[NIL_PTR, NIL_PTR],
            );
            lists.push(list);
        }
        let process_lists = self.pointers(None, CLASS_ARRAY_PTR, &lists);
        self.scheduler = self.pointers(
            None,
            self.scheduler_class,
            &[process_lists, NIL_PTR],
        );
        let processor_symbol = self.symbol("Processor");
        let scheduler = self.scheduler;
        self.pointers(
            Some(SCHEDULER_ASSOCIATION_PTR),
            self.association_class,
            &[processor_symbol, scheduler],
        );

        // an idle process to boot into; a spin in place until something
        // better is scheduled
        let idle_method = self.method(0, 0, 0, &[], &[163, 254]);
        self.idle_process = self.process(idle_method, NIL_PTR, 1);
        let idle = self.idle_process;
        self.activate(idle);
    }

    /// The process the image boots into unless `activate` replaced it.
    pub fn idle(&self) -> Oop {
        self.idle_process
    }

    /// Lay out the accumulated method dictionaries and emit snapshot
    /// bytes.
    pub fn build(mut self) -> Vec<u8> {
        let class_methods: Vec<(Oop, Vec<(Oop, Oop)>)> = self
            .methods
            .iter()
            .map(|(&class, methods)| (class, methods.clone()))
            .collect();
        for (class, methods) in class_methods {
            let dictionary = self.method_dictionary(&methods);
            self.set_field(class, object::MESSAGE_DICTIONARY_INDEX, dictionary);
        }

        let mut image = Vec::new();
        image.extend_from_slice(IMAGE_MAGIC);
        image.extend_from_slice(&IMAGE_VERSION.to_be_bytes());
        image.extend_from_slice(&(HEAP_SEGMENT_COUNT as u16).to_be_bytes());
        let mut used = [0u32; HEAP_SEGMENT_COUNT];
        used[0] = self.storage.len() as u32;
        for words in used {
            image.extend_from_slice(&words.to_be_bytes());
        }
        image.resize(IMAGE_HEADER_SIZE, 0);
        for &word in &self.table {
            image.extend_from_slice(&word.to_be_bytes());
        }
        for &word in &self.storage {
            image.extend_from_slice(&word.to_be_bytes());
        }
        image
    }

    /// A linear-probed selector dictionary sized to the next power of
    /// two, with its parallel method array.
    fn method_dictionary(&mut self, methods: &[(Oop, Oop)]) -> Oop {
        let mut slots: usize = 8;
        while slots < methods.len() * 2 {
            slots *= 2;
        }
        let mask = slots - 1;
        let mut selectors = vec![NIL_PTR; slots];
        let mut method_slots = vec![NIL_PTR; slots];
        for &(selector, method) in methods {
            let mut index = (selector as usize >> 1) & mask;
            while selectors[index] != NIL_PTR {
                index = (index + 1) & mask;
            }
            selectors[index] = selector;
            method_slots[index] = method;
        }
        let method_array = self.pointers(None, CLASS_ARRAY_PTR, &method_slots);
        let mut fields = vec![
            integer_object_of(methods.len() as i16),
            method_array,
        ];
        fields.extend_from_slice(&selectors);
        self.pointers(None, CLASS_ARRAY_PTR, &fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::ObjectMemory;
    use std::io::Cursor;

    #[test]
    fn the_kernel_image_loads() {
        let image = ImageBuilder::new().build();
        let memory =
            ObjectMemory::load_snapshot(&mut Cursor::new(image)).expect("load");
        assert!(memory.has_object(NIL_PTR));
        assert!(memory.has_object(TRUE_PTR));
        assert!(memory.has_object(FALSE_PTR));
        assert!(memory.has_object(SCHEDULER_ASSOCIATION_PTR));
        assert_eq!(memory.fetch_word_length_of(SPECIAL_SELECTORS_PTR), 64);
        assert_eq!(memory.fetch_word_length_of(CHARACTER_TABLE_PTR), 256);
    }

    #[test]
    fn symbols_intern_once() {
        let mut builder = ImageBuilder::new();
        let first = builder.symbol("foo:bar:");
        let second = builder.symbol("foo:bar:");
        assert_eq!(first, second);
    }

    #[test]
    fn well_known_selectors_sit_at_their_oops() {
        let mut builder = ImageBuilder::new();
        assert_eq!(
            builder.symbol("doesNotUnderstand:"),
            DOES_NOT_UNDERSTAND_SEL
        );
        assert_eq!(builder.symbol("mustBeBoolean"), MUST_BE_BOOLEAN_SEL);
        assert_eq!(builder.symbol("cannotReturn:"), CANNOT_RETURN_SEL);
    }

    #[test]
    fn method_headers_encode_the_primitive() {
        let mut builder = ImageBuilder::new();
        let method = builder.method(2, 3, 96, &[], &[123]);
        let header =
            object::MethodHeader::of_header_word(builder.field(method, 0));
        assert_eq!(header.flag_value, 7);
        assert_eq!(header.temporary_count, 3);
        let extension = builder
            .field(method, header.extension_literal_index() + 1);
        assert_eq!(header.primitive_index_with(extension), 96);
        assert_eq!(header.argument_count_with(extension), 2);
    }

    #[test]
    fn dictionaries_probe_like_the_interpreter() {
        let mut builder = ImageBuilder::new();
        let selectors: Vec<Oop> =
            (0..6).map(|index| builder.symbol(&format!("sel{index}"))).collect();
        let method = builder.method(0, 0, 0, &[], &[120]);
        let entries: Vec<(Oop, Oop)> =
            selectors.iter().map(|&selector| (selector, method)).collect();
        let dictionary = builder.method_dictionary(&entries);

        // replay the interpreter's linear probe over the built layout
        let length = 2 + 16;
        let mask = length - object::SELECTOR_START - 1;
        for &selector in &selectors {
            let mut index =
                (mask & (selector >> 1) as usize) + object::SELECTOR_START;
            loop {
                let slot = builder.field(dictionary, index);
                assert_ne!(slot, NIL_PTR, "selector must be reachable");
                if slot == selector {
                    break;
                }
                index += 1;
                if index == length {
                    index = object::SELECTOR_START;
                }
            }
        }
    }
}
