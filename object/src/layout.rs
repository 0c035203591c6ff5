//! Fixed field indices of the kernel classes.
//!
//! The image compiler and the interpreter agree on these layouts; they
//! index the pointer bodies of instances directly.

// MethodContext
pub const SENDER_INDEX: usize = 0;
pub const INSTRUCTION_POINTER_INDEX: usize = 1;
pub const STACK_POINTER_INDEX: usize = 2;
pub const METHOD_INDEX: usize = 3;
pub const RECEIVER_INDEX: usize = 5;
pub const TEMP_FRAME_START: usize = 6;

// BlockContext
pub const CALLER_INDEX: usize = 0;
pub const BLOCK_ARGUMENT_COUNT_INDEX: usize = 3;
pub const INITIAL_IP_INDEX: usize = 4;
pub const HOME_INDEX: usize = 5;

// Class
pub const SUPERCLASS_INDEX: usize = 0;
pub const MESSAGE_DICTIONARY_INDEX: usize = 1;
pub const INSTANCE_SPECIFICATION_INDEX: usize = 2;

// MethodDictionary: selectors start after the tally and method array.
pub const METHOD_ARRAY_INDEX: usize = 1;
pub const SELECTOR_START: usize = 2;

// ProcessorScheduler
pub const PROCESS_LISTS_INDEX: usize = 0;
pub const ACTIVE_PROCESS_INDEX: usize = 1;

// LinkedList
pub const FIRST_LINK_INDEX: usize = 0;
pub const LAST_LINK_INDEX: usize = 1;

// Link
pub const NEXT_LINK_INDEX: usize = 0;

// Semaphore
pub const EXCESS_SIGNALS_INDEX: usize = 2;

// Process
pub const SUSPENDED_CONTEXT_INDEX: usize = 1;
pub const PRIORITY_INDEX: usize = 2;
pub const MY_LIST_INDEX: usize = 3;

// Association
pub const VALUE_INDEX: usize = 1;

// Point
pub const X_INDEX: usize = 0;
pub const Y_INDEX: usize = 1;
pub const CLASS_POINT_SIZE: usize = 2;

// Stream
pub const STREAM_ARRAY_INDEX: usize = 0;
pub const STREAM_INDEX_INDEX: usize = 1;
pub const STREAM_READ_LIMIT_INDEX: usize = 2;
pub const STREAM_WRITE_LIMIT_INDEX: usize = 3;

// Message
pub const MESSAGE_SELECTOR_INDEX: usize = 0;
pub const MESSAGE_ARGUMENTS_INDEX: usize = 1;
pub const MESSAGE_SIZE: usize = 2;

// Character
pub const CHARACTER_VALUE_INDEX: usize = 0;

// CompiledMethod
pub const HEADER_INDEX: usize = 0;
pub const LITERAL_START: usize = 1;

// Form
pub const BITS_IN_FORM: usize = 0;
pub const WIDTH_IN_FORM: usize = 1;
pub const HEIGHT_IN_FORM: usize = 2;
pub const OFFSET_IN_FORM: usize = 3;

// File
pub const FILE_NAME_INDEX: usize = 1;
