//! End-to-end scenarios: a bootstrapped kernel image interpreted for
//! real, observed through receiver fields and the headless host.

use std::io::Cursor;

use memory::{HostFileSystem, ObjectMemory};
use object::{
    integer_object_of, Oop, CLASS_SMALL_INTEGER, NIL_PTR, RED_BUTTON,
};
use vm::bootstrap::{ImageBuilder, InstanceShape};
use vm::{Hal, HeadlessHal, Interpreter};

fn interpreter_for(
    image: Vec<u8>,
) -> Interpreter<HeadlessHal, HostFileSystem> {
    let memory =
        ObjectMemory::load_snapshot(&mut Cursor::new(image)).expect("image");
    let hal = HeadlessHal::new("test.im");
    let fs = HostFileSystem::new(std::env::temp_dir());
    let mut interpreter = Interpreter::new(memory, hal, fs);
    let signals = interpreter.signal_buffer();
    interpreter.hal.attach_signals(signals);
    interpreter.boot();
    interpreter
}

fn run(
    interpreter: &mut Interpreter<HeadlessHal, HostFileSystem>,
    cycles: usize,
) {
    for _ in 0..cycles {
        interpreter.cycle();
    }
}

/// A one-field object of a fresh class, plus that class's oop.
fn cell_class(builder: &mut ImageBuilder) -> (Oop, Oop) {
    let class = builder.class(
        None,
        builder.object_class,
        InstanceShape::pointer_object(1),
    );
    let instance = builder.pointers(None, class, &[integer_object_of(0)]);
    (class, instance)
}

#[test]
fn adding_two_literals_through_the_special_selector() {
    let mut builder = ImageBuilder::new();
    let (_, cell) = cell_class(&mut builder);
    // push 3, push 4, send +, store into the cell, loop
    let method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(3), integer_object_of(4)],
        &[32, 33, 176, 96, 163, 250],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 25);
    assert_eq!(
        interpreter.memory.fetch_pointer(0, cell),
        integer_object_of(7)
    );
}

#[test]
fn integer_overflow_falls_back_to_the_image_method() {
    let mut builder = ImageBuilder::new();
    let (_, cell) = cell_class(&mut builder);
    let marker = integer_object_of(-999);
    let plus = builder.symbol("+");
    let fallback = builder.method(1, 1, 0, &[marker], &[32, 124]);
    builder.add_method(CLASS_SMALL_INTEGER, plus, fallback);

    let method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(16383), integer_object_of(1)],
        &[32, 33, 176, 96, 163, 250],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 60);
    assert_eq!(interpreter.memory.fetch_pointer(0, cell), marker);
}

#[test]
fn block_with_a_temporary_evaluates_to_its_value() {
    let mut builder = ImageBuilder::new();
    let (_, cell) = cell_class(&mut builder);
    // [:| x | x := 3. x] value, stored into the cell
    let method = builder.method(
        0,
        1,
        0,
        &[integer_object_of(3)],
        &[137, 117, 200, 164, 4, 32, 104, 16, 125, 201, 96, 163, 243],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 40);
    assert_eq!(
        interpreter.memory.fetch_pointer(0, cell),
        integer_object_of(3)
    );
}

#[test]
fn unknown_selectors_reach_does_not_understand() {
    let mut builder = ImageBuilder::new();
    let (_, cell) = cell_class(&mut builder);
    let marker = integer_object_of(-7);
    let handler = builder.method(1, 1, 0, &[marker], &[32, 124]);
    let dnu = builder.symbol("doesNotUnderstand:");
    builder.add_method(builder.object_class, dnu, handler);

    let mystery = builder.symbol("frobnicate");
    let method = builder.method(
        0,
        0,
        0,
        &[mystery],
        &[112, 208, 96, 163, 251],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 40);
    assert_eq!(interpreter.memory.fetch_pointer(0, cell), marker);
}

#[test]
fn asynchronous_signal_switches_to_a_higher_priority_waiter() {
    let mut builder = ImageBuilder::new();
    let (_, low_cell) = cell_class(&mut builder);
    let (_, high_cell) = cell_class(&mut builder);

    let low_method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(3), integer_object_of(4)],
        &[32, 33, 176, 96, 163, 250],
    );
    let low_process = builder.process(low_method, low_cell, 4);
    builder.activate(low_process);

    let high_method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(99)],
        &[32, 96, 163, 252],
    );
    let high_process = builder.process(high_method, high_cell, 5);
    let semaphore = builder.semaphore(0);
    builder.park_on_semaphore(high_process, semaphore);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 20);
    assert_eq!(
        interpreter.memory.fetch_pointer(0, high_cell),
        integer_object_of(0),
        "the waiter must stay suspended until signalled"
    );

    interpreter.signal_buffer().asynchronous_signal(semaphore);
    run(&mut interpreter, 20);
    assert_eq!(
        interpreter.memory.fetch_pointer(0, high_cell),
        integer_object_of(99)
    );
}

#[test]
fn scheduled_timer_signal_fires_through_the_host() {
    let mut builder = ImageBuilder::new();
    let (_, low_cell) = cell_class(&mut builder);
    let (_, high_cell) = cell_class(&mut builder);

    let low_method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(1)],
        &[32, 96, 163, 252],
    );
    let low_process = builder.process(low_method, low_cell, 4);
    builder.activate(low_process);

    let high_method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(42)],
        &[32, 96, 163, 252],
    );
    let high_process = builder.process(high_method, high_cell, 6);
    let semaphore = builder.semaphore(0);
    builder.park_on_semaphore(high_process, semaphore);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 5);
    // schedule for a time that has already passed; it fires on the next
    // host poll
    interpreter.hal.signal_at(semaphore, 0);
    interpreter.hal.check_scheduled_semaphore();
    run(&mut interpreter, 20);
    assert_eq!(
        interpreter.memory.fetch_pointer(0, high_cell),
        integer_object_of(42)
    );
}

#[test]
fn input_words_arrive_through_the_primitive() {
    let mut builder = ImageBuilder::new();
    let (class, cell) = cell_class(&mut builder);
    let read_word = builder.symbol("readWord");
    let primitive_method = builder.method(0, 0, 95, &[], &[123]);
    builder.add_method(class, read_word, primitive_method);

    // read one word, store it, then spin in place
    let method = builder.method(
        0,
        0,
        0,
        &[read_word],
        &[112, 208, 96, 163, 254],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    interpreter
        .hal
        .queue_event(object::EventType::BistateDown, RED_BUTTON);
    run(&mut interpreter, 20);
    assert_eq!(
        interpreter.memory.fetch_pointer(0, cell),
        integer_object_of(0x3082),
    );
}

#[test]
fn copy_bits_transfers_words_between_forms() {
    let mut builder = ImageBuilder::new();
    let (class, _) = cell_class(&mut builder);

    let dest_bits = builder.words(None, object::CLASS_DISPLAY_BITMAP_PTR, &[0]);
    let dest_form = builder.pointers(
        None,
        builder.form_class,
        &[
            dest_bits,
            integer_object_of(16),
            integer_object_of(1),
            NIL_PTR,
        ],
    );
    let source_bits =
        builder.words(None, object::CLASS_DISPLAY_BITMAP_PTR, &[0xA5C3]);
    let source_form = builder.pointers(
        None,
        builder.form_class,
        &[
            source_bits,
            integer_object_of(16),
            integer_object_of(1),
            NIL_PTR,
        ],
    );
    let blt_class = builder.class(
        None,
        builder.object_class,
        InstanceShape::pointer_object(14),
    );
    let zero = integer_object_of(0);
    let blt = builder.pointers(
        None,
        blt_class,
        &[
            dest_form,
            source_form,
            NIL_PTR,
            integer_object_of(3),
            zero,
            zero,
            integer_object_of(16),
            integer_object_of(1),
            zero,
            zero,
            zero,
            zero,
            integer_object_of(16),
            integer_object_of(1),
        ],
    );

    let copy = builder.symbol("transfer");
    let primitive_method = builder.method(0, 0, 96, &[], &[123]);
    builder.add_method(blt_class, copy, primitive_method);
    let method = builder.method(
        0,
        0,
        0,
        &[copy, blt],
        &[33, 208, 135, 163, 252],
    );
    let driver = builder.pointers(None, class, &[zero]);
    let process = builder.process(method, driver, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 10);
    assert_eq!(interpreter.memory.fetch_word(0, dest_bits), 0xA5C3);
}

#[test]
fn a_running_image_survives_a_snapshot_round_trip() {
    let mut builder = ImageBuilder::new();
    let (_, cell) = cell_class(&mut builder);
    // keep incrementing the cell
    let method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(1)],
        &[0, 32, 176, 96, 163, 250],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let mut interpreter = interpreter_for(builder.build());
    run(&mut interpreter, 60);
    let before = interpreter.memory.fetch_pointer(0, cell);
    assert_ne!(before, integer_object_of(0));

    let directory = tempfile::tempdir().expect("tempdir");
    let path = directory.path().join("counting.im");
    let mut file =
        std::io::BufWriter::new(std::fs::File::create(&path).expect("create"));
    interpreter.memory.save_snapshot(&mut file).expect("snapshot");
    drop(file);

    let snapshot = std::fs::read(&path).expect("read back");
    let mut resumed = interpreter_for(snapshot);
    run(&mut resumed, 60);
    let after = resumed.memory.fetch_pointer(0, cell);
    assert_ne!(after, before);
    assert!(object::is_integer_object(after));
}
