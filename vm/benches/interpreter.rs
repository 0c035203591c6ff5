use criterion::{criterion_group, criterion_main, Criterion};
use memory::{HostFileSystem, ObjectMemory};
use object::integer_object_of;
use std::io::Cursor;
use vm::bootstrap::{ImageBuilder, InstanceShape};
use vm::{HeadlessHal, Interpreter};

fn counting_interpreter() -> Interpreter<HeadlessHal, HostFileSystem> {
    let mut builder = ImageBuilder::new();
    let class = builder.class(
        None,
        builder.object_class,
        InstanceShape::pointer_object(1),
    );
    let cell = builder.pointers(None, class, &[integer_object_of(0)]);
    // count modulo 16000 so the sum never leaves the immediate range
    let method = builder.method(
        0,
        0,
        0,
        &[integer_object_of(1), integer_object_of(16000)],
        &[0, 32, 176, 33, 186, 96, 163, 248],
    );
    let process = builder.process(method, cell, 4);
    builder.activate(process);

    let memory = ObjectMemory::load_snapshot(&mut Cursor::new(builder.build()))
        .expect("image");
    let hal = HeadlessHal::new("bench.im");
    let fs = HostFileSystem::new(std::env::temp_dir());
    let mut interpreter = Interpreter::new(memory, hal, fs);
    interpreter.boot();
    interpreter
}

fn bytecode_cycles(criterion: &mut Criterion) {
    let mut interpreter = counting_interpreter();
    criterion.bench_function("ten_thousand_cycles", |bencher| {
        bencher.iter(|| {
            for _ in 0..10_000 {
                interpreter.cycle();
            }
        })
    });
}

criterion_group!(benches, bytecode_cycles);
criterion_main!(benches);
