//! # Swerve Module Tick Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use swerve_lib::{
    module_ctrl::{ModulePosition, Params, SwerveModule},
    optimizer::{optimize, ModuleState},
    telemetry::LogTelemetry,
};

fn module_tick_benchmark(c: &mut Criterion) {
    // ---- Build a simulated module ----

    let mut module = SwerveModule::simulated(
        ModulePosition::FrontLeft,
        Params::default(),
        Box::new(LogTelemetry),
    );

    // Alternate between two demands so the module keeps turning
    let demands = [
        ModuleState::new(2.0, 35.0),
        ModuleState::new(1.0, -140.0),
    ];
    let mut i = 0usize;

    c.bench_function("SwerveModule::set_desired_state+tick", |b| {
        b.iter(|| {
            i = (i + 1) % 200;
            let cmd = module.set_desired_state(black_box(demands[i / 100]), false);
            module.tick();
            cmd
        })
    });

    c.bench_function("optimize", |b| {
        b.iter(|| optimize(black_box(ModuleState::new(1.0, 170.0)), black_box(-45.0)))
    });
}

criterion_group!(benches, module_tick_benchmark);
criterion_main!(benches);
