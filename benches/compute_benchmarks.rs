//! 反馈纹理计算性能基准测试
//!
//! 测试 CPU 参考后端的单步更新、查找表生成和按查找表采样的性能

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use feedback_particles::gpgpu::{grid_seed, programs, ComputationRenderer, CpuBackend, UpdateUniforms};
use feedback_particles::render::bridge::{sample_positions, LookupTable};

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_step");

    for grid in [16u32, 50, 128].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(grid), grid, |b, &n| {
            let mut gpu = ComputationRenderer::new(CpuBackend::new(), n, n);
            let seed = gpu.create_texture(grid_seed(n));
            let pos = gpu
                .add_variable("texture_position", programs::wave("texture_position"), seed)
                .unwrap();
            gpu.init().unwrap();

            let mut time = 0.0f32;
            b.iter(|| {
                time += 0.016;
                gpu.compute(&UpdateUniforms::at(time)).unwrap();
                black_box(gpu.current_render_target(pos).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_lookup_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_table");

    for grid in [50u32, 256].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(grid), grid, |b, &n| {
            b.iter(|| black_box(LookupTable::new(n).instances()))
        });
    }

    group.finish();
}

fn bench_sample_positions(c: &mut Criterion) {
    let n = 50;
    let table = LookupTable::new(n);
    let state = feedback_particles::gpgpu::StateTexture::from_seed(n, n, grid_seed(n));

    c.bench_function("sample_positions_50", |b| {
        b.iter(|| black_box(sample_positions(&table, &state)))
    });
}

criterion_group!(
    benches,
    bench_cpu_step,
    bench_lookup_table,
    bench_sample_positions
);
criterion_main!(benches);
