//! Assembly throughput benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use csrasm::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Inputs {
    layout_rows: Vec<GlobalOrdinal>,
    cols: Vec<GlobalOrdinal>,
    values: Vec<f64>,
    num_rows: GlobalOrdinal,
}

/// Duplicate-heavy triples resembling a 3-D stencil fill: roughly 16 raw
/// contributions per matrix row.
fn random_inputs(n: usize, seed: u64) -> Inputs {
    let mut rng = StdRng::seed_from_u64(seed);
    let num_rows = (n / 16).max(1) as GlobalOrdinal;
    Inputs {
        layout_rows: (0..n).map(|_| rng.gen_range(0..num_rows)).collect(),
        cols: (0..n).map(|_| rng.gen_range(0..num_rows)).collect(),
        values: (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        num_rows,
    }
}

fn bench_matrix_assembly(c: &mut Criterion) {
    let device = CpuRuntime::default_device();
    let client = CpuRuntime::default_client(&device);

    let mut group = c.benchmark_group("matrix_assemble");
    for &n in &[10_000usize, 100_000, 1_000_000] {
        let inputs = random_inputs(n, 1);
        let row_start: Vec<GlobalOrdinal> = (0..=n as GlobalOrdinal).collect();
        let layout =
            RowLayout::<CpuRuntime>::from_host(&inputs.layout_rows, &row_start, &device).unwrap();
        let d_cols = DeviceBuffer::from_slice(&inputs.cols, &device);
        let d_vals = DeviceBuffer::from_slice(&inputs.values, &device);

        let mut asm = MatrixAssembler::new(
            "bench",
            true,
            RowRange::new(0, inputs.num_rows / 2).unwrap(),
            RowRange::new(0, inputs.num_rows - 1).unwrap(),
            inputs.num_rows,
            inputs.num_rows,
            n,
            0,
            layout,
            None,
            client.clone(),
        )
        .unwrap();
        let pool = WorkspacePool::<CpuRuntime>::new(
            "bench scratch",
            MatrixAssembler::<CpuRuntime>::required_workspace_len(n),
            0,
            &client,
        );
        asm.bind_workspace(pool.workspace());
        // size the persistent buffers outside the measured loop
        asm.assemble(&d_cols, &d_vals).unwrap();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| asm.assemble(&d_cols, &d_vals).unwrap());
        });
    }
    group.finish();
}

fn bench_rhs_assembly(c: &mut Criterion) {
    let device = CpuRuntime::default_device();
    let client = CpuRuntime::default_client(&device);

    let mut group = c.benchmark_group("rhs_assemble");
    for &n in &[10_000usize, 100_000, 1_000_000] {
        let inputs = random_inputs(n, 2);
        let row_start: Vec<GlobalOrdinal> = (0..=n as GlobalOrdinal).collect();
        let layout =
            RowLayout::<CpuRuntime>::from_host(&inputs.layout_rows, &row_start, &device).unwrap();
        let data = DeviceBuffer::from_slice(&inputs.values, &device);

        let mut asm = RhsAssembler::new(
            "bench",
            true,
            RowRange::new(0, inputs.num_rows / 2).unwrap(),
            inputs.num_rows,
            n,
            0,
            layout,
            None,
            client.clone(),
        )
        .unwrap();
        let pool = WorkspacePool::<CpuRuntime>::new(
            "bench scratch",
            RhsAssembler::<CpuRuntime>::required_workspace_len(n),
            0,
            &client,
        );
        asm.bind_workspace(pool.workspace());
        asm.assemble(&data, 0).unwrap();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| asm.assemble(&data, 0).unwrap());
        });
    }
    group.finish();
}

fn bench_host_staging(c: &mut Criterion) {
    let device = CpuRuntime::default_device();
    let client = CpuRuntime::default_client(&device);

    let n = 100_000;
    let inputs = random_inputs(n, 3);
    let row_start: Vec<GlobalOrdinal> = (0..=n as GlobalOrdinal).collect();
    let layout =
        RowLayout::<CpuRuntime>::from_host(&inputs.layout_rows, &row_start, &device).unwrap();
    let d_cols = DeviceBuffer::from_slice(&inputs.cols, &device);
    let d_vals = DeviceBuffer::from_slice(&inputs.values, &device);

    let mut asm = MatrixAssembler::new(
        "bench",
        true,
        RowRange::new(0, inputs.num_rows / 2).unwrap(),
        RowRange::new(0, inputs.num_rows - 1).unwrap(),
        inputs.num_rows,
        inputs.num_rows,
        n,
        0,
        layout,
        None,
        client.clone(),
    )
    .unwrap();
    let pool = WorkspacePool::<CpuRuntime>::new(
        "bench scratch",
        MatrixAssembler::<CpuRuntime>::required_workspace_len(n),
        0,
        &client,
    );
    asm.bind_workspace(pool.workspace());
    asm.assemble(&d_cols, &d_vals).unwrap();

    c.bench_function("copy_csr_matrix_to_host/100000", |b| {
        b.iter(|| asm.copy_csr_matrix_to_host().unwrap());
    });
}

criterion_group!(
    benches,
    bench_matrix_assembly,
    bench_rhs_assembly,
    bench_host_staging
);
criterion_main!(benches);
