//! Shared helpers for assembly integration tests
#![allow(dead_code)]

use csrasm::prelude::*;

pub fn client() -> CpuClient {
    let device = CpuRuntime::default_device();
    CpuRuntime::default_client(&device)
}

/// Layout with one segment per raw contribution
pub fn scalar_layout(rows: &[GlobalOrdinal], device: &CpuDevice) -> RowLayout<CpuRuntime> {
    let row_start: Vec<GlobalOrdinal> = (0..=rows.len() as GlobalOrdinal).collect();
    RowLayout::from_host(rows, &row_start, device).unwrap()
}

/// Pool sized for `n` raw contributions
pub fn pool_for(n: usize, client: &CpuClient) -> WorkspacePool<CpuRuntime> {
    WorkspacePool::new(
        "test scratch",
        MatrixAssembler::<CpuRuntime>::required_workspace_len(n),
        0,
        client,
    )
}

/// Matrix assembler over a one-contribution-per-segment layout
#[allow(clippy::too_many_arguments)]
pub fn matrix_assembler(
    sort: bool,
    row_range: RowRange,
    global_rows: GlobalOrdinal,
    global_cols: GlobalOrdinal,
    rows: &[GlobalOrdinal],
    bogus_col: Option<GlobalOrdinal>,
    client: &CpuClient,
) -> MatrixAssembler<CpuRuntime> {
    let layout = scalar_layout(rows, client.device());
    MatrixAssembler::new(
        "test matrix",
        sort,
        row_range,
        RowRange::new(0, global_cols - 1).unwrap(),
        global_rows,
        global_cols,
        rows.len(),
        0,
        layout,
        bogus_col,
        client.clone(),
    )
    .unwrap()
}

/// Rhs assembler over a one-contribution-per-segment layout
pub fn rhs_assembler(
    sort: bool,
    row_range: RowRange,
    global_rows: GlobalOrdinal,
    rows: &[GlobalOrdinal],
    bogus_row: Option<GlobalOrdinal>,
    client: &CpuClient,
) -> RhsAssembler<CpuRuntime> {
    let layout = scalar_layout(rows, client.device());
    RhsAssembler::new(
        "test rhs",
        sort,
        row_range,
        global_rows,
        rows.len(),
        0,
        layout,
        bogus_row,
        client.clone(),
    )
    .unwrap()
}

/// Upload matrix input arrays
pub fn upload(
    cols: &[GlobalOrdinal],
    values: &[f64],
    device: &CpuDevice,
) -> (
    DeviceBuffer<GlobalOrdinal, CpuRuntime>,
    DeviceBuffer<f64, CpuRuntime>,
) {
    (
        DeviceBuffer::from_slice(cols, device),
        DeviceBuffer::from_slice(values, device),
    )
}
