//! Host-memory implementation of the compute device.
//!
//! Buffers are word-aligned heap allocations and `launch` runs the reference
//! kernel in `host_kernel` on the calling thread.

use std::collections::HashMap;

use bytemuck::Zeroable;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::compute::device::*;
use crate::compute::host_kernel::run_search;
use crate::compute::kernel_abi::{SearchParams, TableLayout, TableView, BOARD_SNAPSHOT_BYTES};

/// Largest buffer the host device hands out.
pub const HOST_MAX_BUFFER_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone)]
pub struct HostDeviceProvider {
    seed: Option<u64>,
}

impl HostDeviceProvider {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl DeviceProvider for HostDeviceProvider {
    fn name(&self) -> &str {
        "host"
    }

    fn open(&self) -> DeviceResult<Box<dyn ComputeDevice>> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Box::new(HostDevice::new(rng)))
    }
}

struct HostBuffer {
    words: Vec<u64>,
    size_bytes: usize,
}

impl HostBuffer {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.size_bytes]
    }
}

pub struct HostDevice {
    buffers: HashMap<u32, HostBuffer>,
    next_handle: u32,
    rng: StdRng,
    launches: u64,
}

impl HostDevice {
    pub fn new(rng: StdRng) -> Self {
        Self {
            buffers: HashMap::new(),
            next_handle: 1,
            rng,
            launches: 0,
        }
    }

    fn buffer(&self, handle: BufferHandle) -> DeviceResult<&HostBuffer> {
        self.buffers
            .get(&handle.0)
            .ok_or_else(|| DeviceError::new(format!("unknown buffer {}", handle.0)))
    }

    fn bound(&self, bindings: &[Binding], slot: BindingSlot) -> DeviceResult<&HostBuffer> {
        let binding = bindings
            .iter()
            .find(|binding| binding.slot == slot)
            .ok_or_else(|| DeviceError::new(format!("binding {} missing", slot.label())))?;
        self.buffer(binding.buffer)
    }

    fn write_slot(&mut self, bindings: &[Binding], slot: BindingSlot, bytes: &[u8]) -> DeviceResult<()> {
        let handle = bindings
            .iter()
            .find(|binding| binding.slot == slot)
            .map(|binding| binding.buffer)
            .ok_or_else(|| DeviceError::new(format!("binding {} missing", slot.label())))?;
        self.write(handle, bytes)
    }
}

impl ComputeDevice for HostDevice {
    fn describe(&self) -> String {
        "host reference device".to_owned()
    }

    fn max_buffer_size(&self) -> u64 {
        HOST_MAX_BUFFER_BYTES
    }

    fn allocate(&mut self, spec: &BufferSpec) -> DeviceResult<BufferHandle> {
        if spec.size_bytes > HOST_MAX_BUFFER_BYTES {
            return Err(DeviceError::new(format!(
                "{} buffer of {} bytes exceeds the device limit",
                spec.slot.label(),
                spec.size_bytes
            )));
        }
        let size_bytes = spec.size_bytes as usize;
        let words = vec![0u64; size_bytes.div_ceil(8)];
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(handle.0, HostBuffer { words, size_bytes });
        Ok(handle)
    }

    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> DeviceResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| DeviceError::new(format!("unknown buffer {}", buffer.0)))?;
        if bytes.len() > target.size_bytes {
            return Err(DeviceError::new(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                target.size_bytes
            )));
        }
        bytemuck::cast_slice_mut::<u64, u8>(&mut target.words)[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, buffer: BufferHandle, len: usize) -> DeviceResult<Vec<u8>> {
        let source = self.buffer(buffer)?;
        if len > source.size_bytes {
            return Err(DeviceError::new(format!(
                "read of {len} bytes from a {} byte buffer",
                source.size_bytes
            )));
        }
        Ok(source.bytes()[..len].to_vec())
    }

    fn launch(&mut self, bindings: &[Binding], lanes: u32) -> DeviceResult<()> {
        let output = {
            let layout_bytes = self.bound(bindings, BindingSlot::TableLayout)?.bytes();
            let layout: TableLayout = bytemuck::try_pod_read_unaligned(
                layout_bytes
                    .get(..std::mem::size_of::<TableLayout>())
                    .ok_or_else(|| DeviceError::new("table layout buffer too small"))?,
            )
            .map_err(|err| DeviceError::new(format!("table layout: {err}")))?;

            let tables = &self.bound(bindings, BindingSlot::Tables)?.words;
            let view = TableView::new(tables, &layout);
            view.validate().map_err(DeviceError::new)?;

            let board_buffer = self.bound(bindings, BindingSlot::Board)?;
            if board_buffer.size_bytes < BOARD_SNAPSHOT_BYTES {
                return Err(DeviceError::new("board buffer too small"));
            }
            let board = bytemuck::cast_slice::<u64, u32>(&board_buffer.words);

            let params_bytes = self.bound(bindings, BindingSlot::Params)?.bytes();
            let mut params = SearchParams::zeroed();
            bytemuck::bytes_of_mut(&mut params).copy_from_slice(
                params_bytes
                    .get(..std::mem::size_of::<SearchParams>())
                    .ok_or_else(|| DeviceError::new("params buffer too small"))?,
            );
            self.bound(bindings, BindingSlot::Scratch)?;

            debug!(lanes, depth = params.max_depth, "host kernel launch");
            let mut rng = self.rng.clone();
            let output = run_search(view, board, &params, &mut rng);
            self.rng = rng;
            output
        };

        self.write_slot(bindings, BindingSlot::BestMove, &output.best_move.bits().to_le_bytes())?;
        self.write_slot(bindings, BindingSlot::NodeCount, &output.nodes.to_le_bytes())?;
        self.write_slot(bindings, BindingSlot::MoveCount, &output.moves.to_le_bytes())?;
        self.launches += 1;
        Ok(())
    }

    fn free(&mut self, buffer: BufferHandle) -> DeviceResult<()> {
        self.buffers
            .remove(&buffer.0)
            .map(|_| ())
            .ok_or_else(|| DeviceError::new(format!("double free of buffer {}", buffer.0)))
    }

    fn shutdown(&mut self) -> DeviceResult<()> {
        debug!(launches = self.launches, leaked = self.buffers.len(), "host device shutdown");
        self.buffers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_bytes() {
        let mut device = HostDevice::new(StdRng::seed_from_u64(0));
        let handle = device
            .allocate(&BufferSpec::new(BindingSlot::Board, 12, BufferAccess::ReadOnly))
            .expect("allocation should succeed");
        device.write(handle, &[1, 2, 3, 4, 5]).expect("write should fit");
        assert_eq!(device.read(handle, 6).expect("read"), vec![1, 2, 3, 4, 5, 0]);
        assert!(device.read(handle, 13).is_err());
        assert!(device.write(handle, &[0; 13]).is_err());
    }

    #[test]
    fn free_rejects_unknown_handles() {
        let mut device = HostDevice::new(StdRng::seed_from_u64(0));
        let handle = device
            .allocate(&BufferSpec::new(BindingSlot::Scratch, 64, BufferAccess::ReadWrite))
            .expect("allocation should succeed");
        device.free(handle).expect("first free");
        assert!(device.free(handle).is_err());
    }

    #[test]
    fn oversized_allocation_fails() {
        let mut device = HostDevice::new(StdRng::seed_from_u64(0));
        let spec = BufferSpec::new(BindingSlot::Scratch, HOST_MAX_BUFFER_BYTES + 1, BufferAccess::ReadWrite);
        assert!(device.allocate(&spec).is_err());
    }

    #[test]
    fn launch_without_bindings_fails() {
        let mut device = HostDevice::new(StdRng::seed_from_u64(0));
        let err = device.launch(&[], 1).expect_err("launch needs bindings");
        assert!(err.to_string().contains("table_layout"));
    }
}
