//! Device-resident buffer lifecycle.
//!
//! A session is opened lazily on the first `initialize` and owns every
//! buffer the kernel binds. It is valid as a whole or absent: a failure while
//! opening tears down whatever had been created. Static tables go up once per
//! session, the board on every `initialize`, parameters once per dispatch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::compute::device::*;
use crate::compute::kernel_abi::*;
use crate::errors::EngineError;
use crate::game_state::chess_types::Board;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_memory_mb: u32,
    pub max_cores: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 64,
            max_cores: 1,
        }
    }
}

/// Upload and allocation counters over the manager's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub sessions_opened: u64,
    pub table_uploads: u64,
    pub board_uploads: u64,
    pub param_uploads: u64,
    pub scratch_allocations: u64,
    pub launches: u64,
}

#[derive(Debug, Clone, Copy)]
struct SessionBuffers {
    tables: BufferHandle,
    layout: BufferHandle,
    board: BufferHandle,
    params: BufferHandle,
    scratch: BufferHandle,
    best_move: BufferHandle,
    node_count: BufferHandle,
    move_count: BufferHandle,
}

impl SessionBuffers {
    fn bindings(&self) -> [Binding; 8] {
        [
            (BindingSlot::Tables, self.tables),
            (BindingSlot::TableLayout, self.layout),
            (BindingSlot::Board, self.board),
            (BindingSlot::Params, self.params),
            (BindingSlot::Scratch, self.scratch),
            (BindingSlot::BestMove, self.best_move),
            (BindingSlot::NodeCount, self.node_count),
            (BindingSlot::MoveCount, self.move_count),
        ]
        .map(|(slot, buffer)| Binding { slot, buffer })
    }
}

struct DeviceSession {
    device: Box<dyn ComputeDevice>,
    buffers: SessionBuffers,
    scratch_mb: u32,
}

pub struct ComputeBuffers {
    provider: Arc<dyn DeviceProvider>,
    session: Option<DeviceSession>,
    stats: UploadStats,
}

/// Scratch size for a memory budget, clamped to the device limit.
pub fn scratch_bytes(max_memory_mb: u32, device_max: u64) -> u64 {
    (u64::from(max_memory_mb.max(1)) * MIB).min(device_max) & !7
}

impl ComputeBuffers {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            provider,
            session: None,
            stats: UploadStats::default(),
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Open the session if needed, resize scratch on a memory change, then
    /// upload `board`.
    pub fn initialize(&mut self, board: &Board, limits: ResourceLimits) -> Result<(), EngineError> {
        if self.session.is_none() {
            let session = self.open_session(limits)?;
            self.session = Some(session);
        }

        let needs_scratch = self
            .session
            .as_ref()
            .is_some_and(|session| session.scratch_mb != limits.max_memory_mb);
        if needs_scratch {
            if let Err(err) = self.reallocate_scratch(limits.max_memory_mb) {
                self.release();
                return Err(EngineError::DeviceInitFailure(err.to_string()));
            }
        }

        let snapshot = board_snapshot(board);
        let session = self.session_mut()?;
        session
            .device
            .write(session.buffers.board, bytemuck::cast_slice(&snapshot))
            .map_err(|err| EngineError::DispatchFailure(format!("board upload: {err}")))?;
        self.stats.board_uploads += 1;
        Ok(())
    }

    /// Write the parameters and zero the result slots.
    pub fn upload_params(&mut self, params: &SearchParams) -> Result<(), EngineError> {
        let session = self.session_mut()?;
        let buffers = session.buffers;
        let device = &mut session.device;

        let upload = |device: &mut Box<dyn ComputeDevice>| -> DeviceResult<()> {
            device.write(buffers.params, bytemuck::bytes_of(params))?;
            device.write(buffers.best_move, &[0u8; RESULT_MOVE_BYTES])?;
            device.write(buffers.node_count, &[0u8; RESULT_COUNTER_BYTES])?;
            device.write(buffers.move_count, &[0u8; RESULT_COUNTER_BYTES])
        };
        upload(device).map_err(|err| EngineError::DispatchFailure(format!("parameter upload: {err}")))?;
        self.stats.param_uploads += 1;
        Ok(())
    }

    /// Run the kernel and block until it finishes.
    pub fn launch(&mut self, lanes: u32) -> Result<(), EngineError> {
        let session = self.session_mut()?;
        let bindings = session.buffers.bindings();
        session
            .device
            .launch(&bindings, lanes.max(1))
            .map_err(|err| EngineError::DispatchFailure(format!("launch: {err}")))?;
        self.stats.launches += 1;
        Ok(())
    }

    pub fn read_results(&mut self) -> Result<KernelResults, EngineError> {
        let session = self.session_mut()?;
        let buffers = session.buffers;
        let device = &mut session.device;
        let read = |device: &mut Box<dyn ComputeDevice>, buffer, len| {
            device
                .read(buffer, len)
                .map_err(|err| EngineError::DispatchFailure(format!("readback: {err}")))
        };

        let best_move = read(device, buffers.best_move, RESULT_MOVE_BYTES)?;
        let nodes = read(device, buffers.node_count, RESULT_COUNTER_BYTES)?;
        let moves = read(device, buffers.move_count, RESULT_COUNTER_BYTES)?;
        KernelResults::decode(&best_move, &nodes, &moves)
    }

    /// Free every buffer, then shut the device down. Safe to call repeatedly.
    pub fn release(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let bindings = session.buffers.bindings();
        for binding in bindings {
            if let Err(err) = session.device.free(binding.buffer) {
                warn!(buffer = binding.slot.label(), %err, "buffer free failed");
            }
        }
        if let Err(err) = session.device.shutdown() {
            warn!(%err, "device shutdown failed");
        }
        info!(device = self.provider.name(), "device session released");
    }

    fn session_mut(&mut self) -> Result<&mut DeviceSession, EngineError> {
        self.session
            .as_mut()
            .ok_or_else(|| EngineError::DispatchFailure("no device session".to_owned()))
    }

    fn open_session(&mut self, limits: ResourceLimits) -> Result<DeviceSession, EngineError> {
        let mut device = self.provider.open().map_err(|err| {
            EngineError::DeviceInitFailure(format!("{}: {err}", self.provider.name()))
        })?;

        let mut allocated = Vec::new();
        match allocate_session(device.as_mut(), limits, &mut allocated) {
            Ok(buffers) => {
                self.stats.sessions_opened += 1;
                self.stats.table_uploads += 1;
                self.stats.scratch_allocations += 1;
                info!(device = %device.describe(), "device session opened");
                Ok(DeviceSession {
                    device,
                    buffers,
                    scratch_mb: limits.max_memory_mb,
                })
            }
            Err(err) => {
                for handle in allocated {
                    let _ = device.free(handle);
                }
                let _ = device.shutdown();
                warn!(%err, "device session setup failed");
                Err(EngineError::DeviceInitFailure(err.to_string()))
            }
        }
    }

    fn reallocate_scratch(&mut self, max_memory_mb: u32) -> DeviceResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.device.free(session.buffers.scratch)?;
        let size = scratch_bytes(max_memory_mb, session.device.max_buffer_size());
        session.buffers.scratch = session.device.allocate(&BufferSpec::new(
            BindingSlot::Scratch,
            size,
            BufferAccess::ReadWrite,
        ))?;
        session.scratch_mb = max_memory_mb;
        self.stats.scratch_allocations += 1;
        debug!(max_memory_mb, size, "scratch reallocated");
        Ok(())
    }
}

impl Drop for ComputeBuffers {
    fn drop(&mut self) {
        self.release();
    }
}

/// Allocate every buffer and upload the tables. Handles are pushed to
/// `allocated` as they are created so a failure can free them.
fn allocate_session(
    device: &mut dyn ComputeDevice,
    limits: ResourceLimits,
    allocated: &mut Vec<BufferHandle>,
) -> DeviceResult<SessionBuffers> {
    let packed = packed_tables();
    let scratch_size = scratch_bytes(limits.max_memory_mb, device.max_buffer_size());
    let mut alloc = |slot: BindingSlot, size: u64, access: BufferAccess| -> DeviceResult<BufferHandle> {
        let handle = device.allocate(&BufferSpec::new(slot, size, access))?;
        allocated.push(handle);
        Ok(handle)
    };

    let buffers = SessionBuffers {
        tables: alloc(BindingSlot::Tables, packed.size_bytes(), BufferAccess::ReadOnly)?,
        layout: alloc(
            BindingSlot::TableLayout,
            std::mem::size_of::<TableLayout>() as u64,
            BufferAccess::ReadOnly,
        )?,
        board: alloc(BindingSlot::Board, BOARD_SNAPSHOT_BYTES as u64, BufferAccess::ReadOnly)?,
        params: alloc(
            BindingSlot::Params,
            std::mem::size_of::<SearchParams>() as u64,
            BufferAccess::ReadOnly,
        )?,
        scratch: alloc(BindingSlot::Scratch, scratch_size, BufferAccess::ReadWrite)?,
        best_move: alloc(BindingSlot::BestMove, RESULT_MOVE_BYTES as u64, BufferAccess::ReadWrite)?,
        node_count: alloc(BindingSlot::NodeCount, RESULT_COUNTER_BYTES as u64, BufferAccess::ReadWrite)?,
        move_count: alloc(BindingSlot::MoveCount, RESULT_COUNTER_BYTES as u64, BufferAccess::ReadWrite)?,
    };

    device.write(buffers.tables, bytemuck::cast_slice(&packed.words))?;
    device.write(buffers.layout, bytemuck::bytes_of(&packed.layout))?;
    debug!(words = packed.words.len(), "static tables uploaded");
    Ok(buffers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::mock_device::{DeviceEvent, Script, ScriptedProvider};
    use crate::game_state::chess_types::GameState;
    use crate::moves::move_codec::Move;

    fn manager(script: Script) -> (ComputeBuffers, ScriptedProvider) {
        let provider = ScriptedProvider::new(script);
        (ComputeBuffers::new(Arc::new(provider.clone())), provider)
    }

    fn table_writes(provider: &ScriptedProvider) -> usize {
        provider.count(|event| matches!(event, DeviceEvent::Write(BindingSlot::Tables, _)))
    }

    #[test]
    fn tables_go_up_once_and_board_every_time() {
        let (mut buffers, provider) = manager(Script::default());
        let board = GameState::new_game().board;

        for _ in 0..3 {
            buffers
                .initialize(&board, ResourceLimits::default())
                .expect("initialize should succeed");
        }

        assert_eq!(provider.count(|event| *event == DeviceEvent::Open), 1);
        assert_eq!(table_writes(&provider), 1);
        assert_eq!(
            provider.count(|event| matches!(event, DeviceEvent::Write(BindingSlot::Board, BOARD_SNAPSHOT_BYTES))),
            3
        );
        let stats = buffers.stats();
        assert_eq!(stats.table_uploads, 1);
        assert_eq!(stats.board_uploads, 3);
        assert_eq!(stats.scratch_allocations, 1);
    }

    #[test]
    fn scratch_is_reallocated_only_when_memory_changes() {
        let (mut buffers, provider) = manager(Script::default());
        let board = Board::empty();
        let small = ResourceLimits {
            max_memory_mb: 1,
            max_cores: 1,
        };
        let larger = ResourceLimits {
            max_memory_mb: 2,
            max_cores: 1,
        };

        buffers.initialize(&board, small).expect("first initialize");
        buffers.initialize(&board, small).expect("same limits");
        buffers.initialize(&board, larger).expect("memory change");

        let scratch_allocs = provider.count(|event| matches!(event, DeviceEvent::Allocate(BindingSlot::Scratch, _)));
        assert_eq!(scratch_allocs, 2);
        assert_eq!(provider.count(|event| *event == DeviceEvent::Free(BindingSlot::Scratch)), 1);
        assert_eq!(table_writes(&provider), 1);
        // The scripted device caps buffers at 1 MiB.
        assert!(provider
            .events()
            .contains(&DeviceEvent::Allocate(BindingSlot::Scratch, 1 << 20)));
    }

    #[test]
    fn failed_allocation_leaves_no_session() {
        let (mut buffers, provider) = manager(Script {
            fail_allocate: Some(BindingSlot::Scratch),
            ..Script::default()
        });

        let err = buffers
            .initialize(&Board::empty(), ResourceLimits::default())
            .expect_err("allocation failure should surface");
        assert!(matches!(err, EngineError::DeviceInitFailure(_)));
        assert!(!buffers.has_session());

        // Tables, layout, board and params were allocated before the failure.
        assert_eq!(provider.count(|event| matches!(event, DeviceEvent::Free(_))), 4);
        assert_eq!(provider.count(|event| *event == DeviceEvent::Shutdown), 1);
        assert_eq!(table_writes(&provider), 0);
    }

    #[test]
    fn failed_open_is_an_init_failure() {
        let (mut buffers, _provider) = manager(Script {
            fail_open: true,
            ..Script::default()
        });
        let err = buffers
            .initialize(&Board::empty(), ResourceLimits::default())
            .expect_err("open failure should surface");
        assert!(matches!(err, EngineError::DeviceInitFailure(_)));
        assert!(!buffers.has_session());
    }

    #[test]
    fn params_clear_result_slots_and_results_read_back() {
        let mv = Move::encode(0x14, 0x34, 0, 0);
        let (mut buffers, provider) = manager(Script {
            best_move: mv,
            nodes: 1000,
            moves: 20,
            ..Script::default()
        });

        buffers
            .initialize(&GameState::new_game().board, ResourceLimits::default())
            .expect("initialize");
        buffers.upload_params(&SearchParams::default()).expect("params");
        assert_eq!(
            provider.count(|event| matches!(event, DeviceEvent::Write(BindingSlot::NodeCount, 8))),
            1
        );
        assert_eq!(buffers.read_results().expect("cleared results").nodes, 0);

        buffers.launch(4).expect("launch");
        let results = buffers.read_results().expect("results");
        assert_eq!(results.best_move, mv);
        assert_eq!(results.nodes, 1000);
        assert_eq!(results.moves, 20);
        assert!(provider.events().contains(&DeviceEvent::Launch(4)));
    }

    #[test]
    fn release_is_idempotent_and_runs_on_drop() {
        let (mut buffers, provider) = manager(Script::default());
        buffers.release();
        assert!(provider.events().is_empty());

        buffers
            .initialize(&Board::empty(), ResourceLimits::default())
            .expect("initialize");
        buffers.release();
        buffers.release();
        assert_eq!(provider.count(|event| matches!(event, DeviceEvent::Free(_))), 8);
        assert_eq!(provider.count(|event| *event == DeviceEvent::Shutdown), 1);

        buffers
            .initialize(&Board::empty(), ResourceLimits::default())
            .expect("initialize again");
        assert_eq!(table_writes(&provider), 2);
        drop(buffers);
        assert_eq!(provider.count(|event| *event == DeviceEvent::Shutdown), 2);
    }

    #[test]
    fn dispatch_calls_need_a_session() {
        let (mut buffers, _provider) = manager(Script::default());
        assert!(matches!(
            buffers.launch(1),
            Err(EngineError::DispatchFailure(_))
        ));
        assert!(buffers.upload_params(&SearchParams::default()).is_err());
    }
}
