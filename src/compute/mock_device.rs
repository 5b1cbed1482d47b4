//! Scripted device for tests.
//!
//! Records every call in a shared log, fails on request and writes a fixed
//! result into the result slots on launch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::compute::device::*;
use crate::moves::move_codec::Move;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Open,
    Allocate(BindingSlot, u64),
    Write(BindingSlot, usize),
    Read(BindingSlot),
    Launch(u32),
    Free(BindingSlot),
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_open: bool,
    pub fail_allocate: Option<BindingSlot>,
    pub fail_launch: bool,
    pub launch_delay: Option<Duration>,
    pub best_move: Move,
    pub nodes: u64,
    pub moves: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    pub script: Arc<Mutex<Script>>,
    pub log: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            log: Arc::default(),
        }
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.log.lock().expect("log lock").clone()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().expect("script lock"));
    }
}

impl DeviceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self) -> DeviceResult<Box<dyn ComputeDevice>> {
        self.log.lock().expect("log lock").push(DeviceEvent::Open);
        if self.script.lock().expect("script lock").fail_open {
            return Err(DeviceError::new("scripted open failure"));
        }
        Ok(Box::new(ScriptedDevice {
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
            buffers: HashMap::new(),
            next_handle: 1,
        }))
    }
}

pub struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<Vec<DeviceEvent>>>,
    buffers: HashMap<u32, (BindingSlot, Vec<u8>)>,
    next_handle: u32,
}

impl ScriptedDevice {
    fn record(&self, event: DeviceEvent) {
        self.log.lock().expect("log lock").push(event);
    }

    fn slot_of(&self, handle: BufferHandle) -> DeviceResult<BindingSlot> {
        self.buffers
            .get(&handle.0)
            .map(|(slot, _)| *slot)
            .ok_or_else(|| DeviceError::new(format!("unknown buffer {}", handle.0)))
    }
}

impl ComputeDevice for ScriptedDevice {
    fn describe(&self) -> String {
        "scripted device".to_owned()
    }

    fn max_buffer_size(&self) -> u64 {
        1 << 20
    }

    fn allocate(&mut self, spec: &BufferSpec) -> DeviceResult<BufferHandle> {
        self.record(DeviceEvent::Allocate(spec.slot, spec.size_bytes));
        if self.script.lock().expect("script lock").fail_allocate == Some(spec.slot) {
            return Err(DeviceError::new(format!("scripted {} allocation failure", spec.slot.label())));
        }
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        // Contents are only kept for the small result slots.
        let len = (spec.size_bytes as usize).min(64);
        self.buffers.insert(handle.0, (spec.slot, vec![0; len]));
        Ok(handle)
    }

    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> DeviceResult<()> {
        let slot = self.slot_of(buffer)?;
        self.record(DeviceEvent::Write(slot, bytes.len()));
        if let Some((_, contents)) = self.buffers.get_mut(&buffer.0) {
            let len = bytes.len().min(contents.len());
            contents[..len].copy_from_slice(&bytes[..len]);
        }
        Ok(())
    }

    fn read(&mut self, buffer: BufferHandle, len: usize) -> DeviceResult<Vec<u8>> {
        let slot = self.slot_of(buffer)?;
        self.record(DeviceEvent::Read(slot));
        let contents = &self.buffers[&buffer.0].1;
        Ok(contents[..len.min(contents.len())].to_vec())
    }

    fn launch(&mut self, bindings: &[Binding], lanes: u32) -> DeviceResult<()> {
        self.record(DeviceEvent::Launch(lanes));
        let script = self.script.lock().expect("script lock").clone();
        if let Some(delay) = script.launch_delay {
            thread::sleep(delay);
        }
        if script.fail_launch {
            return Err(DeviceError::new("scripted launch failure"));
        }
        for binding in bindings {
            let bytes = match binding.slot {
                BindingSlot::BestMove => script.best_move.bits().to_le_bytes().to_vec(),
                BindingSlot::NodeCount => script.nodes.to_le_bytes().to_vec(),
                BindingSlot::MoveCount => script.moves.to_le_bytes().to_vec(),
                _ => continue,
            };
            if let Some((_, contents)) = self.buffers.get_mut(&binding.buffer.0) {
                contents[..bytes.len()].copy_from_slice(&bytes);
            }
        }
        Ok(())
    }

    fn free(&mut self, buffer: BufferHandle) -> DeviceResult<()> {
        let slot = self.slot_of(buffer)?;
        self.record(DeviceEvent::Free(slot));
        self.buffers.remove(&buffer.0);
        Ok(())
    }

    fn shutdown(&mut self) -> DeviceResult<()> {
        self.record(DeviceEvent::Shutdown);
        Ok(())
    }
}
