//! Compute device seam.
//!
//! A device owns opaque buffers addressed by handle and runs the search
//! kernel over an ordered list of buffer bindings. Every call returns a
//! `Result`; the buffer manager maps failures onto engine errors.

use std::fmt;

/// Storage binding slots in the order the kernel declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BindingSlot {
    Tables = 0,
    TableLayout = 1,
    Board = 2,
    Params = 3,
    Scratch = 4,
    BestMove = 5,
    NodeCount = 6,
    MoveCount = 7,
}

impl BindingSlot {
    pub const ALL: [BindingSlot; 8] = [
        BindingSlot::Tables,
        BindingSlot::TableLayout,
        BindingSlot::Board,
        BindingSlot::Params,
        BindingSlot::Scratch,
        BindingSlot::BestMove,
        BindingSlot::NodeCount,
        BindingSlot::MoveCount,
    ];

    #[inline]
    pub const fn index(self) -> u32 {
        self as u32
    }

    pub const fn label(self) -> &'static str {
        match self {
            BindingSlot::Tables => "tables",
            BindingSlot::TableLayout => "table_layout",
            BindingSlot::Board => "board",
            BindingSlot::Params => "params",
            BindingSlot::Scratch => "scratch",
            BindingSlot::BestMove => "best_move",
            BindingSlot::NodeCount => "node_count",
            BindingSlot::MoveCount => "move_count",
        }
    }
}

/// Kernel access to a buffer. Results are the only buffers the kernel writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSpec {
    pub slot: BindingSlot,
    pub size_bytes: u64,
    pub access: BufferAccess,
}

impl BufferSpec {
    pub fn new(slot: BindingSlot, size_bytes: u64, access: BufferAccess) -> Self {
        Self {
            slot,
            size_bytes,
            access,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// One entry of the launch binding list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub slot: BindingSlot,
    pub buffer: BufferHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError(pub String);

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DeviceError {}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// An open device session: context, queue and a built kernel program.
pub trait ComputeDevice: Send {
    fn describe(&self) -> String;

    /// Largest single buffer the device accepts.
    fn max_buffer_size(&self) -> u64;

    fn allocate(&mut self, spec: &BufferSpec) -> DeviceResult<BufferHandle>;

    /// Write `bytes` at offset 0; `bytes.len()` must fit the buffer.
    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> DeviceResult<()>;

    /// Read the first `len` bytes back to the host, blocking until available.
    fn read(&mut self, buffer: BufferHandle, len: usize) -> DeviceResult<Vec<u8>>;

    /// Run the kernel over `lanes` work items and block until it completes.
    fn launch(&mut self, bindings: &[Binding], lanes: u32) -> DeviceResult<()>;

    fn free(&mut self, buffer: BufferHandle) -> DeviceResult<()>;

    /// Tear down queue, program and context. Buffers are freed first.
    fn shutdown(&mut self) -> DeviceResult<()>;
}

/// Opens device sessions. Opening includes building the kernel program.
pub trait DeviceProvider: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self) -> DeviceResult<Box<dyn ComputeDevice>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_slots_follow_kernel_order() {
        for (expected, slot) in BindingSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), expected as u32);
        }
        assert_eq!(BindingSlot::MoveCount.label(), "move_count");
    }
}
