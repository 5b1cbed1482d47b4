//! GPU device backed by `wgpu`.
//!
//! The kernel is a WGSL compute shader read at start-up. The pipeline uses
//! the shader's own binding declarations (`@group(0) @binding(0..8)`) so the
//! host never restates the layout. Every submission blocks on
//! `Maintain::Wait`; validation errors are collected with error scopes.

use std::collections::HashMap;
use std::sync::mpsc;

use tracing::{debug, info};
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, Buffer, BufferDescriptor, BufferUsages,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    ShaderModuleDescriptor,
};

use crate::compute::device::*;

#[derive(Debug, Clone)]
pub struct WgpuProvider {
    kernel_source: String,
    entry_point: String,
}

impl WgpuProvider {
    pub fn new(kernel_source: String, entry_point: String) -> Self {
        Self {
            kernel_source,
            entry_point,
        }
    }
}

impl DeviceProvider for WgpuProvider {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn open(&self) -> DeviceResult<Box<dyn ComputeDevice>> {
        let device = futures_lite::future::block_on(WgpuDevice::open(&self.kernel_source, &self.entry_point))?;
        Ok(Box::new(device))
    }
}

pub struct WgpuDevice {
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: ComputePipeline,
    max_buffer_size: u64,
    buffers: HashMap<u32, Buffer>,
    next_handle: u32,
}

impl WgpuDevice {
    async fn open(kernel_source: &str, entry_point: &str) -> DeviceResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| DeviceError::new("no compatible GPU adapter"))?;

        let adapter_name = adapter.get_info().name;
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("plum_gpu device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|err| DeviceError::new(format!("request_device: {err}")))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("search kernel"),
            source: wgpu::ShaderSource::Wgsl(kernel_source.into()),
        });
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("search pipeline"),
            layout: None,
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = device.pop_error_scope().await {
            return Err(DeviceError::new(format!("kernel build failed: {err}")));
        }

        let max_buffer_size = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        info!(adapter = %adapter_name, max_buffer_size, "wgpu device opened");

        Ok(Self {
            adapter_name,
            device,
            queue,
            pipeline,
            max_buffer_size,
            buffers: HashMap::new(),
            next_handle: 1,
        })
    }

    fn buffer(&self, handle: BufferHandle) -> DeviceResult<&Buffer> {
        self.buffers
            .get(&handle.0)
            .ok_or_else(|| DeviceError::new(format!("unknown buffer {}", handle.0)))
    }

    fn check_errors(&self, stage: &str) -> DeviceResult<()> {
        match futures_lite::future::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(DeviceError::new(format!("{stage}: {err}"))),
            None => Ok(()),
        }
    }
}

/// Copies must be multiples of four bytes.
fn align4(len: u64) -> u64 {
    len.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

impl ComputeDevice for WgpuDevice {
    fn describe(&self) -> String {
        format!("wgpu adapter {}", self.adapter_name)
    }

    fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }

    fn allocate(&mut self, spec: &BufferSpec) -> DeviceResult<BufferHandle> {
        if spec.size_bytes > self.max_buffer_size {
            return Err(DeviceError::new(format!(
                "{} buffer of {} bytes exceeds the adapter limit",
                spec.slot.label(),
                spec.size_bytes
            )));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some(spec.slot.label()),
            size: align4(spec.size_bytes.max(4)),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        self.check_errors("allocate")?;

        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(handle.0, buffer);
        Ok(handle)
    }

    fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> DeviceResult<()> {
        let target = self.buffer(buffer)?;
        if bytes.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0 {
            self.queue.write_buffer(target, 0, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(align4(bytes.len() as u64) as usize, 0);
            self.queue.write_buffer(target, 0, &padded);
        }
        Ok(())
    }

    fn read(&mut self, buffer: BufferHandle, len: usize) -> DeviceResult<Vec<u8>> {
        let source = self.buffer(buffer)?;
        let copy_len = align4(len as u64);
        let staging = self.device.create_buffer(&BufferDescriptor {
            label: Some("readback staging"),
            size: copy_len,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, copy_len);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..copy_len);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| DeviceError::new("readback callback dropped"))?
            .map_err(|err| DeviceError::new(format!("readback map: {err}")))?;

        let bytes = {
            let mapped = slice.get_mapped_range();
            mapped[..len].to_vec()
        };
        staging.unmap();
        Ok(bytes)
    }

    /// Dispatches one workgroup per lane.
    fn launch(&mut self, bindings: &[Binding], lanes: u32) -> DeviceResult<()> {
        let mut entries = Vec::with_capacity(bindings.len());
        for binding in bindings {
            entries.push(BindGroupEntry {
                binding: binding.slot.index(),
                resource: self.buffer(binding.buffer)?.as_entire_binding(),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("search bindings"),
            layout: &layout,
            entries: &entries,
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("search encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("search pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(lanes, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::Wait);
        debug!(lanes, "kernel dispatch complete");
        self.check_errors("launch")
    }

    fn free(&mut self, buffer: BufferHandle) -> DeviceResult<()> {
        let removed = self
            .buffers
            .remove(&buffer.0)
            .ok_or_else(|| DeviceError::new(format!("double free of buffer {}", buffer.0)))?;
        removed.destroy();
        Ok(())
    }

    fn shutdown(&mut self) -> DeviceResult<()> {
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.device.destroy();
        info!(adapter = %self.adapter_name, "wgpu device shut down");
        Ok(())
    }
}
