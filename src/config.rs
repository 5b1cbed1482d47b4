//! Start-up configuration.
//!
//! Every option can also come from a `PLUM_GPU_*` environment variable so a
//! chess GUI can launch the bare binary. Protocol commands (`sd`, `memory`,
//! `cores`) override the initial limits at run time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::compute::buffers::ResourceLimits;
use crate::compute::device::DeviceProvider;
use crate::compute::host_device::HostDeviceProvider;
use crate::utils::diagnostics::DiagnosticsLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Reference kernel on the CPU.
    Host,
    /// WGSL kernel through wgpu (needs the `gpu` feature).
    Gpu,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "plum_gpu", version, about = "xboard chess engine with a compute-device search kernel")]
pub struct EngineConfig {
    #[arg(long, value_enum, env = "PLUM_GPU_BACKEND", default_value = "host")]
    pub backend: Backend,

    /// WGSL source of the search kernel, read once at start-up.
    #[arg(long, env = "PLUM_GPU_KERNEL", default_value = "kernels/search.wgsl")]
    pub kernel: PathBuf,

    #[arg(long, env = "PLUM_GPU_ENTRY_POINT", default_value = "search")]
    pub entry_point: String,

    /// Append one statistics line per search to this file.
    #[arg(long, env = "PLUM_GPU_DIAGNOSTICS", default_value = "plum_gpu.debug")]
    pub diagnostics: PathBuf,

    #[arg(long, env = "PLUM_GPU_NO_DIAGNOSTICS")]
    pub no_diagnostics: bool,

    /// Upper bound on one kernel invocation; 0 waits forever.
    #[arg(long, env = "PLUM_GPU_SEARCH_TIMEOUT_MS", default_value_t = 120_000)]
    pub search_timeout_ms: u64,

    #[arg(long, env = "PLUM_GPU_DEPTH", default_value_t = 4)]
    pub depth: u32,

    #[arg(long, env = "PLUM_GPU_MEMORY_MB", default_value_t = 64)]
    pub memory_mb: u32,

    #[arg(long, env = "PLUM_GPU_CORES", default_value_t = 1)]
    pub cores: u32,

    /// Seed for the host kernel's tie-breaking.
    #[arg(long, env = "PLUM_GPU_SEED")]
    pub seed: Option<u64>,

    /// Filter directives; falls back to `RUST_LOG`, then `warn`.
    #[arg(long, env = "PLUM_GPU_LOG")]
    pub log_filter: Option<String>,
}

impl EngineConfig {
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_memory_mb: self.memory_mb,
            max_cores: self.cores,
        }
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        (self.search_timeout_ms > 0).then(|| Duration::from_millis(self.search_timeout_ms))
    }

    pub fn diagnostics_log(&self) -> Option<DiagnosticsLog> {
        (!self.no_diagnostics).then(|| DiagnosticsLog::new(self.diagnostics.clone()))
    }

    pub fn build_provider(&self) -> Result<Arc<dyn DeviceProvider>> {
        match self.backend {
            Backend::Host => Ok(Arc::new(HostDeviceProvider::new(self.seed))),
            Backend::Gpu => self.gpu_provider(),
        }
    }

    #[cfg(feature = "gpu")]
    fn gpu_provider(&self) -> Result<Arc<dyn DeviceProvider>> {
        use anyhow::Context;

        use crate::compute::wgpu_device::WgpuProvider;

        let source = std::fs::read_to_string(&self.kernel)
            .with_context(|| format!("reading kernel source {}", self.kernel.display()))?;
        Ok(Arc::new(WgpuProvider::new(source, self.entry_point.clone())))
    }

    #[cfg(not(feature = "gpu"))]
    fn gpu_provider(&self) -> Result<Arc<dyn DeviceProvider>> {
        anyhow::bail!("the gpu backend needs a build with `--features gpu`")
    }
}
