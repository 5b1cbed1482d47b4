//! Append-only search statistics file.
//!
//! One free-text line per completed search. The file is never read back.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;

#[derive(Debug, Clone)]
pub struct DiagnosticsLog {
    path: PathBuf,
}

impl DiagnosticsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, nodes: u64, moves: u64, elapsed: Duration) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_line(nodes, moves, elapsed))
    }
}

fn format_line(nodes: u64, moves: u64, elapsed: Duration) -> String {
    format!(
        "{} nodes: {}, moves: {}, sec: {:.6}",
        Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        nodes,
        moves,
        elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_accumulate_in_order() {
        let path = std::env::temp_dir().join(format!(
            "plum_gpu_diagnostics_{}_{}.log",
            std::process::id(),
            line!()
        ));
        let _ = std::fs::remove_file(&path);
        let log = DiagnosticsLog::new(&path);

        log.append(1000, 20, Duration::from_millis(250)).expect("first append");
        log.append(42, 7, Duration::from_secs(2)).expect("second append");

        let contents = std::fs::read_to_string(&path).expect("log should be readable");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("nodes: 1000, moves: 20, sec: 0.250000"));
        assert!(lines[1].ends_with("nodes: 42, moves: 7, sec: 2.000000"));

        let _ = std::fs::remove_file(&path);
    }
}
