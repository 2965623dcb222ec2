//! Looking up the companion process and waiting for it to exit

use std::ffi::OsStr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait ProcessProbe: Send + Sync + 'static {
    /// Pid of a running process called `name`, if any
    fn find_running(&self, name: &str) -> Option<u32>;

    /// Resolves once process `pid` is gone
    async fn wait_for_exit(&self, pid: u32);
}

/// Process table of the local machine
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }

    fn is_running(&self, pid: Pid) -> bool {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessProbe for SysinfoProbe {
    fn find_running(&self, name: &str) -> Option<u32> {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
            .processes()
            .iter()
            .filter(|(_, process)| name_matches(process.name(), name))
            .map(|(pid, _)| pid.as_u32())
            .min()
    }

    async fn wait_for_exit(&self, pid: u32) {
        let pid = Pid::from_u32(pid);
        while self.is_running(pid) {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

/// Compare process names without the Windows `.exe` suffix
fn name_matches(process: &OsStr, wanted: &str) -> bool {
    strip_exe(&process.to_string_lossy()).eq_ignore_ascii_case(strip_exe(wanted))
}

fn strip_exe(name: &str) -> &str {
    let split = name.len().checked_sub(4).and_then(|at| Some((at, name.get(at..)?)));
    match split {
        Some((at, ext)) if at > 0 && ext.eq_ignore_ascii_case(".exe") => &name[..at],
        _ => name,
    }
}
