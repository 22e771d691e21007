use std::io;
#[cfg(target_family = "unix")]
use std::path::Path;

#[cfg(target_family = "unix")]
use nix::errno::Errno;
#[cfg(target_family = "unix")]
use nix::sys::signal::{kill, Signal};
#[cfg(target_family = "unix")]
use nix::unistd::Pid;
#[cfg(windows)]
use windows_sys::Win32::Foundation::CloseHandle;
#[cfg(windows)]
use windows_sys::Win32::System::Threading::{
    OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
};

/// Read the scheduler state letter from /proc/[pid]/stat (field 3).
#[cfg(target_family = "unix")]
pub fn read_proc_state(pid: u32) -> io::Result<char> {
    let path = format!("/proc/{}/stat", pid);
    let content = std::fs::read_to_string(&path)?;

    // comm is wrapped in parentheses and may itself contain spaces or ')'.
    let after_comm = content.rfind(')').map(|idx| &content[idx + 1..]);
    after_comm
        .and_then(|rest| rest.trim_start().chars().next())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Missing state field in {}", path),
            )
        })
}

/// Check whether a live (non-zombie) process owns `pid`.
#[cfg(target_family = "unix")]
pub fn process_exists(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    if Path::new("/proc/self").exists() {
        return match read_proc_state(pid) {
            Ok(state) => state != 'Z' && state != 'X',
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(_) => signal_probe(pid),
        };
    }

    signal_probe(pid)
}

#[cfg(target_family = "unix")]
fn signal_probe(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send SIGKILL to `pid`. A process that is already gone is not an error.
#[cfg(target_family = "unix")]
pub fn kill_process(pid: u32) -> io::Result<()> {
    let raw = i32::try_from(pid).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid))
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from_raw_os_error(errno as i32)),
    }
}

/// Check if a process exists on Windows via OpenProcess.
#[cfg(windows)]
pub fn process_exists(pid: u32) -> bool {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

/// Terminate a process on Windows. A process that is already gone is not an error.
#[cfg(windows)]
pub fn kill_process(pid: u32) -> io::Result<()> {
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle.is_null() {
            return Ok(());
        }
        let result = TerminateProcess(handle, 1);
        let err = if result == 0 {
            Some(io::Error::last_os_error())
        } else {
            None
        };
        CloseHandle(handle);
        match err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
