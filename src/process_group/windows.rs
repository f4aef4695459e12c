// src/process_group/windows.rs

use std::io;
use std::mem;

use tokio::process::{Child, Command};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First, Thread32Next,
};
use windows_sys::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, TerminateJobObject,
};
use windows_sys::Win32::System::Threading::{
    CREATE_SUSPENDED, OpenThread, ResumeThread, THREAD_SUSPEND_RESUME,
};

use super::{ProcessGroupError, Signal};

/// Job object owning the root process and all of its descendants.
#[derive(Debug)]
pub(super) struct Group {
    job: HANDLE,
}

/// The root starts suspended so it cannot spawn anything before it has
/// been placed in the job.
pub(super) fn configure(root: &mut Command) {
    root.creation_flags(CREATE_SUSPENDED);
}

pub(super) fn attach(child: &Child) -> Result<Group, ProcessGroupError> {
    let process = child
        .raw_handle()
        .ok_or_else(|| os_error("root process handle unavailable"))? as HANDLE;
    let pid = child
        .id()
        .ok_or_else(|| os_error("root process exited before it could be grouped"))?;

    // SAFETY: null attributes and name request an anonymous job.
    let job = unsafe { CreateJobObjectW(std::ptr::null(), std::ptr::null()) };
    if job == 0 {
        return Err(ProcessGroupError::Os(io::Error::last_os_error()));
    }
    let group = Group { job };

    // SAFETY: both handles are valid for the duration of the call.
    if unsafe { AssignProcessToJobObject(group.job, process) } == 0 {
        return Err(ProcessGroupError::Os(io::Error::last_os_error()));
    }

    resume_threads(pid)?;
    Ok(group)
}

/// Resume every thread owned by `pid` (a freshly created process has only
/// its primary thread).
fn resume_threads(pid: u32) -> Result<(), ProcessGroupError> {
    // SAFETY: snapshot of all threads in the system; closed below.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) };
    if snapshot == INVALID_HANDLE_VALUE {
        return Err(ProcessGroupError::Os(io::Error::last_os_error()));
    }

    let mut resumed = 0usize;
    let mut result = Ok(());

    // SAFETY: THREADENTRY32 is plain data; dwSize is set before use.
    let mut entry: THREADENTRY32 = unsafe { mem::zeroed() };
    entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;

    let mut more = unsafe { Thread32First(snapshot, &mut entry) } != 0;
    while more {
        if entry.th32OwnerProcessID == pid {
            let thread = unsafe { OpenThread(THREAD_SUSPEND_RESUME, 0, entry.th32ThreadID) };
            if thread == 0 {
                result = Err(ProcessGroupError::Os(io::Error::last_os_error()));
                break;
            }
            let rc = unsafe { ResumeThread(thread) };
            unsafe { CloseHandle(thread) };
            if rc == u32::MAX {
                result = Err(ProcessGroupError::Os(io::Error::last_os_error()));
                break;
            }
            resumed += 1;
        }
        more = unsafe { Thread32Next(snapshot, &mut entry) } != 0;
    }

    unsafe { CloseHandle(snapshot) };

    if result.is_ok() && resumed == 0 {
        return Err(os_error("no threads found to resume"));
    }
    result
}

fn os_error(msg: &str) -> ProcessGroupError {
    ProcessGroupError::Os(io::Error::other(msg.to_string()))
}

impl Group {
    /// Windows has no graceful group signal; every request terminates the
    /// job. Callers wanting a graceful stop must close stdin or use the
    /// notify protocol first.
    pub(super) fn signal(&self, _sig: Signal) -> Result<(), ProcessGroupError> {
        // SAFETY: job is a live handle owned by self.
        if unsafe { TerminateJobObject(self.job, 1) } == 0 {
            return Err(ProcessGroupError::Os(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        // SAFETY: job was created by CreateJobObjectW and is closed once.
        unsafe { CloseHandle(self.job) };
    }
}
