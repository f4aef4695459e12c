// src/process_group/unix.rs

use std::io;

use tokio::process::{Child, Command};

use super::{ProcessGroupError, Signal};

/// POSIX process group whose id equals the root pid.
#[derive(Debug)]
pub(super) struct Group {
    pgid: libc::pid_t,
}

/// Ask for a fresh process group (`setpgid(0, 0)`) before exec.
pub(super) fn configure(root: &mut Command) {
    root.process_group(0);
}

pub(super) fn attach(child: &Child) -> Result<Group, ProcessGroupError> {
    let pid = child.id().ok_or_else(|| {
        ProcessGroupError::Os(io::Error::other("root process exited before it could be grouped"))
    })?;
    Ok(Group {
        pgid: pid as libc::pid_t,
    })
}

impl Group {
    pub(super) fn signal(&self, sig: Signal) -> Result<(), ProcessGroupError> {
        let signum = match sig {
            Signal::Interrupt => libc::SIGINT,
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };

        // SAFETY: killpg has no memory-safety preconditions.
        let rc = unsafe { libc::killpg(self.pgid, signum) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Whole group already gone.
            return Ok(());
        }
        Err(ProcessGroupError::Os(err))
    }
}
