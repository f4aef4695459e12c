// src/ulimit.rs

//! Open-file limit. A per-path watcher holds one descriptor per watched
//! directory, which runs past the usual soft limit of 256/1024 quickly.

/// Raise the soft `RLIMIT_NOFILE` to the hard limit.
#[cfg(unix)]
pub fn raise_fd_limit() -> std::io::Result<()> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let target = limit.rlim_max;
    // macOS rejects RLIM_INFINITY for NOFILE; OPEN_MAX is the real ceiling.
    #[cfg(target_os = "macos")]
    let target = target.min(10240);

    if limit.rlim_cur >= target {
        return Ok(());
    }
    limit.rlim_cur = target;
    // SAFETY: `limit` is a valid rlimit.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn raise_fd_limit() -> std::io::Result<()> {
    Ok(())
}
