use nix::libc;
use std::ffi::CString;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Failed to create semaphore: {0}")]
    CreateFailed(#[from] nix::errno::Errno),
    #[error("Invalid semaphore name")]
    InvalidName,
}

/// Named POSIX semaphore carrying ready-frame notifications.
///
/// The producer posts once per published slot; a consumer with no READY
/// slot parks in `timed_wait` so the OS can suspend the thread instead of
/// spinning. `signal_shutdown` posts once per slot to wake every waiter.
pub struct ReadySignal {
    sem: *mut libc::sem_t,
}

impl ReadySignal {
    /// Create the semaphore if it does not exist yet, with a zero count.
    pub fn ensure(name: &str) -> Result<Self, SignalError> {
        let c_name = CString::new(name).map_err(|_| SignalError::InvalidName)?;

        let sem = unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT, 0o644, 0) };

        if sem == libc::SEM_FAILED {
            return Err(SignalError::CreateFailed(nix::errno::Errno::last()));
        }

        Ok(Self { sem })
    }

    /// Open an existing semaphore. Fails if the producer has not created it.
    pub fn open(name: &str) -> Result<Self, SignalError> {
        let c_name = CString::new(name).map_err(|_| SignalError::InvalidName)?;

        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };

        if sem == libc::SEM_FAILED {
            return Err(SignalError::CreateFailed(nix::errno::Errno::last()));
        }

        Ok(Self { sem })
    }

    pub fn post(&self) -> Result<(), SignalError> {
        let ret = unsafe { libc::sem_post(self.sem) };
        if ret != 0 {
            return Err(SignalError::CreateFailed(nix::errno::Errno::last()));
        }
        Ok(())
    }

    pub fn try_wait(&self) -> Result<bool, SignalError> {
        let ret = unsafe { libc::sem_trywait(self.sem) };
        if ret == 0 {
            Ok(true)
        } else {
            let errno = nix::errno::Errno::last();
            if errno == nix::errno::Errno::EAGAIN {
                Ok(false)
            } else {
                Err(SignalError::CreateFailed(errno))
            }
        }
    }

    /// Wait until posted or until `timeout` elapses.
    ///
    /// Returns `true` when a post was consumed, `false` on timeout.
    /// Interrupted waits are retried against the original deadline.
    pub fn timed_wait(&self, timeout: Duration) -> Result<bool, SignalError> {
        let mut deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) };
        if ret != 0 {
            return Err(SignalError::CreateFailed(nix::errno::Errno::last()));
        }

        deadline.tv_sec += timeout.as_secs() as libc::time_t;
        deadline.tv_nsec += timeout.subsec_nanos() as libc::c_long;
        if deadline.tv_nsec >= 1_000_000_000 {
            deadline.tv_sec += 1;
            deadline.tv_nsec -= 1_000_000_000;
        }

        loop {
            let ret = unsafe { libc::sem_timedwait(self.sem, &deadline) };
            if ret == 0 {
                return Ok(true);
            }
            match nix::errno::Errno::last() {
                nix::errno::Errno::ETIMEDOUT => return Ok(false),
                nix::errno::Errno::EINTR => continue,
                errno => return Err(SignalError::CreateFailed(errno)),
            }
        }
    }

    /// Remove the name from the system. Open handles stay valid.
    pub fn unlink(name: &str) -> Result<(), SignalError> {
        let c_name = CString::new(name).map_err(|_| SignalError::InvalidName)?;
        let ret = unsafe { libc::sem_unlink(c_name.as_ptr()) };
        if ret != 0 {
            return Err(SignalError::CreateFailed(nix::errno::Errno::last()));
        }
        Ok(())
    }
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

unsafe impl Send for ReadySignal {}
unsafe impl Sync for ReadySignal {}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/transport_test_{}_{}", std::process::id(), tag)
    }

    #[test]
    fn timed_wait_consumes_post() {
        let name = unique_name("post");
        let _ = ReadySignal::unlink(&name);

        let signal = ReadySignal::ensure(&name).expect("Failed to create semaphore");
        signal.post().unwrap();

        assert!(signal.timed_wait(Duration::from_millis(100)).unwrap());

        let _ = ReadySignal::unlink(&name);
    }

    #[test]
    fn timed_wait_times_out_without_post() {
        let name = unique_name("timeout");
        let _ = ReadySignal::unlink(&name);

        let signal = ReadySignal::ensure(&name).expect("Failed to create semaphore");

        let start = std::time::Instant::now();
        assert!(!signal.timed_wait(Duration::from_millis(50)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(40));

        let _ = ReadySignal::unlink(&name);
    }

    #[test]
    fn post_wakes_waiter_on_other_thread() {
        let name = unique_name("cross_thread");
        let _ = ReadySignal::unlink(&name);

        let signal = ReadySignal::ensure(&name).expect("Failed to create semaphore");
        let name_clone = name.clone();

        let waiter = std::thread::spawn(move || {
            let signal = ReadySignal::open(&name_clone).expect("Failed to open semaphore");
            signal.timed_wait(Duration::from_secs(2)).unwrap()
        });

        std::thread::sleep(Duration::from_millis(20));
        signal.post().unwrap();

        assert!(waiter.join().unwrap(), "waiter should be woken by post");

        let _ = ReadySignal::unlink(&name);
    }
}
