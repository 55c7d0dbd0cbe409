//! External control surface.
//!
//! Interactive commands never run engine code inside a signal handler:
//! the handler writes one byte into a self-pipe and a dedicated listener
//! thread turns bytes into engine calls, so dump work runs on an ordinary
//! thread under the usual lock. Fatal signals are the exception: the
//! process is about to die, so the handler dumps in place, restores the
//! default disposition, and re-raises.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Once;
use std::thread;

use crate::error::{Error, Result};
use crate::tracker::{self, Tracker};

/// Discrete commands deliverable over the control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    DumpLive,
    DumpCheckpoint,
}

impl Command {
    /// Wire encoding on the self-pipe. One byte per command keeps the
    /// handler's write a single atomic syscall.
    pub fn to_byte(self) -> u8 {
        match self {
            Command::DumpLive => b'l',
            Command::DumpCheckpoint => b'c',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            b'l' => Some(Command::DumpLive),
            b'c' => Some(Command::DumpCheckpoint),
            _ => None,
        }
    }
}

/// Runs `command` against the engine, rendering into `w`.
pub fn dispatch<W: io::Write>(tracker: &Tracker, command: Command, w: &mut W) -> io::Result<()> {
    match command {
        Command::DumpLive => tracker.dump_live(w),
        Command::DumpCheckpoint => tracker.dump_checkpoint(w),
    }
}

// Write end of the self-pipe, shared with the signal handlers.
static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

static INSTALL: Once = Once::new();

/// Installs the control surface once per process: the self-pipe listener,
/// the user-signal and fatal-signal bindings, and the exit hook. Later
/// calls are no-ops. Install failure is logged and tracking continues
/// without a control surface.
pub fn ensure_installed() {
    INSTALL.call_once(|| {
        if let Err(err) = install() {
            log::error!("{err}");
        }
    });
}

const FATAL_SIGNALS: [libc::c_int; 4] = [
    libc::SIGINT,
    libc::SIGTERM,
    libc::SIGABRT,
    libc::SIGSEGV,
];

fn install() -> Result<()> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(Error::ControlInstall(
            io::Error::last_os_error().to_string(),
        ));
    }
    let [read_fd, write_fd] = fds;
    PIPE_WRITE_FD.store(write_fd, Ordering::SeqCst);

    thread::Builder::new()
        .name("gobject-tracker-ctl".into())
        .spawn(move || listen(read_fd))
        .map_err(|err| Error::ControlInstall(err.to_string()))?;

    unsafe {
        install_handler(libc::SIGUSR1, user_signal_handler as libc::sighandler_t)?;
        install_handler(libc::SIGUSR2, user_signal_handler as libc::sighandler_t)?;
        for signal in FATAL_SIGNALS {
            install_handler(signal, fatal_signal_handler as libc::sighandler_t)?;
        }
        if libc::atexit(exit_hook) != 0 {
            return Err(Error::ControlInstall("atexit registration failed".into()));
        }
    }
    Ok(())
}

unsafe fn install_handler(signal: libc::c_int, handler: libc::sighandler_t) -> Result<()> {
    let mut action: libc::sigaction = mem::zeroed();
    action.sa_sigaction = handler;
    libc::sigemptyset(&mut action.sa_mask);
    action.sa_flags = libc::SA_RESTART;
    if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
        return Err(Error::ControlInstall(
            io::Error::last_os_error().to_string(),
        ));
    }
    Ok(())
}

fn listen(read_fd: libc::c_int) {
    loop {
        let mut byte = 0u8;
        let n = unsafe { libc::read(read_fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        if n < 0 {
            if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        let Some(command) = Command::from_byte(byte) else {
            continue;
        };
        let mut err = io::stderr().lock();
        let _ = dispatch(tracker::global(), command, &mut err);
    }
}

// Async-signal-safe: one write(2) on the self-pipe, nothing else.
extern "C" fn user_signal_handler(signal: libc::c_int) {
    let command = if signal == libc::SIGUSR2 {
        Command::DumpCheckpoint
    } else {
        Command::DumpLive
    };
    let fd = PIPE_WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = command.to_byte();
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

// Runs in the dying process. Dumping here takes the engine lock from a
// signal handler, the documented accepted risk of this tool.
extern "C" fn fatal_signal_handler(signal: libc::c_int) {
    {
        let mut err = io::stderr().lock();
        tracker::global().dump_on_fatal(&mut err);
    }
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(signal, &action, ptr::null_mut());
        libc::raise(signal);
    }
}

extern "C" fn exit_hook() {
    let mut err = io::stderr().lock();
    tracker::global().dump_on_exit(&mut err);
}
