// src/engine/signals.rs

//! Termination-signal escalation.
//!
//! With no running subprocess any signal exits right away. Otherwise:
//!
//! - SIGINT #1: graceful terminate in the background
//! - SIGINT #2: kill
//! - SIGINT #3: exit
//! - SIGTERM / SIGHUP: terminate, then exit
//!
//! "Exit" means sending [`EXIT_CODE`] on the exit channel; the owner of the
//! receiving end tears the program down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::command::CommandSlot;
use crate::errors::Result;

/// Status the process exits with after a signal.
pub const EXIT_CODE: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl TermSignal {
    fn exit_message(self) -> &'static str {
        match self {
            TermSignal::Interrupt => {
                "Subprocess killed from getting SIGINT (trigger SIGINT again to stop ibazel)"
            }
            TermSignal::Terminate => "Subprocess killed from getting SIGTERM",
            TermSignal::Hangup => "Subprocess killed from getting SIGHUP",
        }
    }
}

#[derive(Clone)]
pub struct SignalHandler {
    slot: CommandSlot,
    interrupts: Arc<AtomicU32>,
    exit_tx: UnboundedSender<i32>,
}

impl SignalHandler {
    pub fn new(slot: CommandSlot, interrupts: Arc<AtomicU32>, exit_tx: UnboundedSender<i32>) -> Self {
        Self {
            slot,
            interrupts,
            exit_tx,
        }
    }

    /// React to one signal. Must be called inside a Tokio runtime.
    pub fn handle(&self, sig: TermSignal) {
        let command = match self.slot.get() {
            Some(command) if command.is_subprocess_running() => command,
            _ => {
                debug!(?sig, "no subprocess running; exiting");
                self.exit();
                return;
            }
        };

        match sig {
            TermSignal::Interrupt => {
                let count = self.interrupts.fetch_add(1, Ordering::SeqCst) + 1;
                if count > 2 {
                    error!("Exiting from getting SIGINT 3 times");
                    self.exit();
                } else if count > 1 {
                    command.kill();
                } else {
                    tokio::spawn(async move {
                        command.terminate().await;
                        info!("{}", sig.exit_message());
                    });
                }
            }
            TermSignal::Terminate | TermSignal::Hangup => {
                let exit_tx = self.exit_tx.clone();
                tokio::spawn(async move {
                    command.terminate().await;
                    info!("{}", sig.exit_message());
                    let _ = exit_tx.send(EXIT_CODE);
                });
            }
        }
    }

    fn exit(&self) {
        if self.exit_tx.send(EXIT_CODE).is_err() {
            warn!("exit channel closed");
        }
    }

    /// Handle signals from `signals` until the stream ends.
    pub async fn run(self, mut signals: UnboundedReceiver<TermSignal>) {
        while let Some(sig) = signals.recv().await {
            self.handle(sig);
        }
    }
}

/// Subscribe to the OS termination signals.
#[cfg(unix)]
pub fn listen() -> Result<UnboundedReceiver<TermSignal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let (tx, rx) = mpsc::unbounded_channel();
    for (kind, sig) in [
        (SignalKind::interrupt(), TermSignal::Interrupt),
        (SignalKind::terminate(), TermSignal::Terminate),
        (SignalKind::hangup(), TermSignal::Hangup),
    ] {
        let mut stream = signal(kind)?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(sig).is_err() {
                    break;
                }
            }
        });
    }
    Ok(rx)
}

/// Subscribe to the console control events that stand in for signals.
#[cfg(windows)]
pub fn listen() -> Result<UnboundedReceiver<TermSignal>> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close};

    let (tx, rx) = mpsc::unbounded_channel();

    let mut interrupt = ctrl_c()?;
    let tx_int = tx.clone();
    tokio::spawn(async move {
        while interrupt.recv().await.is_some() {
            if tx_int.send(TermSignal::Interrupt).is_err() {
                break;
            }
        }
    });

    let mut brk = ctrl_break()?;
    let tx_brk = tx.clone();
    tokio::spawn(async move {
        while brk.recv().await.is_some() {
            if tx_brk.send(TermSignal::Terminate).is_err() {
                break;
            }
        }
    });

    let mut close = ctrl_close()?;
    tokio::spawn(async move {
        while close.recv().await.is_some() {
            if tx.send(TermSignal::Hangup).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
