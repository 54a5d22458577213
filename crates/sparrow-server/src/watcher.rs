use std::collections::HashSet;
use std::os::fd::AsRawFd;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use sparrow_poller::{Poller, Ready};
use sparrow_protocol::ProtocolRegistry;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::signal::SelfPipe;
use crate::worker::run_worker;

/// Forks `config.worker_num` workers and supervises them from a watcher
/// event loop. The watcher owns no listening socket — only a signal
/// self-pipe and the set of live worker pids.
///
/// # Safety
/// Calls `fork(2)` via `nix::unistd::fork`. Must be called before any
/// other threads are spawned in this process: forking a multi-threaded
/// process only carries the calling thread into the child, which would
/// leave the child's runtime (mutexes other threads may hold, `tracing`'s
/// own background state) in an inconsistent state.
pub fn run(config: ServerConfig, registry: ProtocolRegistry) -> Result<(), ServerError> {
    let registry = Arc::new(registry);
    let mut live_pids: HashSet<Pid> = HashSet::new();

    for worker_index in 0..config.worker_num {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        // SAFETY: called before any worker threads exist; see doc comment.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => {
                live_pids.insert(child);
                info!(worker_index, pid = child.as_raw(), "spawned worker");
            }
            ForkResult::Child => {
                let exit_code = match run_worker(config, registry) {
                    Ok(()) => 0,
                    Err(e) => {
                        error!(error = %e, "worker exited with error");
                        1
                    }
                };
                std::process::exit(exit_code);
            }
        }
    }

    run_watcher_loop(live_pids)
}

fn run_watcher_loop(mut live_pids: HashSet<Pid>) -> Result<(), ServerError> {
    let mut poller = Poller::new(16)?;
    let mut signal_pipe = SelfPipe::new(&[Signal::SIGCHLD, Signal::SIGTERM, Signal::SIGINT])?;
    let sig_fd = signal_pipe.receiver.as_raw_fd();
    poller.add_fd(sig_fd, &mut signal_pipe.receiver, Ready::READ)?;

    let mut shutting_down = false;
    loop {
        poller.run_once()?;
        signal_pipe.drain();

        reap_dead_children(&mut live_pids);

        if live_pids.is_empty() {
            info!("all workers exited, watcher stopping");
            break;
        }

        let terminal = signal_pipe.take_fired(Signal::SIGTERM) || signal_pipe.take_fired(Signal::SIGINT);
        if !shutting_down && terminal {
            shutting_down = true;
            info!("watcher forwarding shutdown to workers");
            for pid in &live_pids {
                if let Err(e) = kill(*pid, Signal::SIGTERM) {
                    warn!(pid = pid.as_raw(), error = %e, "failed to signal worker");
                }
            }
        }
    }
    Ok(())
}

fn reap_dead_children(live_pids: &mut HashSet<Pid>) {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                info!(pid = pid.as_raw(), code, "worker exited");
                live_pids.remove(&pid);
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                warn!(pid = pid.as_raw(), signal = ?sig, "worker killed by signal");
                live_pids.remove(&pid);
            }
            Ok(WaitStatus::StillAlive) | Err(nix::Error::ECHILD) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                break;
            }
        }
    }
}
