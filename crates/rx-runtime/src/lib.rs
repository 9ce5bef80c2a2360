//! The async event loop: multiplexes per-device reads, hotplug discovery,
//! and duration-timer wakeups onto the single task that owns the
//! [`rx_context::Context`], then hands rising-edge commands to a detached
//! shell spawn.
//!
//! The core (`rx-context`) forbids re-entrant or concurrent calls into its
//! entry points; everything here exists to guarantee that invariant holds
//! even though the process fans many event sources (one read loop per open
//! device, a hotplug watcher, a periodic tick) into it. Every device reader
//! is a cheap forwarding task; the one task running [`EventLoop::run`] is
//! the sole caller of `Context::input_event` / `Context::timeout`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rx_context::Context;
use rx_devices::{DevicePattern, HotplugWatcher};
use tokio::sync::mpsc;

/// A decoded device reading, stripped of everything the core doesn't need:
/// just the typecode and value. `now` is stamped by the central dispatch
/// task at receipt time, not by the reader, since the core only cares that
/// timestamps are monotonic-nondecreasing as *it* observes them.
#[derive(Debug, Clone, Copy)]
struct RawEvent {
    typecode: u32,
    value: i32,
}

/// Spawns `/bin/sh -c <command>` for every rising edge and reaps it on a
/// detached task rather than blocking the dispatch loop on it. The
/// reference daemon relies on a `SIGCHLD` handler calling `wait(NULL)`;
/// here the async runtime's process handle does the equivalent reaping as
/// part of awaiting the child on its own task, so no signal handler is
/// needed (see the redesign note in `SPEC_FULL.md` §9/REDESIGN FLAGS).
pub fn spawn_command(command: &str) {
    let command = command.to_string();
    tokio::spawn(async move {
        match tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(&command)
            .spawn()
        {
            Ok(mut child) => match child.wait().await {
                Ok(status) => {
                    tracing::debug!(command = %command, %status, "command exited");
                }
                Err(error) => {
                    tracing::warn!(command = %command, %error, "failed to wait on spawned command");
                }
            },
            Err(error) => {
                tracing::warn!(command = %command, %error, "failed to spawn command");
            }
        }
    });
}

/// Reads raw input events off one open device and forwards decoded
/// `(typecode, value)` pairs to the central dispatch loop. Key autorepeat
/// (`EV_KEY` value `2`) is dropped here, before it ever reaches the core,
/// matching the reference daemon.
fn spawn_device_reader(
    path: PathBuf,
    device: evdev::Device,
    tx: mpsc::UnboundedSender<RawEvent>,
    log_events: bool,
) {
    tokio::spawn(async move {
        let mut stream = match device.into_event_stream() {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to open device event stream");
                return;
            }
        };

        loop {
            match stream.next_event().await {
                Ok(ev) => {
                    if rx_devices::is_key_repeat(&ev) {
                        continue;
                    }
                    let typecode = rx_codes::typecode(ev.event_type().0, ev.code());
                    if log_events {
                        tracing::info!(
                            path = %path.display(),
                            event_type = rx_codes::type_name(ev.event_type().0),
                            code = ev.code(),
                            value = ev.value(),
                            "input event"
                        );
                    }
                    if tx.send(RawEvent { typecode, value: ev.value() }).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "device read failed, closing");
                    break;
                }
            }
        }
    });
}

/// Owns the reactor core and drives it from a single task for the lifetime
/// of the process. Construct with [`EventLoop::new`], seed it with
/// already-open devices via [`EventLoop::spawn_readers`], then hand it to
/// [`EventLoop::run`].
pub struct EventLoop {
    ctx: Context,
    started: Instant,
    patterns: Vec<DevicePattern>,
    log_events: bool,
    tx: mpsc::UnboundedSender<RawEvent>,
    rx: mpsc::UnboundedReceiver<RawEvent>,
}

impl EventLoop {
    pub fn new(ctx: Context, patterns: Vec<DevicePattern>, log_events: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx,
            started: Instant::now(),
            patterns,
            log_events,
            tx,
            rx,
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Spawn a reader task for each already-open device, forwarding into
    /// this loop's shared channel.
    pub fn spawn_readers(&self, opened: Vec<(PathBuf, evdev::Device)>) {
        for (path, device) in opened {
            spawn_device_reader(path, device, self.tx.clone(), self.log_events);
        }
    }

    /// Open and seed one newly hotplugged device, then spawn its reader,
    /// provided it matches this loop's device patterns and carries at
    /// least one typecode a binding references.
    fn adopt_hotplugged(&mut self, path: PathBuf) {
        let Ok(device) = evdev::Device::open(&path) else {
            return;
        };
        if !rx_devices::device_matches(&self.patterns, &path, &device) {
            return;
        }
        if !rx_devices::seed_initial_state(&device, &mut self.ctx) {
            tracing::debug!(
                path = %path.display(),
                "hotplugged device matched patterns but carries no referenced capability, skipping"
            );
            return;
        }
        tracing::info!(path = %path.display(), name = device.name().unwrap_or("?"), "hotplugged device opened");
        spawn_device_reader(path, device, self.tx.clone(), self.log_events);
    }

    /// Drive the reactor until the process is killed. Multiplexes three
    /// sources onto the one task permitted to touch `Context`:
    /// decoded device readings, newly discovered devices from `hotplug`,
    /// and a timer that fires `Context::timeout` at the deadline the core
    /// last asked for (or never, when nothing is armed).
    pub async fn run(mut self, mut hotplug: Option<HotplugWatcher>) {
        let mut next_wait: Option<u64> = None;

        loop {
            let sleep = async {
                match next_wait {
                    Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                maybe_path = recv_hotplug(&mut hotplug) => {
                    let Some(path) = maybe_path else {
                        hotplug = None;
                        continue;
                    };
                    self.adopt_hotplugged(path);
                }

                maybe_raw = self.rx.recv() => {
                    let Some(raw) = maybe_raw else {
                        tracing::warn!("all device readers exited; event loop idling on timers only");
                        continue;
                    };
                    let now = self.now_ms();
                    next_wait = self.ctx.input_event(raw.typecode, raw.value, now, |cmd| spawn_command(cmd));
                }

                _ = sleep => {
                    let now = self.now_ms();
                    next_wait = self.ctx.timeout(now, |cmd| spawn_command(cmd));
                }
            }
        }
    }
}

/// Awaits the hotplug watcher's next path, or never resolves if there is
/// none — lets `run`'s `select!` treat "no hotplug watcher configured" and
/// "hotplug watcher still running" uniformly.
async fn recv_hotplug(hotplug: &mut Option<HotplugWatcher>) -> Option<PathBuf> {
    match hotplug {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rx_parser::parse;

    #[test]
    fn now_ms_is_nondecreasing_and_starts_near_zero() {
        let ctx = Context::init(parse("<test>", "KEY_A <= echo a\n").unwrap());
        let loop_ = EventLoop::new(ctx, Vec::new(), false);
        let first = loop_.now_ms();
        let second = loop_.now_ms();
        assert!(second >= first);
        assert!(first < 1000, "should be close to construction time");
    }
}
