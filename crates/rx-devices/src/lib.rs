//! Device backend: evdev enumeration, pattern matching, initial-state
//! seeding, and hotplug watching over `/dev/input`.
//!
//! This crate owns every place the reactor touches real device nodes. The
//! matching and seeding logic mirrors the reference daemon's `open_evdev`
//! (pattern filters, then an initial capability-bitmap scan to seed each
//! referenced typecode's starting value so a binding that's already true
//! when the daemon starts — a key held down, a switch already on — doesn't
//! have to wait for an edge that already happened). Hotplug watching
//! replaces its `inotify`-on-`/dev/input` loop with the `notify` crate.

use std::path::{Path, PathBuf};

use evdev::{Device, EventType};
use rx_context::Context;

pub const DEV_INPUT: &str = "/dev/input";

/// One of the four forms the reference daemon accepted on its command line:
/// `name=<glob>`, `phys=<glob>`, `dev=<glob>`, or a bare device-path glob.
#[derive(Debug, Clone)]
pub enum DevicePattern {
    Name(String),
    Phys(String),
    Dev(String),
    Path(String),
}

impl DevicePattern {
    pub fn parse(raw: &str) -> DevicePattern {
        if let Some(rest) = raw.strip_prefix("name=") {
            DevicePattern::Name(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix("phys=") {
            DevicePattern::Phys(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix("dev=") {
            DevicePattern::Dev(rest.to_string())
        } else {
            DevicePattern::Path(raw.to_string())
        }
    }

    fn glob_match(pattern: &str, text: &str) -> bool {
        globset::Glob::new(pattern)
            .map(|g| g.compile_matcher().is_match(text))
            .unwrap_or(false)
    }

    fn matches(&self, path: &Path, phys: Option<&str>, name: Option<&str>) -> bool {
        match self {
            DevicePattern::Name(pat) => name.is_some_and(|n| Self::glob_match(pat, n)),
            DevicePattern::Phys(pat) => phys.is_some_and(|p| Self::glob_match(pat, p)),
            DevicePattern::Dev(pat) | DevicePattern::Path(pat) => {
                Self::glob_match(pat, &path.to_string_lossy())
            }
        }
    }
}

/// True iff `device` at `path` should be opened, given the patterns passed
/// on the command line. An empty pattern list matches everything — the
/// reactor falls back to "every input evdev" just like the reference
/// daemon, with a warning the caller is expected to log.
pub fn device_matches(patterns: &[DevicePattern], path: &Path, device: &Device) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let phys = device.physical_path();
    let name = device.name();
    patterns.iter().any(|p| p.matches(path, phys, name))
}

/// Seed every typecode the context's bindings reference from `device`'s
/// current hardware state, so a binding that's already satisfied at daemon
/// startup (a key already held, a switch already on) is reflected
/// immediately rather than waiting for a future edge.
///
/// Only `EV_KEY`, `EV_SW`, `EV_LED`, and `EV_ABS` carry a meaningful
/// "current value" the kernel will report back via ioctl; other event
/// types (relative axes, sound) have no steady state and are left at their
/// zero default.
///
/// Returns `true` iff the device's capability bitmaps covered at least one
/// typecode a binding actually references — the same "does this device
/// carry any referenced capability" test `open_evdev` re-derives from its
/// own `EVIOCGBIT` scan before deciding whether to add the device to the
/// poll set at all.
pub fn seed_initial_state(device: &Device, ctx: &mut Context) -> bool {
    let key_state = device.get_key_state().ok();
    let switch_state = device.get_switch_state().ok();
    let led_state = device.get_led_state().ok();
    let abs_state = device.get_abs_state().ok();

    let mut matched = false;
    for typecode in ctx.referenced_typecodes().collect::<Vec<_>>() {
        let (event_type, event_code) = rx_codes::untypecode(typecode);
        let value = match event_type {
            t if t == rx_codes::ev_type::EV_KEY => key_state
                .as_ref()
                .map(|set| set.contains(evdev::Key::new(event_code)) as i32),
            t if t == rx_codes::ev_type::EV_SW => switch_state
                .as_ref()
                .map(|set| set.contains(evdev::SwitchType(event_code)) as i32),
            t if t == rx_codes::ev_type::EV_LED => led_state
                .as_ref()
                .map(|set| set.contains(evdev::LedType(event_code)) as i32),
            t if t == rx_codes::ev_type::EV_ABS => abs_state
                .as_ref()
                .and_then(|info| info.get(event_code as usize).map(|i| i.value)),
            _ => None,
        };

        if let Some(value) = value {
            ctx.seed_state(typecode, value);
            matched = true;
        }
    }
    matched
}

/// Enumerate every `/dev/input/event*` node, open the ones matching
/// `patterns`, and seed `ctx` from each opened device's current state
/// (skipped in monitor mode, where `ctx` is `None`, since monitor mode has
/// no bindings to check capabilities against).
///
/// When `ctx` is `Some`, a device that matches the patterns but carries
/// none of the referenced event classes is skipped too — mirroring
/// `open_evdev`'s re-derived `match` against its capability scan, which
/// never hands such a device to `epoll` in the first place.
pub fn scan_and_open(
    patterns: &[DevicePattern],
    mut ctx: Option<&mut Context>,
) -> Vec<(PathBuf, Device)> {
    let mut opened = Vec::new();
    for (path, device) in evdev::enumerate() {
        if !device_matches(patterns, &path, &device) {
            tracing::debug!(path = %path.display(), "device did not match patterns, skipping");
            continue;
        }
        if let Some(ctx) = ctx.as_deref_mut() {
            if !seed_initial_state(&device, ctx) {
                tracing::debug!(
                    path = %path.display(),
                    "device matched patterns but carries no referenced capability, skipping"
                );
                continue;
            }
        }
        tracing::info!(path = %path.display(), name = device.name().unwrap_or("?"), "opened device");
        opened.push((path, device));
    }
    opened
}

/// True iff `event.event_type() == EV_KEY` and `event.value() == 2` — a key
/// autorepeat, which the reactor never treats as an edge.
pub fn is_key_repeat(event: &evdev::InputEvent) -> bool {
    event.event_type() == EventType::KEY && event.value() == 2
}

/// Watches `/dev/input` for newly created device nodes and forwards their
/// paths. Backed by the `notify` crate in place of the reference daemon's
/// raw `inotify_add_watch(..., IN_CREATE | IN_ONLYDIR)`.
pub struct HotplugWatcher {
    _watcher: notify::RecommendedWatcher,
    rx: tokio::sync::mpsc::UnboundedReceiver<PathBuf>,
}

impl HotplugWatcher {
    pub fn watch(dir: &Path) -> notify::Result<HotplugWatcher> {
        use notify::{Event, EventKind, RecursiveMode, Watcher};

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Create(_)) {
                return;
            }
            for path in event.paths {
                let _ = tx.send(path);
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(HotplugWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// The next newly created path under the watched directory. Callers
    /// should still apply their own `event*` filename filter and pattern
    /// match before opening it — a watched directory can receive unrelated
    /// creations too.
    pub async fn next(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_parsing_recognizes_all_prefixes() {
        assert!(matches!(DevicePattern::parse("name=Foo*"), DevicePattern::Name(_)));
        assert!(matches!(DevicePattern::parse("phys=isa0060/*"), DevicePattern::Phys(_)));
        assert!(matches!(DevicePattern::parse("dev=/dev/input/event0"), DevicePattern::Dev(_)));
        assert!(matches!(DevicePattern::parse("/dev/input/event0"), DevicePattern::Path(_)));
    }

    #[test]
    fn name_pattern_matches_glob() {
        let pat = DevicePattern::Name("AT *".to_string());
        assert!(pat.matches(Path::new("/dev/input/event0"), None, Some("AT Keyboard")));
        assert!(!pat.matches(Path::new("/dev/input/event0"), None, Some("PS/2 Mouse")));
    }

    #[test]
    fn is_key_repeat_detects_value_two_on_ev_key() {
        let ev = evdev::InputEvent::new(EventType::KEY.0, evdev::Key::KEY_A.0, 2);
        assert!(is_key_repeat(&ev));
        let ev = evdev::InputEvent::new(EventType::KEY.0, evdev::Key::KEY_A.0, 1);
        assert!(!is_key_repeat(&ev));
        let ev = evdev::InputEvent::new(EventType::RELATIVE.0, 0, 2);
        assert!(!is_key_repeat(&ev));
    }

    #[test]
    fn path_pattern_matches_against_the_device_node_path() {
        let pat = DevicePattern::Path("/dev/input/event*".to_string());
        assert!(pat.matches(Path::new("/dev/input/event3"), None, None));
        assert!(!pat.matches(Path::new("/dev/input/js0"), None, None));
    }

    #[test]
    fn phys_pattern_requires_phys_to_be_present() {
        let pat = DevicePattern::Phys("isa0060/*".to_string());
        assert!(!pat.matches(Path::new("/dev/input/event0"), None, None));
        assert!(pat.matches(Path::new("/dev/input/event0"), Some("isa0060/serio0/input0"), None));
    }
}
