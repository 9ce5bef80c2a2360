//! Static evdev name lookup tables.
//!
//! The DSL lexer and monitor mode both need an ordered mapping between the
//! symbolic names used in Linux's `input-event-codes.h` (`KEY_A`, `SW_LID`,
//! `ABS_X`, ...) and the `(event_type, event_code)` pair evdev itself reports.
//! The raw table below is grouped by event class for readability; it is
//! sorted once, lazily, into [`sorted_entries`] so lookups can binary search
//! it the way the reference implementation's hand-sorted C table does.

use std::sync::LazyLock;

/// Evdev event-type classes relevant to this DSL (see `linux/input-event-codes.h`).
pub mod ev_type {
    pub const EV_KEY: u16 = 0x01;
    pub const EV_REL: u16 = 0x02;
    pub const EV_ABS: u16 = 0x03;
    pub const EV_SW: u16 = 0x05;
    pub const EV_LED: u16 = 0x11;
    pub const EV_SND: u16 = 0x12;
}

/// One entry in the static name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    pub name: &'static str,
    pub event_type: u16,
    pub event_code: u16,
}

impl CodeEntry {
    /// Pack `(event_type, event_code)` into the 32-bit typecode the rest of the
    /// reactor deals in.
    pub const fn typecode(&self) -> u32 {
        typecode(self.event_type, self.event_code)
    }
}

/// Pack an event type and code into the 32-bit identifier used everywhere else
/// in the reactor: the type occupies the high 16 bits, the code the low 16.
pub const fn typecode(event_type: u16, event_code: u16) -> u32 {
    ((event_type as u32) << 16) | event_code as u32
}

/// Split a typecode back into its `(event_type, event_code)` parts, mainly for
/// monitor-mode diagnostics.
pub const fn untypecode(code: u32) -> (u16, u16) {
    ((code >> 16) as u16, (code & 0xffff) as u16)
}

use ev_type::*;

#[rustfmt::skip]
const RAW_TABLE: &[CodeEntry] = &[
    // Keyboard row 1
    CodeEntry { name: "KEY_ESC", event_type: EV_KEY, event_code: 1 },
    CodeEntry { name: "KEY_1", event_type: EV_KEY, event_code: 2 },
    CodeEntry { name: "KEY_2", event_type: EV_KEY, event_code: 3 },
    CodeEntry { name: "KEY_3", event_type: EV_KEY, event_code: 4 },
    CodeEntry { name: "KEY_4", event_type: EV_KEY, event_code: 5 },
    CodeEntry { name: "KEY_5", event_type: EV_KEY, event_code: 6 },
    CodeEntry { name: "KEY_6", event_type: EV_KEY, event_code: 7 },
    CodeEntry { name: "KEY_7", event_type: EV_KEY, event_code: 8 },
    CodeEntry { name: "KEY_8", event_type: EV_KEY, event_code: 9 },
    CodeEntry { name: "KEY_9", event_type: EV_KEY, event_code: 10 },
    CodeEntry { name: "KEY_0", event_type: EV_KEY, event_code: 11 },
    CodeEntry { name: "KEY_MINUS", event_type: EV_KEY, event_code: 12 },
    CodeEntry { name: "KEY_EQUAL", event_type: EV_KEY, event_code: 13 },
    CodeEntry { name: "KEY_BACKSPACE", event_type: EV_KEY, event_code: 14 },
    CodeEntry { name: "KEY_TAB", event_type: EV_KEY, event_code: 15 },
    // QWERTY row
    CodeEntry { name: "KEY_Q", event_type: EV_KEY, event_code: 16 },
    CodeEntry { name: "KEY_W", event_type: EV_KEY, event_code: 17 },
    CodeEntry { name: "KEY_E", event_type: EV_KEY, event_code: 18 },
    CodeEntry { name: "KEY_R", event_type: EV_KEY, event_code: 19 },
    CodeEntry { name: "KEY_T", event_type: EV_KEY, event_code: 20 },
    CodeEntry { name: "KEY_Y", event_type: EV_KEY, event_code: 21 },
    CodeEntry { name: "KEY_U", event_type: EV_KEY, event_code: 22 },
    CodeEntry { name: "KEY_I", event_type: EV_KEY, event_code: 23 },
    CodeEntry { name: "KEY_O", event_type: EV_KEY, event_code: 24 },
    CodeEntry { name: "KEY_P", event_type: EV_KEY, event_code: 25 },
    CodeEntry { name: "KEY_LEFTBRACE", event_type: EV_KEY, event_code: 26 },
    CodeEntry { name: "KEY_RIGHTBRACE", event_type: EV_KEY, event_code: 27 },
    CodeEntry { name: "KEY_ENTER", event_type: EV_KEY, event_code: 28 },
    CodeEntry { name: "KEY_LEFTCTRL", event_type: EV_KEY, event_code: 29 },
    // Home row
    CodeEntry { name: "KEY_A", event_type: EV_KEY, event_code: 30 },
    CodeEntry { name: "KEY_S", event_type: EV_KEY, event_code: 31 },
    CodeEntry { name: "KEY_D", event_type: EV_KEY, event_code: 32 },
    CodeEntry { name: "KEY_F", event_type: EV_KEY, event_code: 33 },
    CodeEntry { name: "KEY_G", event_type: EV_KEY, event_code: 34 },
    CodeEntry { name: "KEY_H", event_type: EV_KEY, event_code: 35 },
    CodeEntry { name: "KEY_J", event_type: EV_KEY, event_code: 36 },
    CodeEntry { name: "KEY_K", event_type: EV_KEY, event_code: 37 },
    CodeEntry { name: "KEY_L", event_type: EV_KEY, event_code: 38 },
    CodeEntry { name: "KEY_SEMICOLON", event_type: EV_KEY, event_code: 39 },
    CodeEntry { name: "KEY_APOSTROPHE", event_type: EV_KEY, event_code: 40 },
    CodeEntry { name: "KEY_GRAVE", event_type: EV_KEY, event_code: 41 },
    CodeEntry { name: "KEY_LEFTSHIFT", event_type: EV_KEY, event_code: 42 },
    CodeEntry { name: "KEY_BACKSLASH", event_type: EV_KEY, event_code: 43 },
    // Bottom row
    CodeEntry { name: "KEY_Z", event_type: EV_KEY, event_code: 44 },
    CodeEntry { name: "KEY_X", event_type: EV_KEY, event_code: 45 },
    CodeEntry { name: "KEY_C", event_type: EV_KEY, event_code: 46 },
    CodeEntry { name: "KEY_V", event_type: EV_KEY, event_code: 47 },
    CodeEntry { name: "KEY_B", event_type: EV_KEY, event_code: 48 },
    CodeEntry { name: "KEY_N", event_type: EV_KEY, event_code: 49 },
    CodeEntry { name: "KEY_M", event_type: EV_KEY, event_code: 50 },
    CodeEntry { name: "KEY_COMMA", event_type: EV_KEY, event_code: 51 },
    CodeEntry { name: "KEY_DOT", event_type: EV_KEY, event_code: 52 },
    CodeEntry { name: "KEY_SLASH", event_type: EV_KEY, event_code: 53 },
    CodeEntry { name: "KEY_RIGHTSHIFT", event_type: EV_KEY, event_code: 54 },
    CodeEntry { name: "KEY_LEFTALT", event_type: EV_KEY, event_code: 56 },
    CodeEntry { name: "KEY_SPACE", event_type: EV_KEY, event_code: 57 },
    CodeEntry { name: "KEY_CAPSLOCK", event_type: EV_KEY, event_code: 58 },
    // Function row
    CodeEntry { name: "KEY_F1", event_type: EV_KEY, event_code: 59 },
    CodeEntry { name: "KEY_F2", event_type: EV_KEY, event_code: 60 },
    CodeEntry { name: "KEY_F3", event_type: EV_KEY, event_code: 61 },
    CodeEntry { name: "KEY_F4", event_type: EV_KEY, event_code: 62 },
    CodeEntry { name: "KEY_F5", event_type: EV_KEY, event_code: 63 },
    CodeEntry { name: "KEY_F6", event_type: EV_KEY, event_code: 64 },
    CodeEntry { name: "KEY_F7", event_type: EV_KEY, event_code: 65 },
    CodeEntry { name: "KEY_F8", event_type: EV_KEY, event_code: 66 },
    CodeEntry { name: "KEY_F9", event_type: EV_KEY, event_code: 67 },
    CodeEntry { name: "KEY_F10", event_type: EV_KEY, event_code: 68 },
    CodeEntry { name: "KEY_F11", event_type: EV_KEY, event_code: 87 },
    CodeEntry { name: "KEY_F12", event_type: EV_KEY, event_code: 88 },
    CodeEntry { name: "KEY_NUMLOCK", event_type: EV_KEY, event_code: 69 },
    CodeEntry { name: "KEY_SCROLLLOCK", event_type: EV_KEY, event_code: 70 },
    CodeEntry { name: "KEY_102ND", event_type: EV_KEY, event_code: 86 },
    CodeEntry { name: "KEY_RIGHTCTRL", event_type: EV_KEY, event_code: 97 },
    CodeEntry { name: "KEY_RIGHTALT", event_type: EV_KEY, event_code: 100 },
    CodeEntry { name: "KEY_LEFTMETA", event_type: EV_KEY, event_code: 125 },
    CodeEntry { name: "KEY_RIGHTMETA", event_type: EV_KEY, event_code: 126 },
    // Navigation cluster
    CodeEntry { name: "KEY_HOME", event_type: EV_KEY, event_code: 102 },
    CodeEntry { name: "KEY_UP", event_type: EV_KEY, event_code: 103 },
    CodeEntry { name: "KEY_PAGEUP", event_type: EV_KEY, event_code: 104 },
    CodeEntry { name: "KEY_LEFT", event_type: EV_KEY, event_code: 105 },
    CodeEntry { name: "KEY_RIGHT", event_type: EV_KEY, event_code: 106 },
    CodeEntry { name: "KEY_END", event_type: EV_KEY, event_code: 107 },
    CodeEntry { name: "KEY_DOWN", event_type: EV_KEY, event_code: 108 },
    CodeEntry { name: "KEY_PAGEDOWN", event_type: EV_KEY, event_code: 109 },
    CodeEntry { name: "KEY_INSERT", event_type: EV_KEY, event_code: 110 },
    CodeEntry { name: "KEY_DELETE", event_type: EV_KEY, event_code: 111 },
    CodeEntry { name: "KEY_SYSRQ", event_type: EV_KEY, event_code: 99 },
    // Multimedia / power
    CodeEntry { name: "KEY_MUTE", event_type: EV_KEY, event_code: 113 },
    CodeEntry { name: "KEY_VOLUMEDOWN", event_type: EV_KEY, event_code: 114 },
    CodeEntry { name: "KEY_VOLUMEUP", event_type: EV_KEY, event_code: 115 },
    CodeEntry { name: "KEY_POWER", event_type: EV_KEY, event_code: 116 },
    CodeEntry { name: "KEY_PLAYPAUSE", event_type: EV_KEY, event_code: 164 },
    CodeEntry { name: "KEY_NEXTSONG", event_type: EV_KEY, event_code: 163 },
    CodeEntry { name: "KEY_PREVIOUSSONG", event_type: EV_KEY, event_code: 165 },
    // Pointer buttons
    CodeEntry { name: "BTN_LEFT", event_type: EV_KEY, event_code: 0x110 },
    CodeEntry { name: "BTN_RIGHT", event_type: EV_KEY, event_code: 0x111 },
    CodeEntry { name: "BTN_MIDDLE", event_type: EV_KEY, event_code: 0x112 },
    CodeEntry { name: "BTN_SIDE", event_type: EV_KEY, event_code: 0x113 },
    CodeEntry { name: "BTN_EXTRA", event_type: EV_KEY, event_code: 0x114 },
    // Relative axes
    CodeEntry { name: "REL_X", event_type: EV_REL, event_code: 0x00 },
    CodeEntry { name: "REL_Y", event_type: EV_REL, event_code: 0x01 },
    CodeEntry { name: "REL_WHEEL", event_type: EV_REL, event_code: 0x08 },
    CodeEntry { name: "REL_HWHEEL", event_type: EV_REL, event_code: 0x06 },
    // Absolute axes
    CodeEntry { name: "ABS_X", event_type: EV_ABS, event_code: 0x00 },
    CodeEntry { name: "ABS_Y", event_type: EV_ABS, event_code: 0x01 },
    CodeEntry { name: "ABS_Z", event_type: EV_ABS, event_code: 0x02 },
    CodeEntry { name: "ABS_RX", event_type: EV_ABS, event_code: 0x03 },
    CodeEntry { name: "ABS_RY", event_type: EV_ABS, event_code: 0x04 },
    CodeEntry { name: "ABS_RZ", event_type: EV_ABS, event_code: 0x05 },
    CodeEntry { name: "ABS_THROTTLE", event_type: EV_ABS, event_code: 0x06 },
    CodeEntry { name: "ABS_RUDDER", event_type: EV_ABS, event_code: 0x07 },
    CodeEntry { name: "ABS_WHEEL", event_type: EV_ABS, event_code: 0x08 },
    CodeEntry { name: "ABS_GAS", event_type: EV_ABS, event_code: 0x09 },
    CodeEntry { name: "ABS_BRAKE", event_type: EV_ABS, event_code: 0x0a },
    CodeEntry { name: "ABS_HAT0X", event_type: EV_ABS, event_code: 0x10 },
    CodeEntry { name: "ABS_HAT0Y", event_type: EV_ABS, event_code: 0x11 },
    CodeEntry { name: "ABS_PRESSURE", event_type: EV_ABS, event_code: 0x18 },
    CodeEntry { name: "ABS_DISTANCE", event_type: EV_ABS, event_code: 0x19 },
    CodeEntry { name: "ABS_TILT_X", event_type: EV_ABS, event_code: 0x1a },
    CodeEntry { name: "ABS_TILT_Y", event_type: EV_ABS, event_code: 0x1b },
    CodeEntry { name: "ABS_VOLUME", event_type: EV_ABS, event_code: 0x20 },
    CodeEntry { name: "ABS_MISC", event_type: EV_ABS, event_code: 0x28 },
    // Switches
    CodeEntry { name: "SW_LID", event_type: EV_SW, event_code: 0x00 },
    CodeEntry { name: "SW_TABLET_MODE", event_type: EV_SW, event_code: 0x01 },
    CodeEntry { name: "SW_HEADPHONE_INSERT", event_type: EV_SW, event_code: 0x02 },
    CodeEntry { name: "SW_RFKILL_ALL", event_type: EV_SW, event_code: 0x03 },
    CodeEntry { name: "SW_MICROPHONE_INSERT", event_type: EV_SW, event_code: 0x04 },
    CodeEntry { name: "SW_DOCK", event_type: EV_SW, event_code: 0x05 },
    CodeEntry { name: "SW_LINEOUT_INSERT", event_type: EV_SW, event_code: 0x06 },
    CodeEntry { name: "SW_CAMERA_LENS_COVER", event_type: EV_SW, event_code: 0x09 },
    CodeEntry { name: "SW_ROTATE_LOCK", event_type: EV_SW, event_code: 0x0c },
    // LEDs
    CodeEntry { name: "LED_NUML", event_type: EV_LED, event_code: 0x00 },
    CodeEntry { name: "LED_CAPSL", event_type: EV_LED, event_code: 0x01 },
    CodeEntry { name: "LED_SCROLLL", event_type: EV_LED, event_code: 0x02 },
    CodeEntry { name: "LED_MUTE", event_type: EV_LED, event_code: 0x07 },
    // Beeper
    CodeEntry { name: "SND_CLICK", event_type: EV_SND, event_code: 0x00 },
    CodeEntry { name: "SND_BELL", event_type: EV_SND, event_code: 0x01 },
    CodeEntry { name: "SND_TONE", event_type: EV_SND, event_code: 0x02 },
];

/// The code table sorted by name, built once on first access. Sorting here
/// (rather than hand-ordering the literal above) keeps `RAW_TABLE` easy to
/// extend without re-deriving byte-wise string order by hand.
static SORTED_TABLE: LazyLock<Vec<CodeEntry>> = LazyLock::new(|| {
    let mut v = RAW_TABLE.to_vec();
    v.sort_by_key(|e| e.name);
    v
});

/// The name table, sorted ascending by name, as the lexer's binary search
/// expects.
pub fn sorted_entries() -> &'static [CodeEntry] {
    &SORTED_TABLE
}

/// Look up a DSL identifier and return its typecode, or `None` if unknown.
pub fn lookup(name: &str) -> Option<CodeEntry> {
    sorted_entries()
        .binary_search_by_key(&name, |e| e.name)
        .ok()
        .map(|i| sorted_entries()[i])
}

/// Human-readable class name for an event type, used by monitor mode.
pub fn type_name(event_type: u16) -> &'static str {
    match event_type {
        EV_KEY => "EV_KEY",
        EV_REL => "EV_REL",
        EV_ABS => "EV_ABS",
        EV_SW => "EV_SW",
        EV_LED => "EV_LED",
        EV_SND => "EV_SND",
        _ => "EV_UNKNOWN",
    }
}

/// Human-readable code name within its event class, used by monitor mode.
/// Falls back to `None` (caller prints the raw numeric code) when the table
/// doesn't carry an entry for it.
pub fn code_name(event_type: u16, event_code: u16) -> Option<&'static str> {
    sorted_entries()
        .iter()
        .find(|e| e.event_type == event_type && e.event_code == event_code)
        .map(|e| e.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_entries_are_strictly_ascending() {
        let entries = sorted_entries();
        for pair in entries.windows(2) {
            assert!(
                pair[0].name < pair[1].name,
                "table not sorted at {:?} / {:?}",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn lookup_finds_known_names() {
        let e = lookup("KEY_A").expect("KEY_A should resolve");
        assert_eq!(e.event_type, EV_KEY);
        assert_eq!(e.event_code, 30);
    }

    #[test]
    fn lookup_rejects_unknown_names() {
        assert!(lookup("KEY_DOES_NOT_EXIST").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn typecode_round_trips() {
        let e = lookup("SW_LID").unwrap();
        let tc = e.typecode();
        assert_eq!(untypecode(tc), (EV_SW, 0));
    }

    #[test]
    fn type_and_code_names_resolve() {
        assert_eq!(type_name(EV_KEY), "EV_KEY");
        assert_eq!(code_name(EV_KEY, 30), Some("KEY_A"));
        assert_eq!(code_name(EV_KEY, 65_000), None);
    }
}
