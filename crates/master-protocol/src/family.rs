use std::ops::RangeInclusive;

use crate::constants::CORE_EVENT_TAG;
use crate::frame::FrameFormat;

/// Hardware generation of the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum HardwareFamily {
    /// Older masters with banked eeprom and fixed-size frames.
    Classic,
    /// Newer masters with paged eeprom and fram.
    Core,
}

impl HardwareFamily {
    /// Lowercase name, used in logs and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            HardwareFamily::Classic => "classic",
            HardwareFamily::Core => "core",
        }
    }

    /// Parse a lowercase family name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "classic" => Some(HardwareFamily::Classic),
            "core" => Some(HardwareFamily::Core),
            _ => None,
        }
    }

    /// Default frame format of the family.
    pub fn frame_format(&self) -> FrameFormat {
        match self {
            HardwareFamily::Classic => FrameFormat::classic(),
            HardwareFamily::Core => FrameFormat::core(),
        }
    }

    /// Tags used for requests. Core reserves 0 to 2 for the master.
    pub fn request_tags(&self) -> RangeInclusive<u8> {
        match self {
            HardwareFamily::Classic => 1..=255,
            HardwareFamily::Core => 3..=255,
        }
    }

    /// Tag the master puts on unsolicited frames.
    pub fn event_tag(&self) -> Option<u8> {
        match self {
            HardwareFamily::Classic => None,
            HardwareFamily::Core => Some(CORE_EVENT_TAG),
        }
    }
}

impl std::fmt::Display for HardwareFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_names() {
        assert_eq!(HardwareFamily::from_name("core"), Some(HardwareFamily::Core));
        assert_eq!(HardwareFamily::from_name("classic"), Some(HardwareFamily::Classic));
        assert_eq!(HardwareFamily::from_name("Core"), None);
        assert_eq!(HardwareFamily::Classic.to_string(), "classic");
    }

    #[test]
    fn test_tag_ranges() {
        assert_eq!(*HardwareFamily::Core.request_tags().start(), 3);
        assert_eq!(*HardwareFamily::Classic.request_tags().start(), 1);
        assert_eq!(HardwareFamily::Core.event_tag(), Some(0));
        assert_eq!(HardwareFamily::Classic.event_tag(), None);
    }
}
