/// Severity of an envelope, from hard errors down to host-side debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    Error,
    Warning,
    Important,
    #[default]
    Normal,
    Host,
    Debug,
    HostDebug,
}

impl Level {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Warning => 1,
            Self::Important => 2,
            Self::Normal => 3,
            Self::Host => 4,
            Self::Debug => 5,
            Self::HostDebug => 6,
        }
    }

    /// Total mapping: unknown wire values degrade to `Normal` rather than
    /// failing the frame.
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Error,
            1 => Self::Warning,
            2 => Self::Important,
            3 => Self::Normal,
            4 => Self::Host,
            5 => Self::Debug,
            6 => Self::HostDebug,
            other => {
                log::debug!("envelope: unknown level {other}, treating as normal");
                Self::Normal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Level;

    #[test]
    fn wire_values_round_trip() {
        for level in [
            Level::Error,
            Level::Warning,
            Level::Important,
            Level::Normal,
            Level::Host,
            Level::Debug,
            Level::HostDebug,
        ] {
            assert_eq!(Level::from_wire(level.to_wire()), level);
        }
    }

    #[test]
    fn unknown_wire_value_degrades_to_normal() {
        assert_eq!(Level::from_wire(200), Level::Normal);
    }
}
