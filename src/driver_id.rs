use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum DriverIdError {
    #[error("Failed to parse board number")]
    BadBoard,
    #[error("Failed to parse driver number")]
    BadPort,
    #[error("Too many driver number segments")]
    TooManySegments,
}

/// Board and port of a stepper driver, written `board.port` (or just `port` on the main board).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverId {
    pub board: u16,
    pub port: u16,
}

impl DriverId {
    pub const fn new(board: u16, port: u16) -> Self {
        Self { board, port }
    }

    /// Packed representation used on the wire: `board << 16 | port`.
    pub const fn as_u32(self) -> u32 {
        (self.board as u32) << 16 | self.port as u32
    }
}

impl From<u32> for DriverId {
    fn from(value: u32) -> Self {
        Self {
            board: (value >> 16) as u16,
            port: (value & 0xFFFF) as u16,
        }
    }
}

impl From<DriverId> for u32 {
    fn from(id: DriverId) -> u32 {
        id.as_u32()
    }
}

impl FromStr for DriverId {
    type Err = DriverIdError;

    /// A blank string yields the default driver `0.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let mut segments = s.split('.');
        let first = segments.next().unwrap_or_default();
        match (segments.next(), segments.next()) {
            (None, _) => Ok(Self {
                board: 0,
                port: first.parse().map_err(|_| DriverIdError::BadPort)?,
            }),
            (Some(port), None) => Ok(Self {
                board: first.parse().map_err(|_| DriverIdError::BadBoard)?,
                port: port.parse().map_err(|_| DriverIdError::BadPort)?,
            }),
            (Some(_), Some(_)) => Err(DriverIdError::TooManySegments),
        }
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.board, self.port)
    }
}

#[cfg(test)]
mod test {
    use super::{DriverId, DriverIdError};

    #[test]
    fn parses_port_only_and_board_dot_port() {
        assert_eq!("3".parse(), Ok(DriverId::new(0, 3)));
        assert_eq!("1.2".parse(), Ok(DriverId::new(1, 2)));
        assert_eq!(" ".parse(), Ok(DriverId::default()));
    }

    #[test]
    fn reports_which_segment_is_broken() {
        assert_eq!("x".parse::<DriverId>(), Err(DriverIdError::BadPort));
        assert_eq!("x.1".parse::<DriverId>(), Err(DriverIdError::BadBoard));
        assert_eq!("1.-1".parse::<DriverId>(), Err(DriverIdError::BadPort));
        assert_eq!("1.2.3".parse::<DriverId>(), Err(DriverIdError::TooManySegments));
    }

    #[test]
    fn packs_into_u32() {
        let id = DriverId::new(2, 5);
        assert_eq!(id.as_u32(), 0x0002_0005);
        assert_eq!(DriverId::from(0x0002_0005), id);
        assert_eq!(id.to_string(), "2.5");
    }
}
