use serde::{Deserialize, Serialize};

/// Direction of a terminal punch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }

    /// Map the gateway `punch_state` code onto a direction.
    ///
    /// `0` check-in, `1` check-out, `2` break-out, `3` break-in,
    /// `4` overtime-in, `5` overtime-out.
    pub fn from_punch_state(code: &str) -> Option<Self> {
        match code.trim() {
            "0" | "3" | "4" => Some(Direction::In),
            "1" | "2" | "5" => Some(Direction::Out),
            _ => None,
        }
    }

    pub fn is_in(&self) -> bool {
        matches!(self, Direction::In)
    }

    pub fn is_out(&self) -> bool {
        matches!(self, Direction::Out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punch_state_codes_map_to_directions() {
        assert_eq!(Direction::from_punch_state("0"), Some(Direction::In));
        assert_eq!(Direction::from_punch_state("3"), Some(Direction::In));
        assert_eq!(Direction::from_punch_state("1"), Some(Direction::Out));
        assert_eq!(Direction::from_punch_state(" 5 "), Some(Direction::Out));
        assert_eq!(Direction::from_punch_state("255"), None);
    }
}
