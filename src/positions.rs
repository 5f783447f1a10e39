use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    AttackingMidfield,
    CentralForward,
    CentralMidfield,
    CentreBack,
    DefensiveMidfield,
    LeftWinger,
    LeftBack,
    RightBack,
    RightWinger,
}

impl Position {
    pub const ALL: [Position; 9] = [
        Position::AttackingMidfield,
        Position::CentralForward,
        Position::CentralMidfield,
        Position::CentreBack,
        Position::DefensiveMidfield,
        Position::LeftWinger,
        Position::LeftBack,
        Position::RightBack,
        Position::RightWinger,
    ];

    /// Wire code understood by the analysis service.
    pub fn code(self) -> &'static str {
        match self {
            Position::AttackingMidfield => "attacking_midfield",
            Position::CentralForward => "central_forward",
            Position::CentralMidfield => "central_midfield",
            Position::CentreBack => "centre-back",
            Position::DefensiveMidfield => "defensive_midfield",
            Position::LeftWinger => "left_winger",
            Position::LeftBack => "left_back",
            Position::RightBack => "right_back",
            Position::RightWinger => "right_winger",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Position::AttackingMidfield => "Attacking Midfield",
            Position::CentralForward => "Central Forward",
            Position::CentralMidfield => "Central Midfield",
            Position::CentreBack => "Center Back",
            Position::DefensiveMidfield => "Defensive Midfielder",
            Position::LeftWinger => "Left Winger",
            Position::LeftBack => "Left Back",
            Position::RightBack => "Right Back",
            Position::RightWinger => "Right Winger",
        }
    }

    pub fn from_code(code: &str) -> Option<Position> {
        let code = code.trim();
        Position::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl FromStr for Position {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Position::from_code(s).ok_or_else(|| AnalysisError::UnknownPosition(s.trim().to_string()))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
