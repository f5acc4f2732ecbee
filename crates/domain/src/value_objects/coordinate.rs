//! Spatial coordinates inside an environment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A point inside an environment (block space, fractional for entity placement).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns this coordinate shifted by `delta`.
    pub fn offset(self, delta: Coordinate) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
        }
    }

    /// Integer block position containing this coordinate.
    pub fn block(self) -> (i64, i64, i64) {
        (
            self.x.floor() as i64,
            self.y.floor() as i64,
            self.z.floor() as i64,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Parses `"x,y,z"` (whitespace around components is ignored).
impl FromStr for Coordinate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, z] = parts.as_slice() else {
            return Err(DomainError::validation(format!(
                "Coordinate must have three components, got '{s}'"
            )));
        };
        let parse = |v: &str| {
            v.parse::<f64>()
                .map_err(|_| DomainError::validation(format!("Invalid coordinate component '{v}'")))
        };
        Ok(Self::new(parse(x)?, parse(y)?, parse(z)?))
    }
}
