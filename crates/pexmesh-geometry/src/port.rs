//! Electrical ports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default source impedance of a port (Ω).
pub const DEFAULT_PORT_IMPEDANCE: f64 = 50.0;

/// Role of a port in the extracted network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    Input,
    Output,
    /// Reference terminal for the source impedance.
    SourceReference,
}

impl PortRole {
    /// Single-character direction code used by netlist-style writers.
    pub fn direction(self) -> char {
        match self {
            PortRole::Input => 'I',
            PortRole::Output => 'O',
            PortRole::SourceReference => 'R',
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortRole::Input => "input",
            PortRole::Output => "output",
            PortRole::SourceReference => "source_reference",
        };
        f.write_str(name)
    }
}

/// A named terminal at a fixed location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    /// Location (x, y, z).
    pub position: [f64; 3],
    pub role: PortRole,
    /// Source impedance seen by the terminal (Ω).
    #[serde(default = "default_impedance")]
    pub impedance: f64,
}

fn default_impedance() -> f64 {
    DEFAULT_PORT_IMPEDANCE
}

impl Port {
    pub fn new(name: impl Into<String>, position: [f64; 3], role: PortRole) -> Self {
        Self {
            name: name.into(),
            position,
            role,
            impedance: DEFAULT_PORT_IMPEDANCE,
        }
    }

    pub fn with_impedance(mut self, impedance: f64) -> Self {
        self.impedance = impedance;
        self
    }
}
