//! Coupling laws: the material coefficient behind each stiffness matrix.
//!
//! The assembler walks the same pairs of cells for every matrix; only the
//! property read from the materials changes. Conductance reads
//! conductivities and terminates ports on their source impedance,
//! capacitance reads permittivities.

use pexmesh_geometry::{MaterialRegion, Port};

use crate::marker::CellClass;

/// Vacuum permittivity (F/m).
pub const EPSILON_0: f64 = 8.854_187_812_8e-12;

/// Material coefficient used by the stiffness assembler.
pub trait CouplingLaw: Send + Sync {
    /// Short name used in reports and file headers.
    fn name(&self) -> &'static str;

    /// Property of a conductor cell for metal-to-metal contact between two
    /// nodes, or `None` if this law does not couple through contacts.
    fn contact_property(&self, region: &MaterialRegion) -> Option<f64>;

    /// Property of a non-conductor cell crossed by a coupling path. Zero
    /// blocks the path.
    fn medium_property(
        &self,
        class: &CellClass,
        regions: &[MaterialRegion],
        background: f64,
    ) -> f64;

    /// Admittance from a port terminal to the external reference.
    fn port_admittance(&self, port: &Port) -> f64;
}

/// Conductance: conductivity across metal contacts, `1/Z` at ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConductanceLaw;

impl CouplingLaw for ConductanceLaw {
    fn name(&self) -> &'static str {
        "conductance"
    }

    fn contact_property(&self, region: &MaterialRegion) -> Option<f64> {
        Some(region.conductivity)
    }

    fn medium_property(
        &self,
        class: &CellClass,
        regions: &[MaterialRegion],
        _background: f64,
    ) -> f64 {
        class
            .region()
            .and_then(|r| regions.get(r))
            .map_or(0.0, |r| r.conductivity)
    }

    fn port_admittance(&self, port: &Port) -> f64 {
        1.0 / port.impedance
    }
}

/// Capacitance: permittivity of the dielectrics between conductor surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitanceLaw {
    /// Scale applied to relative permittivities.
    pub epsilon_0: f64,
}

impl CapacitanceLaw {
    /// Coefficients in units of relative permittivity.
    pub fn relative() -> Self {
        Self { epsilon_0: 1.0 }
    }

    /// Coefficients in farads, for geometry in metres.
    pub fn absolute() -> Self {
        Self { epsilon_0: EPSILON_0 }
    }
}

impl Default for CapacitanceLaw {
    fn default() -> Self {
        Self::absolute()
    }
}

impl CouplingLaw for CapacitanceLaw {
    fn name(&self) -> &'static str {
        "capacitance"
    }

    fn contact_property(&self, _region: &MaterialRegion) -> Option<f64> {
        None
    }

    fn medium_property(
        &self,
        class: &CellClass,
        regions: &[MaterialRegion],
        background: f64,
    ) -> f64 {
        let relative = match class {
            CellClass::Air => background,
            other => other
                .region()
                .and_then(|r| regions.get(r))
                .map_or(background, |r| r.permittivity),
        };
        self.epsilon_0 * relative
    }

    fn port_admittance(&self, _port: &Port) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pexmesh_geometry::{Aabb, PortRole};

    fn regions() -> Vec<MaterialRegion> {
        let b = Aabb::new([0.0; 3], [1.0; 3]);
        vec![
            MaterialRegion::conductor("cu", b, 5.8e7),
            MaterialRegion::dielectric("ox", b, 3.9),
            MaterialRegion::new("doped", b, 10.0, 11.7),
        ]
    }

    #[test]
    fn test_conductance_properties() {
        let regions = regions();
        let law = ConductanceLaw;
        assert_eq!(law.contact_property(&regions[0]), Some(5.8e7));
        assert_eq!(law.medium_property(&CellClass::Dielectric { region: 1 }, &regions, 1.0), 0.0);
        assert_eq!(law.medium_property(&CellClass::Air, &regions, 1.0), 0.0);
        let port = Port::new("p", [0.0; 3], PortRole::Input).with_impedance(25.0);
        assert_relative_eq!(law.port_admittance(&port), 0.04);
    }

    #[test]
    fn test_capacitance_properties() {
        let regions = regions();
        let rel = CapacitanceLaw::relative();
        assert_eq!(rel.contact_property(&regions[0]), None);
        assert_eq!(rel.medium_property(&CellClass::Dielectric { region: 1 }, &regions, 1.0), 3.9);
        assert_eq!(rel.medium_property(&CellClass::Air, &regions, 1.5), 1.5);

        let abs = CapacitanceLaw::absolute();
        assert_relative_eq!(
            abs.medium_property(&CellClass::Dielectric { region: 2 }, &regions, 1.0),
            11.7 * EPSILON_0
        );
        let port = Port::new("p", [0.0; 3], PortRole::Output);
        assert_eq!(abs.port_admittance(&port), 0.0);
    }
}
