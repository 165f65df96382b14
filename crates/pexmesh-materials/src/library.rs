//! Built-in interconnect materials and name lookup.

use crate::provider::{MaterialError, MaterialProvider};

/// A material with constant properties.
#[derive(Debug, Clone, PartialEq)]
pub struct InterconnectMaterial {
    name: String,
    description: String,
    conductivity: f64,
    relative_permittivity: f64,
}

impl InterconnectMaterial {
    /// Construct a material, rejecting negative or non-finite values.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        conductivity: f64,
        relative_permittivity: f64,
    ) -> Result<Self, MaterialError> {
        let name = name.into();
        for (property, value) in [
            ("conductivity", conductivity),
            ("relative permittivity", relative_permittivity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MaterialError::InvalidValue {
                    name,
                    property,
                    value,
                });
            }
        }
        Ok(Self {
            name,
            description: description.into(),
            conductivity,
            relative_permittivity,
        })
    }

    fn builtin(
        name: &str,
        description: &str,
        conductivity: f64,
        relative_permittivity: f64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            conductivity,
            relative_permittivity,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Copper, 5.8e7 S/m.
    pub fn copper() -> Self {
        Self::builtin("Cu", "Copper", 5.8e7, 1.0)
    }

    /// Aluminium, 3.77e7 S/m.
    pub fn aluminium() -> Self {
        Self::builtin("Al", "Aluminium", 3.77e7, 1.0)
    }

    /// Tungsten (vias and contacts), 1.79e7 S/m.
    pub fn tungsten() -> Self {
        Self::builtin("W", "Tungsten", 1.79e7, 1.0)
    }

    /// Thermal silicon dioxide, εr = 3.9.
    pub fn silicon_dioxide() -> Self {
        Self::builtin("SiO2", "Silicon dioxide", 0.0, 3.9)
    }

    /// Silicon nitride etch-stop, εr = 7.5.
    pub fn silicon_nitride() -> Self {
        Self::builtin("Si3N4", "Silicon nitride", 0.0, 7.5)
    }

    /// Carbon-doped oxide inter-metal dielectric, εr = 2.7.
    pub fn low_k() -> Self {
        Self::builtin("lowk", "Low-k carbon-doped oxide", 0.0, 2.7)
    }

    /// Vacuum / air.
    pub fn air() -> Self {
        Self::builtin("air", "Air", 0.0, 1.0)
    }
}

impl MaterialProvider for InterconnectMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn conductivity(&self) -> f64 {
        self.conductivity
    }

    fn relative_permittivity(&self) -> f64 {
        self.relative_permittivity
    }
}

/// A name-indexed collection of materials.
///
/// Lookup is case-sensitive; entries keep insertion order so listings are
/// stable.
#[derive(Debug, Clone)]
pub struct MaterialLibrary {
    materials: Vec<InterconnectMaterial>,
}

impl Default for MaterialLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MaterialLibrary {
    /// An empty library.
    pub fn empty() -> Self {
        Self { materials: Vec::new() }
    }

    /// The standard interconnect stack materials.
    pub fn builtin() -> Self {
        Self {
            materials: vec![
                InterconnectMaterial::copper(),
                InterconnectMaterial::aluminium(),
                InterconnectMaterial::tungsten(),
                InterconnectMaterial::silicon_dioxide(),
                InterconnectMaterial::silicon_nitride(),
                InterconnectMaterial::low_k(),
                InterconnectMaterial::air(),
            ],
        }
    }

    /// Add a user-defined material. Names must be unique.
    pub fn insert(&mut self, material: InterconnectMaterial) -> Result<(), MaterialError> {
        if self.materials.iter().any(|m| m.name == material.name) {
            return Err(MaterialError::Duplicate {
                name: material.name,
            });
        }
        self.materials.push(material);
        Ok(())
    }

    /// Look up a material by name.
    pub fn get(&self, name: &str) -> Result<&InterconnectMaterial, MaterialError> {
        self.materials
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| MaterialError::NotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterconnectMaterial> {
        self.materials.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let lib = MaterialLibrary::builtin();
        let cu = lib.get("Cu").unwrap();
        assert!(cu.is_conductor());
        assert_eq!(cu.conductivity(), 5.8e7);

        let ox = lib.get("SiO2").unwrap();
        assert!(!ox.is_conductor());
        assert_eq!(ox.relative_permittivity(), 3.9);
    }

    #[test]
    fn test_unknown_material() {
        let lib = MaterialLibrary::builtin();
        assert_eq!(
            lib.get("unobtainium").unwrap_err(),
            MaterialError::NotFound("unobtainium".into())
        );
    }

    #[test]
    fn test_insert_rejects_duplicates_and_bad_values() {
        let mut lib = MaterialLibrary::empty();
        lib.insert(InterconnectMaterial::new("poly", "Doped polysilicon", 1e5, 1.0).unwrap())
            .unwrap();
        assert!(matches!(
            lib.insert(InterconnectMaterial::copper()),
            Ok(())
        ));
        assert!(matches!(
            lib.insert(InterconnectMaterial::new("poly", "again", 1.0, 1.0).unwrap()),
            Err(MaterialError::Duplicate { .. })
        ));
        assert!(matches!(
            InterconnectMaterial::new("bad", "negative", -1.0, 1.0),
            Err(MaterialError::InvalidValue { property: "conductivity", .. })
        ));
        assert_eq!(lib.iter().count(), 2);
    }
}
