//! Variable groups required by the Aurora model's input contract.

/// A named group of GRIB parameters sharing a level type.
///
/// Pressure-level groups also carry the levels (hPa) to request; surface
/// groups leave `levels` empty.
#[derive(Debug, Clone, Copy)]
pub struct VariableSet {
    pub name: &'static str,
    pub levtype: &'static str,
    pub params: &'static [&'static str],
    pub levels: &'static [u32],
}

/// Near-surface fields consumed by Aurora.
pub const SURFACE: VariableSet = VariableSet {
    name: "surface",
    levtype: "sfc",
    params: &["2t", "2d", "10u", "10v", "msl", "tp", "sp", "tcwv"],
    levels: &[],
};

/// Upper-air fields on the full Aurora pressure levels.
pub const PRESSURE_LEVEL: VariableSet = VariableSet {
    name: "pressure-level",
    levtype: "pl",
    params: &["u", "v", "t", "q"],
    levels: &[1000, 925, 850, 700, 600, 500, 400, 300, 250, 200, 150, 100],
};

impl VariableSet {
    /// Whether `level` is requested by this group. Surface groups accept
    /// any level because their index entries carry none.
    pub fn wants_level(&self, level: u32) -> bool {
        self.levels.is_empty() || self.levels.contains(&level)
    }

    pub fn wants_param(&self, param: &str) -> bool {
        self.params.contains(&param)
    }
}
