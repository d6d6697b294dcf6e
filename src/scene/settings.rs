/// Scene-wide parameters edited through the "Global" pseudo-node.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub exposure: f32,
    pub main_light_intensity: f32,
    pub rim_light_intensity: f32,
    pub ambient_intensity: f32,
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
    pub logo_light_intensity: f32,
    pub logo_light_x: f32,
    pub logo_light_y: f32,
    pub logo_light_z: f32,
    pub logo_light_distance: f32,
    pub logo_light_decay: f32,
    pub logo_light_angle: f32,
    pub logo_light_penumbra: f32,
    pub logo_light_target_x: f32,
    pub logo_light_target_y: f32,
    pub logo_light_target_z: f32,
    pub debug_helpers: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            main_light_intensity: 2.13,
            rim_light_intensity: 2.38,
            ambient_intensity: 0.0,
            bloom_strength: 0.48,
            bloom_radius: 1.0,
            bloom_threshold: 0.975,
            logo_light_intensity: 8.8,
            logo_light_x: 0.0,
            logo_light_y: 0.03,
            logo_light_z: 2.0,
            logo_light_distance: 3.73,
            logo_light_decay: 5.0,
            logo_light_angle: 0.03,
            logo_light_penumbra: 1.0,
            logo_light_target_x: 0.0,
            logo_light_target_y: -0.15,
            logo_light_target_z: 0.0,
            debug_helpers: true,
        }
    }
}

/// A single numeric field of [`GlobalSettings`] exposed in the inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalField {
    Exposure,
    AmbientIntensity,
    MainLightIntensity,
    RimLightIntensity,
    BloomStrength,
    BloomRadius,
    BloomThreshold,
}

impl GlobalField {
    pub const LIGHTING: [GlobalField; 4] = [
        GlobalField::Exposure,
        GlobalField::AmbientIntensity,
        GlobalField::MainLightIntensity,
        GlobalField::RimLightIntensity,
    ];

    pub const BLOOM: [GlobalField; 3] = [
        GlobalField::BloomStrength,
        GlobalField::BloomRadius,
        GlobalField::BloomThreshold,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GlobalField::Exposure => "Exposure",
            GlobalField::AmbientIntensity => "Ambient Int.",
            GlobalField::MainLightIntensity => "Main Light Int.",
            GlobalField::RimLightIntensity => "Rim Light Int.",
            GlobalField::BloomStrength => "Strength",
            GlobalField::BloomRadius => "Radius",
            GlobalField::BloomThreshold => "Threshold",
        }
    }
}

impl GlobalSettings {
    pub fn get(&self, field: GlobalField) -> f32 {
        match field {
            GlobalField::Exposure => self.exposure,
            GlobalField::AmbientIntensity => self.ambient_intensity,
            GlobalField::MainLightIntensity => self.main_light_intensity,
            GlobalField::RimLightIntensity => self.rim_light_intensity,
            GlobalField::BloomStrength => self.bloom_strength,
            GlobalField::BloomRadius => self.bloom_radius,
            GlobalField::BloomThreshold => self.bloom_threshold,
        }
    }

    pub fn set(&mut self, field: GlobalField, value: f32) {
        let slot = match field {
            GlobalField::Exposure => &mut self.exposure,
            GlobalField::AmbientIntensity => &mut self.ambient_intensity,
            GlobalField::MainLightIntensity => &mut self.main_light_intensity,
            GlobalField::RimLightIntensity => &mut self.rim_light_intensity,
            GlobalField::BloomStrength => &mut self.bloom_strength,
            GlobalField::BloomRadius => &mut self.bloom_radius,
            GlobalField::BloomThreshold => &mut self.bloom_threshold,
        };
        *slot = value;
    }
}
