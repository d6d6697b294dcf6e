//! Finish parameters for the lamp's configurable surfaces.

use crate::config::{BaseFinish, PatternMotif, RimFinish};
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishParams {
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub env_map_intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowParams {
    pub color: Vec3,
    pub intensity: f32,
}

fn rgb(hex: u32) -> Vec3 {
    Vec3::new(
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    )
}

const fn finish(metalness: f32, roughness: f32, env_map_intensity: f32) -> (f32, f32, f32) {
    (metalness, roughness, env_map_intensity)
}

pub fn base_finish(base: BaseFinish) -> FinishParams {
    let ((metalness, roughness, env_map_intensity), color) = match base {
        BaseFinish::Red => (finish(0.1, 0.55, 0.8), 0x9b1b1e),
        BaseFinish::RedMetallic => (finish(0.85, 0.3, 1.4), 0xa3161a),
        BaseFinish::Black => (finish(0.2, 0.45, 0.9), 0x111111),
        BaseFinish::White => (finish(0.05, 0.5, 0.7), 0xf2f0eb),
        BaseFinish::Gold => (finish(1.0, 0.25, 1.5), 0xd4a84a),
        BaseFinish::Silver => (finish(1.0, 0.2, 1.5), 0xc8c8cc),
        BaseFinish::Copper => (finish(1.0, 0.3, 1.4), 0xb8734a),
    };
    FinishParams {
        color: rgb(color),
        metalness,
        roughness,
        env_map_intensity,
    }
}

/// Cap, ring and logo metal.
pub fn rim_finish(rim: RimFinish) -> FinishParams {
    let ((metalness, roughness, env_map_intensity), color) = match rim {
        RimFinish::GoldenRing => (finish(1.0, 0.18, 1.6), 0xe0b453),
        RimFinish::SilverRing => (finish(1.0, 0.15, 1.6), 0xd9d9de),
        RimFinish::CopperRing => (finish(1.0, 0.22, 1.5), 0xc27a50),
    };
    FinishParams {
        color: rgb(color),
        metalness,
        roughness,
        env_map_intensity,
    }
}

/// Perforated screen behind the pattern; rougher than the cap so it reads as mesh.
pub fn screen_finish(rim: RimFinish) -> FinishParams {
    let ((metalness, roughness, env_map_intensity), color) = match rim {
        RimFinish::GoldenRing => (finish(0.9, 0.4, 1.2), 0xc99b3f),
        RimFinish::SilverRing => (finish(0.9, 0.35, 1.2), 0xbdbdc2),
        RimFinish::CopperRing => (finish(0.9, 0.45, 1.1), 0xa8653f),
    };
    FinishParams {
        color: rgb(color),
        metalness,
        roughness,
        env_map_intensity,
    }
}

pub fn pattern_glow(pattern: PatternMotif) -> GlowParams {
    let (color, intensity) = match pattern {
        PatternMotif::Triangle => (0xffb347, 2.5),
        PatternMotif::Star => (0xffc870, 2.8),
        PatternMotif::Arabic => (0xffa64d, 2.2),
    };
    GlowParams {
        color: rgb(color),
        intensity,
    }
}

// Flat colors used when the asset lacks the named material.

pub fn base_fallback_color(base: BaseFinish) -> Vec3 {
    rgb(match base {
        BaseFinish::Red => 0xff0000,
        BaseFinish::RedMetallic => 0xb22222,
        BaseFinish::Black => 0x000000,
        BaseFinish::White => 0xffffff,
        BaseFinish::Gold => 0xffd700,
        BaseFinish::Silver => 0xc0c0c0,
        BaseFinish::Copper => 0xb87333,
    })
}

pub fn rim_fallback_color(rim: RimFinish) -> Vec3 {
    rgb(match rim {
        RimFinish::GoldenRing => 0xffd700,
        RimFinish::SilverRing => 0xc0c0c0,
        RimFinish::CopperRing => 0xb87333,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_decode_to_unit_range() {
        assert_eq!(rgb(0xff0000), Vec3::X);
        assert_eq!(rgb(0x000000), Vec3::ZERO);
        let copper = base_fallback_color(BaseFinish::Copper);
        assert!((copper.x - 184.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn metal_finishes_are_metallic() {
        for rim in RimFinish::ALL {
            assert_eq!(rim_finish(rim).metalness, 1.0);
        }
        assert!(base_finish(BaseFinish::Red).metalness < 0.5);
        assert!(base_finish(BaseFinish::RedMetallic).metalness > 0.5);
    }

    #[test]
    fn every_pattern_glows_above_bloom_threshold() {
        for pattern in PatternMotif::ALL {
            let glow = pattern_glow(pattern);
            assert!(glow.color.max_element() * glow.intensity > 1.0);
        }
    }
}
