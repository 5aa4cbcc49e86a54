//! Per-vertex (Gouraud) lighting on the CPU
//!
//! Lighting runs in linear space: material colors are stored display-referred
//! and converted on the way in, the result goes back to sRGB for the vertex
//! color. Metals lose their diffuse term and pick up the environment tint.

use crate::math::{Rgb, Vec3};
use crate::scene::Material;
use super::composition::{EnvironmentPreset, LightRig};

/// Everything lighting needs besides the surface
pub struct ShadeContext<'a> {
    pub rig: &'a LightRig,
    pub environment: &'a EnvironmentPreset,
    pub eye: Vec3,
}

fn shininess(roughness: f32) -> f32 {
    let r = roughness.clamp(0.05, 1.0);
    (2.0 / (r * r) - 2.0).clamp(1.0, 256.0)
}

/// Lit color (sRGB) of a surface point. `base` is the display-referred
/// albedo before texturing.
pub fn shade_vertex(ctx: &ShadeContext, position: Vec3, normal: Vec3, base: Rgb, material: &Material) -> Rgb {
    let view = (ctx.eye - position).normalize();
    let mut n = normal.normalize();
    // Double-sided: light the face that looks at the camera
    if material.double_sided && n.dot(view) < 0.0 {
        n = -n;
    }

    let albedo = base.to_linear();
    let metal = material.metalness.clamp(0.0, 1.0);
    let smooth = 1.0 - material.roughness.clamp(0.0, 1.0);
    let rig = ctx.rig;

    let hemi = rig.ground.lerp(rig.sky, n.y * 0.5 + 0.5);
    let mut diffuse = rig.ambient.add(hemi);
    let mut specular = Rgb::BLACK;
    let f0 = Rgb::new(0.04, 0.04, 0.04).lerp(albedo, metal);
    let exponent = shininess(material.roughness);

    let mut add_light = |to_light: Vec3, radiance: Rgb| {
        let n_dot_l = n.dot(to_light).max(0.0);
        if n_dot_l <= 0.0 {
            return;
        }
        diffuse = diffuse.add(radiance.scale(n_dot_l));
        let half = (to_light + view).normalize();
        let spec = n.dot(half).max(0.0).powf(exponent) * smooth * n_dot_l;
        specular = specular.add(f0.mul(radiance).scale(spec));
    };

    for light in &rig.directional {
        add_light(light.direction, light.radiance);
    }
    let to_accent = rig.accent.position - position;
    let dist = to_accent.len();
    if dist > 0.001 && dist < rig.accent.radius {
        let falloff = 1.0 - dist / rig.accent.radius;
        add_light(to_accent.scale(1.0 / dist), rig.accent.radiance.scale(falloff * falloff));
    }

    let fresnel = (1.0 - n.dot(view).max(0.0)).powi(5);
    let reflect_weight = smooth * (metal + (1.0 - metal) * fresnel * 0.5);
    let reflection = ctx.environment.reflection.mul(f0.lerp(Rgb::WHITE, fresnel)).scale(reflect_weight);

    albedo
        .mul(diffuse)
        .scale(1.0 - metal)
        .add(specular)
        .add(reflection)
        .add(material.emissive.to_linear())
        .to_srgb()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, LightingSettings};

    fn ctx_parts() -> (LightRig, EnvironmentPreset) {
        (LightRig::from_settings(&LightingSettings::default()), EnvironmentPreset::of(Environment::Studio))
    }

    fn luminance(c: Rgb) -> f32 {
        0.2126 * c.r + 0.7152 * c.g + 0.0722 * c.b
    }

    #[test]
    fn test_facing_key_light_is_brighter() {
        let (rig, env) = ctx_parts();
        let ctx = ShadeContext { rig: &rig, environment: &env, eye: Vec3::new(0.0, 2.0, 10.0) };
        let mut m = Material::default_pbr();
        m.double_sided = false;
        let lit = shade_vertex(&ctx, Vec3::ZERO, rig.key_direction(), m.color, &m);
        let away = shade_vertex(&ctx, Vec3::ZERO, -rig.key_direction(), m.color, &m);
        assert!(luminance(lit) > luminance(away));
    }

    #[test]
    fn test_double_sided_flips_back_faces() {
        let (rig, env) = ctx_parts();
        let ctx = ShadeContext { rig: &rig, environment: &env, eye: Vec3::new(0.0, 0.0, 10.0) };
        let mut m = Material::default_pbr();
        m.double_sided = true;
        let front = shade_vertex(&ctx, Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), m.color, &m);
        let back = shade_vertex(&ctx, Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), m.color, &m);
        assert!((luminance(front) - luminance(back)).abs() < 1e-5);
    }

    #[test]
    fn test_emissive_glows_without_light() {
        let rig = LightRig::from_settings(&LightingSettings {
            ambient: crate::config::LightSpec::new(Rgb::WHITE, 0.0),
            hemisphere: crate::config::LightSpec::new(Rgb::WHITE, 0.0),
            key: crate::config::LightSpec::new(Rgb::WHITE, 0.0),
            fill: crate::config::LightSpec::new(Rgb::WHITE, 0.0),
            rim: crate::config::LightSpec::new(Rgb::WHITE, 0.0),
            accent: crate::config::LightSpec::new(Rgb::WHITE, 0.0),
            shadows: false,
        });
        let env = EnvironmentPreset::of(Environment::Night);
        let ctx = ShadeContext { rig: &rig, environment: &env, eye: Vec3::new(0.0, 0.0, 10.0) };
        let mut m = Material::new("glow", Rgb::BLACK);
        m.roughness = 1.0;
        m.emissive = Rgb::new(1.0, 0.0, 0.0);
        let c = shade_vertex(&ctx, Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), m.color, &m);
        assert!(c.r > 0.99 && c.g < 0.01);
    }
}
