use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use std::f64::consts::{PI, TAU};

/// Wraps an angle in radians into the half-open interval `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut wrapped = angle % TAU;
    if wrapped > PI {
        wrapped -= TAU;
    } else if wrapped <= -PI {
        wrapped += TAU;
    }
    wrapped
}

/// Applies an infinitesimal rotation, given as a rotation vector (axis scaled by
/// angle in radians), to an orientation by pre-multiplication.
pub fn quaternion_increment(orientation: &mut UnitQuaternion<f64>, rotation: &Vector3<f64>) {
    let delta = UnitQuaternion::from_scaled_axis(*rotation);
    *orientation = delta * *orientation;
    orientation.renormalize();
}

/// Draws an orientation uniformly from SO(3) (Shoemake's subgroup algorithm).
pub fn random_orientation<R: Rng + ?Sized>(rng: &mut R) -> UnitQuaternion<f64> {
    let u1: f64 = rng.gen_range(0.0..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let u3: f64 = rng.gen_range(0.0..1.0);

    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    let q = Quaternion::new(
        b * (TAU * u3).cos(),
        a * (TAU * u2).sin(),
        a * (TAU * u2).cos(),
        b * (TAU * u3).sin(),
    );
    UnitQuaternion::from_quaternion(q)
}

pub fn random_in_box<R: Rng + ?Sized>(
    corner1: &Vector3<f64>,
    corner2: &Vector3<f64>,
    rng: &mut R,
) -> Vector3<f64> {
    Vector3::from_fn(|i, _| {
        let t: f64 = rng.gen_range(0.0..1.0);
        corner1[i] + (corner2[i] - corner1[i]) * t
    })
}

pub fn random_angle<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    normalize_angle(rng.gen_range(-PI..PI))
}
