//! Discrete sensor orientations.
//!
//! Every orientation is a composition of roll, pitch and yaw in 45 degree
//! steps, so rotating is done with swaps, sign flips and, for the odd steps,
//! a multiplication by `1/sqrt(2)`. No trigonometry is evaluated at runtime.

use core::f32::consts::FRAC_1_SQRT_2;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Orientation of a sensor relative to the vehicle body frame.
///
/// The codes match the orientation codes used for mounting tags on the rest of
/// the platform. Code 38 (roll 90, pitch 68, yaw 293) is not axis aligned and
/// is not supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Rotation {
    None = 0,
    Yaw45 = 1,
    Yaw90 = 2,
    Yaw135 = 3,
    Yaw180 = 4,
    Yaw225 = 5,
    Yaw270 = 6,
    Yaw315 = 7,
    Roll180 = 8,
    Roll180Yaw45 = 9,
    Roll180Yaw90 = 10,
    Roll180Yaw135 = 11,
    Pitch180 = 12,
    Roll180Yaw225 = 13,
    Roll180Yaw270 = 14,
    Roll180Yaw315 = 15,
    Roll90 = 16,
    Roll90Yaw45 = 17,
    Roll90Yaw90 = 18,
    Roll90Yaw135 = 19,
    Roll270 = 20,
    Roll270Yaw45 = 21,
    Roll270Yaw90 = 22,
    Roll270Yaw135 = 23,
    Pitch90 = 24,
    Pitch270 = 25,
    Pitch180Yaw90 = 26,
    Pitch180Yaw270 = 27,
    Roll90Pitch90 = 28,
    Roll180Pitch90 = 29,
    Roll270Pitch90 = 30,
    Roll90Pitch180 = 31,
    Roll270Pitch180 = 32,
    Roll90Pitch270 = 33,
    Roll180Pitch270 = 34,
    Roll270Pitch270 = 35,
    Roll90Pitch180Yaw90 = 36,
    Roll90Yaw270 = 37,
    Pitch315 = 39,
    Roll90Pitch315 = 40,
}

// `#[default]` would make num_enum map unknown codes to the default variant
impl Default for Rotation {
    fn default() -> Self {
        Self::None
    }
}

impl Rotation {
    /// Mounting of a sensor looking at the ground.
    pub const DOWNWARD_FACING: Self = Self::Pitch270;

    pub const ALL: [Self; 40] = [
        Self::None,
        Self::Yaw45,
        Self::Yaw90,
        Self::Yaw135,
        Self::Yaw180,
        Self::Yaw225,
        Self::Yaw270,
        Self::Yaw315,
        Self::Roll180,
        Self::Roll180Yaw45,
        Self::Roll180Yaw90,
        Self::Roll180Yaw135,
        Self::Pitch180,
        Self::Roll180Yaw225,
        Self::Roll180Yaw270,
        Self::Roll180Yaw315,
        Self::Roll90,
        Self::Roll90Yaw45,
        Self::Roll90Yaw90,
        Self::Roll90Yaw135,
        Self::Roll270,
        Self::Roll270Yaw45,
        Self::Roll270Yaw90,
        Self::Roll270Yaw135,
        Self::Pitch90,
        Self::Pitch270,
        Self::Pitch180Yaw90,
        Self::Pitch180Yaw270,
        Self::Roll90Pitch90,
        Self::Roll180Pitch90,
        Self::Roll270Pitch90,
        Self::Roll90Pitch180,
        Self::Roll270Pitch180,
        Self::Roll90Pitch270,
        Self::Roll180Pitch270,
        Self::Roll270Pitch270,
        Self::Roll90Pitch180Yaw90,
        Self::Roll90Yaw270,
        Self::Pitch315,
        Self::Roll90Pitch315,
    ];

    /// Roll, pitch and yaw in 45 degree steps. Applied in that order.
    const fn steps(self) -> (u8, u8, u8) {
        match self {
            Self::None => (0, 0, 0),
            Self::Yaw45 => (0, 0, 1),
            Self::Yaw90 => (0, 0, 2),
            Self::Yaw135 => (0, 0, 3),
            Self::Yaw180 => (0, 0, 4),
            Self::Yaw225 => (0, 0, 5),
            Self::Yaw270 => (0, 0, 6),
            Self::Yaw315 => (0, 0, 7),
            Self::Roll180 => (4, 0, 0),
            Self::Roll180Yaw45 => (4, 0, 1),
            Self::Roll180Yaw90 => (4, 0, 2),
            Self::Roll180Yaw135 => (4, 0, 3),
            Self::Pitch180 => (0, 4, 0),
            Self::Roll180Yaw225 => (4, 0, 5),
            Self::Roll180Yaw270 => (4, 0, 6),
            Self::Roll180Yaw315 => (4, 0, 7),
            Self::Roll90 => (2, 0, 0),
            Self::Roll90Yaw45 => (2, 0, 1),
            Self::Roll90Yaw90 => (2, 0, 2),
            Self::Roll90Yaw135 => (2, 0, 3),
            Self::Roll270 => (6, 0, 0),
            Self::Roll270Yaw45 => (6, 0, 1),
            Self::Roll270Yaw90 => (6, 0, 2),
            Self::Roll270Yaw135 => (6, 0, 3),
            Self::Pitch90 => (0, 2, 0),
            Self::Pitch270 => (0, 6, 0),
            Self::Pitch180Yaw90 => (0, 4, 2),
            Self::Pitch180Yaw270 => (0, 4, 6),
            Self::Roll90Pitch90 => (2, 2, 0),
            Self::Roll180Pitch90 => (4, 2, 0),
            Self::Roll270Pitch90 => (6, 2, 0),
            Self::Roll90Pitch180 => (2, 4, 0),
            Self::Roll270Pitch180 => (6, 4, 0),
            Self::Roll90Pitch270 => (2, 6, 0),
            Self::Roll180Pitch270 => (4, 6, 0),
            Self::Roll270Pitch270 => (6, 6, 0),
            Self::Roll90Pitch180Yaw90 => (2, 4, 2),
            Self::Roll90Yaw270 => (2, 0, 6),
            Self::Pitch315 => (0, 7, 0),
            Self::Roll90Pitch315 => (2, 7, 0),
        }
    }

    /// Rotates `(x, y, z)` from the sensor frame into the body frame.
    pub fn rotate(self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let (roll, pitch, yaw) = self.steps();
        // roll turns y towards z, pitch turns z towards x, yaw turns x towards y
        let (y, z) = turn(y, z, roll);
        let (z, x) = turn(z, x, pitch);
        let (x, y) = turn(x, y, yaw);
        (x, y, z)
    }

    pub fn rotate_vector(self, [x, y, z]: [f32; 3]) -> [f32; 3] {
        let (x, y, z) = self.rotate(x, y, z);
        [x, y, z]
    }

    /// The orientation undoing this one, if it is part of the supported set.
    pub fn inverse(self) -> Option<Self> {
        const BASIS: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        Self::ALL.into_iter().find(|candidate| {
            BASIS.iter().all(|&axis| {
                let back = candidate.rotate_vector(self.rotate_vector(axis));
                back.iter().zip(axis.iter()).all(|(a, b)| {
                    let error = a - b;
                    error < 1e-6 && error > -1e-6
                })
            })
        })
    }
}

/// Rotates the `(a, b)` plane by `steps * 45` degrees, turning `a` towards `b`.
fn turn(a: f32, b: f32, steps: u8) -> (f32, f32) {
    match steps % 8 {
        0 => (a, b),
        1 => (FRAC_1_SQRT_2 * (a - b), FRAC_1_SQRT_2 * (a + b)),
        2 => (-b, a),
        3 => (-FRAC_1_SQRT_2 * (a + b), FRAC_1_SQRT_2 * (a - b)),
        4 => (-a, -b),
        5 => (FRAC_1_SQRT_2 * (b - a), -FRAC_1_SQRT_2 * (a + b)),
        6 => (b, -a),
        _ => (FRAC_1_SQRT_2 * (a + b), FRAC_1_SQRT_2 * (b - a)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: (f32, f32, f32), b: (f32, f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-5 && (a.1 - b.1).abs() < 1e-5 && (a.2 - b.2).abs() < 1e-5
    }

    #[test]
    fn codes_round_trip() {
        for rotation in Rotation::ALL {
            let code: u8 = rotation.into();
            assert_eq!(Rotation::try_from(code), Ok(rotation));
        }
        assert!(Rotation::try_from(38).is_err());
        assert!(Rotation::try_from(41).is_err());
        assert_eq!(Rotation::try_from(25), Ok(Rotation::DOWNWARD_FACING));
    }

    #[test]
    fn yaw_rotations() {
        assert_eq!(Rotation::None.rotate(1.0, 2.0, 3.0), (1.0, 2.0, 3.0));
        assert_eq!(Rotation::Yaw90.rotate(1.0, 2.0, 3.0), (-2.0, 1.0, 3.0));
        assert_eq!(Rotation::Yaw180.rotate(1.0, 2.0, 3.0), (-1.0, -2.0, 3.0));
        assert_eq!(Rotation::Yaw270.rotate(1.0, 2.0, 3.0), (2.0, -1.0, 3.0));
        assert!(approx(
            Rotation::Yaw45.rotate(1.0, 0.0, 0.0),
            (FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0)
        ));
        assert!(approx(
            Rotation::Yaw315.rotate(1.0, 0.0, 0.0),
            (FRAC_1_SQRT_2, -FRAC_1_SQRT_2, 0.0)
        ));
    }

    #[test]
    fn roll_and_pitch_rotations() {
        assert_eq!(Rotation::Roll90.rotate(1.0, 2.0, 3.0), (1.0, -3.0, 2.0));
        assert_eq!(Rotation::Roll180.rotate(1.0, 2.0, 3.0), (1.0, -2.0, -3.0));
        assert_eq!(Rotation::Roll270.rotate(1.0, 2.0, 3.0), (1.0, 3.0, -2.0));
        assert_eq!(Rotation::Pitch90.rotate(1.0, 2.0, 3.0), (3.0, 2.0, -1.0));
        assert_eq!(Rotation::Pitch180.rotate(1.0, 2.0, 3.0), (-1.0, 2.0, -3.0));
        assert_eq!(Rotation::Pitch270.rotate(1.0, 2.0, 3.0), (-3.0, 2.0, 1.0));
        // roll first, then yaw
        assert_eq!(Rotation::Roll90Yaw90.rotate(1.0, 2.0, 3.0), (3.0, 1.0, 2.0));
    }

    #[test]
    fn equivalent_compositions_agree() {
        let v = (0.25, -1.5, 4.0);
        assert_eq!(
            Rotation::Roll180Yaw90.rotate(v.0, v.1, v.2),
            Rotation::Pitch180Yaw270.rotate(v.0, v.1, v.2)
        );
        assert_eq!(
            Rotation::Roll180Yaw270.rotate(v.0, v.1, v.2),
            Rotation::Pitch180Yaw90.rotate(v.0, v.1, v.2)
        );
    }

    #[test]
    fn zero_stays_zero() {
        for rotation in Rotation::ALL {
            let (x, y, z) = rotation.rotate(0.0, 0.0, 0.0);
            assert_eq!((x, y, z), (0.0, 0.0, 0.0), "{rotation:?}");
        }
    }

    #[test]
    fn preserves_length() {
        for rotation in Rotation::ALL {
            let (x, y, z) = rotation.rotate(0.3, -0.4, 1.2);
            let norm = (x * x + y * y + z * z).sqrt();
            assert!((norm - 1.3).abs() < 1e-5, "{rotation:?}");
        }
    }

    #[test]
    fn inverse_restores_vector() {
        let v = (0.125, -2.5, 7.0);
        for rotation in Rotation::ALL {
            let Some(inverse) = rotation.inverse() else {
                continue;
            };
            let (x, y, z) = rotation.rotate(v.0, v.1, v.2);
            let back = inverse.rotate(x, y, z);
            let (roll, pitch, yaw) = rotation.steps();
            if roll % 2 == 0 && pitch % 2 == 0 && yaw % 2 == 0 {
                assert_eq!(back, v, "{rotation:?}");
            } else {
                assert!(approx(back, v), "{rotation:?}");
            }
        }
    }

    #[test]
    fn known_inverses() {
        assert_eq!(Rotation::None.inverse(), Some(Rotation::None));
        assert_eq!(Rotation::Yaw90.inverse(), Some(Rotation::Yaw270));
        assert_eq!(Rotation::Yaw45.inverse(), Some(Rotation::Yaw315));
        assert_eq!(Rotation::Roll90.inverse(), Some(Rotation::Roll270));
        assert_eq!(Rotation::Pitch90.inverse(), Some(Rotation::Pitch270));
        assert_eq!(Rotation::Yaw180.inverse(), Some(Rotation::Yaw180));
        assert_eq!(Rotation::Roll180Yaw45.inverse(), Some(Rotation::Roll180Yaw45));
    }
}
