//! Dynamics modifiers: per-particle forces and spins accumulated every frame
//!
//! Accumulating modifiers add into Acceleration or an angular velocity channel,
//! which the owning [`super::DynamicsInfluencer`] clears before they run and
//! integrates afterwards. FaceDirection overwrites the rotation instead.

use crate::channels::{
    ChannelDescriptor, ACCELERATION, ANGULAR_VELOCITY_2D, ANGULAR_VELOCITY_3D, LIFE,
    LIFE_PERCENT_OFFSET, POSITION, ROTATION_3D, W_OFFSET, X_OFFSET, Y_OFFSET, Z_OFFSET,
};
use crate::controller::ControllerState;
use crate::influencers::interpolation::{bound, AngularTrack, LifetimeTrack};
use crate::store::ChannelHandle;
use crate::values::ScaledNumericValue;
use ember_core::Result;
use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

#[inline]
fn read3(data: &[f32], i: usize) -> Vec3 {
    let k = i * 3;
    Vec3::new(data[k + X_OFFSET], data[k + Y_OFFSET], data[k + Z_OFFSET])
}

#[inline]
fn add3(data: &mut [f32], i: usize, v: Vec3) {
    let k = i * 3;
    data[k + X_OFFSET] += v.x;
    data[k + Y_OFFSET] += v.y;
    data[k + Z_OFFSET] += v.z;
}

#[inline]
fn life_percent(life: &[f32], i: usize) -> f32 {
    life[i * LIFE.stride + LIFE_PERCENT_OFFSET]
}

fn bind(state: &mut ControllerState, descriptor: &ChannelDescriptor) -> Result<Option<ChannelHandle>> {
    Ok(Some(state.particles.add_channel(descriptor)?))
}

/// Channels a strength-based modifier resolved at allocation
#[derive(Debug, Clone, Copy, Default)]
struct ModifierChannels {
    life: Option<ChannelHandle>,
    position: Option<ChannelHandle>,
    output: Option<ChannelHandle>,
}

/// A modifier whose magnitude follows a curve over each particle's life
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthModifier {
    pub strength: LifetimeTrack,
    /// Work in world space instead of the controller's frame
    pub global: bool,
    #[serde(skip)]
    channels: ModifierChannels,
}

impl StrengthModifier {
    pub fn new(strength: ScaledNumericValue) -> Self {
        Self {
            strength: LifetimeTrack::new(strength),
            global: false,
            channels: ModifierChannels::default(),
        }
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    fn copy(&self) -> Self {
        Self {
            strength: self.strength.copy(),
            global: self.global,
            channels: ModifierChannels::default(),
        }
    }

    fn allocate(&mut self, state: &mut ControllerState) -> Result<()> {
        self.strength.value.validate("strength")?;
        self.channels.life = Some(state.particles.add_channel(&LIFE)?);
        self.strength.allocate(&mut state.particles);
        Ok(())
    }
}

/// A strength modifier with a direction given as two angles over life
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AngularModifier {
    #[serde(flatten)]
    pub base: StrengthModifier,
    pub angle: AngularTrack,
}

impl AngularModifier {
    pub fn new(strength: ScaledNumericValue, theta: ScaledNumericValue, phi: ScaledNumericValue) -> Self {
        Self {
            base: StrengthModifier::new(strength),
            angle: AngularTrack::new(theta, phi),
        }
    }

    pub fn global(mut self, global: bool) -> Self {
        self.base.global = global;
        self
    }

    fn copy(&self) -> Self {
        Self {
            base: self.base.copy(),
            angle: self.angle.copy(),
        }
    }

    fn allocate(&mut self, state: &mut ControllerState) -> Result<()> {
        self.base.allocate(state)?;
        self.angle.theta.validate("theta")?;
        self.angle.phi.validate("phi")?;
        self.angle.allocate(&mut state.particles);
        Ok(())
    }

    fn activate(&self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        self.base.strength.activate(state, start, count)?;
        self.angle.activate(state, start, count)
    }
}

/// Orients each particle's Rotation3D so its local Z follows its acceleration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceDirection {
    #[serde(skip)]
    rotation: Option<ChannelHandle>,
    #[serde(skip)]
    acceleration: Option<ChannelHandle>,
}

/// One dynamics law, tagged by `type` in effect files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DynamicsModifier {
    FaceDirection(FaceDirection),
    /// Degrees per second about Z
    #[serde(rename = "rotational_2d")]
    Rotational2D(StrengthModifier),
    /// Degrees per second about the axis given by the angles
    #[serde(rename = "rotational_3d")]
    Rotational3D(AngularModifier),
    /// Pushes away from the center (negative strength pulls in)
    CentripetalAcceleration(StrengthModifier),
    /// Along the direction given by the angles
    PolarAcceleration(AngularModifier),
    /// Perpendicular to both the direction and the particle's radius vector
    TangentialAcceleration(AngularModifier),
    /// Along a fresh random direction every frame
    BrownianAcceleration(StrengthModifier),
}

impl DynamicsModifier {
    pub fn face_direction() -> Self {
        Self::FaceDirection(FaceDirection::default())
    }

    pub fn rotational_2d(strength: ScaledNumericValue) -> Self {
        Self::Rotational2D(StrengthModifier::new(strength))
    }

    pub fn rotational_3d(strength: ScaledNumericValue, theta: ScaledNumericValue, phi: ScaledNumericValue) -> Self {
        Self::Rotational3D(AngularModifier::new(strength, theta, phi))
    }

    pub fn centripetal(strength: ScaledNumericValue) -> Self {
        Self::CentripetalAcceleration(StrengthModifier::new(strength))
    }

    pub fn polar(strength: ScaledNumericValue, theta: ScaledNumericValue, phi: ScaledNumericValue) -> Self {
        Self::PolarAcceleration(AngularModifier::new(strength, theta, phi))
    }

    pub fn tangential(strength: ScaledNumericValue, theta: ScaledNumericValue, phi: ScaledNumericValue) -> Self {
        Self::TangentialAcceleration(AngularModifier::new(strength, theta, phi))
    }

    pub fn brownian(strength: ScaledNumericValue) -> Self {
        Self::BrownianAcceleration(StrengthModifier::new(strength))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FaceDirection(_) => "face_direction",
            Self::Rotational2D(_) => "rotational_2d",
            Self::Rotational3D(_) => "rotational_3d",
            Self::CentripetalAcceleration(_) => "centripetal_acceleration",
            Self::PolarAcceleration(_) => "polar_acceleration",
            Self::TangentialAcceleration(_) => "tangential_acceleration",
            Self::BrownianAcceleration(_) => "brownian_acceleration",
        }
    }

    pub fn copy(&self) -> Self {
        match self {
            Self::FaceDirection(_) => Self::face_direction(),
            Self::Rotational2D(m) => Self::Rotational2D(m.copy()),
            Self::Rotational3D(m) => Self::Rotational3D(m.copy()),
            Self::CentripetalAcceleration(m) => Self::CentripetalAcceleration(m.copy()),
            Self::PolarAcceleration(m) => Self::PolarAcceleration(m.copy()),
            Self::TangentialAcceleration(m) => Self::TangentialAcceleration(m.copy()),
            Self::BrownianAcceleration(m) => Self::BrownianAcceleration(m.copy()),
        }
    }

    pub fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        match self {
            Self::FaceDirection(m) => {
                m.rotation = bind(state, &ROTATION_3D)?;
                m.acceleration = bind(state, &ACCELERATION)?;
            }
            Self::Rotational2D(m) => {
                m.allocate(state)?;
                m.channels.output = bind(state, &ANGULAR_VELOCITY_2D)?;
            }
            Self::Rotational3D(m) => {
                m.allocate(state)?;
                m.base.channels.output = bind(state, &ANGULAR_VELOCITY_3D)?;
            }
            Self::CentripetalAcceleration(m) => {
                m.allocate(state)?;
                m.channels.position = bind(state, &POSITION)?;
                m.channels.output = bind(state, &ACCELERATION)?;
            }
            Self::BrownianAcceleration(m) => {
                m.allocate(state)?;
                m.channels.output = bind(state, &ACCELERATION)?;
            }
            Self::PolarAcceleration(m) | Self::TangentialAcceleration(m) => {
                m.allocate(state)?;
                m.base.channels.position = bind(state, &POSITION)?;
                m.base.channels.output = bind(state, &ACCELERATION)?;
            }
        }
        Ok(())
    }

    pub fn activate_particles(&self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        match self {
            Self::FaceDirection(_) => Ok(()),
            Self::Rotational2D(m) | Self::CentripetalAcceleration(m) | Self::BrownianAcceleration(m) => {
                m.strength.activate(state, start, count)
            }
            Self::Rotational3D(m) | Self::PolarAcceleration(m) | Self::TangentialAcceleration(m) => {
                m.activate(state, start, count)
            }
        }
    }

    pub fn update(&self, state: &mut ControllerState) -> Result<()> {
        match self {
            Self::FaceDirection(m) => face_direction(m, state),
            Self::Rotational2D(m) => rotational_2d(m, state),
            Self::Rotational3D(m) => rotational_3d(m, state),
            Self::CentripetalAcceleration(m) => centripetal(m, state),
            Self::PolarAcceleration(m) => polar(m, state),
            Self::TangentialAcceleration(m) => tangential(m, state),
            Self::BrownianAcceleration(m) => brownian(m, state),
        }
    }
}

fn face_direction(m: &FaceDirection, state: &mut ControllerState) -> Result<()> {
    let rotation = bound(m.rotation, "face direction rotation")?;
    let acceleration = bound(m.acceleration, "face direction acceleration")?;
    let size = state.particles.size();
    let [rot, acc] = state.particles.floats_many_mut([rotation, acceleration])?;
    for i in 0..size {
        let z = read3(acc, i).normalize_or_zero();
        if z == Vec3::ZERO {
            continue;
        }
        let up = if z.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };
        let y = z.cross(up).normalize().cross(z).normalize();
        let x = y.cross(z);
        let q = Quat::from_mat3(&Mat3::from_cols(x, y, z));
        let k = i * ROTATION_3D.stride;
        rot[k + X_OFFSET] = q.x;
        rot[k + Y_OFFSET] = q.y;
        rot[k + Z_OFFSET] = q.z;
        rot[k + W_OFFSET] = q.w;
    }
    Ok(())
}

fn rotational_2d(m: &StrengthModifier, state: &mut ControllerState) -> Result<()> {
    let life = bound(m.channels.life, "rotational life")?;
    let output = bound(m.channels.output, "angular velocity 2d")?;
    let size = state.particles.size();
    let [life, strength, velocity] = state.particles.floats_many_mut([life, m.strength.channel()?, output])?;
    for i in 0..size {
        velocity[i] += m.strength.at(strength, i, life_percent(life, i));
    }
    Ok(())
}

fn rotational_3d(m: &AngularModifier, state: &mut ControllerState) -> Result<()> {
    let base = &m.base;
    let life = bound(base.channels.life, "rotational life")?;
    let output = bound(base.channels.output, "angular velocity 3d")?;
    let size = state.particles.size();
    let [life, strength, angle, velocity] =
        state
            .particles
            .floats_many_mut([life, base.strength.channel()?, m.angle.channel()?, output])?;
    for i in 0..size {
        let lp = life_percent(life, i);
        let axis = m.angle.direction(angle, i, lp);
        add3(velocity, i, axis * base.strength.at(strength, i, lp).to_radians());
    }
    Ok(())
}

fn centripetal(m: &StrengthModifier, state: &mut ControllerState) -> Result<()> {
    let center = if m.global { state.origin() } else { Vec3::ZERO };
    let life = bound(m.channels.life, "centripetal life")?;
    let position = bound(m.channels.position, "centripetal position")?;
    let output = bound(m.channels.output, "acceleration")?;
    let size = state.particles.size();
    let [life, strength, pos, acc] =
        state
            .particles
            .floats_many_mut([life, m.strength.channel()?, position, output])?;
    for i in 0..size {
        let dir = (read3(pos, i) - center).normalize_or_zero();
        add3(acc, i, dir * m.strength.at(strength, i, life_percent(life, i)));
    }
    Ok(())
}

/// Angle-derived direction, rotated into the controller's frame unless global
fn oriented(global: bool, rotation: Quat, dir: Vec3) -> Vec3 {
    if global {
        dir
    } else {
        rotation * dir
    }
}

fn controller_rotation(state: &ControllerState) -> Quat {
    let (_, rotation, _) = state.transform.to_scale_rotation_translation();
    rotation
}

fn polar(m: &AngularModifier, state: &mut ControllerState) -> Result<()> {
    let base = &m.base;
    let rotation = controller_rotation(state);
    let life = bound(base.channels.life, "polar life")?;
    let output = bound(base.channels.output, "acceleration")?;
    let size = state.particles.size();
    let [life, strength, angle, acc] =
        state
            .particles
            .floats_many_mut([life, base.strength.channel()?, m.angle.channel()?, output])?;
    for i in 0..size {
        let lp = life_percent(life, i);
        let dir = oriented(base.global, rotation, m.angle.direction(angle, i, lp)).normalize_or_zero();
        add3(acc, i, dir * base.strength.at(strength, i, lp));
    }
    Ok(())
}

fn tangential(m: &AngularModifier, state: &mut ControllerState) -> Result<()> {
    let base = &m.base;
    let rotation = controller_rotation(state);
    let life = bound(base.channels.life, "tangential life")?;
    let position = bound(base.channels.position, "tangential position")?;
    let output = bound(base.channels.output, "acceleration")?;
    let size = state.particles.size();
    let [life, strength, angle, pos, acc] = state.particles.floats_many_mut([
        life,
        base.strength.channel()?,
        m.angle.channel()?,
        position,
        output,
    ])?;
    for i in 0..size {
        let lp = life_percent(life, i);
        let axis = oriented(base.global, rotation, m.angle.direction(angle, i, lp));
        let dir = axis.cross(read3(pos, i)).normalize_or_zero();
        add3(acc, i, dir * base.strength.at(strength, i, lp));
    }
    Ok(())
}

fn brownian(m: &StrengthModifier, state: &mut ControllerState) -> Result<()> {
    let life = bound(m.channels.life, "brownian life")?;
    let output = bound(m.channels.output, "acceleration")?;
    let size = state.particles.size();
    let [life, strength, acc] = state.particles.floats_many_mut([life, m.strength.channel()?, output])?;
    for i in 0..size {
        let dir = state.rng.random_direction();
        add3(acc, i, dir * m.strength.at(strength, i, life_percent(life, i)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influencers::interpolation::spherical_direction;
    use glam::Mat4;

    /// Allocate `modifier`, spawn `positions`, and run one activation plus update.
    fn run(modifier: &mut DynamicsModifier, state: &mut ControllerState, positions: &[Vec3]) {
        modifier.allocate_channels(state).unwrap();
        let count = positions.len();
        state.particles.grow_size(count);
        if let Some(handle) = state.particles.get_channel(&POSITION) {
            let data = state.particles.floats_mut(handle).unwrap();
            for (i, p) in positions.iter().enumerate() {
                data[i * 3..i * 3 + 3].copy_from_slice(&p.to_array());
            }
        }
        modifier.activate_particles(state, 0, count).unwrap();
        modifier.update(state).unwrap();
    }

    fn channel3(state: &ControllerState, descriptor: &ChannelDescriptor, i: usize) -> Vec3 {
        let handle = state.particles.get_channel(descriptor).unwrap();
        read3(state.particles.floats(handle).unwrap(), i)
    }

    fn constant(v: f32) -> ScaledNumericValue {
        ScaledNumericValue::constant(v)
    }

    #[test]
    fn rotational_2d_accumulates_strength() {
        let mut first = DynamicsModifier::rotational_2d(constant(30.0));
        let mut second = DynamicsModifier::rotational_2d(constant(15.0));
        let mut state = ControllerState::new(1, 1);
        first.allocate_channels(&mut state).unwrap();
        second.allocate_channels(&mut state).unwrap();
        state.particles.grow_size(1);
        first.activate_particles(&mut state, 0, 1).unwrap();
        second.activate_particles(&mut state, 0, 1).unwrap();
        first.update(&mut state).unwrap();
        second.update(&mut state).unwrap();
        let handle = state.particles.get_channel(&ANGULAR_VELOCITY_2D).unwrap();
        assert!((state.particles.floats(handle).unwrap()[0] - 45.0).abs() < 1e-5);
    }

    #[test]
    fn rotational_3d_converts_degrees_to_radians() {
        let mut modifier = DynamicsModifier::rotational_3d(constant(180.0), constant(0.0), constant(0.0));
        let mut state = ControllerState::new(1, 1);
        run(&mut modifier, &mut state, &[Vec3::ZERO]);
        let velocity = channel3(&state, &ANGULAR_VELOCITY_3D, 0);
        assert!((velocity - Vec3::Y * std::f32::consts::PI).length() < 1e-5);
    }

    #[test]
    fn rotational_3d_axis_for_ninety_degree_phi() {
        let mut modifier = DynamicsModifier::rotational_3d(constant(1.0), constant(0.0), constant(90.0));
        let mut state = ControllerState::new(1, 1);
        run(&mut modifier, &mut state, &[Vec3::ZERO]);
        let velocity = channel3(&state, &ANGULAR_VELOCITY_3D, 0);
        let expected = spherical_direction(0.0, 90.0) * 1f32.to_radians();
        assert!((velocity - expected).length() < 1e-6);
        assert!((expected.normalize() - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn centripetal_pushes_away_from_origin() {
        let mut modifier = DynamicsModifier::centripetal(constant(2.0));
        let mut state = ControllerState::new(2, 1);
        run(&mut modifier, &mut state, &[Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -0.5)]);
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
        assert!((channel3(&state, &ACCELERATION, 1) - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-6);
    }

    #[test]
    fn centripetal_global_center_follows_transform() {
        let mut global = DynamicsModifier::CentripetalAcceleration(StrengthModifier::new(constant(1.0)).global(true));
        let mut state = ControllerState::new(1, 1);
        state.transform = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        run(&mut global, &mut state, &[Vec3::new(4.0, 0.0, 0.0)]);
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::NEG_X).length() < 1e-6);

        let mut local = DynamicsModifier::centripetal(constant(1.0));
        let mut state = ControllerState::new(1, 1);
        state.transform = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        run(&mut local, &mut state, &[Vec3::new(4.0, 0.0, 0.0)]);
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn polar_follows_angles() {
        let mut modifier = DynamicsModifier::polar(constant(3.0), constant(90.0), constant(90.0));
        let mut state = ControllerState::new(1, 1);
        run(&mut modifier, &mut state, &[Vec3::ZERO]);
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::Z * 3.0).length() < 1e-5);
    }

    #[test]
    fn polar_rotates_with_controller_unless_global() {
        let turn = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let mut local = DynamicsModifier::polar(constant(1.0), constant(0.0), constant(90.0));
        let mut state = ControllerState::new(1, 1);
        state.transform = turn;
        run(&mut local, &mut state, &[Vec3::ZERO]);
        // +X turned a quarter about Y is -Z
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::NEG_Z).length() < 1e-5);

        let mut global = DynamicsModifier::PolarAcceleration(
            AngularModifier::new(constant(1.0), constant(0.0), constant(90.0)).global(true),
        );
        let mut state = ControllerState::new(1, 1);
        state.transform = turn;
        run(&mut global, &mut state, &[Vec3::ZERO]);
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn tangential_is_perpendicular_to_axis_and_radius() {
        let mut modifier = DynamicsModifier::TangentialAcceleration(
            AngularModifier::new(constant(2.0), constant(0.0), constant(0.0)).global(true),
        );
        let mut state = ControllerState::new(1, 1);
        run(&mut modifier, &mut state, &[Vec3::new(1.0, 0.0, 0.0)]);
        // Y x X = -Z
        assert!((channel3(&state, &ACCELERATION, 0) - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn brownian_has_strength_magnitude() {
        let mut modifier = DynamicsModifier::brownian(constant(4.0));
        let mut state = ControllerState::new(8, 21);
        run(&mut modifier, &mut state, &[Vec3::ZERO; 8]);
        for i in 0..8 {
            assert!((channel3(&state, &ACCELERATION, i).length() - 4.0).abs() < 1e-4);
        }
    }

    #[test]
    fn face_direction_aligns_z_with_acceleration() {
        let mut modifier = DynamicsModifier::face_direction();
        let mut state = ControllerState::new(2, 1);
        modifier.allocate_channels(&mut state).unwrap();
        state.particles.grow_size(2);
        let acc = state.particles.get_channel(&ACCELERATION).unwrap();
        state.particles.floats_mut(acc).unwrap()[..3].copy_from_slice(&[1.0, 0.0, 0.0]);
        modifier.update(&mut state).unwrap();

        let rot = state.particles.get_channel(&ROTATION_3D).unwrap();
        let data = state.particles.floats(rot).unwrap();
        let q = Quat::from_xyzw(data[0], data[1], data[2], data[3]);
        assert!((q * Vec3::Z - Vec3::X).length() < 1e-5);
        // Zero acceleration leaves the identity rotation alone
        assert_eq!(&data[4..8], &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn face_direction_handles_vertical_acceleration() {
        let mut modifier = DynamicsModifier::face_direction();
        let mut state = ControllerState::new(1, 1);
        modifier.allocate_channels(&mut state).unwrap();
        state.particles.grow_size(1);
        let acc = state.particles.get_channel(&ACCELERATION).unwrap();
        state.particles.floats_mut(acc).unwrap()[..3].copy_from_slice(&[0.0, -9.8, 0.0]);
        modifier.update(&mut state).unwrap();
        let rot = state.particles.get_channel(&ROTATION_3D).unwrap();
        let data = state.particles.floats(rot).unwrap();
        let q = Quat::from_xyzw(data[0], data[1], data[2], data[3]);
        assert!(q.is_finite());
        assert!((q * Vec3::Z - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn toml_tags_name_each_law() {
        let modifier = DynamicsModifier::rotational_2d(constant(1.0));
        let text = toml::to_string(&modifier).unwrap();
        assert!(text.contains("type = \"rotational_2d\""));
        let back: DynamicsModifier = toml::from_str(&text).unwrap();
        assert_eq!(back.kind(), "rotational_2d");
    }
}
