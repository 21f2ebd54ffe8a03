//! Packing of collider ownership into backend `user_data`.
//!
//! Every backend rigid body and collision object carries the id of the collider (and
//! bone) that owns it, so contact filtering can map backend pairs back to colliders.
//!
//! # Bit layout
//! `user_data` is a `u128` (least-significant bit = bit 0):
//!
//! - bits 0..=31   : collider slot index
//! - bits 32..=63  : collider generation
//! - bits 64..=95  : bone index + 1 (0 = the collider's simple body)
//! - bit  127      : owned marker; backend objects without it (the ground anchor) are unowned

use crate::collider::ColliderId;

const OWNED: u128 = 1 << 127;

/// The collider and optional bone a backend object belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyOwner {
    pub collider: ColliderId,
    pub bone: Option<usize>,
}

impl BodyOwner {
    pub fn new(collider: ColliderId, bone: Option<usize>) -> Self {
        Self { collider, bone }
    }
}

pub fn pack_owner(owner: BodyOwner) -> u128 {
    let bone = owner.bone.map_or(0, |b| (b as u128 + 1) & 0xffff_ffff);
    OWNED
        | u128::from(owner.collider.index())
        | (u128::from(owner.collider.generation()) << 32)
        | (bone << 64)
}

/// Inverse of [`pack_owner`]; `None` for unowned backend objects.
pub fn unpack_owner(data: u128) -> Option<BodyOwner> {
    if data & OWNED == 0 {
        return None;
    }
    let index = (data & 0xffff_ffff) as u32;
    let generation = ((data >> 32) & 0xffff_ffff) as u32;
    let bone = ((data >> 64) & 0xffff_ffff) as usize;
    Some(BodyOwner {
        collider: ColliderId::new(index, generation),
        bone: bone.checked_sub(1),
    })
}
