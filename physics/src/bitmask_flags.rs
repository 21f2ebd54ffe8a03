use num_traits::{One, PrimInt};

/// Default storage for collision layer masks.
pub type LayerBits = u64;

/// A set of numbered collision layers packed into an integer.
///
/// Layer `i` is bit `1 << i`. Indices beyond the storage width are ignored rather than
/// wrapping into low bits.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerMask<T: PrimInt = LayerBits> {
    pub bits: T,
}

impl<T: PrimInt> LayerMask<T> {
    pub fn new(bits: T) -> Self {
        Self { bits }
    }

    /// A mask with every layer set.
    pub fn all() -> Self {
        Self { bits: !T::zero() }
    }

    pub fn empty() -> Self {
        Self { bits: T::zero() }
    }

    fn bit(layer: u8) -> Option<T> {
        let width = T::zero().count_zeros();
        (u32::from(layer) < width).then(|| T::one() << usize::from(layer))
    }

    // --- Single Layer Operations ---
    pub fn add(&mut self, layer: u8) {
        if let Some(bit) = Self::bit(layer) {
            self.bits = self.bits | bit;
        }
    }

    pub fn remove(&mut self, layer: u8) {
        if let Some(bit) = Self::bit(layer) {
            self.bits = self.bits & !bit;
        }
    }

    pub fn has(&self, layer: u8) -> bool {
        Self::bit(layer).is_some_and(|bit| (self.bits & bit) != T::zero())
    }

    // --- Mask Operations ---
    pub fn with_layers(layers: &[u8]) -> Self {
        let mut mask = Self::empty();
        for &layer in layers {
            mask.add(layer);
        }
        mask
    }

    pub fn intersects(&self, other: &Self) -> bool {
        (self.bits & other.bits) != T::zero()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == T::zero()
    }

    pub fn len(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn clear(&mut self) {
        self.bits = T::zero();
    }
}

impl<T: PrimInt> LayerMask<T> {
    /// True if exactly one layer is set.
    pub fn is_single(&self) -> bool {
        self.len() == 1 && (self.bits & (self.bits - T::one())) == T::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_beyond_width_are_ignored() {
        let mut m: LayerMask<u8> = LayerMask::empty();
        m.add(3);
        m.add(9);
        assert_eq!(m.bits, 0b1000);
        assert!(m.has(3));
        assert!(!m.has(9));
    }

    #[test]
    fn intersection_and_single() {
        let a: LayerMask = LayerMask::with_layers(&[0, 5]);
        let b: LayerMask = LayerMask::with_layers(&[5]);
        assert!(a.intersects(&b));
        assert!(b.is_single());
        assert!(!a.is_single());
        assert!(!LayerMask::<u64>::empty().intersects(&LayerMask::all()));
    }
}
