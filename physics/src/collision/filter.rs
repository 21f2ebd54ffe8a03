use crate::bitmask_flags::LayerMask;

/// Category/filter layer pair deciding which colliders may touch.
///
/// Two filters collide when each one's category intersects the other's filter.
/// An empty category or an empty filter never collides with anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollisionFilter {
    pub category: LayerMask,
    pub filter: LayerMask,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            category: LayerMask::with_layers(&[0]),
            filter: LayerMask::all(),
        }
    }
}

impl CollisionFilter {
    pub fn new(category: LayerMask, filter: LayerMask) -> Self {
        Self { category, filter }
    }

    /// A filter that collides with nothing.
    pub fn none() -> Self {
        Self {
            category: LayerMask::empty(),
            filter: LayerMask::empty(),
        }
    }

    #[inline]
    pub fn collides(&self, other: &CollisionFilter) -> bool {
        self.category.intersects(&other.filter) && other.category.intersects(&self.filter)
    }

    #[inline]
    pub fn collides_not(&self) -> bool {
        self.category.is_empty() || self.filter.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_is_symmetric_and_needs_both_sides() {
        let a = CollisionFilter::new(LayerMask::with_layers(&[1]), LayerMask::with_layers(&[2]));
        let b = CollisionFilter::new(LayerMask::with_layers(&[2]), LayerMask::with_layers(&[1]));
        let c = CollisionFilter::new(LayerMask::with_layers(&[2]), LayerMask::with_layers(&[3]));

        assert!(a.collides(&b));
        assert!(b.collides(&a));
        assert!(!a.collides(&c));
        assert!(!c.collides(&a));
    }

    #[test]
    fn empty_filter_collides_not() {
        assert!(CollisionFilter::none().collides_not());
        assert!(!CollisionFilter::default().collides_not());
        assert!(!CollisionFilter::none().collides(&CollisionFilter::default()));
    }
}
