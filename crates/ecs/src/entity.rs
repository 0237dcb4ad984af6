use std::fmt;

/// Stable identity for an entity: a slot index plus the generation the slot
/// had when the entity was created. Reusing a slot bumps its generation, so
/// handles held across a removal compare unequal to the new occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub index: u32,
    pub generation: u32,
}

impl Entity {
    pub const NULL: Entity = Entity {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn is_null(self) -> bool {
        self.index == u32::MAX || self.generation == u32::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.index, self.generation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_semantics() {
        assert!(Entity::NULL.is_null());
        assert!(Entity::new(u32::MAX, 0).is_null());
        assert!(Entity::new(0, u32::MAX).is_null());
        assert!(!Entity::new(0, 0).is_null());
        assert_eq!(Entity::default(), Entity::NULL);
    }
}
