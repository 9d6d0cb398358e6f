use core::fmt;

/// Category of a live scene object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    Unit,
    Feature,
    /// Projectiles have no definition and no pieces; only a world transform.
    Projectile,
}

/// Identity of a live scene object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub id: u32,
}

impl ObjectId {
    pub const fn unit(id: u32) -> Self {
        Self { kind: ObjectKind::Unit, id }
    }

    pub const fn feature(id: u32) -> Self {
        Self { kind: ObjectKind::Feature, id }
    }

    pub const fn projectile(id: u32) -> Self {
        Self { kind: ObjectKind::Projectile, id }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.id)
    }
}

/// Identity of an object definition. Projectiles have none.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DefId {
    Unit(u32),
    Feature(u32),
}

/// Identity of the model a definition renders with.
///
/// Definitions that share a model share its bind-pose entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ModelKey(pub u32);

/// What an offset lookup is for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OffsetKey {
    /// Bind-pose matrices of a definition (static).
    Def(DefId),
    /// World + piece matrices of a live object this frame (dynamic).
    Object(ObjectId),
}
