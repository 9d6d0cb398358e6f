use super::{DefId, Mat4, ModelKey, ObjectId};

/// A live object whose transforms are published to the instance buffer.
pub trait SceneObject {
    fn id(&self) -> ObjectId;

    /// Definition and model, or `None` for objects without one (projectiles).
    fn definition(&self) -> Option<(DefId, ModelKey)>;

    fn world_transform(&self) -> Mat4;

    /// Appends the current piece-local transforms, one per model piece.
    fn piece_transforms(&self, _out: &mut Vec<Mat4>) {}

    /// Team/owner index forwarded to per-instance draw data.
    fn team(&self) -> u32 {
        0
    }
}

/// Supplies bind-pose piece matrices of models.
pub trait ModelSource {
    /// Appends one bind-pose matrix per piece of `model`.
    fn bind_pose(&self, model: ModelKey, out: &mut Vec<Mat4>);
}

/// Visibility predicate supplied by the culling layer.
pub trait Visibility<O: ?Sized> {
    fn is_visible(&self, object: &O) -> bool;
}

impl<O: ?Sized, F> Visibility<O> for F
where
    F: Fn(&O) -> bool,
{
    #[inline]
    fn is_visible(&self, object: &O) -> bool {
        self(object)
    }
}
