//! Entities and shared entity references.
//!
//! Loaded entities are shared as [`EntityRef<T>`]: an `Arc<RwLock<T>>` plus a
//! stable [`EntityHandle`] assigned when the instance is materialized. The
//! handle is the entity's identity for the rest of the load; two references
//! are "the same entity" iff their handles are equal, regardless of what
//! their fields (or `PartialEq`) say. This lets identity-keyed maps be plain
//! `HashMap<EntityHandle, _>` arenas instead of pointer-keyed maps.

use crate::key::Key;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A mapped entity type.
pub trait Entity: Send + Sync + 'static {
    /// The identifier type of this entity.
    type Id: Key;

    /// Human-readable type name used in logs and relation names.
    const ENTITY_NAME: &'static str;

    /// Read this instance's identifier.
    fn id(&self) -> Self::Id;
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Stable integer identity of one materialized entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(u64);

impl EntityHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw handle value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything that carries an entity identity.
pub trait Identity {
    /// The identity handle of the referenced instance.
    fn handle(&self) -> EntityHandle;
}

/// Runtime type tag, compared by `TypeId`.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type name, for diagnostics only.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this tag denotes `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

/// Shared reference to a loaded entity instance.
pub struct EntityRef<T> {
    handle: EntityHandle,
    cell: Arc<RwLock<T>>,
}

impl<T> EntityRef<T> {
    /// Wrap a freshly materialized entity, assigning it a new handle.
    pub fn new(value: T) -> Self {
        Self {
            handle: EntityHandle::next(),
            cell: Arc::new(RwLock::new(value)),
        }
    }

    /// Acquire a read guard. A poisoned lock is recovered, not propagated.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire a write guard. A poisoned lock is recovered, not propagated.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.cell.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both references point at the same instance.
    pub fn same_entity(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T: Send + Sync + 'static> EntityRef<T> {
    /// Type-erase this reference, keeping its handle and a type tag.
    pub fn erase(&self) -> AnyEntityRef {
        let cell: Arc<dyn Any + Send + Sync> = self.cell.clone();
        AnyEntityRef {
            handle: self.handle,
            tag: TypeTag::of::<T>(),
            cell,
        }
    }
}

impl<T: Entity> EntityRef<T> {
    /// Read the identifier of the referenced entity.
    pub fn id(&self) -> T::Id {
        self.read().id()
    }
}

impl<T> Identity for EntityRef<T> {
    fn handle(&self) -> EntityHandle {
        self.handle
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("type", &std::any::type_name::<T>())
            .field("handle", &self.handle)
            .finish()
    }
}

/// Type-erased [`EntityRef`].
///
/// Stores the `Arc<RwLock<T>>` itself behind `dyn Any` so downcasting
/// returns a reference to the same instance, not a copy.
#[derive(Clone)]
pub struct AnyEntityRef {
    handle: EntityHandle,
    tag: TypeTag,
    cell: Arc<dyn Any + Send + Sync>,
}

impl AnyEntityRef {
    /// Runtime type of the referenced entity.
    pub const fn type_tag(&self) -> TypeTag {
        self.tag
    }

    /// Recover the typed reference, or `None` if `T` is not the runtime type.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<EntityRef<T>> {
        Arc::clone(&self.cell)
            .downcast::<RwLock<T>>()
            .ok()
            .map(|cell| EntityRef {
                handle: self.handle,
                cell,
            })
    }
}

impl Identity for AnyEntityRef {
    fn handle(&self) -> EntityHandle {
        self.handle
    }
}

impl fmt::Debug for AnyEntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyEntityRef")
            .field("type", &self.tag.name())
            .field("handle", &self.handle)
            .finish()
    }
}
