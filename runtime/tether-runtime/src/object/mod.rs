use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::concurrency::NativeLock;

pub(crate) mod mapping;
pub(crate) mod store;

pub use mapping::GuestDict;
pub(crate) use store::ObjectStore;

pub const TYPE_ID_OBJECT: usize = 100;
pub const TYPE_ID_NONE: usize = 101;
pub const TYPE_ID_BOOL: usize = 102;
pub const TYPE_ID_INT: usize = 103;
pub const TYPE_ID_FLOAT: usize = 104;
pub const TYPE_ID_STRING: usize = 200;
pub const TYPE_ID_DICT: usize = 204;
pub const TYPE_ID_LOCK: usize = 230;

// Singletons never share an address with an `Arc` payload, which is always
// word aligned.
const NONE_IDENTITY: usize = 1;
const FALSE_IDENTITY: usize = 2;
const TRUE_IDENTITY: usize = 3;

/// Native type category of a stored object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Object,
    None,
    Bool,
    Int,
    Float,
    Str,
    Dict,
    Lock,
}

impl ObjectKind {
    /// Tag written into `ob_type` when no type block has been registered.
    pub fn default_tag(self) -> usize {
        match self {
            ObjectKind::Object => TYPE_ID_OBJECT,
            ObjectKind::None => TYPE_ID_NONE,
            ObjectKind::Bool => TYPE_ID_BOOL,
            ObjectKind::Int => TYPE_ID_INT,
            ObjectKind::Float => TYPE_ID_FLOAT,
            ObjectKind::Str => TYPE_ID_STRING,
            ObjectKind::Dict => TYPE_ID_DICT,
            ObjectKind::Lock => TYPE_ID_LOCK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Object => "object",
            ObjectKind::None => "NoneType",
            ObjectKind::Bool => "bool",
            ObjectKind::Int => "int",
            ObjectKind::Float => "float",
            ObjectKind::Str => "str",
            ObjectKind::Dict => "dict",
            ObjectKind::Lock => "lock",
        }
    }
}

/// A host-side object reachable from native code through a handle.
///
/// Type-specific behaviour lives with collaborators; the core only needs the
/// kind (for the header tag) and the identity (for de-duplication).
#[derive(Clone)]
pub enum ManagedObject {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Dict(GuestDict),
    Lock(Arc<NativeLock>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl ManagedObject {
    pub fn str(value: &str) -> Self {
        ManagedObject::Str(Arc::from(value))
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        ManagedObject::Opaque(Arc::new(value))
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::None => ObjectKind::None,
            ManagedObject::Bool(_) => ObjectKind::Bool,
            ManagedObject::Int(_) => ObjectKind::Int,
            ManagedObject::Float(_) => ObjectKind::Float,
            ManagedObject::Str(_) => ObjectKind::Str,
            ManagedObject::Dict(_) => ObjectKind::Dict,
            ManagedObject::Lock(_) => ObjectKind::Lock,
            ManagedObject::Opaque(_) => ObjectKind::Object,
        }
    }

    /// Identity used to map an object back to its existing handle. Plain
    /// numbers have none and always get a fresh handle.
    pub fn identity(&self) -> Option<usize> {
        match self {
            ManagedObject::None => Some(NONE_IDENTITY),
            ManagedObject::Bool(false) => Some(FALSE_IDENTITY),
            ManagedObject::Bool(true) => Some(TRUE_IDENTITY),
            ManagedObject::Int(_) | ManagedObject::Float(_) => None,
            ManagedObject::Str(s) => Some(Arc::as_ptr(s) as *const u8 as usize),
            ManagedObject::Dict(d) => Some(d.identity()),
            ManagedObject::Lock(l) => Some(Arc::as_ptr(l) as usize),
            ManagedObject::Opaque(o) => Some(Arc::as_ptr(o) as *const () as usize),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ManagedObject::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ManagedObject::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&GuestDict> {
        match self {
            ManagedObject::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_lock(&self) -> Option<&Arc<NativeLock>> {
        match self {
            ManagedObject::Lock(l) => Some(l),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ManagedObject::Opaque(o) => o.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ManagedObject::None)
    }
}

impl PartialEq for ManagedObject {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ManagedObject::None, ManagedObject::None) => true,
            (ManagedObject::Bool(a), ManagedObject::Bool(b)) => a == b,
            (ManagedObject::Int(a), ManagedObject::Int(b)) => a == b,
            (ManagedObject::Float(a), ManagedObject::Float(b)) => a == b,
            (ManagedObject::Str(a), ManagedObject::Str(b)) => a == b,
            (ManagedObject::Dict(a), ManagedObject::Dict(b)) => a.ptr_eq(b),
            (ManagedObject::Lock(a), ManagedObject::Lock(b)) => Arc::ptr_eq(a, b),
            (ManagedObject::Opaque(_), ManagedObject::Opaque(_)) => {
                self.identity() == other.identity()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedObject::None => f.write_str("None"),
            ManagedObject::Bool(v) => write!(f, "{v:?}"),
            ManagedObject::Int(v) => write!(f, "{v}"),
            ManagedObject::Float(v) => write!(f, "{v:?}"),
            ManagedObject::Str(s) => write!(f, "{s:?}"),
            ManagedObject::Dict(d) => write!(f, "<dict len={}>", d.len()),
            ManagedObject::Lock(l) => write!(f, "<lock locked={}>", l.is_locked()),
            ManagedObject::Opaque(_) => f.write_str("<object>"),
        }
    }
}

impl From<bool> for ManagedObject {
    fn from(value: bool) -> Self {
        ManagedObject::Bool(value)
    }
}

impl From<i64> for ManagedObject {
    fn from(value: i64) -> Self {
        ManagedObject::Int(value)
    }
}

impl From<f64> for ManagedObject {
    fn from(value: f64) -> Self {
        ManagedObject::Float(value)
    }
}

impl From<&str> for ManagedObject {
    fn from(value: &str) -> Self {
        ManagedObject::str(value)
    }
}

impl From<GuestDict> for ManagedObject {
    fn from(value: GuestDict) -> Self {
        ManagedObject::Dict(value)
    }
}
