//! Host-assigned resource handles and their context objects.
//!
//! The host registers resources in order and the registry hands out the
//! same dense ids, so handle `n` is the `n`th registration. A registration
//! that breaks this ordering is a desync and leaves the registry unusable.

use std::collections::BTreeSet;
use std::fmt;

use glreplay_webgl::GlObject;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::info::{ResourceInfo, ResourceKind};

/// Dense id of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registration out of order: expected uid {expected}, got {got}")]
    Desync { expected: u32, got: u32 },

    #[error("unknown resource handle {0}")]
    UnknownResource(i64),

    #[error("resource {0} has not been created")]
    NotCreated(Handle),

    #[error("resource {handle} is a {found}, expected a {expected}")]
    WrongKind {
        handle: Handle,
        expected: ResourceKind,
        found: ResourceKind,
    },
}

/// One registered resource.
#[derive(Debug, Clone)]
pub struct Resource {
    pub handle: Handle,
    /// The context object, once a create command ran.
    pub native: Option<GlObject>,
    pub info: ResourceInfo,
}

/// Ordered table of registered resources.
#[derive(Debug, Default)]
pub struct Registry {
    resources: Vec<Resource>,
    dirty: BTreeSet<Handle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next resource. `uid` must equal the number of resources
    /// registered so far.
    pub fn register(&mut self, uid: u32) -> Result<Handle, RegistryError> {
        let expected = self.resources.len() as u32;
        if uid != expected {
            return Err(RegistryError::Desync { expected, got: uid });
        }
        let handle = Handle(uid);
        self.resources.push(Resource {
            handle,
            native: None,
            info: ResourceInfo::Unset,
        });
        trace!(%handle, "Registered resource");
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Validate a raw handle argument from a command.
    pub fn handle(&self, raw: i64) -> Result<Handle, RegistryError> {
        u32::try_from(raw)
            .ok()
            .filter(|&id| (id as usize) < self.resources.len())
            .map(Handle)
            .ok_or(RegistryError::UnknownResource(raw))
    }

    /// Like [`Registry::handle`], with negative values meaning "none".
    pub fn optional_handle(&self, raw: i64) -> Result<Option<Handle>, RegistryError> {
        if raw < 0 {
            Ok(None)
        } else {
            self.handle(raw).map(Some)
        }
    }

    pub fn get(&self, handle: Handle) -> Result<&Resource, RegistryError> {
        self.resources
            .get(handle.index())
            .ok_or(RegistryError::UnknownResource(handle.0 as i64))
    }

    /// Mutable access; callers that change `info` must [`Registry::mark_dirty`].
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Resource, RegistryError> {
        self.resources
            .get_mut(handle.index())
            .ok_or(RegistryError::UnknownResource(handle.0 as i64))
    }

    /// The context object behind `handle`, checked against `kind`.
    pub fn native(&self, handle: Handle, kind: ResourceKind) -> Result<GlObject, RegistryError> {
        let resource = self.get(handle)?;
        match resource.info.kind() {
            None => Err(RegistryError::NotCreated(handle)),
            Some(found) if found != kind => Err(RegistryError::WrongKind {
                handle,
                expected: kind,
                found,
            }),
            Some(_) => resource.native.ok_or(RegistryError::NotCreated(handle)),
        }
    }

    /// Record the context object and initial info of a freshly created resource.
    pub fn create(
        &mut self,
        handle: Handle,
        native: GlObject,
        info: ResourceInfo,
    ) -> Result<(), RegistryError> {
        let resource = self.get_mut(handle)?;
        resource.native = Some(native);
        resource.info = info;
        self.dirty.insert(handle);
        Ok(())
    }

    pub fn set_info(&mut self, handle: Handle, info: ResourceInfo) -> Result<(), RegistryError> {
        self.get_mut(handle)?.info = info;
        self.dirty.insert(handle);
        Ok(())
    }

    pub fn mark_dirty(&mut self, handle: Handle) {
        self.dirty.insert(handle);
    }

    /// Handles whose info changed since the last call, in id order.
    pub fn take_dirty(&mut self) -> Vec<Handle> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::BufferInfo;

    #[test]
    fn test_register_in_order() {
        let mut registry = Registry::new();
        assert_eq!(registry.register(0).unwrap(), Handle(0));
        assert_eq!(registry.register(1).unwrap(), Handle(1));
        assert_eq!(
            registry.register(3),
            Err(RegistryError::Desync {
                expected: 2,
                got: 3
            })
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(Handle(1)).unwrap().info, ResourceInfo::Unset);
    }

    #[test]
    fn test_handle_arguments() {
        let mut registry = Registry::new();
        registry.register(0).unwrap();
        assert_eq!(registry.handle(0), Ok(Handle(0)));
        assert_eq!(registry.handle(1), Err(RegistryError::UnknownResource(1)));
        assert_eq!(registry.handle(-1), Err(RegistryError::UnknownResource(-1)));
        assert_eq!(registry.optional_handle(-1), Ok(None));
        assert_eq!(registry.optional_handle(0), Ok(Some(Handle(0))));
    }

    #[test]
    fn test_native_checks_kind() {
        let mut registry = Registry::new();
        let h = registry.register(0).unwrap();
        assert_eq!(
            registry.native(h, ResourceKind::Buffer),
            Err(RegistryError::NotCreated(h))
        );

        let obj = GlObject::new();
        registry
            .create(h, obj, ResourceInfo::Buffer(BufferInfo::default()))
            .unwrap();
        assert_eq!(registry.native(h, ResourceKind::Buffer), Ok(obj));
        assert_eq!(
            registry.native(h, ResourceKind::Texture),
            Err(RegistryError::WrongKind {
                handle: h,
                expected: ResourceKind::Texture,
                found: ResourceKind::Buffer,
            })
        );
    }

    #[test]
    fn test_dirty_tracking() {
        let mut registry = Registry::new();
        for uid in 0..3 {
            registry.register(uid).unwrap();
        }
        registry.set_info(Handle(2), ResourceInfo::Texture).unwrap();
        registry
            .create(Handle(0), GlObject::new(), ResourceInfo::Framebuffer)
            .unwrap();
        registry.mark_dirty(Handle(2));

        assert_eq!(registry.take_dirty(), vec![Handle(0), Handle(2)]);
        assert!(registry.take_dirty().is_empty());
    }
}
