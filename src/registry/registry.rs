use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use caesar::request::ObjectId;

use super::RegistryError;

/// SharedObjectRegistry holds the application state, one object per object id.
///
/// Objects are registered at startup, before the registry is shared with the delivery threads.
/// After that the set of objects is fixed and only their values change. Each object has its own
/// lock, though the conflict order of requests already keeps two threads from touching one
/// object at the same time.
#[derive(Debug, Default)]
pub struct SharedObjectRegistry<T> {
    objects: HashMap<ObjectId, Mutex<T>>,
}

impl<T> SharedObjectRegistry<T> {
    pub fn with_capacity(capacity: usize) -> SharedObjectRegistry<T> {
        SharedObjectRegistry {
            objects: HashMap::with_capacity(capacity),
        }
    }

    /// register_objects adds an object with its initial value.
    pub fn register_objects(&mut self, oid: ObjectId, initial: T) -> Result<(), RegistryError> {
        if self.objects.contains_key(&oid) {
            return Err(RegistryError::Duplicated(oid));
        }
        self.objects.insert(oid, Mutex::new(initial));
        Ok(())
    }

    /// get_object locks an object for reading or writing.
    pub fn get_object(&self, oid: ObjectId) -> Result<MutexGuard<'_, T>, RegistryError> {
        let obj = self.objects.get(&oid).ok_or(RegistryError::NotFound(oid))?;

        // A panicking delivery thread halts the replica, the value is still consistent.
        Ok(obj.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
